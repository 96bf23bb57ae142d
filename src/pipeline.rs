//! Block-streaming driver for a chain of [`Processor`]s.

use tracing::{debug, trace, warn};

use crate::core::buffer::AudioBuffer;
use crate::core::types::{ProcessContext, ProcessSpec};
use crate::error::FxError;
use crate::processor::Processor;

/// Block size used when none is configured.
pub const DEFAULT_BLOCK_SIZE: usize = 8192;

/// Runs a buffer through processors in series, cancelling their latency.
///
/// The input is padded with as much silence as the processors report in
/// latency. After each processor has seen the whole padded buffer, its
/// output is shifted left by its own latency, so every processor sees
/// input aligned with the original and the result has the input's length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineDriver {
    sample_rate: f64,
    block_size: usize,
}

impl PipelineDriver {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Processes `input` through every processor in order.
    ///
    /// # Errors
    /// `BadParameter` for a non-positive sample rate or a zero block size.
    /// An error from processor `k` is wrapped in
    /// [`FxError::ProcessorFailed`] with `index: k`.
    pub fn run<P: Processor>(&self, input: &AudioBuffer, processors: &mut [P]) -> Result<AudioBuffer, FxError> {
        let spec = ProcessSpec::new(self.sample_rate, self.block_size, input.num_channels());
        spec.validate()?;

        for (index, processor) in processors.iter_mut().enumerate() {
            processor
                .prepare(&spec)
                .map_err(|e| failed(index, processor.name(), e))?;
            processor.reset();
        }

        let frames = input.num_frames();
        let latencies: Vec<usize> = processors.iter().map(|p| p.latency_hint()).collect();
        let total_latency: usize = latencies.iter().sum();
        debug!(
            processors = processors.len(),
            frames,
            total_latency,
            block_size = self.block_size,
            "pipeline prepared"
        );

        let padded = frames
            .checked_add(total_latency)
            .ok_or_else(|| FxError::ResourceExhausted("padded length overflows".to_string()))?;
        let mut scratch = AudioBuffer::with_capacity(input.num_channels(), padded)?;
        scratch.set_num_frames(padded)?;
        for (ch, src) in input.channels().enumerate() {
            scratch.channel_mut(ch)[..frames].copy_from_slice(src);
        }

        for (index, (processor, &latency)) in processors.iter_mut().zip(&latencies).enumerate() {
            let mut valid_head = 0usize;
            let mut start = 0;
            while start < padded {
                let len = self.block_size.min(padded - start);
                let mut ctx = ProcessContext::new(scratch.block_mut(start, len));
                let valid = processor
                    .process(&mut ctx)
                    .map_err(|e| failed(index, processor.name(), e))?;
                valid_head += valid.min(len);
                start += len;
            }
            if valid_head < padded {
                warn!(
                    index,
                    name = processor.name(),
                    valid_head,
                    padded,
                    "processor returned fewer valid frames than it processed"
                );
            }

            trace!(index, name = processor.name(), latency, "compensating latency");
            if latency > 0 {
                for ch in 0..scratch.num_channels() {
                    let data = scratch.channel_mut(ch);
                    data.copy_within(latency.., 0);
                    data[padded - latency..].fill(0.0);
                }
            }
        }

        scratch.set_num_frames(frames)?;
        Ok(scratch)
    }
}

fn failed(index: usize, name: &'static str, source: FxError) -> FxError {
    FxError::ProcessorFailed {
        index,
        name,
        source: Box::new(source),
    }
}
