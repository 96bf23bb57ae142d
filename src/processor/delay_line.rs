use crate::core::ring_buffer::RingBuffer;
use crate::core::types::{ProcessContext, ProcessSpec, Sample};
use crate::error::FxError;
use crate::processor::{check_block, Processor};

/// Longest accepted delay: ten seconds at 192 kHz.
pub const MAX_DELAY_SAMPLES: usize = 1_920_000;

/// Pure integer-sample delay.
///
/// Each channel runs through a FIFO pre-filled with `delay_samples` zeros,
/// so output frame `i` is input frame `i - delay_samples`.
#[derive(Debug, Clone, Default)]
pub struct DelayLine {
    delay_samples: usize,
    lines: Vec<RingBuffer<Sample>>,
    spec: Option<ProcessSpec>,
}

impl DelayLine {
    pub fn new(delay_samples: usize) -> Result<Self, FxError> {
        check_delay(delay_samples)?;
        Ok(Self {
            delay_samples,
            lines: Vec::new(),
            spec: None,
        })
    }

    pub fn delay_samples(&self) -> usize {
        self.delay_samples
    }

    /// Changes the delay. A prepared line is rebuilt and starts silent.
    pub fn set_delay_samples(&mut self, delay_samples: usize) -> Result<(), FxError> {
        check_delay(delay_samples)?;
        self.delay_samples = delay_samples;
        if let Some(spec) = self.spec {
            self.build(&spec);
        }
        Ok(())
    }

    fn build(&mut self, spec: &ProcessSpec) {
        let capacity = self.delay_samples + spec.max_block_size;
        self.lines = (0..spec.num_channels)
            .map(|_| RingBuffer::with_capacity(capacity))
            .collect();
        self.reset();
    }
}

fn check_delay(delay_samples: usize) -> Result<(), FxError> {
    if delay_samples > MAX_DELAY_SAMPLES {
        return Err(FxError::bad_parameter(format!(
            "delay of {delay_samples} samples exceeds maximum {MAX_DELAY_SAMPLES}"
        )));
    }
    Ok(())
}

impl Processor for DelayLine {
    fn prepare(&mut self, spec: &ProcessSpec) -> Result<(), FxError> {
        spec.validate()?;
        if self.spec.as_ref() == Some(spec) {
            return Ok(());
        }
        self.build(spec);
        self.spec = Some(*spec);
        Ok(())
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<usize, FxError> {
        let frames = ctx.num_frames();
        if ctx.is_bypassed {
            // The block stays as is, but the history keeps following the input.
            if check_block(self.spec.as_ref(), ctx, self.name()).is_ok() {
                for (line, channel) in self.lines.iter_mut().zip(ctx.block.views()) {
                    line.push_slice(channel);
                    line.discard(channel.len());
                }
            }
            return Ok(frames);
        }
        check_block(self.spec.as_ref(), ctx, self.name())?;
        for (line, channel) in self.lines.iter_mut().zip(ctx.block.channels_mut()) {
            line.push_slice(channel);
            line.pop_slice(&mut channel[..]);
        }
        Ok(frames)
    }

    fn reset(&mut self) {
        for line in &mut self.lines {
            line.clear();
            line.push_default(self.delay_samples);
        }
    }

    fn latency_hint(&self) -> usize {
        self.delay_samples
    }

    fn name(&self) -> &'static str {
        "delay_line"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::buffer::AudioBuffer;

    fn run(delay: &mut DelayLine, input: &[f32], block: usize) -> Vec<f32> {
        let mut buf = AudioBuffer::from_mono(input.to_vec());
        let mut start = 0;
        while start < input.len() {
            let len = block.min(input.len() - start);
            let mut ctx = ProcessContext::new(buf.block_mut(start, len));
            delay.process(&mut ctx).unwrap();
            start += len;
        }
        buf.channel(0).to_vec()
    }

    #[test]
    fn shifts_impulse_across_blocks() {
        let mut delay = DelayLine::new(10).unwrap();
        delay.prepare(&ProcessSpec::new(44100.0, 4, 1)).unwrap();
        let mut input = vec![0.0; 32];
        input[3] = 1.0;
        let out = run(&mut delay, &input, 4);
        assert_eq!(out.iter().position(|&s| s == 1.0), Some(13));
        assert_eq!(out.iter().filter(|&&s| s != 0.0).count(), 1);
    }

    #[test]
    fn zero_delay_passes_through() {
        let mut delay = DelayLine::new(0).unwrap();
        delay.prepare(&ProcessSpec::new(44100.0, 8, 1)).unwrap();
        let input: Vec<f32> = (0..20).map(|i| i as f32).collect();
        assert_eq!(run(&mut delay, &input, 8), input);
    }

    #[test]
    fn reset_restores_silence() {
        let mut delay = DelayLine::new(2).unwrap();
        delay.prepare(&ProcessSpec::new(44100.0, 4, 1)).unwrap();
        run(&mut delay, &[1.0; 4], 4);
        delay.reset();
        assert_eq!(run(&mut delay, &[0.0; 4], 4), vec![0.0; 4]);
    }

    #[test]
    fn bypassed_blocks_still_enter_the_history() {
        let mut delay = DelayLine::new(4).unwrap();
        delay.prepare(&ProcessSpec::new(44100.0, 4, 1)).unwrap();
        run(&mut delay, &[1.0; 4], 4);

        let mut buf = AudioBuffer::from_mono(vec![2.0; 4]);
        {
            let mut ctx = ProcessContext::bypassed(buf.block_mut(0, 4));
            assert_eq!(delay.process(&mut ctx).unwrap(), 4);
        }
        assert_eq!(buf.channel(0), &[2.0; 4]);

        assert_eq!(run(&mut delay, &[3.0; 4], 4), vec![2.0; 4]);
    }

    #[test]
    fn rejects_excessive_delay() {
        assert!(matches!(
            DelayLine::new(MAX_DELAY_SAMPLES + 1),
            Err(FxError::BadParameter(_))
        ));
        let mut delay = DelayLine::new(5).unwrap();
        assert!(delay.set_delay_samples(usize::MAX).is_err());
        assert_eq!(delay.latency_hint(), 5);
    }
}
