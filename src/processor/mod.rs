//! Block processors and the contract the pipeline drives them through.

mod delay_line;
mod gain;
mod pitch_shift;
mod silence_primer;
mod stretcher;

pub use delay_line::{DelayLine, MAX_DELAY_SAMPLES};
pub use gain::Gain;
pub use pitch_shift::PitchShift;
pub use silence_primer::SilencePrimer;
pub use stretcher::StretcherProcessor;

use crate::core::types::{ProcessContext, ProcessSpec};
use crate::error::FxError;

/// An in-place audio effect.
///
/// A processor is prepared for a [`ProcessSpec`], then fed blocks of at
/// most `spec.max_block_size` frames. Each call reads the block and
/// overwrites it with output.
pub trait Processor: Send {
    /// Configures buffers for `spec`. Calling it again with an equal spec
    /// does nothing.
    fn prepare(&mut self, spec: &ProcessSpec) -> Result<(), FxError>;

    /// Processes one block in place and returns how many of its frames hold
    /// valid output.
    ///
    /// A bypassed context must be left untouched and reports the full
    /// block.
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<usize, FxError>;

    /// Clears streaming state, keeping configuration.
    fn reset(&mut self);

    /// Leading output frames that are invalid after a reset.
    fn latency_hint(&self) -> usize;

    /// Short label for logs and errors.
    fn name(&self) -> &'static str;
}

impl<P: Processor + ?Sized> Processor for Box<P> {
    fn prepare(&mut self, spec: &ProcessSpec) -> Result<(), FxError> {
        (**self).prepare(spec)
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<usize, FxError> {
        (**self).process(ctx)
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn latency_hint(&self) -> usize {
        (**self).latency_hint()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Fails unless `ctx` fits the prepared `spec`.
pub(crate) fn check_block(
    spec: Option<&ProcessSpec>,
    ctx: &ProcessContext<'_>,
    name: &str,
) -> Result<(), FxError> {
    let Some(spec) = spec else {
        return Err(FxError::internal(format!("{name} processed before prepare")));
    };
    if ctx.num_channels() != spec.num_channels {
        return Err(FxError::internal(format!(
            "{name} prepared for {} channels, got {}",
            spec.num_channels,
            ctx.num_channels()
        )));
    }
    if ctx.num_frames() > spec.max_block_size {
        return Err(FxError::internal(format!(
            "{name} block of {} frames exceeds prepared maximum {}",
            ctx.num_frames(),
            spec.max_block_size
        )));
    }
    Ok(())
}
