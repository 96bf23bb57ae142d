use crate::core::types::{db_to_gain, ProcessContext, ProcessSpec};
use crate::error::FxError;
use crate::processor::{check_block, Processor};

/// Static gain in decibels.
#[derive(Debug, Clone)]
pub struct Gain {
    gain_db: f64,
    factor: f32,
    spec: Option<ProcessSpec>,
}

impl Gain {
    pub fn new(gain_db: f64) -> Result<Self, FxError> {
        let mut gain = Self {
            gain_db: 0.0,
            factor: 1.0,
            spec: None,
        };
        gain.set_gain_db(gain_db)?;
        Ok(gain)
    }

    pub fn gain_db(&self) -> f64 {
        self.gain_db
    }

    /// Linear factor applied to every sample.
    pub fn factor(&self) -> f32 {
        self.factor
    }

    pub fn set_gain_db(&mut self, gain_db: f64) -> Result<(), FxError> {
        if !gain_db.is_finite() {
            return Err(FxError::bad_parameter(format!("gain must be finite, got {gain_db} dB")));
        }
        self.gain_db = gain_db;
        self.factor = db_to_gain(gain_db) as f32;
        Ok(())
    }
}

impl Processor for Gain {
    fn prepare(&mut self, spec: &ProcessSpec) -> Result<(), FxError> {
        spec.validate()?;
        self.spec = Some(*spec);
        Ok(())
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<usize, FxError> {
        let frames = ctx.num_frames();
        if ctx.is_bypassed {
            return Ok(frames);
        }
        check_block(self.spec.as_ref(), ctx, self.name())?;
        for channel in ctx.block.channels_mut() {
            for s in &mut channel[..] {
                *s *= self.factor;
            }
        }
        Ok(frames)
    }

    fn reset(&mut self) {}

    fn latency_hint(&self) -> usize {
        0
    }

    fn name(&self) -> &'static str {
        "gain"
    }
}
