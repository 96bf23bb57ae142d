use crate::core::buffer::AudioBlock;
use crate::error::FxError;

/// A single audio sample (32-bit float, nominal range -1.0 to 1.0).
pub type Sample = f32;

/// Largest pitch shift accepted anywhere in the crate, in semitones.
pub const MAX_PITCH_SEMITONES: f64 = 72.0;

/// Stream configuration handed to [`crate::Processor::prepare`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProcessSpec {
    /// Sample rate in Hz.
    pub sample_rate: f64,
    /// Largest block the driver will pass to `process`.
    pub max_block_size: usize,
    /// Channels in every block.
    pub num_channels: usize,
}

impl ProcessSpec {
    pub fn new(sample_rate: f64, max_block_size: usize, num_channels: usize) -> Self {
        Self {
            sample_rate,
            max_block_size,
            num_channels,
        }
    }

    /// Checks the invariants `sample_rate > 0`, `max_block_size >= 1` and
    /// `num_channels >= 1`.
    pub fn validate(&self) -> Result<(), FxError> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(FxError::bad_parameter(format!(
                "sample rate must be positive, got {}",
                self.sample_rate
            )));
        }
        if self.max_block_size == 0 {
            return Err(FxError::bad_parameter("block size must be at least 1"));
        }
        if self.num_channels == 0 {
            return Err(FxError::bad_parameter("at least one channel is required"));
        }
        Ok(())
    }
}

/// One block of in-place audio work.
#[derive(Debug)]
pub struct ProcessContext<'a> {
    /// Input on entry, output on return.
    pub block: AudioBlock<'a>,
    /// When set, processors must leave the block unchanged.
    pub is_bypassed: bool,
}

impl<'a> ProcessContext<'a> {
    pub fn new(block: AudioBlock<'a>) -> Self {
        Self {
            block,
            is_bypassed: false,
        }
    }

    /// A context whose processor should pass audio through untouched.
    pub fn bypassed(block: AudioBlock<'a>) -> Self {
        Self {
            block,
            is_bypassed: true,
        }
    }

    #[inline]
    pub fn num_frames(&self) -> usize {
        self.block.num_frames()
    }

    #[inline]
    pub fn num_channels(&self) -> usize {
        self.block.num_channels()
    }
}

/// A parameter that is either fixed or given per input frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Control<'a> {
    Constant(f64),
    Curve(&'a [f64]),
}

impl Control<'_> {
    /// Value at `frame`. Constants ignore the index.
    ///
    /// # Panics
    /// Panics if a curve is indexed out of range.
    #[inline]
    pub fn at(&self, frame: usize) -> f64 {
        match self {
            Control::Constant(v) => *v,
            Control::Curve(c) => c[frame],
        }
    }

    #[inline]
    pub fn is_curve(&self) -> bool {
        matches!(self, Control::Curve(_))
    }

    /// Iterates over every value the control can take.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        let (constant, curve) = match self {
            Control::Constant(v) => (Some(*v), &[][..]),
            Control::Curve(c) => (None, *c),
        };
        constant.into_iter().chain(curve.iter().copied())
    }
}

impl From<f64> for Control<'_> {
    fn from(v: f64) -> Self {
        Control::Constant(v)
    }
}

impl<'a> From<&'a [f64]> for Control<'a> {
    fn from(c: &'a [f64]) -> Self {
        Control::Curve(c)
    }
}

impl<'a> From<&'a Vec<f64>> for Control<'a> {
    fn from(c: &'a Vec<f64>) -> Self {
        Control::Curve(c.as_slice())
    }
}

/// Converts a pitch shift in semitones to a frequency scale factor.
#[inline]
pub fn semitones_to_pitch_scale(semitones: f64) -> f64 {
    2f64.powf(semitones / 12.0)
}

/// Converts decibels to a linear amplitude factor.
#[inline]
pub fn db_to_gain(db: f64) -> f64 {
    10f64.powf(db / 20.0)
}

/// Rejects pitch shifts that are not finite or exceed ±72 semitones.
pub fn check_semitones(semitones: f64) -> Result<(), FxError> {
    if !semitones.is_finite() || semitones.abs() > MAX_PITCH_SEMITONES {
        return Err(FxError::bad_parameter(format!(
            "pitch shift must be within [-{MAX_PITCH_SEMITONES}, {MAX_PITCH_SEMITONES}] semitones, got {semitones}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn semitone_conversion() {
        assert_relative_eq!(semitones_to_pitch_scale(12.0), 2.0, epsilon = 1e-12);
        assert_relative_eq!(semitones_to_pitch_scale(-12.0), 0.5, epsilon = 1e-12);
        assert_relative_eq!(semitones_to_pitch_scale(0.0), 1.0);
    }

    #[test]
    fn db_conversion() {
        assert_relative_eq!(db_to_gain(0.0), 1.0);
        assert_relative_eq!(db_to_gain(6.0), 1.9953, epsilon = 1e-4);
        assert_relative_eq!(db_to_gain(-20.0), 0.1, epsilon = 1e-12);
    }

    #[test]
    fn semitone_range_is_inclusive() {
        assert!(check_semitones(72.0).is_ok());
        assert!(check_semitones(-72.0).is_ok());
        assert!(check_semitones(72.5).is_err());
        assert!(check_semitones(f64::NAN).is_err());
    }

    #[test]
    fn spec_validation() {
        assert!(ProcessSpec::new(44100.0, 512, 2).validate().is_ok());
        assert!(ProcessSpec::new(0.0, 512, 2).validate().is_err());
        assert!(ProcessSpec::new(44100.0, 0, 2).validate().is_err());
        assert!(ProcessSpec::new(44100.0, 512, 0).validate().is_err());
    }

    #[test]
    fn control_values() {
        let curve = [1.0, 2.0, 3.0];
        let c = Control::from(&curve[..]);
        assert!(c.is_curve());
        assert_eq!(c.at(1), 2.0);
        assert_eq!(c.values().collect::<Vec<_>>(), vec![1.0, 2.0, 3.0]);
        let k = Control::from(0.5);
        assert_eq!(k.at(99), 0.5);
        assert_eq!(k.values().count(), 1);
    }
}
