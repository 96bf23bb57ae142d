use crate::core::types::{check_semitones, semitones_to_pitch_scale, ProcessContext, ProcessSpec};
use crate::error::FxError;
use crate::processor::{Processor, SilencePrimer, StretcherProcessor};
use crate::stretch::TimeStretchOptions;

/// Pitch shift in semitones, primed on silence to hide the vocoder's
/// start-up transient.
#[derive(Debug)]
pub struct PitchShift {
    semitones: f64,
    inner: SilencePrimer<StretcherProcessor>,
}

impl PitchShift {
    pub fn new(semitones: f64) -> Result<Self, FxError> {
        check_semitones(semitones)?;
        let stretcher = StretcherProcessor::new(semitones_to_pitch_scale(semitones))?;
        Ok(Self {
            semitones,
            inner: SilencePrimer::new(stretcher),
        })
    }

    /// Replaces the default one second of priming silence.
    pub fn with_silence_frames(mut self, frames: usize) -> Result<Self, FxError> {
        self.inner = self.inner.with_silence_frames(frames)?;
        Ok(self)
    }

    pub fn with_options(mut self, options: TimeStretchOptions) -> Self {
        self.inner.inner_mut().set_options(options);
        self
    }

    pub fn semitones(&self) -> f64 {
        self.semitones
    }

    pub fn set_semitones(&mut self, semitones: f64) -> Result<(), FxError> {
        check_semitones(semitones)?;
        self.inner
            .inner_mut()
            .set_pitch_scale(semitones_to_pitch_scale(semitones))?;
        self.semitones = semitones;
        Ok(())
    }
}

impl Processor for PitchShift {
    fn prepare(&mut self, spec: &ProcessSpec) -> Result<(), FxError> {
        self.inner.prepare(spec)
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<usize, FxError> {
        self.inner.process(ctx)
    }

    fn reset(&mut self) {
        self.inner.reset();
    }

    fn latency_hint(&self) -> usize {
        self.inner.latency_hint()
    }

    fn name(&self) -> &'static str {
        "pitch_shift"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semitone_range_is_checked() {
        assert!(PitchShift::new(72.0).is_ok());
        assert!(matches!(PitchShift::new(-72.5), Err(FxError::BadParameter(_))));
        let mut shift = PitchShift::new(0.0).unwrap();
        assert!(shift.set_semitones(100.0).is_err());
        assert_eq!(shift.semitones(), 0.0);
        shift.set_semitones(-12.0).unwrap();
        assert_eq!(shift.semitones(), -12.0);
    }

    #[test]
    fn latency_covers_priming_and_window() {
        let mut shift = PitchShift::new(5.0).unwrap().with_silence_frames(1000).unwrap();
        shift.prepare(&ProcessSpec::new(44100.0, 1024, 1)).unwrap();
        assert_eq!(shift.latency_hint(), 1000 + 2048);
    }

    #[test]
    fn unprepared_process_fails() {
        let mut shift = PitchShift::new(3.0).unwrap();
        let mut buf = crate::core::buffer::AudioBuffer::from_mono(vec![0.0; 16]);
        let mut ctx = ProcessContext::new(buf.block_mut(0, 16));
        assert!(shift.process(&mut ctx).is_err());
    }
}
