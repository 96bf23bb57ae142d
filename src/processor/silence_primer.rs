use crate::core::types::{ProcessContext, ProcessSpec};
use crate::error::FxError;
use crate::processor::{DelayLine, Processor};

/// Warms up a processor on silence before it sees real input.
///
/// Phase vocoders and similar effects emit start-up transients. The
/// wrapper delays the real signal by `silence_len` frames so the inner
/// processor first consumes that many zeros, and reports the extra delay
/// in its latency so a pipeline drops the primed region.
///
/// Bypassed blocks still enter the delay, so the signal stays continuous
/// when bypass is switched off again.
#[derive(Debug, Clone)]
pub struct SilencePrimer<P> {
    inner: P,
    silence_override: Option<usize>,
    silence: DelayLine,
    frames_fed_to_inner: usize,
}

impl<P: Processor> SilencePrimer<P> {
    /// Primes with one second of silence, measured at `prepare`.
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            silence_override: None,
            silence: DelayLine::default(),
            frames_fed_to_inner: 0,
        }
    }

    /// Primes with exactly `frames` frames of silence.
    pub fn with_silence_frames(mut self, frames: usize) -> Result<Self, FxError> {
        self.silence.set_delay_samples(frames)?;
        self.silence_override = Some(frames);
        Ok(self)
    }

    pub fn silence_len(&self) -> usize {
        self.silence.delay_samples()
    }

    pub fn frames_fed_to_inner(&self) -> usize {
        self.frames_fed_to_inner
    }

    /// True once the inner processor has consumed all of the silence.
    pub fn is_primed(&self) -> bool {
        self.frames_fed_to_inner >= self.silence_len()
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut P {
        &mut self.inner
    }

    pub fn into_inner(self) -> P {
        self.inner
    }
}

impl<P: Processor> Processor for SilencePrimer<P> {
    fn prepare(&mut self, spec: &ProcessSpec) -> Result<(), FxError> {
        let silence = self
            .silence_override
            .unwrap_or_else(|| spec.sample_rate.round() as usize);
        if silence != self.silence.delay_samples() {
            self.silence.set_delay_samples(silence)?;
        }
        self.silence.prepare(spec)?;
        self.inner.prepare(spec)
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<usize, FxError> {
        let frames = ctx.num_frames();
        if ctx.is_bypassed {
            // Keeps the delayed history in step with the input; the block
            // itself is left alone.
            self.silence.process(ctx)?;
            return Ok(frames);
        }
        self.silence.process(ctx)?;
        let valid = self.inner.process(ctx)?;
        self.frames_fed_to_inner = self.frames_fed_to_inner.saturating_add(frames);
        Ok(valid)
    }

    fn reset(&mut self) {
        self.frames_fed_to_inner = 0;
        self.silence.reset();
        self.inner.reset();
    }

    fn latency_hint(&self) -> usize {
        self.silence_len() + self.inner.latency_hint()
    }

    fn name(&self) -> &'static str {
        "silence_primer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::buffer::AudioBuffer;
    use crate::processor::Gain;

    #[test]
    fn default_silence_is_one_second() {
        let mut primer = SilencePrimer::new(Gain::new(0.0).unwrap());
        primer.prepare(&ProcessSpec::new(8000.0, 256, 1)).unwrap();
        assert_eq!(primer.silence_len(), 8000);
        assert_eq!(primer.latency_hint(), 8000);
    }

    #[test]
    fn latency_adds_inner_latency() {
        let primer = SilencePrimer::new(DelayLine::new(30).unwrap())
            .with_silence_frames(100)
            .unwrap();
        assert_eq!(primer.latency_hint(), 130);
    }

    #[test]
    fn inner_sees_silence_first() {
        let mut primer = SilencePrimer::new(Gain::new(0.0).unwrap())
            .with_silence_frames(6)
            .unwrap();
        primer.prepare(&ProcessSpec::new(44100.0, 4, 1)).unwrap();
        let mut buf = AudioBuffer::from_mono(vec![1.0; 12]);
        for start in (0..12).step_by(4) {
            let mut ctx = ProcessContext::new(buf.block_mut(start, 4));
            primer.process(&mut ctx).unwrap();
        }
        assert_eq!(&buf.channel(0)[..6], &[0.0; 6]);
        assert_eq!(&buf.channel(0)[6..], &[1.0; 6]);
        assert!(primer.is_primed());
        assert_eq!(primer.frames_fed_to_inner(), 12);

        primer.reset();
        assert_eq!(primer.frames_fed_to_inner(), 0);
        assert!(!primer.is_primed());
    }

    #[test]
    fn bypass_keeps_delayed_input_aligned() {
        let mut primer = SilencePrimer::new(Gain::new(0.0).unwrap())
            .with_silence_frames(4)
            .unwrap();
        primer.prepare(&ProcessSpec::new(44100.0, 4, 1)).unwrap();
        let mut buf = AudioBuffer::from_mono([[1.0; 4], [2.0; 4], [3.0; 4]].concat());
        for (start, bypassed) in [(0, false), (4, true), (8, false)] {
            let block = buf.block_mut(start, 4);
            let mut ctx = if bypassed {
                ProcessContext::bypassed(block)
            } else {
                ProcessContext::new(block)
            };
            assert_eq!(primer.process(&mut ctx).unwrap(), 4);
        }
        let out = buf.channel(0);
        assert_eq!(&out[..4], &[0.0; 4]);
        assert_eq!(&out[4..8], &[2.0; 4]);
        assert_eq!(&out[8..], &[2.0; 4]);
        assert_eq!(primer.frames_fed_to_inner(), 8);
    }
}
