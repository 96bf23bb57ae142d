//! Cepstral spectral envelope for formant-preserving pitch shifts.
//!
//! Shifting bins by a pitch scale also moves the spectral envelope, which
//! turns voices into chipmunks or giants. [`FormantCorrector`] measures the
//! envelope of each analysis frame and rescales the shifted magnitudes so
//! the envelope stays where it was.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft};

use crate::core::fft::COMPLEX_ZERO;

/// Minimum magnitude floor to avoid log(0) in cepstral analysis.
const LOG_FLOOR: f32 = 1e-10;
/// Largest gain or cut applied to any bin by envelope correction.
const MAX_CORRECTION: f32 = 10.0;
/// Below this fraction of the frame peak, bins are left uncorrected.
const CORRECTION_FLOOR_RATIO: f32 = 1e-4;

/// Chooses a cepstral order from the spectral centroid of a frame.
///
/// Bass-heavy frames get fewer coefficients so the envelope does not
/// follow individual harmonics; bright frames get more to keep formants.
/// The result is clamped to `[10, fft_size / 4]`.
pub fn adaptive_cepstral_order(centroid_hz: f32, fft_size: usize) -> usize {
    let order = if centroid_hz < 500.0 {
        25
    } else if centroid_hz < 1500.0 {
        35
    } else if centroid_hz < 4000.0 {
        50
    } else {
        40
    };
    order.min(fft_size / 4).max(10)
}

/// Magnitude-weighted mean frequency in Hz, 1 kHz for silent frames.
pub fn spectral_centroid(magnitudes: &[f32], sample_rate: f64, fft_size: usize) -> f32 {
    let bin_freq = sample_rate / fft_size as f64;
    let (weighted, total) = magnitudes
        .iter()
        .enumerate()
        .fold((0.0f64, 0.0f64), |(w, t), (i, &m)| {
            (w + i as f64 * bin_freq * m as f64, t + m as f64)
        });
    if total > 1e-10 {
        (weighted / total) as f32
    } else {
        1000.0
    }
}

/// Per-stretcher envelope state with preallocated FFT scratch.
pub struct FormantCorrector {
    fft_size: usize,
    sample_rate: f64,
    fft_forward: Arc<dyn Fft<f32>>,
    fft_inverse: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex<f32>>,
    cepstrum: Vec<Complex<f32>>,
    envelope: Vec<f32>,
}

impl FormantCorrector {
    pub fn new(
        fft_size: usize,
        sample_rate: f64,
        fft_forward: Arc<dyn Fft<f32>>,
        fft_inverse: Arc<dyn Fft<f32>>,
    ) -> Self {
        let scratch_len = fft_forward
            .get_inplace_scratch_len()
            .max(fft_inverse.get_inplace_scratch_len());
        Self {
            fft_size,
            sample_rate,
            fft_forward,
            fft_inverse,
            scratch: vec![COMPLEX_ZERO; scratch_len],
            cepstrum: vec![COMPLEX_ZERO; fft_size],
            envelope: vec![1.0; fft_size / 2 + 1],
        }
    }

    /// Envelope of the most recent [`FormantCorrector::analyze`] call.
    pub fn envelope(&self) -> &[f32] {
        &self.envelope
    }

    /// Extracts the spectral envelope of `magnitudes` (one frame, `fft/2+1`
    /// bins) through the real cepstrum.
    pub fn analyze(&mut self, magnitudes: &[f32]) {
        let num_bins = self.fft_size / 2 + 1;
        let centroid = spectral_centroid(&magnitudes[..num_bins], self.sample_rate, self.fft_size);
        let order = adaptive_cepstral_order(centroid, self.fft_size);

        for (c, &m) in self.cepstrum.iter_mut().zip(&magnitudes[..num_bins]) {
            *c = Complex::new(m.max(LOG_FLOOR).ln(), 0.0);
        }
        for i in 1..num_bins - 1 {
            self.cepstrum[self.fft_size - i] = self.cepstrum[i];
        }

        let inv_need = self.fft_inverse.get_inplace_scratch_len();
        self.fft_inverse
            .process_with_scratch(&mut self.cepstrum, &mut self.scratch[..inv_need]);

        // Lifter: keep low quefrencies and their mirror.
        let norm = 1.0 / self.fft_size as f32;
        let effective_order = order.min(self.fft_size / 2);
        for (i, c) in self.cepstrum.iter_mut().enumerate() {
            if i > effective_order && i < self.fft_size - effective_order {
                *c = COMPLEX_ZERO;
            } else {
                *c *= norm;
            }
        }

        let fwd_need = self.fft_forward.get_inplace_scratch_len();
        self.fft_forward
            .process_with_scratch(&mut self.cepstrum, &mut self.scratch[..fwd_need]);

        for (e, c) in self.envelope.iter_mut().zip(&self.cepstrum) {
            *e = c.re.exp();
        }
    }

    /// Rescales bin-shifted magnitudes so that target bin `j` carries the
    /// analysed envelope at `j` rather than at its source bin `j / scale`.
    pub fn correct(&self, shifted: &mut [f32], pitch_scale: f64) {
        let num_bins = self.envelope.len();
        let peak = shifted.iter().copied().fold(0.0f32, f32::max);
        let floor = peak * CORRECTION_FLOOR_RATIO;
        for (j, mag) in shifted.iter_mut().enumerate().take(num_bins) {
            if *mag <= floor {
                continue;
            }
            let source = ((j as f64 / pitch_scale).round() as usize).min(num_bins - 1);
            let correction = self.envelope[j] / self.envelope[source].max(LOG_FLOOR);
            *mag *= correction.clamp(1.0 / MAX_CORRECTION, MAX_CORRECTION);
        }
    }
}

impl std::fmt::Debug for FormantCorrector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormantCorrector")
            .field("fft_size", &self.fft_size)
            .field("sample_rate", &self.sample_rate)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustfft::FftPlanner;

    fn corrector(fft_size: usize) -> FormantCorrector {
        let mut planner = FftPlanner::new();
        FormantCorrector::new(
            fft_size,
            44100.0,
            planner.plan_fft_forward(fft_size),
            planner.plan_fft_inverse(fft_size),
        )
    }

    #[test]
    fn flat_spectrum_has_flat_envelope() {
        let mut fc = corrector(512);
        fc.analyze(&vec![2.0; 257]);
        for &e in fc.envelope() {
            assert!((e - 2.0).abs() < 1e-3, "envelope {e}");
        }
    }

    #[test]
    fn envelope_follows_broad_tilt() {
        let mut fc = corrector(1024);
        let mags: Vec<f32> = (0..513).map(|i| 1.0 / (1.0 + i as f32 / 50.0)).collect();
        fc.analyze(&mags);
        let env = fc.envelope();
        assert!(env[10] > env[200]);
        assert!(env[200] > env[500]);
    }

    #[test]
    fn unity_scale_is_a_no_op() {
        let mut fc = corrector(512);
        let mags: Vec<f32> = (0..257).map(|i| 1.0 + (i % 7) as f32).collect();
        fc.analyze(&mags);
        let mut shifted = mags.clone();
        fc.correct(&mut shifted, 1.0);
        for (a, b) in shifted.iter().zip(&mags) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn order_clamped_to_fft_size() {
        assert_eq!(adaptive_cepstral_order(2000.0, 64), 16);
        assert_eq!(adaptive_cepstral_order(100.0, 4096), 25);
        assert_eq!(adaptive_cepstral_order(2000.0, 16), 10);
    }
}
