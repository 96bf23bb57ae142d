#![allow(dead_code)]

use std::f32::consts::PI;

use fxchain::AudioBuffer;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

pub fn gen_sine(freq_hz: f32, sr: f32, n: usize, amp: f32) -> Vec<f32> {
    (0..n)
        .map(|i| amp * (2.0 * PI * freq_hz * i as f32 / sr).sin())
        .collect()
}

pub fn gen_impulse(n: usize, at: usize, amp: f32) -> Vec<f32> {
    let mut out = vec![0.0f32; n];
    out[at] = amp;
    out
}

/// Deterministic white noise in [-amp, amp].
pub fn gen_noise(n: usize, amp: f32, mut seed: u32) -> Vec<f32> {
    (0..n)
        .map(|_| {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let unit = (seed >> 8) as f32 / (1u32 << 24) as f32;
            amp * (2.0 * unit - 1.0)
        })
        .collect()
}

pub fn mono(samples: Vec<f32>) -> AudioBuffer {
    AudioBuffer::from_mono(samples)
}

pub fn rms(signal: &[f32]) -> f64 {
    if signal.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = signal.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_sq / signal.len() as f64).sqrt()
}

/// RMS of `test - reference` over their common length, relative to the
/// RMS of `reference`.
pub fn relative_rms_error(reference: &[f32], test: &[f32]) -> f64 {
    let len = reference.len().min(test.len());
    let diff: Vec<f32> = reference[..len]
        .iter()
        .zip(&test[..len])
        .map(|(r, t)| r - t)
        .collect();
    rms(&diff) / rms(&reference[..len]).max(1e-12)
}

pub fn argmax_abs(signal: &[f32]) -> usize {
    signal
        .iter()
        .enumerate()
        .fold((0, 0.0f32), |(bi, bv), (i, &s)| {
            if s.abs() > bv {
                (i, s.abs())
            } else {
                (bi, bv)
            }
        })
        .0
}

/// Frequency of the strongest spectral peak in `signal[start..start+len]`,
/// refined by parabolic interpolation over log magnitudes.
pub fn dominant_frequency(signal: &[f32], sr: f32, start: usize, len: usize) -> f32 {
    let fft_len = len.next_power_of_two();
    let mut buf: Vec<Complex<f32>> = (0..fft_len)
        .map(|i| {
            let s = if i < len { signal[start + i] } else { 0.0 };
            let w = if i < len {
                0.5 - 0.5 * (2.0 * PI * i as f32 / len as f32).cos()
            } else {
                0.0
            };
            Complex::new(s * w, 0.0)
        })
        .collect();
    FftPlanner::new().plan_fft_forward(fft_len).process(&mut buf);

    let mags: Vec<f32> = buf[..fft_len / 2].iter().map(|c| c.norm()).collect();
    let peak = (1..mags.len() - 1)
        .max_by(|&a, &b| mags[a].total_cmp(&mags[b]))
        .unwrap_or(1);
    let (l, c, r) = (
        mags[peak - 1].max(1e-12).ln(),
        mags[peak].max(1e-12).ln(),
        mags[peak + 1].max(1e-12).ln(),
    );
    let denom = l - 2.0 * c + r;
    let offset = if denom.abs() > 1e-12 { 0.5 * (l - r) / denom } else { 0.0 };
    (peak as f32 + offset) * sr / fft_len as f32
}
