//! Frame-by-frame onset detection for phase-reset decisions.
//!
//! Two detectors are available. The percussive one counts bins whose
//! magnitude jumps by more than 3 dB from the previous frame. The soft one
//! measures band-weighted spectral flux against an adaptive median
//! threshold. Compound mode fires when either does.

use crate::stretch::options::TransientDetector;

// Frequency band boundaries for flux weighting (Hz).
const BAND_SUB_BASS_LIMIT: f32 = 100.0;
const BAND_BASS_MID_LIMIT: f32 = 500.0;
const BAND_MID_LIMIT: f32 = 2000.0;
const BAND_HIGH_MID_LIMIT: f32 = 8000.0;

const WEIGHT_SUB_BASS: f32 = 0.3;
const WEIGHT_BASS_MID: f32 = 0.6;
const WEIGHT_MID: f32 = 0.8;
/// Hi-hats and snare attacks live here.
const WEIGHT_HIGH_MID: f32 = 1.5;
const WEIGHT_VERY_HIGH: f32 = 0.8;

/// Magnitude ratio of a 3 dB rise.
const RISE_RATIO: f32 = 1.412_537_5;
/// Fraction of rising bins that marks a percussive onset.
const PERCUSSIVE_THRESHOLD: f32 = 0.35;
/// Frames in the median window for the soft detector.
const MEDIAN_WINDOW_FRAMES: usize = 11;
const SOFT_THRESHOLD_MULTIPLIER: f32 = 1.5;
const SOFT_THRESHOLD_FLOOR: f32 = 0.1;
/// Minimum gap between reported onsets.
const MIN_ONSET_GAP_FRAMES: usize = 4;
/// Frames quieter than this (summed magnitude) never count as onsets.
const SILENCE_FLOOR: f32 = 1e-6;

/// Streaming onset detector over magnitude spectra.
#[derive(Debug, Clone)]
pub struct OnsetDetector {
    kind: TransientDetector,
    weights: Vec<f32>,
    prev: Vec<f32>,
    history: [f32; MEDIAN_WINDOW_FRAMES],
    history_len: usize,
    history_pos: usize,
    prev_rising: f32,
    prev_flux: f32,
    frames_since_onset: usize,
}

impl OnsetDetector {
    pub fn new(kind: TransientDetector, fft_size: usize, sample_rate: f64) -> Self {
        let num_bins = fft_size / 2 + 1;
        Self {
            kind,
            weights: band_weights(fft_size, sample_rate),
            prev: vec![0.0; num_bins],
            history: [0.0; MEDIAN_WINDOW_FRAMES],
            history_len: 0,
            history_pos: 0,
            prev_rising: 0.0,
            prev_flux: 0.0,
            frames_since_onset: MIN_ONSET_GAP_FRAMES,
        }
    }

    pub fn reset(&mut self) {
        self.prev.fill(0.0);
        self.history = [0.0; MEDIAN_WINDOW_FRAMES];
        self.history_len = 0;
        self.history_pos = 0;
        self.prev_rising = 0.0;
        self.prev_flux = 0.0;
        self.frames_since_onset = MIN_ONSET_GAP_FRAMES;
    }

    /// Feeds one frame of magnitudes and reports whether it starts a
    /// transient.
    pub fn process(&mut self, magnitudes: &[f32]) -> bool {
        let total: f32 = magnitudes.iter().sum();
        let (rising, flux) = self.measure(magnitudes);
        let bins = self.prev.len();
        self.prev.copy_from_slice(&magnitudes[..bins]);

        let threshold = self.soft_threshold();
        self.push_history(flux);

        let percussive = rising > PERCUSSIVE_THRESHOLD && rising > self.prev_rising;
        let soft = flux > threshold && flux > self.prev_flux;
        self.prev_rising = rising;
        self.prev_flux = flux;

        let fired = total > SILENCE_FLOOR
            && match self.kind {
                TransientDetector::Percussive => percussive,
                TransientDetector::Soft => soft,
                TransientDetector::Compound => percussive || soft,
            };

        if fired && self.frames_since_onset >= MIN_ONSET_GAP_FRAMES {
            self.frames_since_onset = 0;
            true
        } else {
            self.frames_since_onset = self.frames_since_onset.saturating_add(1);
            false
        }
    }

    /// Returns (fraction of bins rising 3 dB, normalised weighted flux).
    fn measure(&self, magnitudes: &[f32]) -> (f32, f32) {
        let bins = self.prev.len().min(magnitudes.len());
        if bins == 0 {
            return (0.0, 0.0);
        }
        let mut rising = 0usize;
        let mut flux = 0.0f32;
        let mut weighted_total = 0.0f32;
        for ((&mag, &prev), &w) in magnitudes.iter().zip(&self.prev).zip(&self.weights) {
            if mag > SILENCE_FLOOR && mag > prev * RISE_RATIO {
                rising += 1;
            }
            let diff = mag - prev;
            if diff > 0.0 {
                flux += diff * w;
            }
            weighted_total += mag * w;
        }
        let flux = if weighted_total > SILENCE_FLOOR {
            flux / weighted_total
        } else {
            0.0
        };
        (rising as f32 / bins as f32, flux)
    }

    fn soft_threshold(&self) -> f32 {
        if self.history_len == 0 {
            return SOFT_THRESHOLD_FLOOR;
        }
        let mut local = self.history;
        let window = &mut local[..self.history_len];
        window.sort_unstable_by(f32::total_cmp);
        window[window.len() / 2] * SOFT_THRESHOLD_MULTIPLIER + SOFT_THRESHOLD_FLOOR
    }

    fn push_history(&mut self, flux: f32) {
        self.history[self.history_pos] = flux;
        self.history_pos = (self.history_pos + 1) % MEDIAN_WINDOW_FRAMES;
        self.history_len = (self.history_len + 1).min(MEDIAN_WINDOW_FRAMES);
    }
}

/// Per-bin flux weights emphasising the 2–8 kHz attack range.
fn band_weights(fft_size: usize, sample_rate: f64) -> Vec<f32> {
    let num_bins = fft_size / 2 + 1;
    let bin_freq = (sample_rate / fft_size as f64) as f32;

    (0..num_bins)
        .map(|bin| {
            let freq = bin as f32 * bin_freq;
            if freq < BAND_SUB_BASS_LIMIT {
                WEIGHT_SUB_BASS
            } else if freq < BAND_BASS_MID_LIMIT {
                WEIGHT_BASS_MID
            } else if freq < BAND_MID_LIMIT {
                WEIGHT_MID
            } else if freq < BAND_HIGH_MID_LIMIT {
                WEIGHT_HIGH_MID
            } else {
                WEIGHT_VERY_HIGH
            }
        })
        .collect()
}
