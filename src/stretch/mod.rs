//! Time stretching and pitch shifting.
//!
//! [`Stretcher`] is the streaming primitive; [`PhaseVocoderStretcher`] is
//! the implementation shipped with the crate. [`TimeStretchEngine`] drives a
//! stretcher over a whole buffer, planning block sizes with
//! [`StretchPlan`] when stretch or pitch vary over time.

pub mod engine;
pub mod envelope;
pub mod options;
pub mod phase_vocoder;
pub mod plan;
pub mod transient;

use std::ops::{Deref, DerefMut};

use rustfft::FftPlanner;

use crate::core::fft::lock_planner;
use crate::core::types::Sample;
use crate::error::FxError;

pub use engine::TimeStretchEngine;
pub use options::{
    StretcherOptions, TimeStretchOptions, TransientDetector, TransientMode, WindowSize,
};
pub use phase_vocoder::PhaseVocoderStretcher;
pub use plan::{choose_chunk_size, PlannedChunk, StretchPlan, MIN_BLOCK, STUDY_BLOCK};

/// Streaming time/pitch modifier.
///
/// A stretcher consumes one stream. Offline stretchers may be studied first
/// and fix their ratios once input starts; realtime stretchers accept ratio
/// changes between calls. Output accumulates internally until retrieved.
pub trait Stretcher: Send {
    /// Output duration over input duration.
    fn set_time_ratio(&mut self, ratio: f64) -> Result<(), FxError>;
    /// Frequency multiplier; 2.0 is an octave up.
    fn set_pitch_scale(&mut self, scale: f64) -> Result<(), FxError>;
    fn time_ratio(&self) -> f64;
    fn pitch_scale(&self) -> f64;
    fn channel_count(&self) -> usize;

    /// Declares the total input length of an offline stream.
    fn set_expected_input_duration(&mut self, frames: usize) -> Result<(), FxError>;
    /// Upper bound on the frames passed to any single `study`/`process` call.
    fn set_max_process_size(&mut self, frames: usize);
    /// Hard ceiling for [`Stretcher::set_max_process_size`].
    fn process_size_limit(&self) -> usize;

    /// Offline pre-analysis pass over the whole input.
    fn study(&mut self, input: &[&[Sample]], is_last: bool) -> Result<(), FxError>;
    /// Consumes input frames; `is_last` ends the stream.
    fn process(&mut self, input: &[&[Sample]], is_last: bool) -> Result<(), FxError>;

    /// Frames ready for [`Stretcher::retrieve`], or -1 once the stream has
    /// ended and every frame was retrieved.
    fn available(&self) -> isize;
    /// Moves up to `output[0].len()` frames into `output`, one slice per
    /// channel. Returns the number of frames written.
    fn retrieve(&mut self, output: &mut [&mut [Sample]]) -> usize;

    /// Delay in frames between input and output in realtime mode.
    fn latency(&self) -> usize;
    /// Input frames still needed before the next analysis frame can run.
    fn samples_required(&self) -> usize;
    /// Starts a new stream with the same configuration.
    fn reset(&mut self);
}

/// Unique owner of a stretcher.
///
/// Construction and destruction both run while holding the process-wide
/// FFT planner lock, so no two stretchers are ever built or torn down
/// concurrently.
pub struct StretcherHandle<S: Stretcher> {
    inner: Option<S>,
}

impl<S: Stretcher> StretcherHandle<S> {
    /// Builds a stretcher with exclusive access to the shared planner.
    pub fn create<F>(build: F) -> Result<Self, FxError>
    where
        F: FnOnce(&mut FftPlanner<f32>) -> Result<S, FxError>,
    {
        let mut planner = lock_planner();
        let inner = build(&mut *planner)?;
        Ok(Self { inner: Some(inner) })
    }
}

impl<S: Stretcher> Deref for StretcherHandle<S> {
    type Target = S;

    fn deref(&self) -> &S {
        match &self.inner {
            Some(s) => s,
            None => unreachable!("stretcher is only released on drop"),
        }
    }
}

impl<S: Stretcher> DerefMut for StretcherHandle<S> {
    fn deref_mut(&mut self) -> &mut S {
        match &mut self.inner {
            Some(s) => s,
            None => unreachable!("stretcher is only released on drop"),
        }
    }
}

impl<S: Stretcher> Drop for StretcherHandle<S> {
    fn drop(&mut self) {
        let _planner = lock_planner();
        drop(self.inner.take());
    }
}

impl<S: Stretcher + std::fmt::Debug> std::fmt::Debug for StretcherHandle<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("StretcherHandle").field(&self.inner).finish()
    }
}
