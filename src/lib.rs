#![forbid(unsafe_code)]
//! Composable audio effects with a latency-compensating pipeline driver and
//! an offline phase-vocoder time-stretch engine.
//!
//! `fxchain` has two entry points. [`run_pipeline`] streams a buffer through
//! a chain of [`Processor`]s in fixed-size blocks and cancels the latency
//! each one reports, so the output lines up with the input. [`time_stretch`]
//! changes duration and pitch independently, with either constant values or
//! per-frame curves.
//!
//! # Quick Start
//!
//! ```
//! use fxchain::{AudioBuffer, TimeStretchOptions};
//!
//! // Half a second of 440 Hz sine at 44.1 kHz
//! let input = AudioBuffer::from_mono(
//!     (0..22050)
//!         .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 44100.0).sin())
//!         .collect(),
//! );
//!
//! // Twice as fast, same pitch
//! let output = fxchain::time_stretch(&input, 44100.0, 2.0, 0.0, &TimeStretchOptions::default()).unwrap();
//! assert_eq!(output.num_frames(), 11025);
//! ```
//!
//! # Pipelines
//!
//! ```
//! use fxchain::processors::{DelayLine, Gain};
//! use fxchain::{AudioBuffer, Processor};
//!
//! let mut input = AudioBuffer::new(1, 4096).unwrap();
//! input.channel_mut(0)[100] = 1.0;
//!
//! let mut chain: Vec<Box<dyn Processor>> = vec![
//!     Box::new(Gain::new(-6.0).unwrap()),
//!     Box::new(DelayLine::new(441).unwrap()),
//! ];
//! let output = fxchain::run_pipeline(&input, 44100.0, &mut chain).unwrap();
//!
//! // The delay is compensated: the impulse stays at frame 100.
//! assert!(output.channel(0)[100] > 0.4);
//! ```

pub mod core;
pub mod error;
pub mod pipeline;
pub mod processor;
pub mod stretch;

pub use crate::core::buffer::{AudioBlock, AudioBuffer};
pub use crate::core::quiet::SuppressStderr;
pub use crate::core::types::{
    db_to_gain, semitones_to_pitch_scale, Control, ProcessContext, ProcessSpec, Sample,
    MAX_PITCH_SEMITONES,
};
pub use error::FxError;
pub use pipeline::{PipelineDriver, DEFAULT_BLOCK_SIZE};
pub use processor::Processor;
pub use stretch::{
    choose_chunk_size, PhaseVocoderStretcher, PlannedChunk, StretchPlan, Stretcher,
    StretcherHandle, StretcherOptions, TimeStretchEngine, TimeStretchOptions, TransientDetector,
    TransientMode, WindowSize, MIN_BLOCK, STUDY_BLOCK,
};

/// Concrete processors, re-exported for convenience.
pub mod processors {
    pub use crate::processor::{
        DelayLine, Gain, PitchShift, SilencePrimer, StretcherProcessor, MAX_DELAY_SAMPLES,
    };
}

/// Time-stretches and pitch-shifts a buffer.
///
/// `stretch` is the speed factor: 2.0 plays twice as fast and halves the
/// length. `pitch_semitones` shifts pitch without changing duration. Either
/// may be a constant or a per-frame curve the length of `input`.
///
/// With constant controls the output has exactly `floor(N / stretch)`
/// frames. With a curve the length is whatever the stretcher emits, at most
/// `ceil(N / min(stretch))`.
///
/// # Errors
/// `BadParameter` for non-positive stretch values, pitch outside ±72
/// semitones, curves of the wrong length, an empty buffer, or a
/// non-positive sample rate.
pub fn time_stretch<'a>(
    input: &'a AudioBuffer,
    sample_rate: f64,
    stretch: impl Into<Control<'a>>,
    pitch_semitones: impl Into<Control<'a>>,
    options: &TimeStretchOptions,
) -> Result<AudioBuffer, FxError> {
    TimeStretchEngine::new(
        input,
        sample_rate,
        stretch.into(),
        pitch_semitones.into(),
        options.clone(),
    )?
    .run()
}

/// Runs `input` through `processors` in blocks of [`DEFAULT_BLOCK_SIZE`].
pub fn run_pipeline<P: Processor>(
    input: &AudioBuffer,
    sample_rate: f64,
    processors: &mut [P],
) -> Result<AudioBuffer, FxError> {
    PipelineDriver::new(sample_rate).run(input, processors)
}

/// Runs `input` through `processors` in blocks of `block_size` frames.
pub fn run_pipeline_with_block_size<P: Processor>(
    input: &AudioBuffer,
    sample_rate: f64,
    processors: &mut [P],
    block_size: usize,
) -> Result<AudioBuffer, FxError> {
    PipelineDriver::new(sample_rate)
        .with_block_size(block_size)
        .run(input, processors)
}
