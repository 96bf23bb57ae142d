//! Offline driver that runs a whole buffer through a [`Stretcher`].

use tracing::debug;

use crate::core::buffer::AudioBuffer;
use crate::core::quiet::SuppressStderr;
use crate::core::types::{check_semitones, semitones_to_pitch_scale, Control};
use crate::error::FxError;
use crate::stretch::options::{StretcherOptions, TimeStretchOptions};
use crate::stretch::phase_vocoder::PhaseVocoderStretcher;
use crate::stretch::plan::{StretchPlan, STUDY_BLOCK};
use crate::stretch::{Stretcher, StretcherHandle};

/// A validated time-stretch / pitch-shift job over one buffer.
///
/// Constant stretch and pitch run the stretcher offline with a study pass
/// and give exactly `floor(N / stretch)` frames. If either control is a
/// curve the stretcher runs in realtime mode and the ratios are updated
/// block by block.
#[derive(Debug, Clone)]
pub struct TimeStretchEngine<'a> {
    input: &'a AudioBuffer,
    sample_rate: f64,
    stretch: Control<'a>,
    pitch: Control<'a>,
    options: TimeStretchOptions,
}

impl<'a> TimeStretchEngine<'a> {
    /// Validates a job.
    ///
    /// # Errors
    /// `BadParameter` for an empty buffer, a non-positive sample rate, a
    /// stretch value that is not a positive finite number, a pitch outside
    /// ±72 semitones, or a curve whose length is not the input length.
    pub fn new(
        input: &'a AudioBuffer,
        sample_rate: f64,
        stretch: Control<'a>,
        pitch: Control<'a>,
        options: TimeStretchOptions,
    ) -> Result<Self, FxError> {
        let frames = input.num_frames();
        if frames == 0 {
            return Err(FxError::bad_parameter("input buffer is empty"));
        }
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(FxError::bad_parameter(format!(
                "sample rate must be positive, got {sample_rate}"
            )));
        }
        for (name, control) in [("stretch", &stretch), ("pitch", &pitch)] {
            if let Control::Curve(curve) = control {
                if curve.len() != frames {
                    return Err(FxError::bad_parameter(format!(
                        "{name} curve has {} values for {frames} frames",
                        curve.len()
                    )));
                }
            }
        }
        if let Some(bad) = stretch.values().find(|s| !(s.is_finite() && *s > 0.0)) {
            return Err(FxError::bad_parameter(format!(
                "stretch factor must be positive, got {bad}"
            )));
        }
        pitch.values().try_for_each(check_semitones)?;

        Ok(Self {
            input,
            sample_rate,
            stretch,
            pitch,
            options,
        })
    }

    /// True when the stretcher must accept ratio changes mid-stream.
    pub fn is_realtime(&self) -> bool {
        self.stretch.is_curve() || self.pitch.is_curve()
    }

    /// Full option set handed to the stretcher.
    pub fn stretcher_options(&self) -> StretcherOptions {
        let mode = if self.is_realtime() {
            StretcherOptions::PROCESS_REALTIME
        } else {
            StretcherOptions::PROCESS_OFFLINE
        };
        self.options.stretcher_options()
            | mode
            | StretcherOptions::THREADING_NEVER
            | StretcherOptions::CHANNELS_TOGETHER
            | StretcherOptions::PITCH_HIGH_QUALITY
    }

    /// Upper bound on the output length, `ceil(N / min(stretch))`.
    pub fn output_capacity(&self) -> usize {
        let min_stretch = self.stretch.values().fold(f64::INFINITY, f64::min);
        (self.input.num_frames() as f64 / min_stretch).ceil() as usize
    }

    /// Builds a [`PhaseVocoderStretcher`] and runs the job through it.
    pub fn run(&self) -> Result<AudioBuffer, FxError> {
        let _quiet = SuppressStderr::acquire();
        let options = self.stretcher_options();
        let time_ratio = 1.0 / self.stretch.at(0);
        let pitch_scale = semitones_to_pitch_scale(self.pitch.at(0));
        let channels = self.input.num_channels();

        let mut stretcher = StretcherHandle::create(|planner| {
            PhaseVocoderStretcher::new(
                planner,
                self.sample_rate,
                channels,
                options,
                time_ratio,
                pitch_scale,
            )
        })?;
        debug!(
            realtime = self.is_realtime(),
            frames = self.input.num_frames(),
            channels,
            fft_size = stretcher.fft_size(),
            options = options.bits(),
            "time stretch starting"
        );
        self.run_with(&mut *stretcher)
    }

    /// Runs the job through a caller-provided stretcher.
    ///
    /// The stretcher must be freshly created or reset, with this job's
    /// channel count and processing mode.
    pub fn run_with<S: Stretcher + ?Sized>(&self, stretcher: &mut S) -> Result<AudioBuffer, FxError> {
        let frames = self.input.num_frames();
        if stretcher.channel_count() != self.input.num_channels() {
            return Err(FxError::internal(format!(
                "stretcher has {} channels, input has {}",
                stretcher.channel_count(),
                self.input.num_channels()
            )));
        }

        if !self.is_realtime() {
            stretcher.set_expected_input_duration(frames)?;
        }
        let max_block = stretcher.process_size_limit();
        // Chunks never exceed the input, so short inputs need less room.
        stretcher.set_max_process_size(max_block.min(frames.max(1)));

        if !self.is_realtime() {
            let mut offset = 0;
            while offset < frames {
                let len = STUDY_BLOCK.min(frames - offset);
                let slices = self.input.views(offset, len);
                stretcher.study(&slices, offset + len >= frames)?;
                offset += len;
            }
        }

        let mut output = AudioBuffer::with_capacity(self.input.num_channels(), self.output_capacity())?;
        let plan = StretchPlan::new(self.stretch, self.pitch, frames, max_block);
        for chunk in plan {
            let chunk = chunk?;
            if let Some(ratio) = chunk.time_ratio {
                stretcher.set_time_ratio(ratio)?;
            }
            if let Some(scale) = chunk.pitch_scale {
                stretcher.set_pitch_scale(scale)?;
            }
            let slices = self.input.views(chunk.offset, chunk.len);
            stretcher.process(&slices, chunk.is_last)?;
            drain(stretcher, &mut output)?;
        }
        drain(stretcher, &mut output)?;

        if stretcher.available() > 0 {
            return Err(FxError::internal("samples remained"));
        }
        debug!(output_frames = output.num_frames(), "time stretch finished");
        Ok(output)
    }
}

/// Moves everything the stretcher has ready onto the end of `output`.
fn drain<S: Stretcher + ?Sized>(stretcher: &mut S, output: &mut AudioBuffer) -> Result<(), FxError> {
    loop {
        let Ok(ready) = usize::try_from(stretcher.available()) else {
            return Ok(());
        };
        if ready == 0 {
            return Ok(());
        }
        let start = output.num_frames();
        output.set_num_frames(start + ready)?;
        let got = {
            let mut block = output.block_mut(start, ready);
            stretcher.retrieve(block.as_mut_slices())
        };
        if got < ready {
            output.set_num_frames(start + got)?;
            if got == 0 {
                return Err(FxError::internal(format!(
                    "stretcher reported {ready} frames but retrieved none"
                )));
            }
        }
    }
}
