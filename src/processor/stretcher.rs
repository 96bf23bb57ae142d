use std::cell::Cell;

use tracing::debug;

use crate::core::buffer::ChannelViewsMut;
use crate::core::quiet::SuppressStderr;
use crate::core::ring_buffer::RingBuffer;
use crate::core::types::{ProcessContext, ProcessSpec, Sample};
use crate::error::FxError;
use crate::processor::{check_block, Processor};
use crate::stretch::{
    PhaseVocoderStretcher, Stretcher, StretcherHandle, StretcherOptions, TimeStretchOptions,
};

/// Realtime pitch shifter over a [`PhaseVocoderStretcher`] at time ratio 1.
///
/// The stretcher's output is queued behind `latency_hint` frames of
/// silence, so every block comes back full and the delay through the
/// processor is fixed.
pub struct StretcherProcessor {
    pitch_scale: f64,
    options: TimeStretchOptions,
    spec: Option<ProcessSpec>,
    stretcher: Option<StretcherHandle<PhaseVocoderStretcher>>,
    fifo: Vec<RingBuffer<Sample>>,
    scratch: Vec<Vec<Sample>>,
    /// Largest latency the stretcher has reported. Only ever grows.
    initial_samples_required: Cell<usize>,
}

impl StretcherProcessor {
    pub fn new(pitch_scale: f64) -> Result<Self, FxError> {
        check_scale(pitch_scale)?;
        Ok(Self {
            pitch_scale,
            options: TimeStretchOptions::default(),
            spec: None,
            stretcher: None,
            fifo: Vec::new(),
            scratch: Vec::new(),
            initial_samples_required: Cell::new(0),
        })
    }

    /// Quality settings used when the stretcher is next built.
    pub fn with_options(mut self, options: TimeStretchOptions) -> Self {
        self.set_options(options);
        self
    }

    /// Replaces the quality settings. A prepared processor must be
    /// prepared again before the next block.
    pub fn set_options(&mut self, options: TimeStretchOptions) {
        self.options = options;
        self.stretcher = None;
        self.spec = None;
    }

    pub fn pitch_scale(&self) -> f64 {
        self.pitch_scale
    }

    /// Changes the pitch scale, applied from the next block on.
    pub fn set_pitch_scale(&mut self, pitch_scale: f64) -> Result<(), FxError> {
        check_scale(pitch_scale)?;
        if let Some(stretcher) = self.stretcher.as_mut() {
            stretcher.set_pitch_scale(pitch_scale)?;
        }
        self.pitch_scale = pitch_scale;
        Ok(())
    }

    fn stretcher_options(&self) -> StretcherOptions {
        self.options.stretcher_options()
            | StretcherOptions::PROCESS_REALTIME
            | StretcherOptions::THREADING_NEVER
            | StretcherOptions::PITCH_HIGH_QUALITY
    }

    /// Moves every frame the stretcher has ready into the FIFOs.
    ///
    /// The FIFOs are sized in `prepare` for the worst case, so running out
    /// of room here means the stretcher produced more than it reported.
    fn collect_output(&mut self) -> Result<(), FxError> {
        let Some(stretcher) = self.stretcher.as_mut() else {
            return Ok(());
        };
        let chunk = self.scratch.first().map_or(0, Vec::len);
        while let Ok(ready) = usize::try_from(stretcher.available()) {
            let want = ready.min(chunk);
            if want == 0 {
                break;
            }
            let mut slices: ChannelViewsMut<'_> =
                self.scratch.iter_mut().map(|c| &mut c[..want]).collect();
            let got = stretcher.retrieve(&mut slices);
            if got == 0 {
                break;
            }
            for (fifo, data) in self.fifo.iter_mut().zip(&slices) {
                if fifo.available() < got {
                    return Err(FxError::internal(format!(
                        "stretcher output overflows its FIFO ({got} frames, {} free)",
                        fifo.available()
                    )));
                }
                fifo.push_slice(&data[..got]);
            }
        }
        Ok(())
    }
}

fn check_scale(pitch_scale: f64) -> Result<(), FxError> {
    if !(pitch_scale.is_finite() && pitch_scale > 0.0) {
        return Err(FxError::bad_parameter(format!(
            "pitch scale must be positive, got {pitch_scale}"
        )));
    }
    Ok(())
}

impl Processor for StretcherProcessor {
    fn prepare(&mut self, spec: &ProcessSpec) -> Result<(), FxError> {
        spec.validate()?;
        if self.spec.as_ref() == Some(spec) && self.stretcher.is_some() {
            return Ok(());
        }

        let options = self.stretcher_options();
        let pitch_scale = self.pitch_scale;
        let mut stretcher = {
            let _quiet = SuppressStderr::acquire();
            self.stretcher = None;
            StretcherHandle::create(|planner| {
                PhaseVocoderStretcher::new(
                    planner,
                    spec.sample_rate,
                    spec.num_channels,
                    options,
                    1.0,
                    pitch_scale,
                )
            })?
        };
        stretcher.set_max_process_size(spec.max_block_size);
        debug!(
            fft_size = stretcher.fft_size(),
            latency = stretcher.latency(),
            pitch_scale,
            "stretcher processor prepared"
        );

        let latency = stretcher.latency();
        let capacity = 2 * (latency + spec.max_block_size) + stretcher.fft_size();
        self.fifo = (0..spec.num_channels)
            .map(|_| RingBuffer::with_capacity(capacity))
            .collect();
        let scratch_len = spec.max_block_size.max(stretcher.hop_synthesis());
        self.scratch = vec![vec![0.0; scratch_len]; spec.num_channels];
        self.stretcher = Some(stretcher);
        self.spec = Some(*spec);
        self.reset();
        Ok(())
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<usize, FxError> {
        let frames = ctx.num_frames();
        if ctx.is_bypassed {
            return Ok(frames);
        }
        check_block(self.spec.as_ref(), ctx, self.name())?;
        let Some(stretcher) = self.stretcher.as_mut() else {
            return Err(FxError::internal("stretcher processor has no stretcher"));
        };

        stretcher.process(&ctx.block.views(), false)?;
        self.collect_output()?;

        let mut valid = frames;
        for (fifo, channel) in self.fifo.iter_mut().zip(ctx.block.channels_mut()) {
            let got = fifo.pop_slice(&mut channel[..]);
            channel[got..].fill(0.0);
            valid = valid.min(got);
        }
        Ok(valid)
    }

    fn reset(&mut self) {
        if let Some(stretcher) = self.stretcher.as_mut() {
            stretcher.reset();
        }
        let latency = self.latency_hint();
        for fifo in &mut self.fifo {
            fifo.clear();
            fifo.push_default(latency);
        }
    }

    fn latency_hint(&self) -> usize {
        let reported = self.stretcher.as_ref().map_or(0, |s| s.latency());
        let latency = self.initial_samples_required.get().max(reported);
        self.initial_samples_required.set(latency);
        latency
    }

    fn name(&self) -> &'static str {
        "stretcher"
    }
}

impl std::fmt::Debug for StretcherProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StretcherProcessor")
            .field("pitch_scale", &self.pitch_scale)
            .field("spec", &self.spec)
            .field("stretcher", &self.stretcher)
            .field("initial_samples_required", &self.initial_samples_required.get())
            .finish_non_exhaustive()
    }
}
