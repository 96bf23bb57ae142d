//! Streaming STFT phase vocoder implementing [`Stretcher`].
//!
//! Each analysis frame is windowed, transformed, and resynthesised with
//! phases advanced by the estimated true frequency of every bin. The
//! analysis hop is the synthesis hop divided by the time ratio; pitch is
//! shifted by remapping bins, so output duration does not depend on it.
//!
//! The input stream is preceded by one window of silence and the first
//! output frames are skipped so that output sample `i` lines up with input
//! sample `i / ratio`. At unity settings the vocoder reconstructs its input.

use std::f64::consts::{PI, TAU};
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::core::fft::COMPLEX_ZERO;
use crate::core::quiet::diag;
use crate::core::ring_buffer::RingBuffer;
use crate::core::types::Sample;
use crate::core::window::{apply_window, hann_periodic, hann_squared_overlap_gain};
use crate::error::FxError;
use crate::stretch::envelope::FormantCorrector;
use crate::stretch::options::{StretcherOptions, TransientMode, WindowSize};
use crate::stretch::transient::OnsetDetector;
use crate::stretch::Stretcher;

const SHORT_FFT_SIZE: usize = 1024;
const STANDARD_FFT_SIZE: usize = 2048;
const LONG_FFT_SIZE: usize = 4096;
/// Window sizes are tuned for rates up to about this one.
const REFERENCE_SAMPLE_RATE: f64 = 48_000.0;

/// Largest single `process` call accepted.
const PROCESS_SIZE_LIMIT: usize = 524_288;
const DEFAULT_MAX_PROCESS_SIZE: usize = 8192;
/// Slack when flooring fractional output lengths.
const LENGTH_EPSILON: f64 = 1e-6;

/// Under mixed transients, phases in this band stay continuous.
const MIXED_BAND_LOW_HZ: f64 = 80.0;
const MIXED_BAND_HIGH_HZ: f64 = 4000.0;

/// Ratios beyond this factor either way draw a stderr warning.
const EXTREME_RATIO: f64 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Idle,
    Studying,
    Processing,
    Finished,
}

/// Per-channel analysis and synthesis state.
#[derive(Debug, Clone)]
struct Lane {
    input: RingBuffer<Sample>,
    output: RingBuffer<Sample>,
    accumulator: Vec<f32>,
    frame: Vec<f32>,
    magnitudes: Vec<f32>,
    phases: Vec<f32>,
    prev_phases: Vec<f32>,
    /// True frequency per analysis bin, radians per sample.
    frequencies: Vec<f64>,
    shifted_magnitudes: Vec<f32>,
    shifted_frequencies: Vec<f64>,
    shifted_phases: Vec<f32>,
    strongest: Vec<f32>,
    prev_output_magnitudes: Vec<f32>,
    synth_phases: Vec<f64>,
}

impl Lane {
    fn new(fft_size: usize, input_capacity: usize, output_capacity: usize) -> Self {
        let bins = fft_size / 2 + 1;
        Self {
            input: RingBuffer::with_capacity(input_capacity),
            output: RingBuffer::with_capacity(output_capacity),
            accumulator: vec![0.0; fft_size],
            frame: vec![0.0; fft_size],
            magnitudes: vec![0.0; bins],
            phases: vec![0.0; bins],
            prev_phases: vec![0.0; bins],
            frequencies: vec![0.0; bins],
            shifted_magnitudes: vec![0.0; bins],
            shifted_frequencies: vec![0.0; bins],
            shifted_phases: vec![0.0; bins],
            strongest: vec![0.0; bins],
            prev_output_magnitudes: vec![0.0; bins],
            synth_phases: vec![0.0; bins],
        }
    }

    fn clear(&mut self) {
        self.input.clear();
        self.output.clear();
        self.accumulator.fill(0.0);
        self.prev_phases.fill(0.0);
        self.prev_output_magnitudes.fill(0.0);
        self.synth_phases.fill(0.0);
    }

    /// Maps analysis bins onto output bins for `scale`.
    fn shift_bins(&mut self, scale: f64, accumulate: bool) {
        if scale == 1.0 {
            self.shifted_magnitudes.copy_from_slice(&self.magnitudes);
            self.shifted_frequencies.copy_from_slice(&self.frequencies);
            self.shifted_phases.copy_from_slice(&self.phases);
            return;
        }
        let bins = self.magnitudes.len();
        let fft_size = (bins - 1) * 2;
        self.shifted_magnitudes.fill(0.0);
        self.shifted_phases.fill(0.0);
        self.strongest.fill(-1.0);
        for (j, f) in self.shifted_frequencies.iter_mut().enumerate() {
            *f = bin_frequency(j, fft_size);
        }
        for k in 0..bins {
            let j = (k as f64 * scale).round() as usize;
            if j >= bins {
                break;
            }
            let m = self.magnitudes[k];
            if accumulate {
                self.shifted_magnitudes[j] += m;
            } else if m > self.shifted_magnitudes[j] {
                self.shifted_magnitudes[j] = m;
            }
            if m > self.strongest[j] {
                self.strongest[j] = m;
                self.shifted_frequencies[j] = self.frequencies[k] * scale;
                self.shifted_phases[j] = self.phases[k];
            }
        }
    }
}

/// Phase vocoder stretcher.
pub struct PhaseVocoderStretcher {
    sample_rate: f64,
    channels: usize,
    options: StretcherOptions,
    fft_size: usize,
    hop_synthesis: usize,
    time_ratio: f64,
    pitch_scale: f64,

    fft_forward: Arc<dyn Fft<f32>>,
    fft_inverse: Arc<dyn Fft<f32>>,
    fft_scratch: Vec<Complex<f32>>,
    spectrum: Vec<Complex<f32>>,
    window: Vec<f32>,
    /// Reciprocal of the squared-window overlap gain, folded with 1/N.
    synthesis_scale: f32,
    mid_side: bool,
    mid_side_scratch: [Vec<Sample>; 2],

    lanes: Vec<Lane>,
    mix_magnitudes: Vec<f32>,
    peaks: Vec<usize>,
    detector: OnsetDetector,
    formants: Option<FormantCorrector>,

    state: StreamState,
    /// Fractional read offset of the next analysis frame in the input ring.
    analysis_pos: f64,
    /// Input frames consumed since the previous analysis frame.
    pending_hop: usize,
    frames_done: usize,
    input_fed: usize,
    output_emitted: usize,
    skip_remaining: usize,
    /// Running Σ chunk_len · ratio for realtime streams.
    planned_output: f64,
    target_output: Option<usize>,
    expected_input: Option<usize>,
    max_process_size: usize,
    study_signal: Vec<Sample>,
    study_flags: Option<Vec<bool>>,
}

impl PhaseVocoderStretcher {
    /// Builds a stretcher, planning its FFTs from `planner`.
    ///
    /// # Errors
    /// `BadParameter` for a non-positive sample rate, ratio, or scale, or for
    /// zero channels.
    pub fn new(
        planner: &mut FftPlanner<f32>,
        sample_rate: f64,
        channels: usize,
        options: StretcherOptions,
        time_ratio: f64,
        pitch_scale: f64,
    ) -> Result<Self, FxError> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(FxError::bad_parameter(format!(
                "sample rate must be positive, got {sample_rate}"
            )));
        }
        if channels == 0 {
            return Err(FxError::bad_parameter("stretcher needs at least one channel"));
        }
        check_ratio("time ratio", time_ratio)?;
        check_ratio("pitch scale", pitch_scale)?;

        let fft_size = fft_size_for(options.window(), sample_rate);
        let hop_synthesis = if options.contains(StretcherOptions::ENGINE_FINER) {
            fft_size / 8
        } else {
            fft_size / 4
        };
        let fft_forward = planner.plan_fft_forward(fft_size);
        let fft_inverse = planner.plan_fft_inverse(fft_size);
        let scratch_len = fft_forward
            .get_inplace_scratch_len()
            .max(fft_inverse.get_inplace_scratch_len());

        let formants = options
            .contains(StretcherOptions::FORMANT_PRESERVED)
            .then(|| {
                FormantCorrector::new(
                    fft_size,
                    sample_rate,
                    Arc::clone(&fft_forward),
                    Arc::clone(&fft_inverse),
                )
            });

        let input_capacity = 2 * fft_size + hop_synthesis;
        let output_capacity = 2 * fft_size + DEFAULT_MAX_PROCESS_SIZE;
        let lanes = (0..channels)
            .map(|_| Lane::new(fft_size, input_capacity, output_capacity))
            .collect();

        if !(1.0 / EXTREME_RATIO..=EXTREME_RATIO).contains(&time_ratio) {
            diag!("fxchain: time ratio {time_ratio} is extreme; expect smearing");
        }
        if !(1.0 / EXTREME_RATIO..=EXTREME_RATIO).contains(&pitch_scale) {
            diag!("fxchain: pitch scale {pitch_scale} is extreme; expect artifacts");
        }

        let bins = fft_size / 2 + 1;
        let mut stretcher = Self {
            sample_rate,
            channels,
            options,
            fft_size,
            hop_synthesis,
            time_ratio,
            pitch_scale,
            fft_forward,
            fft_inverse,
            fft_scratch: vec![COMPLEX_ZERO; scratch_len],
            spectrum: vec![COMPLEX_ZERO; fft_size],
            window: hann_periodic(fft_size),
            synthesis_scale: 1.0
                / (hann_squared_overlap_gain(fft_size, hop_synthesis) * fft_size as f32),
            mid_side: channels == 2 && options.contains(StretcherOptions::CHANNELS_TOGETHER),
            mid_side_scratch: [vec![0.0; input_capacity], vec![0.0; input_capacity]],
            lanes,
            mix_magnitudes: vec![0.0; bins],
            peaks: Vec::with_capacity(bins),
            detector: OnsetDetector::new(options.transient_detector(), fft_size, sample_rate),
            formants,
            state: StreamState::Idle,
            analysis_pos: 0.0,
            pending_hop: 0,
            frames_done: 0,
            input_fed: 0,
            output_emitted: 0,
            skip_remaining: 0,
            planned_output: 0.0,
            target_output: None,
            expected_input: None,
            max_process_size: DEFAULT_MAX_PROCESS_SIZE,
            study_signal: Vec::new(),
            study_flags: None,
        };
        stretcher.size_realtime_output();
        Ok(stretcher)
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn hop_synthesis(&self) -> usize {
        self.hop_synthesis
    }

    pub fn options(&self) -> StretcherOptions {
        self.options
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn realtime(&self) -> bool {
        self.options.is_realtime()
    }

    fn analysis_hop(&self) -> f64 {
        self.hop_synthesis as f64 / self.time_ratio
    }

    fn check_input(&self, input: &[&[Sample]]) -> Result<usize, FxError> {
        if input.len() != self.channels {
            return Err(FxError::bad_parameter(format!(
                "expected {} channels, got {}",
                self.channels,
                input.len()
            )));
        }
        let frames = input.first().map_or(0, |c| c.len());
        if input.iter().any(|c| c.len() != frames) {
            return Err(FxError::bad_parameter("input channels differ in length"));
        }
        Ok(frames)
    }

    fn begin_stream(&mut self) {
        for lane in &mut self.lanes {
            lane.input.push_default(self.fft_size);
        }
        let half = self.fft_size as f64 / 2.0;
        self.skip_remaining = (half * self.time_ratio + half).round() as usize;
        self.state = StreamState::Processing;
    }

    fn push_input(&mut self, input: &[&[Sample]], offset: usize, len: usize) {
        if self.mid_side {
            let [mid, side] = &mut self.mid_side_scratch;
            for i in 0..len {
                let (l, r) = (input[0][offset + i], input[1][offset + i]);
                mid[i] = 0.5 * (l + r);
                side[i] = 0.5 * (l - r);
            }
            self.lanes[0].input.push_slice(&mid[..len]);
            self.lanes[1].input.push_slice(&side[..len]);
        } else {
            for (lane, ch) in self.lanes.iter_mut().zip(input) {
                lane.input.push_slice(&ch[offset..offset + len]);
            }
        }
    }

    /// Drops input the analysis position has moved past.
    fn consume_hop(&mut self, flushing: bool) {
        let want = self.analysis_pos.floor() as usize;
        if want == 0 {
            return;
        }
        let have = self.lanes[0].input.len();
        let drop = if flushing { want } else { want.min(have) };
        for lane in &mut self.lanes {
            lane.input.discard(drop);
        }
        self.analysis_pos -= drop as f64;
        self.pending_hop += drop;
    }

    fn frame_ready(&self) -> bool {
        self.analysis_pos < 1.0 && self.lanes[0].input.len() >= self.fft_size
    }

    fn run_frames(&mut self, flushing: bool) -> Result<(), FxError> {
        loop {
            self.consume_hop(flushing);
            if flushing {
                if self.output_emitted >= self.target_output.unwrap_or(0) {
                    break;
                }
            } else if !self.frame_ready() {
                break;
            }
            self.process_frame()?;
            self.analysis_pos += self.analysis_hop();
        }
        Ok(())
    }

    fn final_length(&self) -> usize {
        let exact = if self.realtime() {
            self.planned_output
        } else {
            self.expected_input.unwrap_or(self.input_fed) as f64 * self.time_ratio
        };
        (exact + LENGTH_EPSILON).floor() as usize
    }

    fn finish(&mut self) -> Result<(), FxError> {
        self.target_output = Some(self.final_length());
        self.run_frames(true)?;
        self.state = StreamState::Finished;
        Ok(())
    }

    fn process_frame(&mut self) -> Result<(), FxError> {
        let hop_in = std::mem::take(&mut self.pending_hop);
        let first = self.frames_done == 0;
        let n = self.fft_size;
        let bins = n / 2 + 1;

        // Analysis
        self.mix_magnitudes.fill(0.0);
        for lane in &mut self.lanes {
            let got = lane.input.peek_slice(&mut lane.frame);
            lane.frame[got..].fill(0.0);
            apply_window(&mut lane.frame, &self.window);
            for (c, &s) in self.spectrum.iter_mut().zip(&lane.frame) {
                *c = Complex::new(s, 0.0);
            }
            self.fft_forward
                .process_with_scratch(&mut self.spectrum, &mut self.fft_scratch);

            for k in 0..bins {
                let c = self.spectrum[k];
                let phase = c.arg();
                lane.magnitudes[k] = c.norm();
                lane.phases[k] = phase;
                lane.frequencies[k] = if first || hop_in == 0 {
                    bin_frequency(k, n)
                } else {
                    true_frequency(k, n, hop_in, phase, lane.prev_phases[k])
                };
                lane.prev_phases[k] = phase;
                self.mix_magnitudes[k] += lane.magnitudes[k];
            }
        }

        let transient = match &self.study_flags {
            Some(flags) => flags.get(self.frames_done).copied().unwrap_or(false),
            None => self.detector.process(&self.mix_magnitudes),
        };
        let laminar = !self.options.contains(StretcherOptions::PHASE_INDEPENDENT);
        let smoothing = self.options.contains(StretcherOptions::SMOOTHING_ON);
        let accumulate = self.options.contains(StretcherOptions::PITCH_HIGH_QUALITY);
        let hop_out = self.hop_synthesis as f64;

        // Synthesis
        for lane_idx in 0..self.lanes.len() {
            let scale = self.pitch_scale;
            let lane = &mut self.lanes[lane_idx];
            lane.shift_bins(scale, accumulate);

            if scale != 1.0 {
                if let Some(fc) = self.formants.as_mut() {
                    fc.analyze(&lane.magnitudes);
                    fc.correct(&mut lane.shifted_magnitudes, scale);
                }
            }

            if smoothing {
                for (m, prev) in lane
                    .shifted_magnitudes
                    .iter_mut()
                    .zip(lane.prev_output_magnitudes.iter_mut())
                {
                    let current = *m;
                    if !first {
                        *m = 0.5 * (current + *prev);
                    }
                    *prev = current;
                }
            }

            for j in 0..bins {
                let reset =
                    first || (transient && resets_bin_at(self.options, j, n, self.sample_rate));
                lane.synth_phases[j] = if reset {
                    lane.shifted_phases[j] as f64
                } else {
                    wrap_phase(lane.synth_phases[j] + lane.shifted_frequencies[j] * hop_out)
                };
            }

            if laminar && !first {
                lock_phases_to_peaks(
                    &lane.shifted_magnitudes,
                    &lane.shifted_phases,
                    &mut lane.synth_phases,
                    &mut self.peaks,
                );
            }

            for j in 0..bins {
                self.spectrum[j] =
                    Complex::from_polar(lane.shifted_magnitudes[j], lane.synth_phases[j] as f32);
            }
            for j in 1..bins - 1 {
                self.spectrum[n - j] = self.spectrum[j].conj();
            }
            self.fft_inverse
                .process_with_scratch(&mut self.spectrum, &mut self.fft_scratch);

            for ((acc, c), &w) in lane
                .accumulator
                .iter_mut()
                .zip(&self.spectrum)
                .zip(&self.window)
            {
                *acc += c.re * w * self.synthesis_scale;
            }
        }

        self.emit_hop()?;
        self.frames_done += 1;
        Ok(())
    }

    /// Moves the completed head of every accumulator into the output rings.
    ///
    /// Offline output stays buffered until the caller retrieves it, so the
    /// rings grow. Realtime rings are sized up front and never reallocate.
    fn emit_hop(&mut self) -> Result<(), FxError> {
        let hop = self.hop_synthesis;
        let skip = self.skip_remaining.min(hop);
        self.skip_remaining -= skip;
        let mut count = hop - skip;
        if let Some(target) = self.target_output.or(self.known_target()) {
            count = count.min(target.saturating_sub(self.output_emitted));
        }

        let free = self.lanes[0].output.available();
        if free < count {
            if self.realtime() {
                return Err(FxError::internal(format!(
                    "realtime output is full ({count} frames, {free} free); retrieve between calls"
                )));
            }
            for lane in &mut self.lanes {
                let grown = (lane.output.capacity() * 2).max(lane.output.len() + count);
                lane.output.grow(grown);
            }
        }
        for lane in &mut self.lanes {
            lane.output.push_slice(&lane.accumulator[skip..skip + count]);
            lane.accumulator.copy_within(hop.., 0);
            let tail = lane.accumulator.len() - hop;
            lane.accumulator[tail..].fill(0.0);
        }
        self.output_emitted += count;
        Ok(())
    }

    /// Sizes the realtime output rings for one full `process` call plus the
    /// final flush at the current time ratio.
    fn size_realtime_output(&mut self) {
        if !self.realtime() {
            return;
        }
        let span = (self.max_process_size + 2 * self.fft_size) as f64;
        let capacity = (span * self.time_ratio.max(1.0)).ceil() as usize + self.hop_synthesis;
        for lane in &mut self.lanes {
            lane.output.grow(capacity);
        }
    }

    /// Offline output length when the input length is known up front.
    fn known_target(&self) -> Option<usize> {
        if self.realtime() {
            return None;
        }
        self.expected_input
            .map(|n| (n as f64 * self.time_ratio + LENGTH_EPSILON).floor() as usize)
    }

    /// Runs the onset detector over the studied mono mix using the same
    /// frame positions `process` will visit.
    fn detect_study_transients(&mut self) -> Vec<bool> {
        let n = self.fft_size;
        let bins = n / 2 + 1;
        let mut detector =
            OnsetDetector::new(self.options.transient_detector(), n, self.sample_rate);
        let signal = &self.study_signal;
        let padded_len = signal.len() + n;
        let hop = self.analysis_hop();

        let mut magnitudes = vec![0.0f32; bins];
        let mut flags = Vec::new();
        let mut pos = 0.0f64;
        let mut start = 0usize;
        while start < padded_len {
            for (i, c) in self.spectrum.iter_mut().enumerate() {
                let y = start + i;
                let s = if y < n { 0.0 } else { signal.get(y - n).copied().unwrap_or(0.0) };
                *c = Complex::new(s * self.window[i], 0.0);
            }
            self.fft_forward
                .process_with_scratch(&mut self.spectrum, &mut self.fft_scratch);
            for (m, c) in magnitudes.iter_mut().zip(&self.spectrum) {
                *m = c.norm();
            }
            flags.push(detector.process(&magnitudes));

            pos += hop;
            let advance = pos.floor();
            pos -= advance;
            start += advance as usize;
        }
        flags
    }
}

impl Stretcher for PhaseVocoderStretcher {
    fn set_time_ratio(&mut self, ratio: f64) -> Result<(), FxError> {
        check_ratio("time ratio", ratio)?;
        if !self.realtime() && self.state != StreamState::Idle {
            return Err(FxError::internal(
                "time ratio is fixed once an offline stream has started",
            ));
        }
        self.time_ratio = ratio;
        self.size_realtime_output();
        Ok(())
    }

    fn set_pitch_scale(&mut self, scale: f64) -> Result<(), FxError> {
        check_ratio("pitch scale", scale)?;
        if !self.realtime() && self.state != StreamState::Idle {
            return Err(FxError::internal(
                "pitch scale is fixed once an offline stream has started",
            ));
        }
        self.pitch_scale = scale;
        Ok(())
    }

    fn time_ratio(&self) -> f64 {
        self.time_ratio
    }

    fn pitch_scale(&self) -> f64 {
        self.pitch_scale
    }

    fn channel_count(&self) -> usize {
        self.channels
    }

    fn set_expected_input_duration(&mut self, frames: usize) -> Result<(), FxError> {
        if self.realtime() {
            return Err(FxError::internal(
                "expected input duration only applies to offline streams",
            ));
        }
        if matches!(self.state, StreamState::Processing | StreamState::Finished) {
            return Err(FxError::internal(
                "expected input duration must be set before processing",
            ));
        }
        self.expected_input = Some(frames);
        Ok(())
    }

    fn set_max_process_size(&mut self, frames: usize) {
        self.max_process_size = frames.clamp(1, PROCESS_SIZE_LIMIT);
        self.size_realtime_output();
    }

    fn process_size_limit(&self) -> usize {
        PROCESS_SIZE_LIMIT
    }

    fn study(&mut self, input: &[&[Sample]], is_last: bool) -> Result<(), FxError> {
        if self.realtime() {
            return Err(FxError::internal("study is only available in offline mode"));
        }
        if !matches!(self.state, StreamState::Idle | StreamState::Studying) {
            return Err(FxError::internal("study called after processing started"));
        }
        if self.study_flags.is_some() {
            return Err(FxError::internal("study called after the final study block"));
        }
        let frames = self.check_input(input)?;
        self.state = StreamState::Studying;

        let gain = 1.0 / self.channels as f32;
        self.study_signal.try_reserve(frames)?;
        self.study_signal
            .extend((0..frames).map(|i| input.iter().map(|c| c[i]).sum::<f32>() * gain));

        if is_last {
            let flags = self.detect_study_transients();
            self.study_flags = Some(flags);
            self.study_signal = Vec::new();
        }
        Ok(())
    }

    fn process(&mut self, input: &[&[Sample]], is_last: bool) -> Result<(), FxError> {
        let frames = self.check_input(input)?;
        match self.state {
            StreamState::Finished => {
                return Err(FxError::internal("process called after the final block"));
            }
            StreamState::Studying if self.study_flags.is_none() => {
                return Err(FxError::internal("process called before study finished"));
            }
            StreamState::Idle | StreamState::Studying => self.begin_stream(),
            StreamState::Processing => {}
        }

        if self.realtime() {
            self.planned_output += frames as f64 * self.time_ratio;
        }

        let mut offset = 0;
        while offset < frames {
            let take = self.lanes[0].input.available().min(frames - offset);
            self.push_input(input, offset, take);
            offset += take;
            self.input_fed += take;
            self.run_frames(false)?;
        }

        if is_last {
            self.finish()?;
        }
        Ok(())
    }

    fn available(&self) -> isize {
        let ready = self.lanes[0].output.len();
        if ready == 0 && self.state == StreamState::Finished {
            -1
        } else {
            ready as isize
        }
    }

    fn retrieve(&mut self, output: &mut [&mut [Sample]]) -> usize {
        let want = output.first().map_or(0, |c| c.len());
        let count = want.min(self.lanes[0].output.len());
        for (ch, lane) in self.lanes.iter_mut().enumerate() {
            match output.get_mut(ch) {
                Some(out) => {
                    lane.output.pop_slice(&mut out[..count]);
                }
                None => {
                    lane.output.discard(count);
                }
            }
        }
        if self.mid_side && output.len() >= 2 {
            let (left, right) = output.split_at_mut(1);
            for (m, s) in left[0][..count].iter_mut().zip(right[0][..count].iter_mut()) {
                let (mid, side) = (*m, *s);
                *m = mid + side;
                *s = mid - side;
            }
        }
        count
    }

    fn latency(&self) -> usize {
        if self.realtime() {
            self.fft_size
        } else {
            0
        }
    }

    fn samples_required(&self) -> usize {
        match self.state {
            StreamState::Finished => 0,
            StreamState::Idle | StreamState::Studying => 0,
            StreamState::Processing => {
                let need = self.analysis_pos.floor() as usize + self.fft_size;
                need.saturating_sub(self.lanes[0].input.len())
            }
        }
    }

    fn reset(&mut self) {
        for lane in &mut self.lanes {
            lane.clear();
        }
        self.detector.reset();
        self.state = StreamState::Idle;
        self.analysis_pos = 0.0;
        self.pending_hop = 0;
        self.frames_done = 0;
        self.input_fed = 0;
        self.output_emitted = 0;
        self.skip_remaining = 0;
        self.planned_output = 0.0;
        self.target_output = None;
        self.study_signal = Vec::new();
        self.study_flags = None;
    }
}

impl std::fmt::Debug for PhaseVocoderStretcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseVocoderStretcher")
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("options", &self.options)
            .field("fft_size", &self.fft_size)
            .field("hop_synthesis", &self.hop_synthesis)
            .field("time_ratio", &self.time_ratio)
            .field("pitch_scale", &self.pitch_scale)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

fn check_ratio(what: &str, value: f64) -> Result<(), FxError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(FxError::bad_parameter(format!("{what} must be positive, got {value}")))
    }
}

fn fft_size_for(window: WindowSize, sample_rate: f64) -> usize {
    let base = match window {
        WindowSize::Short => SHORT_FFT_SIZE,
        WindowSize::Standard => STANDARD_FFT_SIZE,
        WindowSize::Long => LONG_FFT_SIZE,
    };
    let factor = ((sample_rate / REFERENCE_SAMPLE_RATE).round() as usize)
        .max(1)
        .next_power_of_two();
    base * factor
}

fn resets_bin_at(options: StretcherOptions, bin: usize, fft_size: usize, sample_rate: f64) -> bool {
    match options.transient_mode() {
        TransientMode::Crisp => true,
        TransientMode::Smooth => false,
        TransientMode::Mixed => {
            let freq = bin as f64 * sample_rate / fft_size as f64;
            !(MIXED_BAND_LOW_HZ..MIXED_BAND_HIGH_HZ).contains(&freq)
        }
    }
}

/// Centre frequency of `bin` in radians per sample.
#[inline]
fn bin_frequency(bin: usize, fft_size: usize) -> f64 {
    TAU * bin as f64 / fft_size as f64
}

/// Instantaneous frequency from the phase advance over `hop` samples.
#[inline]
fn true_frequency(bin: usize, fft_size: usize, hop: usize, phase: f32, prev_phase: f32) -> f64 {
    let expected = TAU * bin as f64 * hop as f64 / fft_size as f64;
    let deviation = wrap_phase(phase as f64 - prev_phase as f64 - expected);
    (expected + deviation) / hop as f64
}

/// Wraps a phase value to [-PI, PI).
#[inline]
fn wrap_phase(phase: f64) -> f64 {
    (phase + PI).rem_euclid(TAU) - PI
}

/// Identity phase locking: each non-peak bin keeps its analysed phase
/// offset from the nearest magnitude peak.
fn lock_phases_to_peaks(
    magnitudes: &[f32],
    analysis_phases: &[f32],
    synth_phases: &mut [f64],
    peaks: &mut Vec<usize>,
) {
    let bins = magnitudes.len();
    if bins < 3 {
        return;
    }
    peaks.clear();
    for bin in 1..bins - 1 {
        if magnitudes[bin] > magnitudes[bin - 1] && magnitudes[bin] >= magnitudes[bin + 1] {
            peaks.push(bin);
        }
    }
    if peaks.is_empty() {
        return;
    }

    let mut peak_idx = 0;
    for bin in 0..bins {
        while peak_idx + 1 < peaks.len()
            && peaks[peak_idx + 1].abs_diff(bin) < peaks[peak_idx].abs_diff(bin)
        {
            peak_idx += 1;
        }
        let peak = peaks[peak_idx];
        if bin != peak {
            let offset = analysis_phases[bin] as f64 - analysis_phases[peak] as f64;
            synth_phases[bin] = wrap_phase(synth_phases[peak] + offset);
        }
    }
}
