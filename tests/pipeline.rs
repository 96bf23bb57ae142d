mod common;

use approx::assert_relative_eq;
use common::*;
use fxchain::processors::{DelayLine, Gain, PitchShift, SilencePrimer};
use fxchain::{
    run_pipeline, run_pipeline_with_block_size, AudioBuffer, FxError, PipelineDriver,
    ProcessContext, ProcessSpec, Processor,
};

/// Fails on its second block.
struct Failing {
    blocks: usize,
}

impl Processor for Failing {
    fn prepare(&mut self, _spec: &ProcessSpec) -> Result<(), FxError> {
        Ok(())
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<usize, FxError> {
        self.blocks += 1;
        if self.blocks > 1 {
            return Err(FxError::Internal("synthetic failure".to_string()));
        }
        Ok(ctx.num_frames())
    }

    fn reset(&mut self) {
        self.blocks = 0;
    }

    fn latency_hint(&self) -> usize {
        0
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Writes silence and never reports a valid frame.
struct Mute;

impl Processor for Mute {
    fn prepare(&mut self, _spec: &ProcessSpec) -> Result<(), FxError> {
        Ok(())
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<usize, FxError> {
        ctx.block.fill(0.0);
        Ok(0)
    }

    fn reset(&mut self) {}

    fn latency_hint(&self) -> usize {
        0
    }

    fn name(&self) -> &'static str {
        "mute"
    }
}

#[test]
fn gain_scales_impulse_in_place() {
    let input = mono(gen_impulse(44100, 0, 1.0));
    let mut chain = vec![Gain::new(6.0).unwrap()];
    let out = run_pipeline(&input, 44100.0, &mut chain).unwrap();

    assert_eq!(out.num_channels(), 1);
    assert_eq!(out.num_frames(), 44100);
    assert_relative_eq!(out.channel(0)[0], 1.9953, epsilon = 1e-4);
    assert!(out.channel(0)[1..].iter().all(|&s| s == 0.0));
}

#[test]
fn delay_on_silence_stays_silent() {
    let input = AudioBuffer::new(1, 4410).unwrap();
    let mut chain = vec![DelayLine::new(441).unwrap()];
    let out = run_pipeline(&input, 44100.0, &mut chain).unwrap();
    assert_eq!(out.num_frames(), 4410);
    assert_eq!(out, input);
}

#[test]
fn empty_chain_returns_input() {
    let input = AudioBuffer::from_channels(&[gen_noise(3000, 0.5, 1), gen_noise(3000, 0.5, 2)]).unwrap();
    let mut chain: Vec<Box<dyn Processor>> = Vec::new();
    let out = run_pipeline(&input, 48000.0, &mut chain).unwrap();
    assert_eq!(out, input);
}

#[test]
fn output_shape_matches_input_for_any_block_size() {
    let input = AudioBuffer::from_channels(&[gen_noise(5000, 0.5, 3), gen_noise(5000, 0.5, 4)]).unwrap();
    for block in [1, 7, 512, 4999, 5000, 8192] {
        let mut chain: Vec<Box<dyn Processor>> = vec![
            Box::new(Gain::new(-3.0).unwrap()),
            Box::new(DelayLine::new(100).unwrap()),
        ];
        let out = run_pipeline_with_block_size(&input, 44100.0, &mut chain, block).unwrap();
        assert_eq!(out.num_channels(), 2, "block {block}");
        assert_eq!(out.num_frames(), 5000, "block {block}");
    }
}

#[test]
fn delay_latency_is_compensated() {
    let input = mono(gen_impulse(8000, 2500, 1.0));
    for block in [64, 1000, 8192] {
        let mut chain = vec![DelayLine::new(1234).unwrap()];
        let out = PipelineDriver::new(44100.0)
            .with_block_size(block)
            .run(&input, &mut chain)
            .unwrap();
        assert_eq!(argmax_abs(out.channel(0)), 2500, "block {block}");
        assert_eq!(out, input, "block {block}");
    }
}

#[test]
fn pitch_shift_latency_is_compensated() {
    let input = mono(gen_impulse(6000, 3000, 1.0));
    let mut chain = vec![PitchShift::new(0.0).unwrap().with_silence_frames(4096).unwrap()];
    let out = run_pipeline_with_block_size(&input, 44100.0, &mut chain, 512).unwrap();
    assert_eq!(out.num_frames(), 6000);
    assert_eq!(argmax_abs(out.channel(0)), 3000);
}

#[test]
fn neutral_pitch_shift_is_transparent() {
    let input = mono(gen_sine(440.0, 44100.0, 20_000, 0.5));
    let mut chain = vec![PitchShift::new(0.0).unwrap()];
    let out = run_pipeline(&input, 44100.0, &mut chain).unwrap();
    let err = relative_rms_error(input.channel(0), out.channel(0));
    assert!(err < 1e-2, "relative error {err}");
}

#[test]
fn octave_pitch_shift_keeps_length() {
    let input = mono(gen_sine(440.0, 44100.0, 44100, 0.5));
    let mut chain = vec![PitchShift::new(12.0).unwrap()];
    let out = run_pipeline(&input, 44100.0, &mut chain).unwrap();
    assert_eq!(out.num_frames(), 44100);
    let freq = dominant_frequency(out.channel(0), 44100.0, 8192, 16384);
    assert!((freq - 880.0).abs() < 8.8, "dominant frequency {freq}");
}

#[test]
fn bypassed_blocks_are_untouched() {
    let spec = ProcessSpec::new(44100.0, 256, 2);
    let original = AudioBuffer::from_channels(&[gen_noise(256, 0.8, 5), gen_noise(256, 0.8, 6)]).unwrap();
    let mut processors: Vec<Box<dyn Processor>> = vec![
        Box::new(Gain::new(12.0).unwrap()),
        Box::new(DelayLine::new(17).unwrap()),
        Box::new(PitchShift::new(7.0).unwrap()),
        Box::new(SilencePrimer::new(Gain::new(-40.0).unwrap())),
    ];
    for p in &mut processors {
        p.prepare(&spec).unwrap();
        p.reset();
        let mut buf = original.clone();
        {
            let mut ctx = ProcessContext::bypassed(buf.block_mut(0, 256));
            assert_eq!(p.process(&mut ctx).unwrap(), 256, "{}", p.name());
        }
        assert_eq!(buf, original, "{} modified a bypassed block", p.name());
    }
}

#[test]
fn processor_error_carries_index() {
    let input = mono(gen_noise(3000, 0.5, 7));
    let mut chain: Vec<Box<dyn Processor>> = vec![
        Box::new(Gain::new(0.0).unwrap()),
        Box::new(Failing { blocks: 0 }),
    ];
    let err = run_pipeline_with_block_size(&input, 44100.0, &mut chain, 1024).unwrap_err();
    match err {
        FxError::ProcessorFailed { index, name, source } => {
            assert_eq!(index, 1);
            assert_eq!(name, "failing");
            assert!(matches!(*source, FxError::Internal(_)));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn silent_processor_still_completes() {
    let input = mono(gen_noise(2000, 0.5, 8));
    let mut chain: Vec<Box<dyn Processor>> = vec![Box::new(Mute), Box::new(Gain::new(6.0).unwrap())];
    let out = run_pipeline_with_block_size(&input, 44100.0, &mut chain, 300).unwrap();
    assert_eq!(out.num_frames(), 2000);
    assert!(out.channel(0).iter().all(|&s| s == 0.0));
}

#[test]
fn invalid_driver_settings_are_rejected() {
    let input = mono(vec![0.0; 16]);
    let mut chain = vec![Gain::new(0.0).unwrap()];
    assert!(matches!(
        run_pipeline_with_block_size(&input, 44100.0, &mut chain, 0),
        Err(FxError::BadParameter(_))
    ));
    assert!(matches!(
        run_pipeline(&input, 0.0, &mut chain),
        Err(FxError::BadParameter(_))
    ));
}
