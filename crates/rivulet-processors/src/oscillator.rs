//! Wavetable sine oscillator and phase ramp.
//!
//! Both run the same block pipeline: phase increments are integrated with
//! [`prefix_sum`], wrapped with [`SampleBlock::fmod`], and (for `osc~`) turned
//! into samples with [`index_fetch`]. The integrator is carried in `f64` inside
//! `prefix_sum`, and the phase is re-wrapped at the end of every block so it
//! never drifts out of `f32` precision.
//!
//! With inlet 0 wired, each inlet sample is the instantaneous frequency in Hz;
//! otherwise the `freq` parameter sets a constant frequency.

use std::f32::consts::TAU;

use rivulet_core::{
    ConfigError, CreateArgs, GeneratorKind, Io, ParamMap, ParamSpec, ProcessContext, Processor,
    ProcessorError, ProcessorType, SampleBlock, index_fetch, prefix_sum,
};

/// Samples in one wavetable cycle.
pub const TABLE_SIZE: usize = 2048;

/// Highest accepted `freq`, as a multiple of the sample rate.
const MAX_FREQ_RATIO: f64 = 0.5;

fn check_freq(params: &ParamMap, sample_rate: f32) -> Result<f32, ConfigError> {
    let freq = params.float("freq");
    let nyquist = f64::from(sample_rate) * MAX_FREQ_RATIO;
    if !(-nyquist..=nyquist).contains(&freq) {
        return Err(ConfigError::out_of_range("freq", freq, -nyquist, nyquist));
    }
    Ok(freq as f32)
}

/// Folds `fmod` output (which keeps the sign of its input) into `[0, period)`.
fn fold_negative(phase: &mut [f32], period: f32) {
    for p in phase.iter_mut() {
        if *p < 0.0 {
            *p += period;
        }
        if *p >= period {
            *p = 0.0;
        }
    }
}

/// `osc~`: table-lookup sine oscillator.
pub struct Osc {
    table: Vec<f32>,
    phase_block: SampleBlock,
    phase: f32,
    freq: f32,
    ampl: f32,
    /// Table samples advanced per Hz per sample.
    hz_to_index: f32,
}

impl Osc {
    /// Descriptor registered as `osc~`.
    pub fn processor_type() -> ProcessorType {
        ProcessorType::new("osc~", GeneratorKind::Conditional, Self::create)
            .with_description("wavetable sine; frequency from inlet 0 or freq")
            .with_param(ParamSpec::float("freq", 440.0))
            .with_param(ParamSpec::float("ampl", 1.0))
            .with_ports(1, 1)
    }

    fn create(args: &CreateArgs<'_>) -> Result<Box<dyn Processor>, ProcessorError> {
        let freq = check_freq(args.params, args.sample_rate)?;
        let table = (0..TABLE_SIZE)
            .map(|i| (i as f32 / TABLE_SIZE as f32 * TAU).sin())
            .collect();
        Ok(Box::new(Self {
            table,
            phase_block: SampleBlock::new(args.block_size),
            phase: 0.0,
            freq,
            ampl: args.params.float("ampl") as f32,
            hz_to_index: TABLE_SIZE as f32 / args.sample_rate,
        }))
    }
}

impl Processor for Osc {
    fn config(&mut self, params: &ParamMap, ctx: &mut ProcessContext<'_>) -> Result<(), ConfigError> {
        let freq = check_freq(params, ctx.sample_rate())?;
        self.freq = freq;
        self.ampl = params.float("ampl") as f32;
        Ok(())
    }

    fn reset(&mut self, _ctx: &mut ProcessContext<'_>) {
        self.phase = 0.0;
    }

    fn process(&mut self, io: &mut Io<'_>, _ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError> {
        let period = TABLE_SIZE as f32;
        let last = if io.is_connected(0) {
            prefix_sum(Some(io.inlet(0)), self.hz_to_index, self.phase, &mut self.phase_block)
        } else {
            prefix_sum(None, self.freq * self.hz_to_index, self.phase, &mut self.phase_block)
        };
        self.phase = last.rem_euclid(period);

        self.phase_block.fmod(period);
        fold_negative(&mut self.phase_block, period);

        let out = io.outlet(0);
        index_fetch(&self.phase_block, &self.table, out);
        for s in out.iter_mut() {
            *s *= self.ampl;
        }
        Ok(())
    }
}

/// `phasor~`: sawtooth ramp from 0 to 1.
#[derive(Debug, Clone)]
pub struct Phasor {
    phase: f32,
    freq: f32,
    inv_sample_rate: f32,
}

impl Phasor {
    /// Descriptor registered as `phasor~`.
    pub fn processor_type() -> ProcessorType {
        ProcessorType::new("phasor~", GeneratorKind::Conditional, Self::create)
            .with_description("0..1 ramp; frequency from inlet 0 or freq")
            .with_param(ParamSpec::float("freq", 1.0))
            .with_ports(1, 1)
    }

    fn create(args: &CreateArgs<'_>) -> Result<Box<dyn Processor>, ProcessorError> {
        Ok(Box::new(Self {
            phase: 0.0,
            freq: check_freq(args.params, args.sample_rate)?,
            inv_sample_rate: 1.0 / args.sample_rate,
        }))
    }
}

impl Processor for Phasor {
    fn config(&mut self, params: &ParamMap, ctx: &mut ProcessContext<'_>) -> Result<(), ConfigError> {
        self.freq = check_freq(params, ctx.sample_rate())?;
        Ok(())
    }

    fn reset(&mut self, _ctx: &mut ProcessContext<'_>) {
        self.phase = 0.0;
    }

    fn process(&mut self, io: &mut Io<'_>, _ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError> {
        let wired = io.is_connected(0);
        let (ins, outs) = io.split();
        let out = &mut outs[0];
        let last = if wired {
            prefix_sum(Some(ins[0].as_slice()), self.inv_sample_rate, self.phase, out)
        } else {
            prefix_sum(None, self.freq * self.inv_sample_rate, self.phase, out)
        };
        self.phase = last.rem_euclid(1.0);
        out.fmod(1.0);
        fold_negative(out, 1.0);
        Ok(())
    }
}
