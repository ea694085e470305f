//! Linear ramp generator.

use rivulet_core::{
    ConfigError, CreateArgs, GeneratorKind, Io, ParamMap, ParamSpec, ProcessContext, Processor,
    ProcessorError, ProcessorType,
};

/// Longest accepted ramp, in milliseconds.
const MAX_TIME_MS: f64 = 3_600_000.0;

/// `line~`: ramps linearly from its current value to `target` over `time_ms`.
///
/// Setting `target` starts a new ramp from wherever the previous one is. A
/// `time_ms` of zero jumps immediately.
#[derive(Debug, Clone)]
pub struct Line {
    value: f64,
    target: f64,
    step: f64,
    remaining: u64,
    time_ms: f64,
    sample_rate: f64,
}

impl Line {
    /// Descriptor registered as `line~`.
    pub fn processor_type() -> ProcessorType {
        ProcessorType::new("line~", GeneratorKind::Always, Self::create)
            .with_description("linear ramp to target over time_ms")
            .with_param(ParamSpec::float("target", 0.0))
            .with_param(ParamSpec::float("time_ms", 0.0))
            .with_ports(0, 1)
    }

    fn create(args: &CreateArgs<'_>) -> Result<Box<dyn Processor>, ProcessorError> {
        // The initial target is where the line starts, not a ramp.
        let target = args.params.float("target");
        Ok(Box::new(Self {
            value: target,
            target,
            step: 0.0,
            remaining: 0,
            time_ms: args.params.float("time_ms"),
            sample_rate: f64::from(args.sample_rate),
        }))
    }

    fn start_ramp(&mut self, target: f64) {
        let samples = (self.time_ms * self.sample_rate / 1000.0).round() as u64;
        self.target = target;
        if samples == 0 {
            self.value = target;
            self.remaining = 0;
        } else {
            self.step = (target - self.value) / samples as f64;
            self.remaining = samples;
        }
    }
}

impl Processor for Line {
    fn config(&mut self, params: &ParamMap, _ctx: &mut ProcessContext<'_>) -> Result<(), ConfigError> {
        let time_ms = params.float("time_ms");
        if !(0.0..=MAX_TIME_MS).contains(&time_ms) {
            return Err(ConfigError::out_of_range("time_ms", time_ms, 0.0, MAX_TIME_MS));
        }
        self.time_ms = time_ms;
        let target = params.float("target");
        if params.changed("target") && target != self.target {
            self.start_ramp(target);
        }
        Ok(())
    }

    fn reset(&mut self, _ctx: &mut ProcessContext<'_>) {
        self.value = self.target;
        self.remaining = 0;
    }

    fn process(&mut self, io: &mut Io<'_>, _ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError> {
        for s in io.outlet(0).iter_mut() {
            if self.remaining > 0 {
                self.remaining -= 1;
                self.value = if self.remaining == 0 {
                    self.target
                } else {
                    self.value + self.step
                };
            }
            *s = self.value as f32;
        }
        Ok(())
    }
}
