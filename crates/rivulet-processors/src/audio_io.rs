//! Engine audio input and output.
//!
//! `adc~` and `dac~` are the only processors that touch the engine's audio
//! boundary. Channels beyond what the session was configured with read as
//! silence and are discarded on output.

use rivulet_core::{
    ConfigError, CreateArgs, GeneratorKind, Io, ParamMap, ParamSpec, ProcessContext, Processor,
    ProcessorError, ProcessorType,
};

/// Highest accepted channel index.
const MAX_CHANNEL: i64 = 255;

fn channel(params: &ParamMap) -> Result<usize, ConfigError> {
    let ch = params.int("channel");
    if !(0..=MAX_CHANNEL).contains(&ch) {
        return Err(ConfigError::out_of_range("channel", ch as f64, 0.0, MAX_CHANNEL as f64));
    }
    Ok(ch as usize)
}

/// `adc~`: copies one engine input channel to its outlet.
#[derive(Debug, Clone)]
pub struct Adc {
    channel: usize,
}

impl Adc {
    /// Descriptor registered as `adc~`.
    pub fn processor_type() -> ProcessorType {
        ProcessorType::new("adc~", GeneratorKind::Always, Self::create)
            .with_description("engine input channel")
            .with_param(ParamSpec::int("channel", 0))
            .with_ports(0, 1)
    }

    fn create(args: &CreateArgs<'_>) -> Result<Box<dyn Processor>, ProcessorError> {
        Ok(Box::new(Self {
            channel: channel(args.params)?,
        }))
    }
}

impl Processor for Adc {
    fn config(&mut self, params: &ParamMap, _ctx: &mut ProcessContext<'_>) -> Result<(), ConfigError> {
        self.channel = channel(params)?;
        Ok(())
    }

    fn process(&mut self, io: &mut Io<'_>, ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError> {
        let out = io.outlet(0);
        match ctx.audio_input(self.channel) {
            Some(input) => out.copy_from_slice(input),
            None => out.fill(0.0),
        }
        Ok(())
    }
}

/// `dac~`: adds its inlet into one engine output channel.
///
/// Several `dac~` on the same channel mix.
#[derive(Debug, Clone)]
pub struct Dac {
    channel: usize,
}

impl Dac {
    /// Descriptor registered as `dac~`.
    pub fn processor_type() -> ProcessorType {
        ProcessorType::new("dac~", GeneratorKind::Never, Self::create)
            .with_description("sums into engine output channel")
            .with_param(ParamSpec::int("channel", 0))
            .with_ports(1, 0)
    }

    fn create(args: &CreateArgs<'_>) -> Result<Box<dyn Processor>, ProcessorError> {
        Ok(Box::new(Self {
            channel: channel(args.params)?,
        }))
    }
}

impl Processor for Dac {
    fn config(&mut self, params: &ParamMap, _ctx: &mut ProcessContext<'_>) -> Result<(), ConfigError> {
        self.channel = channel(params)?;
        Ok(())
    }

    fn process(&mut self, io: &mut Io<'_>, ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError> {
        if let Some(out) = ctx.audio_output(self.channel) {
            for (o, &i) in out.iter_mut().zip(io.inlet(0)) {
                *o += i;
            }
        }
        Ok(())
    }
}
