//! Constant source and signal arithmetic.

use rivulet_core::{
    ConfigError, CreateArgs, GeneratorKind, Io, ParamMap, ParamSpec, ProcessContext, Processor,
    ProcessorError, ProcessorType, mac,
};

/// `sig~`: writes `value` to every sample of its outlet.
#[derive(Debug, Clone, Default)]
pub struct Sig {
    value: f32,
}

impl Sig {
    /// Descriptor registered as `sig~`.
    pub fn processor_type() -> ProcessorType {
        ProcessorType::new("sig~", GeneratorKind::Always, Self::create)
            .with_description("constant signal")
            .with_param(ParamSpec::float("value", 0.0))
            .with_ports(0, 1)
    }

    fn create(args: &CreateArgs<'_>) -> Result<Box<dyn Processor>, ProcessorError> {
        Ok(Box::new(Self {
            value: args.params.float("value") as f32,
        }))
    }
}

impl Processor for Sig {
    fn config(&mut self, params: &ParamMap, _ctx: &mut ProcessContext<'_>) -> Result<(), ConfigError> {
        self.value = params.float("value") as f32;
        Ok(())
    }

    fn process(&mut self, io: &mut Io<'_>, _ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError> {
        io.outlet(0).fill(self.value);
        Ok(())
    }
}

/// `+~`: sums both inlets and adds `const`.
///
/// Every source wired into the same inlet is already summed by the engine, so
/// `+~` with a single inlet in use is a plain mixer.
#[derive(Debug, Clone, Default)]
pub struct Add {
    constant: f32,
}

impl Add {
    /// Descriptor registered as `+~`.
    pub fn processor_type() -> ProcessorType {
        ProcessorType::new("+~", GeneratorKind::Never, Self::create)
            .with_description("in0 + in1 + const")
            .with_param(ParamSpec::float("const", 0.0))
            .with_ports(2, 1)
    }

    fn create(args: &CreateArgs<'_>) -> Result<Box<dyn Processor>, ProcessorError> {
        Ok(Box::new(Self {
            constant: args.params.float("const") as f32,
        }))
    }
}

impl Processor for Add {
    fn config(&mut self, params: &ParamMap, _ctx: &mut ProcessContext<'_>) -> Result<(), ConfigError> {
        self.constant = params.float("const") as f32;
        Ok(())
    }

    fn process(&mut self, io: &mut Io<'_>, _ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError> {
        let (ins, outs) = io.split();
        let out = &mut outs[0];
        out.fill(self.constant);
        for inlet in ins {
            out.accumulate(inlet);
        }
        Ok(())
    }
}

/// `*~`: multiplies inlet 0 by inlet 1, or by `const` while inlet 1 has no
/// source.
#[derive(Debug, Clone, Default)]
pub struct Mul {
    constant: f32,
}

impl Mul {
    /// Descriptor registered as `*~`.
    pub fn processor_type() -> ProcessorType {
        ProcessorType::new("*~", GeneratorKind::Never, Self::create)
            .with_description("in0 * (in1 or const)")
            .with_param(ParamSpec::float("const", 1.0))
            .with_ports(2, 1)
    }

    fn create(args: &CreateArgs<'_>) -> Result<Box<dyn Processor>, ProcessorError> {
        Ok(Box::new(Self {
            constant: args.params.float("const") as f32,
        }))
    }
}

impl Processor for Mul {
    fn config(&mut self, params: &ParamMap, _ctx: &mut ProcessContext<'_>) -> Result<(), ConfigError> {
        self.constant = params.float("const") as f32;
        Ok(())
    }

    fn process(&mut self, io: &mut Io<'_>, _ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError> {
        let wired = io.inlet_count() > 1 && io.is_connected(1);
        let (ins, outs) = io.split();
        let out = &mut outs[0];
        if wired {
            out.zero();
            mac(&ins[0], &ins[1], None, out);
        } else {
            out.copy_from(&ins[0]);
            out.const_mul(self.constant);
        }
        Ok(())
    }
}
