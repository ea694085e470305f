//! Seeded white noise.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rivulet_core::{
    ConfigError, CreateArgs, GeneratorKind, Io, ParamMap, ParamSpec, ProcessContext, Processor,
    ProcessorError, ProcessorType,
};

/// `noise~`: uniform white noise in `[-ampl, ampl)`.
///
/// The generator is reseeded from `seed` whenever `seed` changes and on reset,
/// so two instances with the same seed produce identical output.
#[derive(Debug, Clone)]
pub struct Noise {
    rng: SmallRng,
    seed: u64,
    ampl: f32,
}

impl Noise {
    /// Descriptor registered as `noise~`.
    pub fn processor_type() -> ProcessorType {
        ProcessorType::new("noise~", GeneratorKind::Always, Self::create)
            .with_description("uniform white noise")
            .with_param(ParamSpec::float("ampl", 1.0))
            .with_param(ParamSpec::int("seed", 1))
            .with_ports(0, 1)
    }

    fn create(args: &CreateArgs<'_>) -> Result<Box<dyn Processor>, ProcessorError> {
        let seed = args.params.int("seed") as u64;
        Ok(Box::new(Self {
            rng: SmallRng::seed_from_u64(seed),
            seed,
            ampl: args.params.float("ampl") as f32,
        }))
    }
}

impl Processor for Noise {
    fn config(&mut self, params: &ParamMap, _ctx: &mut ProcessContext<'_>) -> Result<(), ConfigError> {
        let ampl = params.float("ampl");
        if !(0.0..=16.0).contains(&ampl) {
            return Err(ConfigError::out_of_range("ampl", ampl, 0.0, 16.0));
        }
        self.ampl = ampl as f32;
        if params.changed("seed") {
            self.seed = params.int("seed") as u64;
            self.rng = SmallRng::seed_from_u64(self.seed);
        }
        Ok(())
    }

    fn reset(&mut self, _ctx: &mut ProcessContext<'_>) {
        self.rng = SmallRng::seed_from_u64(self.seed);
    }

    fn process(&mut self, io: &mut Io<'_>, _ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError> {
        for s in io.outlet(0).iter_mut() {
            *s = self.rng.gen_range(-1.0f32..1.0) * self.ampl;
        }
        Ok(())
    }
}
