//! Rivulet Processors - builtin processor types
//!
//! Every type here is registered by [`register_builtins`]:
//!
//! | Name | Kind | Ports (in/out) | |
//! |------|------|----------------|---|
//! | `sig~` | always | 0/1 | constant `value` |
//! | `+~` | never | 2/1 | `in0 + in1 + const` |
//! | `*~` | never | 2/1 | `in0 * in1`, or `in0 * const` while inlet 1 is unwired |
//! | `osc~` | conditional | 1/1 | wavetable sine, frequency from inlet 0 or `freq` |
//! | `phasor~` | conditional | 1/1 | 0..1 ramp, frequency from inlet 0 or `freq` |
//! | `noise~` | always | 0/1 | seeded uniform white noise |
//! | `line~` | always | 0/1 | linear ramp to `target` over `time_ms` |
//! | `adc~` | always | 0/1 | engine input `channel` |
//! | `dac~` | never | 1/0 | sums into engine output `channel` |
//! | `buffer~` | conditional | channels+1/channels | [`BufferPlayer`] |
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use rivulet_core::{create_session, SessionSettings, TypeRegistry};
//!
//! let registry = Arc::new(TypeRegistry::new());
//! rivulet_processors::register_builtins(&registry).unwrap();
//!
//! let (mut engine, controller) = create_session(SessionSettings::default(), registry).unwrap();
//! let a = controller.create("sig~", 0, 0, &[("value", 0.25.into())]).unwrap();
//! let sum = controller.create("+~", 0, 0, &[("const", 1.0.into())]).unwrap();
//! controller.connect(a, 0, sum, 0).unwrap();
//!
//! engine.process_block(&[], &mut []).unwrap();
//! assert!(engine.graph().outlet(sum, 0).unwrap().iter().all(|&s| s == 1.25));
//! ```

pub mod arith;
pub mod audio_io;
pub mod buffer;
pub mod line;
pub mod noise;
pub mod oscillator;

pub use arith::{Add, Mul, Sig};
pub use audio_io::{Adc, Dac};
pub use buffer::{BufferData, BufferPlayer, BufferShape, Direction, Mode, PlayerState};
pub use line::Line;
pub use noise::Noise;
pub use oscillator::{Osc, Phasor};

use rivulet_core::{ProcessorType, RegistryError, TypeRegistry};

/// Descriptors of every builtin type, in registration order.
pub fn builtin_types() -> Vec<ProcessorType> {
    vec![
        Sig::processor_type(),
        Add::processor_type(),
        Mul::processor_type(),
        Osc::processor_type(),
        Phasor::processor_type(),
        Noise::processor_type(),
        Line::processor_type(),
        Adc::processor_type(),
        Dac::processor_type(),
        BufferPlayer::processor_type(),
    ]
}

/// Registers every builtin type.
///
/// Fails if any builtin name is already taken.
pub fn register_builtins(registry: &TypeRegistry) -> Result<(), RegistryError> {
    for ty in builtin_types() {
        registry.register(ty)?;
    }
    tracing::debug!("registered {} builtin processor types", registry.len());
    Ok(())
}
