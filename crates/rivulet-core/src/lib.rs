//! Rivulet Core - real-time dataflow rendering
//!
//! This crate is the rendering core of a dataflow signal-processing engine: a
//! graph of processors connected by signal edges, scheduled and executed once
//! per fixed-size audio block under a hard deadline, while control threads
//! concurrently mutate topology and parameters.
//!
//! # Core Abstractions
//!
//! ## Signal
//!
//! - [`SampleBlock`] - one channel of one block, plus vector arithmetic
//!   ([`mac`], [`index_fetch`], [`prefix_sum`])
//!
//! ## Processors
//!
//! - [`Processor`] - hook trait every processor implements
//! - [`ProcessorType`] - immutable descriptor with parameters and a factory
//! - [`TypeRegistry`] - name-keyed registry, extensible at runtime via
//!   [`Controller::add_extension_types`] (the `rivulet-extension` crate loads
//!   them from shared libraries)
//!
//! ## Session
//!
//! - [`create_session`] - builds an [`Engine`] (render thread) and a
//!   [`Controller`] (control threads)
//! - [`Graph`] - processors and connections, depth-scheduled before each block
//!   that follows a topology change
//! - [`AsyncAllocator`] - off-thread allocation for processors that resize
//!
//! # Threading
//!
//! The engine never blocks: requests are drained with `try_recv`, responses are
//! sent with `try_send` (and dropped, counted, when the queue is full), and
//! request payloads are handed back to the controller to be freed. The
//! controller may block briefly on a full request queue; it retries and never
//! drops a request.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use rivulet_core::{
//!     create_session, CreateArgs, GeneratorKind, Io, ParamSpec, ProcessContext, Processor,
//!     ProcessorError, ProcessorType, SessionSettings, TypeRegistry,
//! };
//!
//! struct Dc(f32);
//!
//! impl Processor for Dc {
//!     fn process(&mut self, io: &mut Io<'_>, _ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError> {
//!         io.outlet(0).fill(self.0);
//!         Ok(())
//!     }
//! }
//!
//! fn dc(args: &CreateArgs<'_>) -> Result<Box<dyn Processor>, ProcessorError> {
//!     Ok(Box::new(Dc(args.params.float("level") as f32)))
//! }
//!
//! let registry = Arc::new(TypeRegistry::new());
//! registry
//!     .register(
//!         ProcessorType::new("dc~", GeneratorKind::Always, dc)
//!             .with_param(ParamSpec::float("level", 0.5))
//!             .with_ports(0, 1),
//!     )
//!     .unwrap();
//!
//! let (mut engine, controller) = create_session(SessionSettings::default(), registry).unwrap();
//! let id = controller.create("dc~", 0, 0, &[]).unwrap();
//! engine.process_block(&[], &mut []).unwrap();
//! assert_eq!(engine.graph().outlet(id, 0).unwrap()[0], 0.5);
//! ```

pub mod alloc;
pub mod block;
pub mod channel;
pub mod engine;
pub mod error;
pub mod graph;
pub mod param;
pub mod processor;
pub mod registry;
pub mod settings;

pub use alloc::{AllocSlot, Allocate, AsyncAllocator, SlotStatus};
pub use block::{SampleBlock, index_fetch, mac, prefix_sum};
pub use channel::{Payload, Request, Response, ResponseKind, Retired};
pub use engine::{Controller, Engine, create_session};
pub use error::{
    AllocError, ConfigError, EngineError, GraphError, ProcessorError, RegistryError, RequestError,
    SchedulingError,
};
pub use graph::{Connection, Endpoint, Graph, ProcessorId, ProcessorNode};
pub use param::{ParamMap, ParamSpec, ParamType, ParamValue};
pub use processor::{CreateArgs, Factory, GeneratorKind, Io, PortLayout, ProcessContext, Processor, ProcessorType};
pub use registry::TypeRegistry;
pub use settings::{SchedulePolicy, SessionSettings};
