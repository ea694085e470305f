//! The processor trait and processor type descriptors.
//!
//! A [`ProcessorType`] is an immutable descriptor registered by name in a
//! [`TypeRegistry`](crate::TypeRegistry): generator kind, declared parameters,
//! default port counts and a factory. Each instance created from it is a boxed
//! [`Processor`] whose hooks the render thread calls in a fixed per-block order:
//!
//! 1. `preconfig` / `config` when parameters changed (or a reconfig was requested)
//! 2. `reset` when a reset was requested
//! 3. inlets are zeroed and every connected source outlet summed into them
//! 4. `process`
//!
//! Hooks receive a [`ProcessContext`] for everything outside the processor's own
//! ports: responses, the asynchronous allocator and the engine's audio I/O.

use core::fmt;
use std::any::Any;
use std::sync::Arc;

use crate::alloc::AsyncAllocator;
use crate::block::SampleBlock;
use crate::channel::{Payload, Response, ResponseKind, ResponseSender};
use crate::error::{ConfigError, ProcessorError};
use crate::graph::{Endpoint, ProcessorId};
use crate::param::{ParamMap, ParamSpec};

/// How a processor participates in scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeneratorKind {
    /// Produces signal on its own. Scheduled at depth 0 and breaks feedback.
    Always,
    /// Runs after every source feeding it.
    Never,
    /// `Always` while no inlet is connected, `Never` otherwise.
    Conditional,
}

impl GeneratorKind {
    /// Lowercase name used in listings.
    pub const fn name(self) -> &'static str {
        match self {
            GeneratorKind::Always => "always",
            GeneratorKind::Never => "never",
            GeneratorKind::Conditional => "conditional",
        }
    }
}

/// Everything a factory needs to build an instance.
#[derive(Debug, Clone, Copy)]
pub struct CreateArgs<'a> {
    /// Session sample rate in Hz.
    pub sample_rate: f32,
    /// Session block size in samples.
    pub block_size: usize,
    /// Number of inlets the instance gets.
    pub inlets: usize,
    /// Number of outlets the instance gets.
    pub outlets: usize,
    /// Initial parameters (defaults overlaid with creation values).
    pub params: &'a ParamMap,
}

/// Builds a processor instance. Runs on the control thread, so it may allocate.
pub type Factory = fn(&CreateArgs<'_>) -> Result<Box<dyn Processor>, ProcessorError>;

/// Derives default `(inlets, outlets)` from creation parameters.
pub type PortLayout = fn(&ParamMap) -> (usize, usize);

/// Immutable descriptor of a processor type.
///
/// Types added by an extension carry an owner handle that keeps the code
/// behind `factory`, `layout` and `description` mapped while the descriptor is
/// reachable.
#[derive(Clone)]
pub struct ProcessorType {
    name: String,
    description: &'static str,
    generator: GeneratorKind,
    params: Vec<ParamSpec>,
    inlets: usize,
    outlets: usize,
    layout: Option<PortLayout>,
    factory: Factory,
    owner: Option<Arc<dyn Any + Send + Sync>>,
}

impl ProcessorType {
    /// Creates a descriptor with no parameters and no ports.
    pub fn new(name: impl Into<String>, generator: GeneratorKind, factory: Factory) -> Self {
        Self {
            name: name.into(),
            description: "",
            generator,
            params: Vec::new(),
            inlets: 0,
            outlets: 0,
            layout: None,
            factory,
            owner: None,
        }
    }

    /// Sets the one-line description shown in listings.
    pub fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Declares a parameter.
    pub fn with_param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    /// Sets the default port counts.
    pub fn with_ports(mut self, inlets: usize, outlets: usize) -> Self {
        self.inlets = inlets;
        self.outlets = outlets;
        self
    }

    /// Derives default port counts from creation parameters instead.
    pub fn with_port_layout(mut self, layout: PortLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    /// Ties the descriptor to `owner`, which lives as long as any clone of
    /// the descriptor does.
    pub fn with_owner(mut self, owner: Arc<dyn Any + Send + Sync>) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Returns true if the type belongs to an extension.
    pub fn is_extension(&self) -> bool {
        self.owner.is_some()
    }

    /// Registered name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// One-line description.
    pub fn description(&self) -> &'static str {
        self.description
    }

    /// Generator kind.
    pub fn generator(&self) -> GeneratorKind {
        self.generator
    }

    /// Declared parameters.
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Default `(inlets, outlets)` for an instance created with `params`.
    pub fn default_ports(&self, params: &ParamMap) -> (usize, usize) {
        match self.layout {
            Some(layout) => layout(params),
            None => (self.inlets, self.outlets),
        }
    }

    /// Runs the factory.
    pub fn create(&self, args: &CreateArgs<'_>) -> Result<Box<dyn Processor>, ProcessorError> {
        (self.factory)(args)
    }
}

impl fmt::Debug for ProcessorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorType")
            .field("name", &self.name)
            .field("generator", &self.generator)
            .field("params", &self.params.len())
            .field("inlets", &self.inlets)
            .field("outlets", &self.outlets)
            .field("extension", &self.owner.is_some())
            .finish_non_exhaustive()
    }
}

/// A processor instance.
///
/// Every hook runs on the render thread and must not block. Allocation belongs
/// in the factory or in an [`Allocate`](crate::alloc::Allocate) job.
pub trait Processor: Send {
    /// Called once, on the first block after the processor is placed in the graph.
    fn init(&mut self, _ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError> {
        Ok(())
    }

    /// Called before `config`. Returning `false` defers configuration to the
    /// next block.
    fn preconfig(&mut self, _params: &ParamMap, _ctx: &mut ProcessContext<'_>) -> bool {
        true
    }

    /// Applies changed parameters. On error the processor keeps its prior state.
    fn config(&mut self, _params: &ParamMap, _ctx: &mut ProcessContext<'_>) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Returns the processor to its initial running state.
    fn reset(&mut self, _ctx: &mut ProcessContext<'_>) {}

    /// Renders one block. Inlets already hold the summed input.
    fn process(&mut self, io: &mut Io<'_>, ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError>;

    /// Called once before the processor leaves the graph.
    fn destroy(&mut self, _ctx: &mut ProcessContext<'_>) {}
}

/// A processor's own ports for one block.
pub struct Io<'a> {
    inlets: &'a [SampleBlock],
    outlets: &'a mut [SampleBlock],
    connections: &'a [Vec<Endpoint>],
}

impl<'a> Io<'a> {
    pub(crate) fn new(
        inlets: &'a [SampleBlock],
        outlets: &'a mut [SampleBlock],
        connections: &'a [Vec<Endpoint>],
    ) -> Self {
        Self {
            inlets,
            outlets,
            connections,
        }
    }

    /// Number of inlets.
    pub fn inlet_count(&self) -> usize {
        self.inlets.len()
    }

    /// Number of outlets.
    pub fn outlet_count(&self) -> usize {
        self.outlets.len()
    }

    /// Summed input of inlet `i`.
    pub fn inlet(&self, i: usize) -> &[f32] {
        &self.inlets[i]
    }

    /// Output block of outlet `i`.
    pub fn outlet(&mut self, i: usize) -> &mut [f32] {
        &mut self.outlets[i]
    }

    /// Returns true if inlet `i` has at least one source.
    pub fn is_connected(&self, i: usize) -> bool {
        self.connections.get(i).is_some_and(|c| !c.is_empty())
    }

    /// All inlets and all outlets at once.
    pub fn split(&mut self) -> (&[SampleBlock], &mut [SampleBlock]) {
        (self.inlets, &mut *self.outlets)
    }
}

/// Per-hook view of the engine.
pub struct ProcessContext<'a> {
    id: ProcessorId,
    sample_rate: f32,
    block_size: usize,
    responses: &'a ResponseSender,
    allocator: &'a AsyncAllocator,
    inputs: &'a [SampleBlock],
    outputs: &'a mut [SampleBlock],
    reconfig: bool,
}

impl ProcessContext<'_> {
    /// Id of the processor being run.
    pub fn id(&self) -> ProcessorId {
        self.id
    }

    /// Session sample rate in Hz.
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Session block size in samples.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Sends a response tagged with this processor's id.
    ///
    /// Never blocks. Returns `false` if the response queue was full and the
    /// response was dropped.
    pub fn emit(&self, kind: ResponseKind, payload: Payload) -> bool {
        self.responses.send(Response {
            processor: Some(self.id),
            kind,
            payload,
        })
    }

    /// The session's asynchronous allocator.
    pub fn allocator(&self) -> &AsyncAllocator {
        self.allocator
    }

    /// Engine input channel `channel` for this block.
    pub fn audio_input(&self, channel: usize) -> Option<&[f32]> {
        self.inputs.get(channel).map(SampleBlock::as_slice)
    }

    /// Engine output channel `channel` for this block.
    pub fn audio_output(&mut self, channel: usize) -> Option<&mut [f32]> {
        self.outputs.get_mut(channel).map(SampleBlock::as_mut_slice)
    }

    /// Asks for `config` to run again on the next block.
    pub fn request_reconfig(&mut self) {
        self.reconfig = true;
    }

    pub(crate) fn take_reconfig(&mut self) -> bool {
        core::mem::take(&mut self.reconfig)
    }
}

/// Render-thread state shared by every processor in a block.
pub(crate) struct RenderEnv {
    pub(crate) sample_rate: f32,
    pub(crate) block_size: usize,
    pub(crate) responses: ResponseSender,
    pub(crate) allocator: AsyncAllocator,
    pub(crate) inputs: Vec<SampleBlock>,
    pub(crate) outputs: Vec<SampleBlock>,
}

impl RenderEnv {
    pub(crate) fn context(&mut self, id: ProcessorId) -> ProcessContext<'_> {
        ProcessContext {
            id,
            sample_rate: self.sample_rate,
            block_size: self.block_size,
            responses: &self.responses,
            allocator: &self.allocator,
            inputs: &self.inputs,
            outputs: &mut self.outputs,
            reconfig: false,
        }
    }

    /// Sends a response with an optional processor tag.
    pub(crate) fn report(&self, processor: Option<ProcessorId>, kind: ResponseKind, payload: Payload) {
        self.responses.send(Response {
            processor,
            kind,
            payload,
        });
    }
}
