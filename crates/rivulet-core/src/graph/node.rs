//! Processor nodes.
//!
//! A [`ProcessorNode`] bundles a processor instance with everything the render
//! thread needs to run it: its parameter map, preallocated inlet and outlet
//! blocks, and the adjacency lists for both directions. Nodes are fully built on
//! the control thread and moved into the graph by a `Create` request, so the
//! render thread never allocates them.

use core::fmt;
use std::sync::Arc;

use crate::block::SampleBlock;
use crate::param::ParamMap;
use crate::processor::{GeneratorKind, Processor, ProcessorType};

use super::edge::Endpoint;

/// Identifier of a processor within a session.
///
/// `index` addresses a storage slot; `generation` distinguishes successive
/// processors placed in the same slot, so a stale id never aliases a new
/// processor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessorId {
    index: u32,
    generation: u32,
}

impl ProcessorId {
    /// Creates an id from its parts.
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Storage slot index.
    #[inline]
    pub const fn index(self) -> usize {
        self.index as usize
    }

    /// Slot generation.
    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ProcessorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

/// A processor instance placed in the graph.
pub struct ProcessorNode {
    pub(crate) id: ProcessorId,
    pub(crate) params: ParamMap,
    pub(crate) processor: Box<dyn Processor>,
    pub(crate) inlets: Vec<SampleBlock>,
    pub(crate) outlets: Vec<SampleBlock>,
    /// Source outlets feeding each inlet.
    pub(crate) inlet_connections: Vec<Vec<Endpoint>>,
    /// Destination inlets fed by each outlet.
    pub(crate) outlet_connections: Vec<Vec<Endpoint>>,
    /// Committed schedule depth. `None` until scheduled.
    pub(crate) depth: Option<u32>,
    /// Scratch depth written during a scheduling pass.
    pub(crate) pending_depth: Option<u32>,
    pub(crate) needs_init: bool,
    pub(crate) needs_config: bool,
    pub(crate) needs_reset: bool,
    pub(crate) faulted: bool,
    /// Declared after `processor` so the processor drops while its type's
    /// extension is still loaded.
    pub(crate) ty: Arc<ProcessorType>,
}

impl ProcessorNode {
    /// Builds a node with zeroed blocks of `block_size` samples.
    ///
    /// Each adjacency list is reserved for `fan` entries so typical connects do
    /// not allocate on the render thread.
    pub(crate) fn new(
        id: ProcessorId,
        ty: Arc<ProcessorType>,
        params: ParamMap,
        processor: Box<dyn Processor>,
        ports: (usize, usize),
        block_size: usize,
        fan: usize,
    ) -> Self {
        let (inlets, outlets) = ports;
        Self {
            id,
            ty,
            params,
            processor,
            inlets: (0..inlets).map(|_| SampleBlock::new(block_size)).collect(),
            outlets: (0..outlets).map(|_| SampleBlock::new(block_size)).collect(),
            inlet_connections: (0..inlets).map(|_| Vec::with_capacity(fan)).collect(),
            outlet_connections: (0..outlets).map(|_| Vec::with_capacity(fan)).collect(),
            depth: None,
            pending_depth: None,
            needs_init: true,
            needs_config: true,
            needs_reset: false,
            faulted: false,
        }
    }

    /// Processor id.
    pub fn id(&self) -> ProcessorId {
        self.id
    }

    /// Processor type.
    pub fn processor_type(&self) -> &Arc<ProcessorType> {
        &self.ty
    }

    /// Current parameters.
    pub fn params(&self) -> &ParamMap {
        &self.params
    }

    /// Number of inlets.
    pub fn inlet_count(&self) -> usize {
        self.inlets.len()
    }

    /// Number of outlets.
    pub fn outlet_count(&self) -> usize {
        self.outlets.len()
    }

    /// Returns true if any inlet has at least one source.
    pub fn has_inputs(&self) -> bool {
        self.inlet_connections.iter().any(|c| !c.is_empty())
    }

    /// Effective generator status for the current topology.
    ///
    /// `Conditional` resolves to `Always` while no inlet is connected.
    pub fn effective_kind(&self) -> GeneratorKind {
        match self.ty.generator() {
            GeneratorKind::Conditional if self.has_inputs() => GeneratorKind::Never,
            GeneratorKind::Conditional => GeneratorKind::Always,
            kind => kind,
        }
    }
}

impl fmt::Debug for ProcessorNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorNode")
            .field("id", &self.id)
            .field("type", &self.ty.name())
            .field("inlets", &self.inlets.len())
            .field("outlets", &self.outlets.len())
            .field("depth", &self.depth)
            .field("faulted", &self.faulted)
            .finish_non_exhaustive()
    }
}
