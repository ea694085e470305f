//! Processor graph: topology mutation and per-block execution.
//!
//! [`Graph`] lives on the render thread. Its mutation methods are called only
//! while the engine drains the request queue, which happens once per block
//! before any processor runs, so processors never observe a half-applied
//! change. Every topology change marks the graph for rescheduling; depths are
//! re-derived lazily right before the next block executes.
//!
//! Storage is a fixed array of slots indexed by [`ProcessorId::index`], sized to
//! the session's processor limit at construction. Placing, connecting and
//! removing processors therefore never grows the slot array.

use std::borrow::Cow;
use std::sync::Arc;

use crate::channel::{Payload, ResponseKind};
use crate::error::{GraphError, ProcessorError};
use crate::processor::{Io, ProcessContext, RenderEnv};
use crate::registry::TypeRegistry;
use crate::settings::SchedulePolicy;

use super::edge::{Connection, Endpoint};
use super::node::{ProcessorId, ProcessorNode};

/// The set of processors and their connections.
pub struct Graph {
    pub(crate) nodes: Vec<Option<Box<ProcessorNode>>>,
    /// Execution order: ascending depth once scheduled.
    pub(crate) order: Vec<ProcessorId>,
    pub(crate) needs_reschedule: bool,
    pub(crate) policy: SchedulePolicy,
    registry: Arc<TypeRegistry>,
}

impl Graph {
    /// Creates an empty graph with room for `capacity` processors.
    pub(crate) fn new(capacity: usize, policy: SchedulePolicy, registry: Arc<TypeRegistry>) -> Self {
        Self {
            nodes: std::iter::repeat_with(|| None).take(capacity).collect(),
            order: Vec::with_capacity(capacity),
            needs_reschedule: false,
            policy,
            registry,
        }
    }

    // --- Queries ---

    /// Type registry this graph instantiates from.
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Number of live processors.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if the graph holds no processors.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Maximum number of live processors.
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if `id` names a live processor.
    pub fn contains(&self, id: ProcessorId) -> bool {
        self.node(id).is_some()
    }

    /// Live processor `id`.
    pub fn node(&self, id: ProcessorId) -> Option<&ProcessorNode> {
        self.nodes
            .get(id.index())?
            .as_deref()
            .filter(|n| n.id == id)
    }

    pub(crate) fn node_mut(&mut self, id: ProcessorId) -> Option<&mut ProcessorNode> {
        self.nodes
            .get_mut(id.index())?
            .as_deref_mut()
            .filter(|n| n.id == id)
    }

    /// Committed depth of `id`, `None` if unscheduled or unknown.
    pub fn depth(&self, id: ProcessorId) -> Option<u32> {
        self.node(id)?.depth
    }

    /// Processors in execution order.
    pub fn order(&self) -> &[ProcessorId] {
        &self.order
    }

    /// Sources feeding inlet `port` of `id`.
    pub fn inlet_connections(&self, id: ProcessorId, port: usize) -> Option<&[Endpoint]> {
        self.node(id)?.inlet_connections.get(port).map(Vec::as_slice)
    }

    /// Destinations fed by outlet `port` of `id`.
    pub fn outlet_connections(&self, id: ProcessorId, port: usize) -> Option<&[Endpoint]> {
        self.node(id)?.outlet_connections.get(port).map(Vec::as_slice)
    }

    /// Last block rendered by outlet `port` of `id`.
    pub fn outlet(&self, id: ProcessorId, port: usize) -> Option<&[f32]> {
        self.node(id)?.outlets.get(port).map(|b| b.as_slice())
    }

    /// Returns true if `id` is isolated after a hook failure.
    pub fn is_faulted(&self, id: ProcessorId) -> bool {
        self.node(id).is_some_and(|n| n.faulted)
    }

    /// Returns true if a topology change is waiting to be scheduled.
    pub fn needs_reschedule(&self) -> bool {
        self.needs_reschedule
    }

    // --- Mutations ---

    /// Places a processor in its slot.
    ///
    /// On failure the node is handed back so the caller can retire it.
    pub(crate) fn insert(&mut self, node: Box<ProcessorNode>) -> Result<(), (GraphError, Box<ProcessorNode>)> {
        let id = node.id;
        let Some(slot) = self.nodes.get_mut(id.index()) else {
            return Err((GraphError::SlotUnavailable(id), node));
        };
        if slot.is_some() {
            return Err((GraphError::SlotUnavailable(id), node));
        }
        *slot = Some(node);
        self.order.push(id);
        self.needs_reschedule = true;
        tracing::debug!("graph_add: processor {id}");
        Ok(())
    }

    /// Removes a processor and every edge touching it.
    pub(crate) fn remove(&mut self, id: ProcessorId) -> Result<Box<ProcessorNode>, GraphError> {
        if !self.contains(id) {
            return Err(GraphError::ProcessorNotFound(id));
        }
        let Some(mut node) = self.nodes[id.index()].take() else {
            return Err(GraphError::ProcessorNotFound(id));
        };

        for (inlet, sources) in node.inlet_connections.iter_mut().enumerate() {
            let this = Endpoint::new(id, inlet);
            for src in sources.drain(..) {
                if let Some(peer) = self.node_mut(src.processor) {
                    peer.outlet_connections[src.port].retain(|e| *e != this);
                }
            }
        }
        for (outlet, dests) in node.outlet_connections.iter_mut().enumerate() {
            let this = Endpoint::new(id, outlet);
            for dst in dests.drain(..) {
                if let Some(peer) = self.node_mut(dst.processor) {
                    peer.inlet_connections[dst.port].retain(|e| *e != this);
                }
            }
        }

        self.order.retain(|p| *p != id);
        self.needs_reschedule = true;
        tracing::debug!("graph_remove: processor {id}");
        Ok(node)
    }

    fn check_ports(&self, conn: &Connection) -> Result<(), GraphError> {
        let src = self
            .node(conn.src.processor)
            .ok_or(GraphError::ProcessorNotFound(conn.src.processor))?;
        if conn.src.port >= src.outlets.len() {
            return Err(GraphError::InvalidOutlet {
                id: conn.src.processor,
                port: conn.src.port,
            });
        }
        let dst = self
            .node(conn.dst.processor)
            .ok_or(GraphError::ProcessorNotFound(conn.dst.processor))?;
        if conn.dst.port >= dst.inlets.len() {
            return Err(GraphError::InvalidInlet {
                id: conn.dst.processor,
                port: conn.dst.port,
            });
        }
        Ok(())
    }

    /// Adds an edge to both endpoints. Returns `false` if it already existed.
    pub(crate) fn connect(&mut self, conn: Connection) -> Result<bool, GraphError> {
        self.check_ports(&conn)?;
        let Some(dst) = self.node_mut(conn.dst.processor) else {
            return Err(GraphError::ProcessorNotFound(conn.dst.processor));
        };
        let sources = &mut dst.inlet_connections[conn.dst.port];
        if sources.contains(&conn.src) {
            return Ok(false);
        }
        sources.push(conn.src);
        if let Some(src) = self.node_mut(conn.src.processor) {
            src.outlet_connections[conn.src.port].push(conn.dst);
        }
        self.needs_reschedule = true;
        tracing::debug!("graph_connect: {conn}");
        Ok(true)
    }

    /// Removes an edge from both endpoints. Returns `false` if it was absent.
    pub(crate) fn disconnect(&mut self, conn: Connection) -> Result<bool, GraphError> {
        self.check_ports(&conn)?;
        let Some(dst) = self.node_mut(conn.dst.processor) else {
            return Err(GraphError::ProcessorNotFound(conn.dst.processor));
        };
        let sources = &mut dst.inlet_connections[conn.dst.port];
        let Some(pos) = sources.iter().position(|e| *e == conn.src) else {
            return Ok(false);
        };
        sources.remove(pos);
        if let Some(src) = self.node_mut(conn.src.processor) {
            src.outlet_connections[conn.src.port].retain(|e| *e != conn.dst);
        }
        self.needs_reschedule = true;
        tracing::debug!("graph_disconnect: {conn}");
        Ok(true)
    }

    // --- Execution ---

    /// Runs every scheduled processor once, in order.
    pub(crate) fn process(&mut self, env: &mut RenderEnv) {
        for k in 0..self.order.len() {
            let index = self.order[k].index();
            let Some(mut node) = self.nodes[index].take() else {
                continue;
            };
            if node.depth.is_some() {
                run_node(&mut node, &self.nodes, env);
            }
            self.nodes[index] = Some(node);
        }
    }
}

/// Hook sequence for one processor. `node` is temporarily out of `others`.
fn run_node(node: &mut ProcessorNode, others: &[Option<Box<ProcessorNode>>], env: &mut RenderEnv) {
    let mut ctx = env.context(node.id);

    if node.needs_init {
        node.needs_init = false;
        if let Err(err) = node.processor.init(&mut ctx) {
            fault(node, &ctx, err);
        }
    }

    if node.faulted {
        for outlet in &mut node.outlets {
            outlet.zero();
        }
        return;
    }

    if node.needs_config && node.processor.preconfig(&node.params, &mut ctx) {
        match node.processor.config(&node.params, &mut ctx) {
            Ok(()) => node.params.clear_changed(),
            Err(err) => {
                // Changed markers stay set so a staged bang survives until the
                // next successful config.
                tracing::warn!(processor = %node.id, error = %err, "config rejected");
                ctx.emit(ResponseKind::ConfigError, Payload::Text(Cow::Borrowed(err.summary())));
            }
        }
        node.needs_config = ctx.take_reconfig();
    }

    if node.needs_reset {
        node.processor.reset(&mut ctx);
        node.needs_reset = false;
    }

    let this = node.id;
    for (inlet, sources) in node.inlets.iter_mut().zip(&node.inlet_connections) {
        inlet.zero();
        for src in sources {
            if src.processor == this {
                inlet.accumulate(&node.outlets[src.port]);
            } else if let Some(peer) = others[src.processor.index()].as_deref() {
                inlet.accumulate(&peer.outlets[src.port]);
            }
        }
    }

    let mut io = Io::new(&node.inlets, &mut node.outlets, &node.inlet_connections);
    if let Err(err) = node.processor.process(&mut io, &mut ctx) {
        fault(node, &ctx, err);
        for outlet in &mut node.outlets {
            outlet.zero();
        }
    }
    if ctx.take_reconfig() {
        node.needs_config = true;
    }
}

fn fault(node: &mut ProcessorNode, ctx: &ProcessContext<'_>, err: ProcessorError) {
    tracing::error!(processor = %node.id, error = %err, "processor fault, isolating");
    node.faulted = true;
    ctx.emit(ResponseKind::ProcessorFault, Payload::Text(err.into_message()));
}
