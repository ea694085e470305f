//! A rendering session: the render-side [`Engine`] and the control-side
//! [`Controller`].
//!
//! [`create_session`] builds both halves around four bounded queues (see
//! [`channel`](crate::channel)). The engine is moved to the audio thread and
//! driven by [`Engine::process_block`]; the controller is `Send + Sync` and may
//! be shared by any number of control threads through `Arc`.
//!
//! # Per-block sequence
//!
//! 1. Apply exactly the requests that were queued when the block started.
//! 2. Reschedule if the topology changed.
//! 3. Copy engine inputs in, zero engine outputs.
//! 4. Run every scheduled processor in depth order.
//! 5. Copy engine outputs out.
//!
//! The render thread never blocks and never frees request payloads: every
//! consumed or replaced heap value goes back over the retire queue and is
//! dropped by the controller. Every controller call drains that queue before
//! staging its request, so it stays short under plain parameter automation.
//! Slot indices come back over their own queue and are reused even when a
//! payload had to be dropped on the render thread.
//!
//! # Example
//!
//! ```rust,ignore
//! let registry = Arc::new(TypeRegistry::new());
//! rivulet_processors::register_builtins(&registry)?;
//! let (mut engine, controller) = create_session(SessionSettings::default(), registry)?;
//!
//! let osc = controller.create("osc~", 0, 0, &[("freq", 220.0.into())])?;
//! let dac = controller.create("dac~", 0, 0, &[])?;
//! controller.connect(osc, 0, dac, 0)?;
//!
//! engine.process_block(&[], &mut [&mut left, &mut right])?;
//! ```

use std::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use parking_lot::Mutex;

use crate::alloc::AsyncAllocator;
use crate::block::SampleBlock;
use crate::channel::{Payload, Request, Response, ResponseKind, ResponseSender, Retired, Retirer};
use crate::error::{ConfigError, EngineError, GraphError, RequestError, SchedulingError};
use crate::graph::{Connection, Graph, ProcessorId, ProcessorNode};
use crate::param::{ParamMap, ParamValue};
use crate::processor::{CreateArgs, ProcessorType, RenderEnv};
use crate::registry::TypeRegistry;
use crate::settings::{SchedulePolicy, SessionSettings};

/// Builds an engine and its controller.
pub fn create_session(
    settings: SessionSettings,
    registry: Arc<TypeRegistry>,
) -> Result<(Engine, Controller), EngineError> {
    settings.validate()?;

    let (request_tx, request_rx) = crossbeam_channel::bounded(settings.request_capacity);
    let (response_tx, response_rx) = crossbeam_channel::bounded(settings.response_capacity);
    let (retire_tx, retire_rx) = crossbeam_channel::bounded(settings.retire_capacity);
    let (freed_tx, freed_rx) = crossbeam_channel::bounded(settings.max_processors);
    let dropped = Arc::new(AtomicU64::new(0));

    let allocator = AsyncAllocator::spawn(settings.alloc_capacity).map_err(EngineError::Spawn)?;

    let engine = Engine {
        graph: Graph::new(settings.max_processors, settings.schedule_policy, Arc::clone(&registry)),
        env: RenderEnv {
            sample_rate: settings.sample_rate,
            block_size: settings.block_size,
            responses: ResponseSender::new(response_tx, Arc::clone(&dropped)),
            allocator,
            inputs: (0..settings.input_channels)
                .map(|_| SampleBlock::new(settings.block_size))
                .collect(),
            outputs: (0..settings.output_channels)
                .map(|_| SampleBlock::new(settings.block_size))
                .collect(),
        },
        requests: request_rx,
        retirer: Retirer::new(retire_tx, freed_tx),
        halted: None,
    };

    let controller = Controller {
        requests: request_tx,
        responses: response_rx,
        retired: retire_rx,
        freed: freed_rx,
        dropped,
        state: Mutex::new(ControlState::new(settings.max_processors)),
        registry,
        settings,
    };

    tracing::info!(
        sample_rate = controller.settings.sample_rate,
        block_size = controller.settings.block_size,
        "session created"
    );
    Ok((engine, controller))
}

// ---------------------------------------------------------------------------
// Render side
// ---------------------------------------------------------------------------

/// Render-thread half of a session.
pub struct Engine {
    graph: Graph,
    env: RenderEnv,
    requests: Receiver<Request>,
    retirer: Retirer,
    /// Set while rendering is halted after a scheduling failure.
    halted: Option<SchedulingError>,
}

impl Engine {
    /// Renders one block.
    ///
    /// `inputs` and `outputs` hold one slice per engine channel. Missing
    /// channels read as silence; extra channels are ignored. Slices shorter than
    /// the block are zero-padded on input and truncated on output.
    ///
    /// Returns [`EngineError::Halted`] when the block was silenced because the
    /// graph could not be scheduled. Rendering resumes on its own once a
    /// topology change makes the graph schedulable again.
    pub fn process_block(&mut self, inputs: &[&[f32]], outputs: &mut [&mut [f32]]) -> Result<(), EngineError> {
        self.drain_requests();
        if self.graph.needs_reschedule {
            self.reschedule();
        }

        for (i, block) in self.env.inputs.iter_mut().enumerate() {
            block.zero();
            if let Some(src) = inputs.get(i) {
                block.copy_from(src);
            }
        }
        for block in &mut self.env.outputs {
            block.zero();
        }

        if self.halted.is_none() {
            self.graph.process(&mut self.env);
        }

        for (dst, block) in outputs.iter_mut().zip(&self.env.outputs) {
            let n = dst.len().min(block.len());
            dst[..n].copy_from_slice(&block[..n]);
            dst[n..].fill(0.0);
        }
        for dst in outputs.iter_mut().skip(self.env.outputs.len()) {
            dst.fill(0.0);
        }

        match self.halted {
            Some(err) => Err(EngineError::Halted(err)),
            None => Ok(()),
        }
    }

    /// The processor graph.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Session sample rate in Hz.
    pub fn sample_rate(&self) -> f32 {
        self.env.sample_rate
    }

    /// Session block size in samples.
    pub fn block_size(&self) -> usize {
        self.env.block_size
    }

    /// Returns true while rendering is halted by a scheduling failure.
    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    fn drain_requests(&mut self) {
        let pending = self.requests.len();
        for _ in 0..pending {
            let Ok(request) = self.requests.try_recv() else {
                break;
            };
            self.apply(request);
        }
    }

    fn apply(&mut self, request: Request) {
        let name = request.name();
        let outcome = match request {
            Request::Create(node) => match self.graph.insert(node) {
                Ok(()) => Ok(()),
                Err((err, node)) => {
                    self.retirer.retire_processor(node);
                    Err((None, err))
                }
            },
            Request::Connect(conn) => self
                .graph
                .connect(conn)
                .map(drop)
                .map_err(|e| (Some(conn.dst.processor), e)),
            Request::Disconnect(conn) => self
                .graph
                .disconnect(conn)
                .map(drop)
                .map_err(|e| (Some(conn.dst.processor), e)),
            Request::Destroy(id) => match self.graph.remove(id) {
                Ok(mut node) => {
                    let mut ctx = self.env.context(id);
                    node.processor.destroy(&mut ctx);
                    self.retirer.retire_processor(node);
                    Ok(())
                }
                Err(err) => Err((Some(id), err)),
            },
            Request::SetParam { id, name, mut value } => {
                let result = match self.graph.node_mut(id) {
                    Some(node) => match node.params.swap(&name, &mut value) {
                        Ok(()) => {
                            node.needs_config = true;
                            Ok(())
                        }
                        Err(err) => Err((Some(id), GraphError::from(err))),
                    },
                    None => Err((Some(id), GraphError::ProcessorNotFound(id))),
                };
                self.retirer.retire(Retired::Text(name));
                self.retirer.retire(Retired::Value(value));
                result
            }
            Request::Reset(id) => match self.graph.node_mut(id) {
                Some(node) => {
                    node.needs_reset = true;
                    if node.faulted {
                        tracing::info!(processor = %id, "restarting faulted processor");
                        node.faulted = false;
                    }
                    Ok(())
                }
                None => Err((Some(id), GraphError::ProcessorNotFound(id))),
            },
            Request::ExtensionLoaded { types } => {
                self.env
                    .report(None, ResponseKind::ExtensionLoaded, Payload::Int(types as i64));
                Ok(())
            }
        };

        if let Err((processor, err)) = outcome {
            tracing::warn!(request = name, error = %err, "request failed");
            self.env.report(
                processor,
                ResponseKind::RequestFailed,
                Payload::Text(Cow::Borrowed(err.summary())),
            );
        }
    }

    fn reschedule(&mut self) {
        match self.graph.schedule() {
            Ok(()) => {
                if self.halted.take().is_some() {
                    tracing::info!("scheduling recovered, rendering resumed");
                }
            }
            Err(err) => {
                self.env.report(
                    None,
                    ResponseKind::SchedulingFailed,
                    Payload::Int(match err {
                        SchedulingError::Cycle { unscheduled } => unscheduled as i64,
                    }),
                );
                match self.graph.policy {
                    SchedulePolicy::Silence => self.halted = Some(err),
                    SchedulePolicy::ReuseLastOrder => self.halted = None,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Control side
// ---------------------------------------------------------------------------

struct ProcessorInfo {
    ty: Arc<ProcessorType>,
    inlets: usize,
    outlets: usize,
}

struct ControlState {
    live: HashMap<ProcessorId, ProcessorInfo>,
    /// Slot indices released by the engine, ready for reuse.
    free: Vec<u32>,
    generations: Vec<u32>,
    next_index: u32,
    capacity: usize,
}

impl ControlState {
    fn new(capacity: usize) -> Self {
        Self {
            live: HashMap::new(),
            free: Vec::new(),
            generations: Vec::new(),
            next_index: 0,
            capacity,
        }
    }

    fn allocate_id(&mut self) -> Result<ProcessorId, RequestError> {
        if let Some(index) = self.free.pop() {
            let generation = &mut self.generations[index as usize];
            *generation = generation.wrapping_add(1);
            return Ok(ProcessorId::new(index, *generation));
        }
        if (self.next_index as usize) < self.capacity {
            let index = self.next_index;
            self.next_index += 1;
            self.generations.push(0);
            return Ok(ProcessorId::new(index, 0));
        }
        Err(RequestError::TooManyProcessors(self.capacity))
    }

    fn info(&self, id: ProcessorId) -> Result<&ProcessorInfo, RequestError> {
        self.live.get(&id).ok_or(RequestError::UnknownProcessor(id))
    }

    /// Takes back every slot the engine has released.
    fn reclaim(&mut self, freed: &Receiver<ProcessorId>) {
        for id in freed.try_iter() {
            // A processor that never made it into the graph is still live here.
            self.live.remove(&id);
            self.free.push(id.index() as u32);
        }
    }
}

/// Control-side half of a session.
///
/// Every method validates synchronously against the controller's own record
/// of live processors, then stages a request for the engine.
pub struct Controller {
    requests: Sender<Request>,
    responses: Receiver<Response>,
    retired: Receiver<Retired>,
    freed: Receiver<ProcessorId>,
    dropped: Arc<AtomicU64>,
    state: Mutex<ControlState>,
    registry: Arc<TypeRegistry>,
    settings: SessionSettings,
}

impl Controller {
    /// Type registry of this session.
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Settings of this session.
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Creates a processor of type `type_name`.
    ///
    /// Port counts of 0 select the type's defaults. `params` overlay the
    /// type's defaults and are visible to the factory and the first `config`.
    pub fn create(
        &self,
        type_name: &str,
        inlets: usize,
        outlets: usize,
        params: &[(&str, ParamValue)],
    ) -> Result<ProcessorId, RequestError> {
        let ty = self
            .registry
            .get(type_name)
            .ok_or_else(|| RequestError::UnknownType(type_name.to_owned()))?;

        let mut map = ParamMap::from_specs(ty.params());
        for (name, value) in params {
            map.set(name, value.clone())?;
        }
        let (default_inlets, default_outlets) = ty.default_ports(&map);
        let inlets = if inlets == 0 { default_inlets } else { inlets };
        let outlets = if outlets == 0 { default_outlets } else { outlets };

        let processor = ty.create(&CreateArgs {
            sample_rate: self.settings.sample_rate,
            block_size: self.settings.block_size,
            inlets,
            outlets,
            params: &map,
        })?;

        let mut state = self.state.lock();
        state.reclaim(&self.freed);
        let id = state.allocate_id()?;
        let node = ProcessorNode::new(
            id,
            Arc::clone(&ty),
            map,
            processor,
            (inlets, outlets),
            self.settings.block_size,
            self.settings.port_fan,
        );
        self.push(Request::Create(Box::new(node)))?;
        state.live.insert(id, ProcessorInfo { ty, inlets, outlets });
        tracing::debug!("control_create: {type_name} {id} ({inlets} in, {outlets} out)");
        Ok(id)
    }

    fn check_connection(state: &ControlState, conn: &Connection) -> Result<(), RequestError> {
        let src = state.info(conn.src.processor)?;
        if conn.src.port >= src.outlets {
            return Err(RequestError::InvalidPort {
                id: conn.src.processor,
                direction: "outlet",
                port: conn.src.port,
            });
        }
        let dst = state.info(conn.dst.processor)?;
        if conn.dst.port >= dst.inlets {
            return Err(RequestError::InvalidPort {
                id: conn.dst.processor,
                direction: "inlet",
                port: conn.dst.port,
            });
        }
        Ok(())
    }

    /// Connects outlet `src_port` of `src` to inlet `dst_port` of `dst`.
    pub fn connect(
        &self,
        src: ProcessorId,
        src_port: usize,
        dst: ProcessorId,
        dst_port: usize,
    ) -> Result<(), RequestError> {
        let conn = Connection::new(src, src_port, dst, dst_port);
        let state = self.state.lock();
        Self::check_connection(&state, &conn)?;
        self.push(Request::Connect(conn))
    }

    /// Removes the edge from outlet `src_port` of `src` to inlet `dst_port` of
    /// `dst`. Removing an absent edge is a no-op.
    pub fn disconnect(
        &self,
        src: ProcessorId,
        src_port: usize,
        dst: ProcessorId,
        dst_port: usize,
    ) -> Result<(), RequestError> {
        let conn = Connection::new(src, src_port, dst, dst_port);
        let state = self.state.lock();
        Self::check_connection(&state, &conn)?;
        self.push(Request::Disconnect(conn))
    }

    /// Stages a parameter value for the processor's next `config`.
    pub fn set_param(&self, id: ProcessorId, name: &str, value: impl Into<ParamValue>) -> Result<(), RequestError> {
        let mut value = value.into();
        let state = self.state.lock();
        let info = state.info(id)?;
        let spec = info
            .ty
            .params()
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| ConfigError::UnknownParam(name.to_owned()))?;
        value
            .coerce(spec.kind)
            .map_err(|found| ConfigError::TypeMismatch {
                name: name.to_owned(),
                expected: spec.kind,
                found,
            })?;
        self.push(Request::SetParam {
            id,
            name: name.to_owned(),
            value,
        })
    }

    /// Removes a processor and all of its edges.
    pub fn destroy(&self, id: ProcessorId) -> Result<(), RequestError> {
        let mut state = self.state.lock();
        state.info(id)?;
        self.push(Request::Destroy(id))?;
        state.live.remove(&id);
        tracing::debug!("control_destroy: {id}");
        Ok(())
    }

    /// Resets a processor on the next block, restarting it if faulted.
    pub fn reset(&self, id: ProcessorId) -> Result<(), RequestError> {
        let state = self.state.lock();
        state.info(id)?;
        self.push(Request::Reset(id))
    }

    /// Registers types that live in an extension and reports them to the
    /// engine as [`ResponseKind::ExtensionLoaded`].
    ///
    /// `owner` is kept alive by every registered type, so whatever backs the
    /// types' factories stays valid while any of them is reachable. Either all
    /// types are added or none. Returns the number added.
    pub fn add_extension_types(
        &self,
        types: Vec<ProcessorType>,
        owner: Arc<dyn Any + Send + Sync>,
    ) -> Result<usize, RequestError> {
        let count = self.registry.register_owned(types, owner)?;
        self.push(Request::ExtensionLoaded { types: count })?;
        Ok(count)
    }

    /// Processors the controller considers live.
    pub fn processors(&self) -> Vec<ProcessorId> {
        let mut ids: Vec<_> = self.state.lock().live.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Waits up to `timeout` for a response, then drains everything queued.
    pub fn fetch_responses(&self, timeout: Duration) -> Vec<Response> {
        self.collect_retired();
        let mut responses = Vec::new();
        match self.responses.recv_timeout(timeout) {
            Ok(first) => {
                responses.push(first);
                responses.extend(self.responses.try_iter());
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {}
        }
        responses
    }

    /// Drops payloads the engine has finished with and reclaims released
    /// slots.
    ///
    /// Returns the number of payloads collected.
    pub fn collect_retired(&self) -> usize {
        // Another control thread may hold the state lock while it waits on a
        // full request queue; `create` reclaims in that case.
        if let Some(mut state) = self.state.try_lock() {
            state.reclaim(&self.freed);
        }
        self.drain_retired()
    }

    fn drain_retired(&self) -> usize {
        self.retired.try_iter().map(drop).count()
    }

    /// Responses dropped because the response queue was full.
    pub fn dropped_responses(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Queues a request, retrying while the queue is full. Never drops.
    ///
    /// Drains the retire queue first. Callers may hold the state lock.
    fn push(&self, mut request: Request) -> Result<(), RequestError> {
        self.drain_retired();
        let mut attempt: u32 = 0;
        loop {
            match self.requests.send_timeout(request, self.settings.request_backoff) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(returned)) => {
                    attempt += 1;
                    tracing::warn!(request = returned.name(), attempt, "request queue full, retrying");
                    request = returned;
                }
                Err(SendTimeoutError::Disconnected(_)) => return Err(RequestError::EngineGone),
            }
        }
    }
}
