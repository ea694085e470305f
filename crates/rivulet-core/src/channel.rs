//! Cross-thread messages between the control side and the render thread.
//!
//! Four bounded queues connect a session's two halves:
//!
//! - **requests** (control → render): topology and parameter changes. The
//!   producer backs off and retries on a full queue; requests are never dropped.
//! - **responses** (render → control): telemetry and diagnostics. The render
//!   thread never blocks, so a full queue drops the response and counts it.
//! - **retired** (render → control): heap payloads the render thread is done
//!   with (removed processors, replaced parameter values, request strings). The
//!   control side drops them, keeping frees off the render thread. A full queue
//!   makes the render thread drop the payload itself.
//! - **freed** (render → control): ids of processors that left the graph, so
//!   their slot indices can be reused. Sized to the processor limit, so it can
//!   never be full; slot recycling does not depend on retire traffic.
//!
//! Each queue is FIFO. Nothing is ordered across queues.

use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Sender, TrySendError};

use crate::graph::{Connection, ProcessorId, ProcessorNode};
use crate::param::ParamValue;

/// A staged change for the render thread to apply during its drain.
pub enum Request {
    /// Place a fully built processor in the graph.
    Create(Box<ProcessorNode>),
    /// Add an edge.
    Connect(Connection),
    /// Remove an edge.
    Disconnect(Connection),
    /// Remove a processor and all its edges.
    Destroy(ProcessorId),
    /// Store a parameter value for the next `config`.
    SetParam {
        /// Target processor.
        id: ProcessorId,
        /// Parameter name.
        name: String,
        /// New value.
        value: ParamValue,
    },
    /// Run `reset` on the next block and clear any fault.
    Reset(ProcessorId),
    /// Report that an extension added types to the registry.
    ExtensionLoaded {
        /// Number of types it registered.
        types: usize,
    },
}

impl Request {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Request::Create(_) => "create",
            Request::Connect(_) => "connect",
            Request::Disconnect(_) => "disconnect",
            Request::Destroy(_) => "destroy",
            Request::SetParam { .. } => "set_param",
            Request::Reset(_) => "reset",
            Request::ExtensionLoaded { .. } => "extension_loaded",
        }
    }
}

/// What a response reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ResponseKind {
    /// A buffer player was triggered. Payload: sample offset within the block.
    Triggered = 1,
    /// A looping player wrapped to region start.
    LoopStarted = 2,
    /// A loop-set recording fixed the region end. Payload: end frame.
    RegionSet = 3,
    /// A pending buffer was swapped in. Payload: new frame count.
    BufferResized = 4,
    /// `config` rejected a parameter. Payload: message.
    ConfigError = 5,
    /// A request failed on the render side. Payload: message.
    RequestFailed = 6,
    /// A processor hook failed; the processor is isolated. Payload: message.
    ProcessorFault = 7,
    /// Scheduling hit a feedback cycle. Payload: unscheduled count.
    SchedulingFailed = 8,
    /// An extension library was attached. Payload: type count.
    ExtensionLoaded = 9,
}

impl ResponseKind {
    /// Numeric code.
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Inverse of [`code`](Self::code).
    pub const fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            1 => ResponseKind::Triggered,
            2 => ResponseKind::LoopStarted,
            3 => ResponseKind::RegionSet,
            4 => ResponseKind::BufferResized,
            5 => ResponseKind::ConfigError,
            6 => ResponseKind::RequestFailed,
            7 => ResponseKind::ProcessorFault,
            8 => ResponseKind::SchedulingFailed,
            9 => ResponseKind::ExtensionLoaded,
            _ => return None,
        })
    }
}

/// Response payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Float value.
    Float(f64),
    /// Integer value.
    Int(i64),
    /// Boolean value.
    Bool(bool),
    /// Text, borrowed when static.
    Text(Cow<'static, str>),
}

impl Payload {
    /// Integer value, if this is an `Int`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Payload::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Text value, if this is a `Text`.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(t) => Some(t),
            _ => None,
        }
    }
}

/// A message from the render thread.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Originating processor. `None` for engine diagnostics.
    pub processor: Option<ProcessorId>,
    /// What is being reported.
    pub kind: ResponseKind,
    /// Value.
    pub payload: Payload,
}

/// A payload handed back for the control side to drop.
#[derive(Debug)]
pub enum Retired {
    /// A destroyed processor, or one that could not be placed.
    Processor(Box<ProcessorNode>),
    /// A replaced or rejected parameter value.
    Value(ParamValue),
    /// A consumed request string.
    Text(String),
}

/// Render-side end of the response queue.
pub(crate) struct ResponseSender {
    tx: Sender<Response>,
    dropped: Arc<AtomicU64>,
}

impl ResponseSender {
    pub(crate) fn new(tx: Sender<Response>, dropped: Arc<AtomicU64>) -> Self {
        Self { tx, dropped }
    }

    /// Queues a response without blocking. Returns `false` if it was dropped.
    pub(crate) fn send(&self, response: Response) -> bool {
        match self.tx.try_send(response) {
            Ok(()) => true,
            Err(TrySendError::Full(response)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(kind = ?response.kind, dropped = total, "response queue full, dropping response");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Render-side end of the retire and freed queues.
pub(crate) struct Retirer {
    tx: Sender<Retired>,
    freed: Sender<ProcessorId>,
}

impl Retirer {
    pub(crate) fn new(tx: Sender<Retired>, freed: Sender<ProcessorId>) -> Self {
        Self { tx, freed }
    }

    /// Retires a processor that left the graph and releases its slot index.
    pub(crate) fn retire_processor(&self, node: Box<ProcessorNode>) {
        let id = node.id();
        self.retire(Retired::Processor(node));
        if let Err(TrySendError::Full(id)) = self.freed.try_send(id) {
            // Unreachable while each index is in flight at most once.
            tracing::error!(processor = %id, "freed queue full, slot index lost");
        }
    }

    /// Hands `item` to the control side. Drops it in place if the queue is full.
    pub(crate) fn retire(&self, item: Retired) {
        match self.tx.try_send(item) {
            Ok(()) => {}
            Err(TrySendError::Full(item)) => {
                tracing::warn!("retire queue full, dropping payload on render thread");
                drop(item);
            }
            Err(TrySendError::Disconnected(item)) => drop(item),
        }
    }
}
