//! Off-thread allocation for processors.
//!
//! Processors that need large storage at runtime (a resized sample buffer, a new
//! table) cannot allocate on the render thread. Instead they own an
//! [`AllocSlot`] and submit a request to the session's [`AsyncAllocator`]; one
//! background worker builds the value and publishes it. The processor polls the
//! slot from `preconfig`/`config` and takes the value once it is ready.
//!
//! ```text
//!            submit              worker done             take / swap
//!   Idle ─────────────▶ Working ─────────────▶ Ready ─────────────▶ Idle
//!                          │ failure
//!                          └──────────────────────────────────────▶ Idle
//! ```
//!
//! Nothing here blocks the render thread: submission uses `try_send`, slot
//! results are read with `try_lock`, and values the processor swaps out are
//! handed back to the worker to drop.
//!
//! In-flight jobs are not interrupted. Dropping or cancelling a slot makes the
//! worker discard the result when it finishes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;

use crate::error::AllocError;

/// A value that can be built by the allocator worker.
pub trait Allocate: Send + Sized + 'static {
    /// Description of what to build. Should be cheap to move.
    type Request: Send + 'static;

    /// Builds the value. Runs on the worker thread.
    fn allocate(request: Self::Request) -> Result<Self, AllocError>;
}

/// Progress of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SlotStatus {
    /// No job in flight and no result waiting.
    Idle = 0,
    /// A job is queued or running.
    Working = 1,
    /// A result is waiting to be taken.
    Ready = 2,
}

impl SlotStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => SlotStatus::Working,
            2 => SlotStatus::Ready,
            _ => SlotStatus::Idle,
        }
    }
}

trait Job: Send + Sync {
    fn run(&self);
}

struct SlotShared<T: Allocate> {
    status: AtomicU8,
    cancelled: AtomicBool,
    request: Mutex<Option<T::Request>>,
    result: Mutex<Option<T>>,
    failure: Mutex<Option<AllocError>>,
    garbage: Mutex<Option<T>>,
}

impl<T: Allocate> SlotShared<T> {
    fn set_status(&self, status: SlotStatus) {
        self.status.store(status as u8, Ordering::Release);
    }
}

impl<T: Allocate> Job for SlotShared<T> {
    fn run(&self) {
        drop(self.garbage.lock().take());

        let Some(request) = self.request.lock().take() else {
            return;
        };
        match T::allocate(request) {
            Ok(value) => {
                if self.cancelled.load(Ordering::Acquire) {
                    tracing::debug!("alloc_discard: slot cancelled");
                    drop(value);
                    self.set_status(SlotStatus::Idle);
                    return;
                }
                *self.result.lock() = Some(value);
                self.set_status(SlotStatus::Ready);
            }
            Err(err) => {
                tracing::warn!(error = %err, "allocation job failed");
                *self.failure.lock() = Some(err);
                self.set_status(SlotStatus::Idle);
            }
        }
    }
}

/// A processor's handle to one outstanding allocation.
pub struct AllocSlot<T: Allocate> {
    shared: Arc<SlotShared<T>>,
}

impl<T: Allocate> AllocSlot<T> {
    /// Creates an idle slot.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(SlotShared {
                status: AtomicU8::new(SlotStatus::Idle as u8),
                cancelled: AtomicBool::new(false),
                request: Mutex::new(None),
                result: Mutex::new(None),
                failure: Mutex::new(None),
                garbage: Mutex::new(None),
            }),
        }
    }

    /// Current status.
    pub fn status(&self) -> SlotStatus {
        SlotStatus::from_u8(self.shared.status.load(Ordering::Acquire))
    }

    /// Returns true while a job is in flight or a result is waiting.
    pub fn is_pending(&self) -> bool {
        self.status() != SlotStatus::Idle
    }

    /// Takes a ready result, returning the slot to `Idle`.
    ///
    /// Returns `None` if nothing is ready or the worker is mid-publish.
    pub fn take_ready(&self) -> Option<T> {
        if self.status() != SlotStatus::Ready {
            return None;
        }
        let value = self.shared.result.try_lock()?.take();
        if value.is_some() {
            self.shared.set_status(SlotStatus::Idle);
        }
        value
    }

    /// Replaces `current` with a ready result.
    ///
    /// The previous value is handed to the worker to drop. Returns `true` if a
    /// swap happened.
    pub fn swap_ready(&self, current: &mut T, allocator: &AsyncAllocator) -> bool {
        let Some(fresh) = self.take_ready() else {
            return false;
        };
        let old = core::mem::replace(current, fresh);
        match self.shared.garbage.try_lock() {
            Some(mut garbage) => {
                // A previous leftover is dropped by this assignment; that only
                // happens if the worker queue was full last time.
                *garbage = Some(old);
            }
            None => {
                tracing::warn!("alloc_swap: garbage slot busy, dropping on render thread");
                drop(old);
                return true;
            }
        }
        let job: Arc<dyn Job> = self.shared.clone();
        allocator.dispatch(job);
        true
    }

    /// Takes the last failure, if any.
    pub fn take_failure(&self) -> Option<AllocError> {
        self.shared.failure.try_lock()?.take()
    }

    /// Makes the worker discard any result still in flight.
    pub fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::Release);
    }

    /// Returns true once cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::Acquire)
    }
}

impl<T: Allocate> Default for AllocSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Allocate> Drop for AllocSlot<T> {
    fn drop(&mut self) {
        self.cancel();
    }
}

type JobHandle = Arc<dyn Job>;

/// Background allocation worker of a session.
pub struct AsyncAllocator {
    tx: Option<Sender<JobHandle>>,
    worker: Option<JoinHandle<()>>,
}

impl AsyncAllocator {
    /// Spawns the worker with a job queue of `capacity` entries.
    pub fn spawn(capacity: usize) -> std::io::Result<Self> {
        let (tx, rx) = crossbeam_channel::bounded::<JobHandle>(capacity);
        let worker = thread::Builder::new()
            .name("rivulet-alloc".into())
            .spawn(move || worker_loop(&rx))?;
        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
        })
    }

    /// Queues an allocation for `slot`. Never blocks.
    ///
    /// Fails with [`AllocError::Busy`] unless the slot is `Idle`, and with
    /// [`AllocError::QueueFull`] if the job queue has no room (the slot stays
    /// `Idle`, so the caller can retry on a later block).
    pub fn submit<T: Allocate>(&self, slot: &AllocSlot<T>, request: T::Request) -> Result<(), AllocError> {
        let Some(tx) = &self.tx else {
            return Err(AllocError::Shutdown);
        };
        let shared = &slot.shared;
        if shared
            .status
            .compare_exchange(
                SlotStatus::Idle as u8,
                SlotStatus::Working as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Err(AllocError::Busy);
        }
        match shared.request.try_lock() {
            Some(mut pending) => *pending = Some(request),
            None => {
                shared.set_status(SlotStatus::Idle);
                return Err(AllocError::Busy);
            }
        }

        let job: JobHandle = shared.clone();
        match tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(err) => {
                if let Some(mut pending) = shared.request.try_lock() {
                    pending.take();
                }
                shared.set_status(SlotStatus::Idle);
                match err {
                    TrySendError::Full(_) => Err(AllocError::QueueFull),
                    TrySendError::Disconnected(_) => Err(AllocError::Shutdown),
                }
            }
        }
    }

    fn dispatch(&self, job: JobHandle) {
        if let Some(tx) = &self.tx
            && tx.try_send(job).is_err()
        {
            tracing::debug!("alloc_dispatch: queue full, leftover dropped with the slot");
        }
    }
}

impl Drop for AsyncAllocator {
    fn drop(&mut self) {
        drop(self.tx.take());
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            tracing::error!("allocator worker panicked");
        }
    }
}

fn worker_loop(rx: &Receiver<JobHandle>) {
    tracing::debug!("alloc_worker: started");
    for job in rx {
        job.run();
    }
    tracing::debug!("alloc_worker: stopped");
}
