//! Fixed per-session settings.

use std::time::Duration;

use crate::error::EngineError;

/// What the engine does when scheduling fails on a feedback cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulePolicy {
    /// Skip every processor and output silence until the topology changes.
    #[default]
    Silence,
    /// Keep running the last good order. Processors created since stay
    /// unscheduled and are skipped.
    ReuseLastOrder,
}

/// Settings fixed for the lifetime of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    /// Sample rate in Hz.
    pub sample_rate: f32,
    /// Samples per block.
    pub block_size: usize,
    /// Engine input channels.
    pub input_channels: usize,
    /// Engine output channels.
    pub output_channels: usize,
    /// Request queue capacity.
    pub request_capacity: usize,
    /// Response queue capacity.
    pub response_capacity: usize,
    /// Retire queue capacity.
    pub retire_capacity: usize,
    /// Allocator job queue capacity.
    pub alloc_capacity: usize,
    /// How long a producer waits on a full request queue before retrying.
    pub request_backoff: Duration,
    /// Maximum number of live processors.
    pub max_processors: usize,
    /// Connections reserved per port at creation.
    pub port_fan: usize,
    /// Behaviour on scheduling failure.
    pub schedule_policy: SchedulePolicy,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            block_size: 64,
            input_channels: 2,
            output_channels: 2,
            request_capacity: 1024,
            response_capacity: 1024,
            retire_capacity: 1024,
            alloc_capacity: 16,
            request_backoff: Duration::from_millis(1),
            max_processors: 1024,
            port_fan: 8,
            schedule_policy: SchedulePolicy::Silence,
        }
    }
}

impl SessionSettings {
    /// Rejects settings a session cannot run with.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(EngineError::InvalidSettings("sample rate must be positive"));
        }
        if self.block_size == 0 {
            return Err(EngineError::InvalidSettings("block size must be non-zero"));
        }
        if self.request_capacity == 0
            || self.response_capacity == 0
            || self.retire_capacity == 0
            || self.alloc_capacity == 0
        {
            return Err(EngineError::InvalidSettings("queue capacities must be non-zero"));
        }
        if self.max_processors == 0 || self.max_processors > u32::MAX as usize {
            return Err(EngineError::InvalidSettings("max processors out of range"));
        }
        if self.request_backoff.is_zero() {
            return Err(EngineError::InvalidSettings("request backoff must be non-zero"));
        }
        Ok(())
    }
}
