//! Error types for the rendering core.
//!
//! One enum per concern. Render-side errors never unwind: they are logged and
//! reported through the response channel; control-side errors are returned
//! synchronously from [`Controller`](crate::Controller) methods.

use std::borrow::Cow;

use thiserror::Error;

use crate::graph::ProcessorId;
use crate::param::ParamType;

/// A parameter could not be applied.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// The processor type does not declare this parameter.
    #[error("unknown parameter '{0}'")]
    UnknownParam(String),

    /// The value's type does not match the declared parameter type.
    #[error("parameter '{name}' expects {expected}, got {found}")]
    TypeMismatch {
        /// Parameter name.
        name: String,
        /// Declared type.
        expected: ParamType,
        /// Type of the supplied value.
        found: ParamType,
    },

    /// A numeric value lies outside the accepted range.
    #[error("parameter '{name}' value {value} out of range [{min}, {max}]")]
    OutOfRange {
        /// Parameter name.
        name: &'static str,
        /// Rejected value.
        value: f64,
        /// Lower bound (inclusive).
        min: f64,
        /// Upper bound (inclusive).
        max: f64,
    },

    /// The value has the right type but is not acceptable.
    #[error("parameter '{name}': {reason}")]
    InvalidValue {
        /// Parameter name.
        name: &'static str,
        /// Why the value was rejected.
        reason: &'static str,
    },
}

impl ConfigError {
    /// Create an out-of-range error.
    pub fn out_of_range(name: &'static str, value: f64, min: f64, max: f64) -> Self {
        ConfigError::OutOfRange {
            name,
            value,
            min,
            max,
        }
    }

    /// Create an invalid-value error.
    pub fn invalid(name: &'static str, reason: &'static str) -> Self {
        ConfigError::InvalidValue { name, reason }
    }

    /// Static message for response payloads. Does not allocate.
    pub fn summary(&self) -> &'static str {
        match self {
            ConfigError::UnknownParam(_) => "unknown parameter",
            ConfigError::TypeMismatch { .. } => "parameter type mismatch",
            ConfigError::OutOfRange { .. } => "parameter out of range",
            ConfigError::InvalidValue { reason, .. } => reason,
        }
    }
}

/// A processor hook failed. The processor is isolated until reset.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// The processor hit an unrecoverable condition.
    #[error("processor fault: {0}")]
    Fault(Cow<'static, str>),

    /// Creation-time parameters were rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ProcessorError {
    /// Create a fault from a static message.
    pub fn fault(message: &'static str) -> Self {
        ProcessorError::Fault(Cow::Borrowed(message))
    }

    /// Message for response payloads, moved out without formatting.
    pub fn into_message(self) -> Cow<'static, str> {
        match self {
            ProcessorError::Fault(message) => message,
            ProcessorError::Config(err) => Cow::Borrowed(err.summary()),
        }
    }
}

/// The scheduler could not order the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SchedulingError {
    /// A feedback cycle without a generator in it.
    #[error("feedback cycle: {unscheduled} processor(s) could not be scheduled")]
    Cycle {
        /// Processors left without a depth when relaxation stalled.
        unscheduled: usize,
    },
}

/// An asynchronous allocation did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
    /// The slot already has a job in flight or a result waiting.
    #[error("allocation slot busy")]
    Busy,

    /// The job queue is full.
    #[error("allocation queue full")]
    QueueFull,

    /// The allocator worker has shut down.
    #[error("allocator shut down")]
    Shutdown,

    /// The allocation task itself failed.
    #[error("allocation failed: {0}")]
    Failed(String),
}

/// A processor type could not be registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A type with this name is already registered.
    #[error("processor type '{0}' already registered")]
    Duplicate(String),
}

/// A topology request could not be applied to the graph.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    /// No live processor has this id.
    #[error("processor {0} not found")]
    ProcessorNotFound(ProcessorId),

    /// The outlet index is out of range.
    #[error("processor {id} has no outlet {port}")]
    InvalidOutlet {
        /// Processor id.
        id: ProcessorId,
        /// Requested outlet.
        port: usize,
    },

    /// The inlet index is out of range.
    #[error("processor {id} has no inlet {port}")]
    InvalidInlet {
        /// Processor id.
        id: ProcessorId,
        /// Requested inlet.
        port: usize,
    },

    /// The storage slot for this id is out of range or occupied.
    #[error("no free slot for processor {0}")]
    SlotUnavailable(ProcessorId),

    /// A parameter update was rejected.
    #[error(transparent)]
    Param(#[from] ConfigError),
}

impl GraphError {
    /// Static message for response payloads. Does not allocate.
    pub fn summary(&self) -> &'static str {
        match self {
            GraphError::ProcessorNotFound(_) => "processor not found",
            GraphError::InvalidOutlet { .. } => "invalid outlet",
            GraphError::InvalidInlet { .. } => "invalid inlet",
            GraphError::SlotUnavailable(_) => "processor slot unavailable",
            GraphError::Param(err) => err.summary(),
        }
    }
}

/// A control-side request was rejected before reaching the render thread.
#[derive(Debug, Error)]
pub enum RequestError {
    /// No processor type with this name is registered.
    #[error("unknown processor type '{0}'")]
    UnknownType(String),

    /// No live processor has this id.
    #[error("unknown processor {0}")]
    UnknownProcessor(ProcessorId),

    /// A port index is out of range.
    #[error("invalid {direction} {port} on processor {id}")]
    InvalidPort {
        /// Processor id.
        id: ProcessorId,
        /// `"inlet"` or `"outlet"`.
        direction: &'static str,
        /// Requested port.
        port: usize,
    },

    /// A parameter name or value was rejected.
    #[error(transparent)]
    InvalidParam(#[from] ConfigError),

    /// The processor factory failed.
    #[error("failed to create processor: {0}")]
    Create(#[from] ProcessorError),

    /// Every processor slot is in use.
    #[error("processor limit of {0} reached")]
    TooManyProcessors(usize),

    /// The engine side of the session has been dropped.
    #[error("engine is gone")]
    EngineGone,

    /// Types could not be added to the registry.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// A session could not be created or stopped rendering.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Session settings failed validation.
    #[error("invalid session settings: {0}")]
    InvalidSettings(&'static str),

    /// The allocator worker thread could not be started.
    #[error("failed to spawn allocator worker: {0}")]
    Spawn(#[source] std::io::Error),

    /// Rendering is halted after a scheduling failure; the block was silent.
    #[error("rendering halted: {0}")]
    Halted(#[from] SchedulingError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn config_error_messages() {
        let err = ConfigError::out_of_range("frames", -1.0, 1.0, 1e9);
        assert!(err.to_string().contains("frames"));
        let err = ConfigError::TypeMismatch {
            name: "mode".into(),
            expected: ParamType::Text,
            found: ParamType::Float,
        };
        assert_eq!(err.to_string(), "parameter 'mode' expects text, got float");
    }

    #[test]
    fn processor_error_wraps_config() {
        let err: ProcessorError = ConfigError::invalid("mode", "unknown mode").into();
        assert!(matches!(err, ProcessorError::Config(_)));
        assert_eq!(err.to_string(), "parameter 'mode': unknown mode");
    }

    #[test]
    fn summaries_are_static() {
        assert_eq!(ConfigError::UnknownParam("gain".into()).summary(), "unknown parameter");
        assert_eq!(ConfigError::invalid("mode", "unknown mode").summary(), "unknown mode");
        let err = GraphError::from(ConfigError::out_of_range("frames", -1.0, 1.0, 1e9));
        assert_eq!(err.summary(), "parameter out of range");
        assert!(matches!(
            ProcessorError::fault("denormal storm").into_message(),
            Cow::Borrowed("denormal storm")
        ));
        assert!(matches!(
            ProcessorError::from(ConfigError::invalid("mode", "unknown mode")).into_message(),
            Cow::Borrowed("unknown mode")
        ));
    }

    #[test]
    fn halted_carries_scheduling_source() {
        let err = EngineError::from(SchedulingError::Cycle { unscheduled: 2 });
        assert!(err.source().is_some());
        assert!(err.to_string().contains("2 processor(s)"));
    }
}
