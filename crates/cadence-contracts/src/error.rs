//! Runtime error types for the Cadence orchestration core.
//!
//! All fallible operations return `CadenceResult<T>`. The buses never hand
//! one of these to their callers directly: they fold it into a
//! `success: false` result and surface the message through `error`.

use thiserror::Error;

/// The unified error type for the Cadence crates.
#[derive(Debug, Clone, Error)]
pub enum CadenceError {
    /// No handler is registered for the requested command or query type.
    #[error("no handler registered for {kind} type '{type_name}'")]
    NoHandler { kind: &'static str, type_name: String },

    /// A second handler was registered for a type that already has one.
    #[error("a handler for {kind} type '{type_name}' is already registered")]
    DuplicateHandler { kind: &'static str, type_name: String },

    /// A registered handler reported a failure.
    #[error("handler failed: {reason}")]
    HandlerFailed { reason: String },

    /// A middleware in the bus pipeline rejected or failed the request.
    #[error("middleware '{middleware}' failed: {reason}")]
    MiddlewareFailed { middleware: String, reason: String },

    /// The request did not pass validation before execution.
    #[error("validation failed: {reason}")]
    Validation { reason: String },

    /// An agent task exceeded its timeout.
    #[error("task '{task_id}' timed out after {timeout_ms}ms")]
    Timeout { task_id: String, timeout_ms: u64 },

    /// An agent task was cancelled before it finished.
    #[error("task '{task_id}' was cancelled")]
    Cancelled { task_id: String },

    /// The scheduler queue reached its configured limit.
    #[error("task queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    /// A payload could not be converted to or from its typed form.
    #[error("serialization error: {reason}")]
    Serialization { reason: String },
}

impl CadenceError {
    /// Shorthand for handler code that wants to fail with a message.
    pub fn handler(reason: impl Into<String>) -> Self {
        Self::HandlerFailed { reason: reason.into() }
    }

    /// Shorthand for validation failures raised by middleware or handlers.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation { reason: reason.into() }
    }
}

impl From<serde_json::Error> for CadenceError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization { reason: e.to_string() }
    }
}

/// Convenience alias used throughout the Cadence crates.
pub type CadenceResult<T> = Result<T, CadenceError>;
