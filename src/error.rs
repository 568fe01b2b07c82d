//! Error types for qdispatch.
//!
//! [`DispatchError`] is the error every public operation returns. Backend
//! specific failures are reported as [`StorageError`](crate::storage::StorageError)
//! inside the storage layer and folded into this enum at the dispatcher seam.

use thiserror::Error;

/// The main error type for dispatch operations.
///
/// Errors detected synchronously (argument parsing, enqueueing) are returned
/// directly to the caller. Failures raised while a job executes never show up
/// here; they are recorded as the job's terminal `FAILURE` state instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    /// Malformed or missing request input
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// The broker could not accept the message
    #[error("Queue unavailable: {message}")]
    QueueUnavailable { message: String },

    /// Arguments or envelopes could not be encoded/decoded
    #[error("Serialization failed: {message}")]
    SerializationError { message: String },

    /// Unknown or expired job id
    #[error("Job not found: {job_id}")]
    NotFound { job_id: String },

    /// Attempted to move a job out of a terminal state
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    /// Result store failures that are not connectivity problems
    #[error("Storage error: {message}")]
    StorageError { message: String },

    /// Handler-side errors
    #[error("Worker error: {message}")]
    WorkerError { message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    /// A wait or execution deadline elapsed
    #[error("Operation timed out: {operation}")]
    Timeout { operation: String },
}

impl DispatchError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn worker(message: impl Into<String>) -> Self {
        Self::WorkerError {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
        }
    }

    /// Whether the caller may reasonably retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DispatchError::QueueUnavailable { .. } | DispatchError::Timeout { .. }
        )
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        DispatchError::SerializationError {
            message: err.to_string(),
        }
    }
}

/// A specialized Result type for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;
