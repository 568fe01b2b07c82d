use crate::error::DispatchError;
use thiserror::Error;

/// Storage-specific errors raised by queue and result-store backends
#[derive(Error, Debug)]
pub enum StorageError {
    /// Connection-related errors (network, authentication, etc.)
    #[error("Storage connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Serialization/deserialization errors when converting to/from storage format
    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Job not found in storage
    #[error("Job not found: {job_id}")]
    JobNotFound { job_id: String },

    /// Storage operation timed out
    #[error("Storage operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Storage is unavailable or down
    #[error("Storage is unavailable: {reason}")]
    Unavailable { reason: String },

    /// Configuration errors
    #[error("Storage configuration error: {message}")]
    Configuration { message: String },

    /// General storage operation errors
    #[error("Storage operation failed: {operation} - {message}")]
    OperationFailed {
        operation: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Storage capacity exceeded
    #[error("Storage capacity exceeded: {message}")]
    CapacityExceeded { message: String },
}

impl StorageError {
    /// Create a connection error
    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection error with source
    pub fn connection_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a serialization error
    pub fn serialization<S: Into<String>>(message: S) -> Self {
        Self::Serialization {
            message: message.into(),
            source: None,
        }
    }

    /// Create a serialization error with source
    pub fn serialization_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Serialization {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a job not found error
    pub fn job_not_found<S: Into<String>>(job_id: S) -> Self {
        Self::JobNotFound {
            job_id: job_id.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(timeout_ms: u64) -> Self {
        Self::Timeout { timeout_ms }
    }

    /// Create an unavailable error
    pub fn unavailable<S: Into<String>>(reason: S) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an operation failed error with source
    pub fn operation_failed_with_source<S: Into<String>, T: Into<String>>(
        operation: S,
        message: T,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a capacity exceeded error
    pub fn capacity_exceeded<S: Into<String>>(message: S) -> Self {
        Self::CapacityExceeded {
            message: message.into(),
        }
    }

    /// Whether the backend could not be reached at all, as opposed to
    /// reaching it and being told no.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            StorageError::Connection { .. }
                | StorageError::Timeout { .. }
                | StorageError::Unavailable { .. }
        )
    }
}

// Broker reachability problems surface to callers as QueueUnavailable so they
// know a retry of the same submission is reasonable.
impl From<StorageError> for DispatchError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::JobNotFound { job_id } => DispatchError::NotFound { job_id },
            StorageError::Serialization { message, .. } => {
                DispatchError::SerializationError { message }
            }
            StorageError::Configuration { message } => {
                DispatchError::ConfigurationError { message }
            }
            e if e.is_connectivity() => DispatchError::QueueUnavailable {
                message: e.to_string(),
            },
            e => DispatchError::StorageError {
                message: e.to_string(),
            },
        }
    }
}
