//! Job definition, handle and queue envelope.
//!
//! This module contains the [`Job`] record kept in the result store, the
//! [`QueueMessage`] envelope pushed onto the broker, and the [`JobHandle`]
//! handed back to callers at submission time.
//!
//! ## Examples
//!
//! ### Building a job and its envelope
//! ```rust
//! use qdispatch::{Job, JobStatus};
//! use serde_json::json;
//!
//! let job = Job::new("add_together", vec![json!(2.0), json!(3.0)]);
//! assert_eq!(job.status(), JobStatus::Pending);
//!
//! let message = job.to_message();
//! let wire = message.encode().unwrap();
//! assert!(wire.contains("add_together"));
//! assert!(wire.contains(&job.id));
//! ```

use crate::core::{JobState, JobStatus};
use crate::error::{DispatchError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Queue used when the caller does not name one.
pub const DEFAULT_QUEUE: &str = "default";

fn default_queue() -> String {
    DEFAULT_QUEUE.to_string()
}

/// One unit of deferred work, as recorded in the result store.
///
/// ## Fields
///
/// - **`id`**: Unique identifier (UUID v4), fixed at submission time
/// - **`operation`**: Name of the registered handler to run (e.g. `"add_together"`)
/// - **`args`**: Ordered JSON arguments passed to the handler
/// - **`queue`**: Queue the message was pushed onto
/// - **`created_at`**: When the job was created
/// - **`ignore_result`**: Whether the computed value is dropped on success
/// - **`state`**: Current [`JobState`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier for the job (UUID format)
    pub id: String,

    /// The operation name to execute
    ///
    /// Must match a name registered in the [`WorkerRegistry`] of the workers
    /// consuming the queue. It is not checked at submission time.
    ///
    /// [`WorkerRegistry`]: crate::processing::WorkerRegistry
    pub operation: String,

    /// Arguments for the operation
    pub args: Vec<Value>,

    /// Queue name where the job waits
    pub queue: String,

    /// When the job was created (UTC timestamp)
    pub created_at: DateTime<Utc>,

    /// Drop the computed value on success, keep only the terminal status
    pub ignore_result: bool,

    /// Current state of the job
    pub state: JobState,
}

impl Job {
    /// Creates a new pending job on the default queue with a fresh id.
    pub fn new(operation: impl Into<String>, args: Vec<Value>) -> Self {
        Self::with_queue(operation, args, DEFAULT_QUEUE)
    }

    /// Creates a new pending job on the given queue.
    pub fn with_queue(
        operation: impl Into<String>,
        args: Vec<Value>,
        queue: impl Into<String>,
    ) -> Self {
        let queue = queue.into();

        Self {
            id: Uuid::new_v4().to_string(),
            operation: operation.into(),
            args,
            state: JobState::pending(&queue),
            queue,
            created_at: Utc::now(),
            ignore_result: false,
        }
    }

    /// Sets whether the computed value should be dropped.
    pub fn ignoring_result(mut self, ignore_result: bool) -> Self {
        self.ignore_result = ignore_result;
        self
    }

    pub fn status(&self) -> JobStatus {
        self.state.status()
    }

    /// The computed value, present only for successful jobs that keep results.
    pub fn result(&self) -> Option<&Value> {
        match &self.state {
            JobState::Success { result, .. } => result.as_ref(),
            _ => None,
        }
    }

    /// The error description, present only for failed jobs.
    pub fn error(&self) -> Option<&str> {
        match &self.state {
            JobState::Failure { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Updates the job's state, refusing anything but `Pending → terminal`.
    pub fn set_state(&mut self, new_state: JobState) -> Result<()> {
        if !self.state.can_transition_to(&new_state) {
            return Err(DispatchError::InvalidStateTransition {
                from: self.state.status().to_string(),
                to: new_state.status().to_string(),
            });
        }

        self.state = new_state;
        Ok(())
    }

    /// Builds the envelope a worker needs to execute this job.
    pub fn to_message(&self) -> QueueMessage {
        let enqueued_at = match &self.state {
            JobState::Pending { enqueued_at, .. } => *enqueued_at,
            _ => self.created_at,
        };

        QueueMessage {
            id: self.id.clone(),
            operation: self.operation.clone(),
            args: self.args.clone(),
            queue: self.queue.clone(),
            ignore_result: self.ignore_result,
            enqueued_at: Some(enqueued_at),
        }
    }

    /// Serializes the job record to JSON.
    pub fn serialize(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| DispatchError::SerializationError {
            message: format!("Failed to serialize job: {}", e),
        })
    }

    /// Deserializes a job record from JSON.
    pub fn deserialize(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| DispatchError::SerializationError {
            message: format!("Failed to deserialize job: {}", e),
        })
    }
}

/// The serialized unit of work pushed onto the broker.
///
/// Only `id`, `operation` and `args` are required on the wire; the remaining
/// fields fall back to their defaults when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub id: String,
    pub operation: String,
    pub args: Vec<Value>,
    #[serde(default = "default_queue")]
    pub queue: String,
    #[serde(default)]
    pub ignore_result: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enqueued_at: Option<DateTime<Utc>>,
}

impl QueueMessage {
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| DispatchError::SerializationError {
            message: format!("Failed to encode queue message: {}", e),
        })
    }

    pub fn decode(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| DispatchError::SerializationError {
            message: format!("Failed to decode queue message: {}", e),
        })
    }

    /// Rebuilds the pending job record this message stands for.
    pub fn to_job(&self) -> Job {
        let enqueued_at = self.enqueued_at.unwrap_or_else(Utc::now);

        Job {
            id: self.id.clone(),
            operation: self.operation.clone(),
            args: self.args.clone(),
            queue: self.queue.clone(),
            created_at: enqueued_at,
            ignore_result: self.ignore_result,
            state: JobState::Pending {
                enqueued_at,
                queue: self.queue.clone(),
            },
        }
    }
}

/// The identifier returned to a caller right after submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle {
    pub id: String,
}

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_job_is_pending_without_result_or_error() {
        let job = Job::new("add_together", vec![json!(1.0), json!(2.0)]);

        assert!(!job.id.is_empty());
        assert_eq!(job.queue, DEFAULT_QUEUE);
        assert_eq!(job.status(), JobStatus::Pending);
        assert!(job.result().is_none());
        assert!(job.error().is_none());
        assert!(!job.ignore_result);
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Job::new("noop", vec![]);
        let b = Job::new("noop", vec![]);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_set_state_is_monotone() {
        let mut job = Job::new("add_together", vec![]);
        job.set_state(JobState::success(5, Some(json!(3.0)))).unwrap();
        assert_eq!(job.result(), Some(&json!(3.0)));

        let err = job.set_state(JobState::failure("late")).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidStateTransition { .. }));
        assert_eq!(job.status(), JobStatus::Success);
    }

    #[test]
    fn test_minimal_envelope_decodes_with_defaults() {
        let raw = r#"{"id":"abc","operation":"add_together","args":[2,3]}"#;
        let message = QueueMessage::decode(raw).unwrap();

        assert_eq!(message.id, "abc");
        assert_eq!(message.queue, DEFAULT_QUEUE);
        assert!(!message.ignore_result);
        assert!(message.enqueued_at.is_none());

        let job = message.to_job();
        assert_eq!(job.args, vec![json!(2), json!(3)]);
        assert_eq!(job.status(), JobStatus::Pending);
    }

    #[test]
    fn test_envelope_carries_job_identity() {
        let job = Job::with_queue("add_together", vec![json!(1.5)], "math").ignoring_result(true);
        let decoded = QueueMessage::decode(&job.to_message().encode().unwrap()).unwrap();

        assert_eq!(decoded.id, job.id);
        assert_eq!(decoded.queue, "math");
        assert!(decoded.ignore_result);
    }

    #[test]
    fn test_garbage_envelope_is_a_serialization_error() {
        let err = QueueMessage::decode("{not json").unwrap_err();
        assert!(matches!(err, DispatchError::SerializationError { .. }));
    }

    #[test]
    fn test_handle_displays_bare_id() {
        let handle = JobHandle::new("1234");
        assert_eq!(format!("result:{}", handle), "result:1234");
    }
}
