//! Job state management.
//!
//! A job starts `Pending` when it is submitted and moves exactly once to a
//! terminal state when a worker finishes with it:
//!
//! ```text
//! Pending ──→ Success
//!    └──────→ Failure
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Coarse status of a job, as reported to callers polling for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Pending,
    Success,
    Failure,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Success => "SUCCESS",
            JobStatus::Failure => "FAILURE",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The state of a job together with the data that belongs to it.
///
/// `result` only exists on `Success` and `error` only on `Failure`, so the two
/// can never be present at the same time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "UPPERCASE")]
pub enum JobState {
    /// Submitted and waiting for a worker
    Pending {
        /// When the job was handed to the queue
        enqueued_at: DateTime<Utc>,
        /// The queue the message was pushed onto
        queue: String,
    },

    /// A worker finished the job
    Success {
        /// When the worker finished
        finished_at: DateTime<Utc>,
        /// Execution time in milliseconds
        duration_ms: u64,
        /// Computed value; `None` when results are ignored
        result: Option<Value>,
    },

    /// The job failed during execution
    Failure {
        /// When the failure was recorded
        finished_at: DateTime<Utc>,
        /// Description of what went wrong
        error: String,
    },
}

impl JobState {
    pub fn pending(queue: impl Into<String>) -> Self {
        JobState::Pending {
            enqueued_at: Utc::now(),
            queue: queue.into(),
        }
    }

    pub fn success(duration_ms: u64, result: Option<Value>) -> Self {
        JobState::Success {
            finished_at: Utc::now(),
            duration_ms,
            result,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        JobState::Failure {
            finished_at: Utc::now(),
            error: error.into(),
        }
    }

    pub fn status(&self) -> JobStatus {
        match self {
            JobState::Pending { .. } => JobStatus::Pending,
            JobState::Success { .. } => JobStatus::Success,
            JobState::Failure { .. } => JobStatus::Failure,
        }
    }

    /// Checks if the job has reached a terminal state.
    pub fn is_final(&self) -> bool {
        !matches!(self, JobState::Pending { .. })
    }

    /// When the job reached its terminal state, `None` while pending.
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        match self {
            JobState::Pending { .. } => None,
            JobState::Success { finished_at, .. } | JobState::Failure { finished_at, .. } => {
                Some(*finished_at)
            }
        }
    }

    /// Only `Pending → Success` and `Pending → Failure` are allowed.
    pub fn can_transition_to(&self, target: &JobState) -> bool {
        matches!(self, JobState::Pending { .. }) && target.is_final()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pending_moves_to_terminal_states_only() {
        let pending = JobState::pending("default");

        assert!(pending.can_transition_to(&JobState::success(1, Some(json!(5.0)))));
        assert!(pending.can_transition_to(&JobState::failure("boom")));
        assert!(!pending.can_transition_to(&JobState::pending("default")));
        assert!(pending.finished_at().is_none());
        assert!(JobState::failure("boom").finished_at().is_some());
    }

    #[test]
    fn test_terminal_states_are_never_left() {
        let done = JobState::success(10, None);
        let failed = JobState::failure("boom");

        for target in [
            JobState::pending("default"),
            JobState::success(1, None),
            JobState::failure("again"),
        ] {
            assert!(!done.can_transition_to(&target));
            assert!(!failed.can_transition_to(&target));
        }
    }

    #[test]
    fn test_status_serializes_upper_case() {
        let state = JobState::success(3, Some(json!(5.0)));
        let value = serde_json::to_value(&state).unwrap();

        assert_eq!(value["status"], "SUCCESS");
        assert_eq!(value["result"], json!(5.0));
        assert_eq!(serde_json::to_value(JobStatus::Failure).unwrap(), "FAILURE");
        assert_eq!(JobStatus::Pending.to_string(), "PENDING");
    }
}
