//! Worker types and configuration
//!
//! This module contains the types handed to handlers at execution time and
//! the result they hand back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::core::DEFAULT_QUEUE;

/// Configuration for a single worker loop
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Unique identifier for the worker
    pub worker_id: String,
    /// Name of the server where the worker is running
    pub server_name: String,
    /// Queues this worker consumes, in priority order
    pub queues: Vec<String>,
    /// Timeout for a single job execution
    pub job_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: uuid::Uuid::new_v4().to_string(),
            server_name: "default".to_string(),
            queues: vec![DEFAULT_QUEUE.to_string()],
            job_timeout: Duration::from_secs(5 * 60),
        }
    }
}

impl WorkerConfig {
    pub fn new(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            ..Default::default()
        }
    }

    pub fn server_name(mut self, server_name: impl Into<String>) -> Self {
        self.server_name = server_name.into();
        self
    }

    pub fn queues(mut self, queues: Vec<String>) -> Self {
        self.queues = queues;
        self
    }

    pub fn job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }
}

/// Application-level context shared by every execution.
///
/// Handlers that need configuration read it from here instead of reaching
/// for process-wide state.
#[derive(Debug, Clone, Default)]
pub struct AppContext {
    /// Application name
    pub name: String,
    /// Free-form settings the application wants handlers to see
    pub values: HashMap<String, String>,
}

impl AppContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: HashMap::new(),
        }
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// Context information provided to workers during job execution
#[derive(Debug, Clone)]
pub struct WorkerContext {
    /// Worker configuration
    pub config: WorkerConfig,
    /// Application context
    pub app: Arc<AppContext>,
    /// When the job execution started
    pub started_at: DateTime<Utc>,
}

impl WorkerContext {
    pub fn new(config: WorkerConfig, app: Arc<AppContext>) -> Self {
        Self {
            config,
            app,
            started_at: Utc::now(),
        }
    }

    /// Get execution duration so far
    pub fn duration(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }
}

/// Result of job execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorkerResult {
    /// Job completed successfully
    Success {
        /// Optional result data
        result: Option<Value>,
        /// Execution duration in milliseconds
        duration_ms: u64,
    },
    /// Job failed
    Failure {
        /// Error message
        error: String,
    },
}

impl WorkerResult {
    pub fn success(result: Option<Value>, duration_ms: u64) -> Self {
        Self::Success {
            result,
            duration_ms,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self::Failure {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, WorkerResult::Success { .. })
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            WorkerResult::Failure { error } => Some(error),
            WorkerResult::Success { .. } => None,
        }
    }
}
