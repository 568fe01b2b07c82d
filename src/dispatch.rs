//! Job submission facade
//!
//! [`JobDispatcher`] turns a synchronous call into a queued job and hands the
//! caller a [`JobHandle`] right away. It only ever writes the `PENDING`
//! record; terminal states come from the worker path.
//!
//! ## Examples
//!
//! ```rust
//! use qdispatch::{DispatchOptions, JobDispatcher, JobStatus, MemoryStorage};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let storage = Arc::new(MemoryStorage::new());
//! let dispatcher = JobDispatcher::new(storage.clone(), storage, DispatchOptions::default());
//!
//! let handle = dispatcher.submit("add_together", (2.0, 3.0)).await.unwrap();
//! let job = dispatcher.get_status(handle.id()).await.unwrap();
//! assert_eq!(job.status(), JobStatus::Pending);
//! # });
//! ```

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::core::{DEFAULT_QUEUE, Job, JobHandle};
use crate::error::{DispatchError, Result};
use crate::storage::{ResultStore, StorageError, TaskQueue};

/// Defaults applied to every submission of a dispatcher
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOptions {
    /// Queue messages are pushed onto
    pub queue: String,
    /// Drop computed values, keep only the terminal status
    pub ignore_result: bool,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            queue: DEFAULT_QUEUE.to_string(),
            ignore_result: false,
        }
    }
}

impl DispatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    pub fn ignore_result(mut self, ignore_result: bool) -> Self {
        self.ignore_result = ignore_result;
        self
    }
}

/// Per-call overrides of [`DispatchOptions`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmitOptions {
    pub queue: Option<String>,
    pub ignore_result: Option<bool>,
}

impl SubmitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn ignore_result(mut self, ignore_result: bool) -> Self {
        self.ignore_result = Some(ignore_result);
        self
    }
}

/// Enqueues jobs and looks up their state
///
/// Holds explicit handles to its queue and result store. Cloning is cheap
/// and clones share both backends.
#[derive(Clone)]
pub struct JobDispatcher {
    queue: Arc<dyn TaskQueue>,
    results: Arc<dyn ResultStore>,
    options: DispatchOptions,
}

impl JobDispatcher {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        results: Arc<dyn ResultStore>,
        options: DispatchOptions,
    ) -> Self {
        Self {
            queue,
            results,
            options,
        }
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    /// Submit `operation` with typed arguments
    ///
    /// `args` must serialize to a JSON array: a tuple, `Vec` or array.
    /// Anything else fails with [`DispatchError::SerializationError`].
    pub async fn submit<A>(&self, operation: &str, args: A) -> Result<JobHandle>
    where
        A: Serialize,
    {
        self.submit_with(operation, args, SubmitOptions::default()).await
    }

    /// Submit `operation` with typed arguments and per-call overrides
    pub async fn submit_with<A>(
        &self,
        operation: &str,
        args: A,
        options: SubmitOptions,
    ) -> Result<JobHandle>
    where
        A: Serialize,
    {
        let args = match serde_json::to_value(&args)? {
            Value::Array(values) => values,
            other => {
                return Err(DispatchError::SerializationError {
                    message: format!(
                        "Arguments must encode to a JSON array, got {}",
                        json_kind(&other)
                    ),
                });
            }
        };

        self.enqueue(operation, args, options).await
    }

    /// Submit `operation` with already-encoded arguments
    pub async fn submit_values(&self, operation: &str, args: Vec<Value>) -> Result<JobHandle> {
        self.enqueue(operation, args, SubmitOptions::default()).await
    }

    async fn enqueue(
        &self,
        operation: &str,
        args: Vec<Value>,
        options: SubmitOptions,
    ) -> Result<JobHandle> {
        let queue = options.queue.unwrap_or_else(|| self.options.queue.clone());
        let ignore_result = options.ignore_result.unwrap_or(self.options.ignore_result);

        let job = Job::with_queue(operation, args, queue).ignoring_result(ignore_result);
        let message = job.to_message();

        // The pending record goes in first so a fast worker never races it.
        self.results.create(&job).await?;

        if let Err(e) = self.queue.push(&message).await {
            warn!(job_id = %job.id, "Failed to push job onto queue: {}", e);

            if let Err(cleanup) = self.results.delete(&job.id).await {
                warn!(job_id = %job.id, "Failed to remove pending record: {}", cleanup);
            }

            return Err(match e {
                StorageError::Serialization { message, .. } => {
                    DispatchError::SerializationError { message }
                }
                other => DispatchError::QueueUnavailable {
                    message: other.to_string(),
                },
            });
        }

        info!(
            job_id = %job.id,
            operation = %job.operation,
            queue = %job.queue,
            ignore_result,
            "Job submitted"
        );

        Ok(JobHandle::new(job.id))
    }

    /// Current record of a job
    ///
    /// Fails with [`DispatchError::NotFound`] for unknown or expired ids.
    pub async fn get_status(&self, job_id: &str) -> Result<Job> {
        self.results
            .get(job_id)
            .await?
            .ok_or_else(|| DispatchError::NotFound {
                job_id: job_id.to_string(),
            })
    }

    /// Poll until the job reaches a terminal state or `timeout` elapses
    pub async fn wait_for(
        &self,
        job_id: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Job> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let job = self.get_status(job_id).await?;
            if job.state.is_final() {
                return Ok(job);
            }

            if tokio::time::Instant::now() + poll_interval > deadline {
                debug!(job_id, ?timeout, "Gave up waiting for job");
                return Err(DispatchError::Timeout {
                    operation: format!("waiting for job {}", job_id),
                });
            }

            tokio::time::sleep(poll_interval).await;
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{JobState, JobStatus, QueueMessage};
    use crate::storage::{MemoryConfig, MemoryStorage};
    use async_trait::async_trait;
    use serde_json::json;

    struct DownQueue;

    #[async_trait]
    impl TaskQueue for DownQueue {
        async fn push(&self, _message: &QueueMessage) -> std::result::Result<(), StorageError> {
            Err(StorageError::connection("connection refused"))
        }

        async fn pop(
            &self,
            _queues: &[String],
            _wait: Duration,
        ) -> std::result::Result<Option<QueueMessage>, StorageError> {
            Ok(None)
        }

        async fn len(&self, _queue: &str) -> std::result::Result<usize, StorageError> {
            Ok(0)
        }
    }

    fn dispatcher() -> (JobDispatcher, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let dispatcher =
            JobDispatcher::new(storage.clone(), storage.clone(), DispatchOptions::default());
        (dispatcher, storage)
    }

    #[tokio::test]
    async fn test_submit_writes_pending_record_and_message() {
        let (dispatcher, storage) = dispatcher();

        let handle = dispatcher.submit("add_together", (2, 3)).await.unwrap();

        let job = dispatcher.get_status(handle.id()).await.unwrap();
        assert_eq!(job.status(), JobStatus::Pending);
        assert_eq!(job.operation, "add_together");
        assert_eq!(job.args, vec![json!(2), json!(3)]);

        let message = storage
            .pop(&[DEFAULT_QUEUE.to_string()], Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.id, handle.id);
        assert!(!message.ignore_result);
    }

    #[tokio::test]
    async fn test_submit_rejects_non_array_args() {
        let (dispatcher, storage) = dispatcher();

        let result = dispatcher.submit("add_together", json!({"a": 1})).await;
        assert!(matches!(
            result,
            Err(DispatchError::SerializationError { .. })
        ));
        assert_eq!(storage.job_count(), 0);
    }

    #[tokio::test]
    async fn test_submit_with_overrides_defaults() {
        let storage = Arc::new(MemoryStorage::new());
        let dispatcher = JobDispatcher::new(
            storage.clone(),
            storage.clone(),
            DispatchOptions::new().ignore_result(true),
        );

        let handle = dispatcher
            .submit_with(
                "add_together",
                [1.0, 2.0],
                SubmitOptions::new().queue("math").ignore_result(false),
            )
            .await
            .unwrap();

        let job = dispatcher.get_status(handle.id()).await.unwrap();
        assert_eq!(job.queue, "math");
        assert!(!job.ignore_result);
        assert_eq!(TaskQueue::len(storage.as_ref(), "math").await.unwrap(), 1);

        let handle = dispatcher
            .submit_values("add_together", vec![json!(1), json!(2)])
            .await
            .unwrap();
        let job = dispatcher.get_status(handle.id()).await.unwrap();
        assert_eq!(job.queue, DEFAULT_QUEUE);
        assert!(job.ignore_result);
    }

    #[tokio::test]
    async fn test_push_failure_is_queue_unavailable() {
        let storage = Arc::new(MemoryStorage::new());
        let dispatcher =
            JobDispatcher::new(Arc::new(DownQueue), storage.clone(), DispatchOptions::default());

        let result = dispatcher.submit("add_together", (1, 2)).await;
        assert!(matches!(result, Err(DispatchError::QueueUnavailable { .. })));

        // The pending record is rolled back
        assert_eq!(storage.job_count(), 0);
    }

    #[tokio::test]
    async fn test_submit_after_store_filled_with_finished_jobs() {
        let storage = Arc::new(MemoryStorage::with_config(MemoryConfig::new().with_max_jobs(5)));
        let dispatcher =
            JobDispatcher::new(storage.clone(), storage.clone(), DispatchOptions::default());

        for _ in 0..5 {
            let handle = dispatcher.submit("add_together", (1, 1)).await.unwrap();
            storage
                .complete(handle.id(), JobState::success(1, Some(json!(2.0))))
                .await
                .unwrap();
        }

        let handle = dispatcher.submit("add_together", (2, 3)).await.unwrap();
        let job = dispatcher.get_status(handle.id()).await.unwrap();
        assert_eq!(job.status(), JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_get_status_unknown_id() {
        let (dispatcher, _) = dispatcher();

        let result = dispatcher.get_status("never-submitted").await;
        assert_eq!(
            result.unwrap_err(),
            DispatchError::NotFound {
                job_id: "never-submitted".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_wait_for_terminal_state() {
        let (dispatcher, storage) = dispatcher();
        let handle = dispatcher.submit("add_together", (2, 3)).await.unwrap();

        let id = handle.id.clone();
        let writer = storage.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            writer
                .complete(&id, JobState::success(1, Some(json!(5.0))))
                .await
                .unwrap();
        });

        let job = dispatcher
            .wait_for(handle.id(), Duration::from_secs(2), Duration::from_millis(5))
            .await
            .unwrap();
        assert_eq!(job.status(), JobStatus::Success);
        assert_eq!(job.result(), Some(&json!(5.0)));
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        let (dispatcher, _) = dispatcher();
        let handle = dispatcher.submit("add_together", (2, 3)).await.unwrap();

        let result = dispatcher
            .wait_for(handle.id(), Duration::from_millis(30), Duration::from_millis(5))
            .await;
        assert!(matches!(result, Err(DispatchError::Timeout { .. })));
    }
}
