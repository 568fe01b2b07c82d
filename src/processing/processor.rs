//! Job processor for executing individual jobs
//!
//! This module contains the JobProcessor that takes one message popped from
//! the broker, runs the matching handler and records the terminal state.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::{AppContext, WorkerConfig, WorkerRegistry, WorkerResult, worker::WorkerContext};
use crate::core::{Job, JobState, QueueMessage};
use crate::error::Result;
use crate::storage::{ResultStore, StorageError};

/// Job processor that executes jobs and records their outcome
pub struct JobProcessor {
    worker_registry: Arc<WorkerRegistry>,
    results: Arc<dyn ResultStore>,
    worker_config: WorkerConfig,
    app: Arc<AppContext>,
}

impl JobProcessor {
    pub fn new(
        worker_registry: Arc<WorkerRegistry>,
        results: Arc<dyn ResultStore>,
        worker_config: WorkerConfig,
        app: Arc<AppContext>,
    ) -> Self {
        Self {
            worker_registry,
            results,
            worker_config,
            app,
        }
    }

    pub fn worker_config(&self) -> &WorkerConfig {
        &self.worker_config
    }

    /// Process a single message to its terminal state
    ///
    /// Handler failures, unknown operations and timeouts all end as a
    /// `FAILURE` record; only result store errors are returned to the caller.
    pub async fn process(&self, message: QueueMessage) -> Result<()> {
        let job = message.to_job();
        let state = self.execute(&job).await;
        self.record(&job, state).await
    }

    async fn execute(&self, job: &Job) -> JobState {
        info!(
            job_id = %job.id,
            operation = %job.operation,
            worker = %self.worker_config.worker_id,
            "Starting job processing"
        );

        let worker = match self.worker_registry.get_worker(&job.operation) {
            Some(worker) => worker,
            None => {
                error!(job_id = %job.id, "No worker found for operation: {}", job.operation);
                return JobState::failure(format!(
                    "No worker registered for operation: {}",
                    job.operation
                ));
            }
        };

        let context = WorkerContext::new(self.worker_config.clone(), self.app.clone());
        let started = Instant::now();

        // Handler panics end as FAILURE instead of unwinding the worker loop.
        let execution = AssertUnwindSafe(worker.execute(job, &context)).catch_unwind();

        let outcome = match tokio::time::timeout(self.worker_config.job_timeout, execution).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(panic)) => {
                let reason = panic_message(panic.as_ref());
                error!(job_id = %job.id, "Job handler panicked: {}", reason);
                return JobState::failure(format!("Job handler panicked: {}", reason));
            }
            Err(_) => {
                warn!(
                    job_id = %job.id,
                    "Job timed out after {:?}", self.worker_config.job_timeout
                );
                return JobState::failure(format!(
                    "Job timed out after {}ms",
                    self.worker_config.job_timeout.as_millis()
                ));
            }
        };

        match outcome {
            Ok(WorkerResult::Success { result, .. }) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                info!(job_id = %job.id, duration_ms, "Job completed successfully");

                let result = if job.ignore_result { None } else { result };
                JobState::success(duration_ms, result)
            }
            Ok(WorkerResult::Failure { error }) => {
                error!(job_id = %job.id, "Job failed: {}", error);
                JobState::failure(error)
            }
            Err(e) => {
                error!(job_id = %job.id, "Job execution error: {}", e);
                JobState::failure(e.to_string())
            }
        }
    }

    async fn record(&self, job: &Job, state: JobState) -> Result<()> {
        let status = state.status();

        match self.results.complete(&job.id, state).await {
            Ok(true) => {
                debug!(job_id = %job.id, %status, "Recorded terminal state");
                Ok(())
            }
            Ok(false) => {
                warn!(job_id = %job.id, "Job already has a terminal state, keeping it");
                Ok(())
            }
            Err(StorageError::JobNotFound { .. }) => {
                // Record expired or was deleted while the job was queued.
                warn!(job_id = %job.id, %status, "No record left for job, outcome dropped");
                Ok(())
            }
            Err(e) => {
                error!(job_id = %job.id, "Failed to record job outcome: {}", e);
                Err(e.into())
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
