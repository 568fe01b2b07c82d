//! Background job server for managing job processing
//!
//! This module contains the BackgroundJobServer that runs a pool of worker
//! loops, each popping messages from the broker and handing them to a
//! [`JobProcessor`].

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info};

use super::{AppContext, WorkerRegistry, processor::JobProcessor, worker::WorkerConfig};
use crate::core::DEFAULT_QUEUE;
use crate::error::{DispatchError, Result};
use crate::storage::{ResultStore, TaskQueue};

/// Pause after a broker error before the loop pops again
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Configuration for the background job server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server name identifier
    pub server_name: String,
    /// Number of worker loops to run
    pub worker_count: usize,
    /// Queues to consume, in priority order
    pub queues: Vec<String>,
    /// How long one pop blocks waiting for a message
    pub pop_timeout: Duration,
    /// Timeout for job execution
    pub job_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_name: "qdispatch-server".to_string(),
            worker_count: 4,
            queues: vec![DEFAULT_QUEUE.to_string()],
            pop_timeout: Duration::from_secs(1),
            job_timeout: Duration::from_secs(5 * 60),
        }
    }
}

impl ServerConfig {
    pub fn new(server_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            ..Default::default()
        }
    }

    pub fn worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    pub fn queues(mut self, queues: Vec<String>) -> Self {
        self.queues = queues;
        self
    }

    pub fn pop_timeout(mut self, timeout: Duration) -> Self {
        self.pop_timeout = timeout;
        self
    }

    pub fn job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }
}

/// Background job server that manages job processing
pub struct BackgroundJobServer {
    config: ServerConfig,
    queue: Arc<dyn TaskQueue>,
    results: Arc<dyn ResultStore>,
    worker_registry: Arc<WorkerRegistry>,
    app: Arc<AppContext>,
    is_running: Arc<tokio::sync::RwLock<bool>>,
    worker_handles: Arc<tokio::sync::RwLock<Vec<JoinHandle<()>>>>,
}

impl BackgroundJobServer {
    pub fn new(
        config: ServerConfig,
        queue: Arc<dyn TaskQueue>,
        results: Arc<dyn ResultStore>,
        worker_registry: Arc<WorkerRegistry>,
        app: Arc<AppContext>,
    ) -> Self {
        Self {
            config,
            queue,
            results,
            worker_registry,
            app,
            is_running: Arc::new(tokio::sync::RwLock::new(false)),
            worker_handles: Arc::new(tokio::sync::RwLock::new(Vec::new())),
        }
    }

    /// Start the worker loops
    pub async fn start(&self) -> Result<()> {
        if self.config.worker_count == 0 {
            return Err(DispatchError::configuration(
                "worker_count must be at least 1",
            ));
        }

        let mut is_running = self.is_running.write().await;
        if *is_running {
            return Err(DispatchError::configuration("Server is already running"));
        }

        info!(
            server = %self.config.server_name,
            workers = self.config.worker_count,
            queues = ?self.config.queues,
            operations = ?self.worker_registry.operations(),
            "Starting background job server"
        );

        *is_running = true;
        drop(is_running);

        self.start_workers().await;

        info!("Background job server started successfully");
        Ok(())
    }

    /// Stop the worker loops
    ///
    /// Loops are aborted; a message that was popped but not yet recorded
    /// stays `PENDING`.
    pub async fn stop(&self) -> Result<()> {
        let mut is_running = self.is_running.write().await;
        if !*is_running {
            return Ok(());
        }

        info!(server = %self.config.server_name, "Stopping background job server");

        *is_running = false;
        drop(is_running);

        let mut handles = self.worker_handles.write().await;
        for handle in handles.drain(..) {
            handle.abort();
        }

        info!("Background job server stopped");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    async fn start_workers(&self) {
        let mut handles = self.worker_handles.write().await;

        for worker_id in 0..self.config.worker_count {
            let worker_config =
                WorkerConfig::new(format!("{}:worker:{}", self.config.server_name, worker_id))
                    .server_name(&self.config.server_name)
                    .queues(self.config.queues.clone())
                    .job_timeout(self.config.job_timeout);

            let processor = JobProcessor::new(
                self.worker_registry.clone(),
                self.results.clone(),
                worker_config,
                self.app.clone(),
            );

            let queue = self.queue.clone();
            let config = self.config.clone();
            let is_running = self.is_running.clone();

            handles.push(tokio::spawn(async move {
                Self::worker_loop(processor, queue, config, is_running).await;
            }));
        }

        info!("Started {} worker loops", self.config.worker_count);
    }

    async fn worker_loop(
        processor: JobProcessor,
        queue: Arc<dyn TaskQueue>,
        config: ServerConfig,
        is_running: Arc<tokio::sync::RwLock<bool>>,
    ) {
        let worker_id = processor.worker_config().worker_id.clone();
        debug!(worker = %worker_id, "Worker loop started");

        while *is_running.read().await {
            match queue.pop(&config.queues, config.pop_timeout).await {
                Ok(Some(message)) => {
                    debug!(worker = %worker_id, job_id = %message.id, "Popped message");
                    if let Err(e) = processor.process(message).await {
                        error!(worker = %worker_id, "Error processing job: {}", e);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    error!(worker = %worker_id, "Error popping from broker: {}", e);
                    sleep(ERROR_BACKOFF).await;
                }
            }
        }

        debug!(worker = %worker_id, "Worker loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Job, JobStatus};
    use crate::processing::{Worker, WorkerContext, WorkerResult};
    use crate::storage::MemoryStorage;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingWorker {
        call_count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Worker for CountingWorker {
        async fn execute(&self, _job: &Job, _context: &WorkerContext) -> Result<WorkerResult> {
            self.call_count.fetch_add(1, Ordering::Relaxed);
            sleep(Duration::from_millis(10)).await;
            Ok(WorkerResult::success(Some(json!("done")), 10))
        }

        fn operation(&self) -> &str {
            "count"
        }
    }

    fn server_with(
        storage: Arc<MemoryStorage>,
        registry: WorkerRegistry,
        workers: usize,
    ) -> BackgroundJobServer {
        let config = ServerConfig::new("test-server")
            .worker_count(workers)
            .pop_timeout(Duration::from_millis(20));

        BackgroundJobServer::new(
            config,
            storage.clone(),
            storage,
            Arc::new(registry),
            Arc::new(AppContext::default()),
        )
    }

    #[tokio::test]
    async fn test_server_start_stop() {
        let storage = Arc::new(MemoryStorage::new());
        let server = server_with(storage, WorkerRegistry::new(), 2);

        server.start().await.unwrap();
        assert!(server.is_running().await);
        assert!(server.start().await.is_err());

        server.stop().await.unwrap();
        assert!(!server.is_running().await);

        // Stopping twice is a no-op
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_workers_rejected() {
        let storage = Arc::new(MemoryStorage::new());
        let server = server_with(storage, WorkerRegistry::new(), 0);

        assert!(matches!(
            server.start().await,
            Err(DispatchError::ConfigurationError { .. })
        ));
        assert!(!server.is_running().await);
    }

    #[tokio::test]
    async fn test_job_processing() {
        let storage = Arc::new(MemoryStorage::new());
        let call_count = Arc::new(AtomicUsize::new(0));

        let mut registry = WorkerRegistry::new();
        registry.register(CountingWorker {
            call_count: call_count.clone(),
        });

        let server = server_with(storage.clone(), registry, 2);

        let jobs: Vec<Job> = (0..3).map(|i| Job::new("count", vec![json!(i)])).collect();
        for job in &jobs {
            storage.create(job).await.unwrap();
            storage.push(&job.to_message()).await.unwrap();
        }

        server.start().await.unwrap();

        let mut done = false;
        for _ in 0..100 {
            let mut finished = 0;
            for job in &jobs {
                let stored = storage.get(&job.id).await.unwrap().unwrap();
                if stored.status() == JobStatus::Success {
                    finished += 1;
                }
            }
            if finished == jobs.len() {
                done = true;
                break;
            }
            sleep(Duration::from_millis(20)).await;
        }

        server.stop().await.unwrap();

        assert!(done, "jobs did not finish in time");
        assert_eq!(call_count.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_worker_survives_panicking_handler() {
        let storage = Arc::new(MemoryStorage::new());

        let mut registry = WorkerRegistry::new();
        registry.register_fn("boom", |_| panic!("handler blew up"));
        registry.register_fn("echo", |args| Ok(json!(args)));

        let server = server_with(storage.clone(), registry, 1);
        server.start().await.unwrap();

        let boom = Job::new("boom", vec![]);
        let echo = Job::new("echo", vec![json!("still alive")]);
        for job in [&boom, &echo] {
            storage.create(job).await.unwrap();
            storage.push(&job.to_message()).await.unwrap();
        }

        let mut echoed = None;
        for _ in 0..100 {
            let stored = storage.get(&echo.id).await.unwrap().unwrap();
            if stored.state.is_final() {
                echoed = Some(stored);
                break;
            }
            sleep(Duration::from_millis(20)).await;
        }

        assert!(server.is_running().await);
        server.stop().await.unwrap();

        let failed = storage.get(&boom.id).await.unwrap().unwrap();
        assert_eq!(failed.status(), JobStatus::Failure);
        assert!(failed.error().unwrap().contains("handler blew up"));

        let echoed = echoed.expect("follow-up job did not finish in time");
        assert_eq!(echoed.status(), JobStatus::Success);
        assert_eq!(echoed.result(), Some(&json!(["still alive"])));
    }
}
