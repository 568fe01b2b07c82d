//! Application wiring
//!
//! [`App::build`] turns [`Settings`] and a [`WorkerRegistry`] into a ready to
//! run application: storage backends, the dispatcher, the HTTP server and
//! the background job server. [`App::run`] starts the parts a [`Role`] needs.

use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

use crate::dispatch::JobDispatcher;
use crate::error::{DispatchError, Result};
use crate::http::{HttpConfig, HttpServer};
use crate::processing::{AppContext, BackgroundJobServer, ServerConfig, WorkerRegistry};
use crate::settings::Settings;
use crate::storage::{ResultStore, StorageInstance, TaskQueue, redact_url};

/// Which parts of the application a process runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// HTTP API and worker loops in one process
    Serve,
    /// HTTP API only
    Web,
    /// Worker loops only
    Worker,
}

impl Role {
    fn runs_http(self) -> bool {
        matches!(self, Role::Serve | Role::Web)
    }

    fn runs_workers(self) -> bool {
        matches!(self, Role::Serve | Role::Worker)
    }
}

pub struct App {
    settings: Settings,
    dispatcher: Arc<JobDispatcher>,
    http: HttpServer,
    jobs: BackgroundJobServer,
}

impl App {
    /// Wire every component from settings
    ///
    /// When broker and result backend are the same `memory://` url both
    /// roles share one in-process backend.
    pub async fn build(settings: Settings, registry: WorkerRegistry) -> Result<Self> {
        let (queue, results) = if settings.shares_memory_backend() {
            let storage =
                Arc::new(StorageInstance::from_config(settings.broker_config()?).await?);
            info!(
                backend = storage.backend_name(),
                "Using shared storage for queue and results"
            );

            let queue: Arc<dyn TaskQueue> = storage.clone();
            let results: Arc<dyn ResultStore> = storage;
            (queue, results)
        } else {
            let queue = StorageInstance::from_config(settings.broker_config()?).await?;
            let results = StorageInstance::from_config(settings.result_backend_config()?).await?;
            info!(
                broker = queue.backend_name(),
                result_backend = results.backend_name(),
                "Connected storage backends"
            );

            let queue: Arc<dyn TaskQueue> = Arc::new(queue);
            let results: Arc<dyn ResultStore> = Arc::new(results);
            (queue, results)
        };

        let dispatcher = Arc::new(JobDispatcher::new(
            queue.clone(),
            results.clone(),
            settings.dispatch_options(),
        ));

        let app_context = Arc::new(
            AppContext::new(env!("CARGO_PKG_NAME"))
                .with_value("broker_url", redact_url(&settings.broker_url))
                .with_value("result_backend_url", redact_url(&settings.result_backend_url)),
        );

        let jobs = BackgroundJobServer::new(
            ServerConfig::new(format!("{}-{}", env!("CARGO_PKG_NAME"), std::process::id()))
                .worker_count(settings.workers),
            queue,
            results,
            Arc::new(registry),
            app_context,
        );

        let http = HttpServer::new(
            Arc::clone(&dispatcher),
            HttpConfig::new(settings.host.clone(), settings.port),
        );

        Ok(Self {
            settings,
            dispatcher,
            http,
            jobs,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn dispatcher(&self) -> Arc<JobDispatcher> {
        Arc::clone(&self.dispatcher)
    }

    pub fn http(&self) -> &HttpServer {
        &self.http
    }

    pub fn jobs(&self) -> &BackgroundJobServer {
        &self.jobs
    }

    /// Run `role` until `shutdown` resolves
    pub async fn run<F>(&self, role: Role, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if role == Role::Web && self.settings.shares_memory_backend() {
            warn!("Web role with an in-process broker: submitted jobs will never run");
        }

        if role.runs_workers() {
            self.jobs.start().await?;
        }

        let outcome = if role.runs_http() {
            self.http
                .serve(shutdown)
                .await
                .map_err(|e| DispatchError::ConfigurationError {
                    message: format!(
                        "HTTP server failed on {}: {}",
                        self.http.config().addr(),
                        e
                    ),
                })
        } else {
            shutdown.await;
            Ok(())
        };

        if role.runs_workers() {
            self.jobs.stop().await?;
        }

        outcome
    }
}
