//! # qdispatch
//!
//! Asynchronous task dispatch: hand a named operation and its arguments to a
//! durable queue, get a job handle back immediately, look the outcome up
//! later.
//!
//! **qdispatch** sits between a request/response cycle and longer-running
//! background work. The caller never waits for execution; it only waits for
//! the enqueue.
//!
//! ## 🚀 **Features**
//!
//! - **Non-blocking submission**: [`JobDispatcher::submit`] returns a [`JobHandle`] as soon as the message is queued
//! - **2 Storage Backends**: in-process memory and Redis, behind the [`TaskQueue`] and [`ResultStore`] traits
//! - **Explicit worker registry**: operation names map to handlers registered at startup
//! - **Monotone job lifecycle**: `PENDING` moves exactly once to `SUCCESS` or `FAILURE`
//! - **HTTP surface**: axum routes for submission and status lookup
//!
//! ## 🎯 **Submitting Work**
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
//! println!("queued as {}", handle);
//!
//! let job = dispatcher.get_status(handle.id()).await.unwrap();
//! assert_eq!(job.status(), JobStatus::Pending);
//! # });
//! ```
//!
//! ## ⚡ **Running Workers**
//!
//! ```rust
//! use qdispatch::{
//!     AppContext, BackgroundJobServer, DispatchOptions, JobDispatcher, JobStatus,
//!     MemoryStorage, ServerConfig, WorkerRegistry, tasks,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let storage = Arc::new(MemoryStorage::new());
//!
//! let mut registry = WorkerRegistry::new();
//! tasks::register_builtin(&mut registry);
//!
//! let server = BackgroundJobServer::new(
//!     ServerConfig::new("server-1").worker_count(2),
//!     storage.clone(),
//!     storage.clone(),
//!     Arc::new(registry),
//!     Arc::new(AppContext::new("docs")),
//! );
//! server.start().await.unwrap();
//!
//! let dispatcher = JobDispatcher::new(storage.clone(), storage, DispatchOptions::default());
//! let handle = dispatcher.submit("add_together", (2, 3)).await.unwrap();
//!
//! let job = dispatcher
//!     .wait_for(handle.id(), Duration::from_secs(5), Duration::from_millis(10))
//!     .await
//!     .unwrap();
//! assert_eq!(job.status(), JobStatus::Success);
//! assert_eq!(job.result(), Some(&json!(5.0)));
//!
//! server.stop().await.unwrap();
//! # });
//! ```
//!
//! ## 🔧 **Custom Workers**
//!
//! ```rust
//! use qdispatch::{Job, Result, Worker, WorkerContext, WorkerResult};
//! use async_trait::async_trait;
//!
//! struct EmailWorker;
//!
//! #[async_trait]
//! impl Worker for EmailWorker {
//!     async fn execute(&self, job: &Job, _context: &WorkerContext) -> Result<WorkerResult> {
//!         let email = &job.args[0];
//!         println!("Sending email to: {}", email);
//!         Ok(WorkerResult::success(None, 0))
//!     }
//!
//!     fn operation(&self) -> &str {
//!         "send_email"
//!     }
//! }
//! ```
//!
//! ## 🔄 **Job Lifecycle**
//!
//! ```text
//! PENDING → SUCCESS (result, unless the job ignores results)
//!    ↓
//! FAILURE (error)
//! ```
//!
//! Execution failures never surface through `submit`; they are recorded as
//! the job's `FAILURE` state and observed through a later lookup.
//!
//! ## 📋 **Configuration**
//!
//! The binary reads [`Settings`] from `QDISPATCH_*` environment variables
//! (and an optional `.env` file). `QDISPATCH_BROKER_URL` and
//! `QDISPATCH_RESULT_BACKEND_URL` accept `memory://` or `redis://` urls.

pub mod bootstrap;
pub mod core;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod processing;
pub mod settings;
pub mod storage;
pub mod tasks;

// Re-export main types for convenience
pub use bootstrap::{App, Role};
pub use crate::core::{DEFAULT_QUEUE, Job, JobHandle, JobState, JobStatus, QueueMessage};
pub use dispatch::{DispatchOptions, JobDispatcher, SubmitOptions};
pub use error::{DispatchError, Result};
pub use http::{HttpConfig, HttpServer, JobView, create_router};
pub use processing::{
    AppContext, BackgroundJobServer, JobProcessor, ServerConfig, Worker, WorkerConfig,
    WorkerContext, WorkerRegistry, WorkerResult,
};
pub use settings::Settings;
pub use storage::{
    MemoryConfig, MemoryStorage, ResultStore, StorageConfig, StorageError, StorageInstance,
    TaskQueue,
};

#[cfg(feature = "redis")]
pub use storage::{RedisConfig, RedisStorage};
