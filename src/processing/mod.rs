//! Job Processing Engine
//!
//! This module contains the worker side: the registry mapping operation
//! names to handlers, the processor that runs one message to its terminal
//! state, and the background server that keeps a pool of worker loops busy.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Instant;

use crate::core::Job;
use crate::error::Result;

pub mod processor;
pub mod server;
pub mod worker;

pub use processor::JobProcessor;
pub use server::{BackgroundJobServer, ServerConfig};
pub use worker::{AppContext, WorkerConfig, WorkerContext, WorkerResult};

/// Trait for executing jobs
///
/// Implementations define how one named operation is executed. A worker
/// receives the job and an explicit [`WorkerContext`] and returns a
/// [`WorkerResult`]. Returning `Err` is treated the same as a failure result.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Execute a job
    async fn execute(&self, job: &Job, context: &WorkerContext) -> Result<WorkerResult>;

    /// The operation name this worker handles
    fn operation(&self) -> &str;
}

type HandlerFn = dyn Fn(&[Value]) -> Result<Value> + Send + Sync;

/// Worker backed by a plain synchronous function over the job arguments
pub struct FnWorker {
    operation: String,
    function: Box<HandlerFn>,
}

impl FnWorker {
    pub fn new<F>(operation: impl Into<String>, function: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            operation: operation.into(),
            function: Box::new(function),
        }
    }
}

#[async_trait]
impl Worker for FnWorker {
    async fn execute(&self, job: &Job, _context: &WorkerContext) -> Result<WorkerResult> {
        let started = Instant::now();
        let value = (self.function)(job.args.as_slice())?;
        Ok(WorkerResult::success(
            Some(value),
            started.elapsed().as_millis() as u64,
        ))
    }

    fn operation(&self) -> &str {
        &self.operation
    }
}

/// Registry for job workers
///
/// Built once at startup and shared read-only afterwards. The processor looks
/// a worker up by the operation name carried in each queue message.
///
/// ```rust
/// use qdispatch::WorkerRegistry;
/// use serde_json::json;
///
/// let mut registry = WorkerRegistry::new();
/// registry.register_fn("echo", |args| Ok(json!(args)));
///
/// assert!(registry.has_worker("echo"));
/// assert!(!registry.has_worker("missing"));
/// ```
#[derive(Default)]
pub struct WorkerRegistry {
    workers: HashMap<String, Box<dyn Worker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self {
            workers: HashMap::new(),
        }
    }

    /// Register a worker under its own operation name, replacing any previous one
    pub fn register<W>(&mut self, worker: W)
    where
        W: Worker + 'static,
    {
        let operation = worker.operation().to_string();
        self.workers.insert(operation, Box::new(worker));
    }

    /// Register a plain function as the handler for `operation`
    pub fn register_fn<F>(&mut self, operation: impl Into<String>, function: F)
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.register(FnWorker::new(operation, function));
    }

    pub fn get_worker(&self, operation: &str) -> Option<&dyn Worker> {
        self.workers.get(operation).map(|w| w.as_ref())
    }

    /// All registered operation names, sorted
    pub fn operations(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.workers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn has_worker(&self, operation: &str) -> bool {
        self.workers.contains_key(operation)
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}
