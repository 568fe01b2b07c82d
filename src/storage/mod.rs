use async_trait::async_trait;
use std::time::Duration;

use crate::core::{Job, JobState, QueueMessage};

pub mod config;
pub mod error;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

#[cfg(feature = "redis")]
pub use config::RedisConfig;
pub use config::{DEFAULT_RESULT_TTL, MemoryConfig, StorageConfig, redact_url};
pub use error::StorageError;
pub use memory::MemoryStorage;
#[cfg(feature = "redis")]
pub use redis::RedisStorage;

/// Durable FIFO the dispatcher pushes job envelopes onto and workers pop from.
///
/// Implementations must be safe to share between concurrent submitters; the
/// backend serializes message ordering, callers never lock around it.
///
/// ## Examples
/// ```rust
/// use qdispatch::{Job, MemoryStorage, TaskQueue};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let queue = MemoryStorage::new();
/// let job = Job::new("add_together", vec![2.into(), 3.into()]);
///
/// queue.push(&job.to_message()).await.unwrap();
/// assert_eq!(queue.len("default").await.unwrap(), 1);
///
/// let message = queue
///     .pop(&["default".to_string()], Duration::from_millis(10))
///     .await
///     .unwrap()
///     .unwrap();
/// assert_eq!(message.id, job.id);
/// # });
/// ```
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Append a message to the tail of its queue.
    async fn push(&self, message: &QueueMessage) -> Result<(), StorageError>;

    /// Take the oldest message from the first non-empty queue in `queues`,
    /// waiting at most `wait` for one to arrive.
    ///
    /// Returns `Ok(None)` when nothing arrived in time.
    async fn pop(
        &self,
        queues: &[String],
        wait: Duration,
    ) -> Result<Option<QueueMessage>, StorageError>;

    /// Number of messages waiting on a queue.
    async fn len(&self, queue: &str) -> Result<usize, StorageError>;
}

/// Key-value store of job records addressed by job id.
///
/// The dispatcher only ever writes the `PENDING` record; terminal states are
/// written by the worker path through [`ResultStore::complete`].
///
/// ## Examples
/// ```rust
/// use qdispatch::{Job, JobState, JobStatus, MemoryStorage, ResultStore};
///
/// # tokio_test::block_on(async {
/// let store = MemoryStorage::new();
/// let job = Job::new("add_together", vec![]);
/// store.create(&job).await.unwrap();
///
/// let applied = store
///     .complete(&job.id, JobState::success(3, Some(5.0.into())))
///     .await
///     .unwrap();
/// assert!(applied);
///
/// let stored = store.get(&job.id).await.unwrap().unwrap();
/// assert_eq!(stored.status(), JobStatus::Success);
///
/// // A second terminal write is refused
/// assert!(!store.complete(&job.id, JobState::failure("late")).await.unwrap());
/// # });
/// ```
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Write the initial record of a newly submitted job.
    async fn create(&self, job: &Job) -> Result<(), StorageError>;

    /// Look up a job record. `Ok(None)` for unknown or expired ids.
    async fn get(&self, job_id: &str) -> Result<Option<Job>, StorageError>;

    /// Apply a terminal state to a pending job.
    ///
    /// ## Returns
    /// * `Ok(true)` - the record was pending and now holds `state`
    /// * `Ok(false)` - the record was already terminal and was left untouched
    /// * `Err(StorageError::JobNotFound)` - no record for `job_id`
    async fn complete(&self, job_id: &str, state: JobState) -> Result<bool, StorageError>;

    /// Remove a job record. Returns whether one existed.
    async fn delete(&self, job_id: &str) -> Result<bool, StorageError>;
}

/// Storage instance that can hold any storage implementation
pub enum StorageInstance {
    /// In-process storage instance
    Memory(MemoryStorage),
    /// Redis storage instance
    #[cfg(feature = "redis")]
    Redis(RedisStorage),
}

impl StorageInstance {
    /// Create a storage instance from configuration
    ///
    /// ```rust
    /// use qdispatch::storage::{MemoryConfig, StorageConfig, StorageInstance};
    ///
    /// # tokio_test::block_on(async {
    /// let config = StorageConfig::Memory(MemoryConfig::default());
    /// let storage = StorageInstance::from_config(config).await.unwrap();
    /// # });
    /// ```
    pub async fn from_config(config: StorageConfig) -> Result<Self, StorageError> {
        match config {
            StorageConfig::Memory(memory_config) => Ok(StorageInstance::Memory(
                MemoryStorage::with_config(memory_config),
            )),
            #[cfg(feature = "redis")]
            StorageConfig::Redis(redis_config) => {
                let redis_storage = RedisStorage::with_config(redis_config).await?;
                Ok(StorageInstance::Redis(redis_storage))
            }
        }
    }

    /// Create an in-process storage instance with default configuration
    pub fn memory() -> Self {
        StorageInstance::Memory(MemoryStorage::new())
    }

    #[cfg(feature = "redis")]
    pub async fn redis(config: RedisConfig) -> Result<Self, StorageError> {
        let redis_storage = RedisStorage::with_config(config).await?;
        Ok(StorageInstance::Redis(redis_storage))
    }

    /// Name of the backend, for logs
    pub fn backend_name(&self) -> &'static str {
        match self {
            StorageInstance::Memory(_) => "memory",
            #[cfg(feature = "redis")]
            StorageInstance::Redis(_) => "redis",
        }
    }
}

#[async_trait]
impl TaskQueue for StorageInstance {
    async fn push(&self, message: &QueueMessage) -> Result<(), StorageError> {
        match self {
            StorageInstance::Memory(storage) => storage.push(message).await,
            #[cfg(feature = "redis")]
            StorageInstance::Redis(storage) => storage.push(message).await,
        }
    }

    async fn pop(
        &self,
        queues: &[String],
        wait: Duration,
    ) -> Result<Option<QueueMessage>, StorageError> {
        match self {
            StorageInstance::Memory(storage) => storage.pop(queues, wait).await,
            #[cfg(feature = "redis")]
            StorageInstance::Redis(storage) => storage.pop(queues, wait).await,
        }
    }

    async fn len(&self, queue: &str) -> Result<usize, StorageError> {
        match self {
            StorageInstance::Memory(storage) => TaskQueue::len(storage, queue).await,
            #[cfg(feature = "redis")]
            StorageInstance::Redis(storage) => storage.len(queue).await,
        }
    }
}

#[async_trait]
impl ResultStore for StorageInstance {
    async fn create(&self, job: &Job) -> Result<(), StorageError> {
        match self {
            StorageInstance::Memory(storage) => storage.create(job).await,
            #[cfg(feature = "redis")]
            StorageInstance::Redis(storage) => storage.create(job).await,
        }
    }

    async fn get(&self, job_id: &str) -> Result<Option<Job>, StorageError> {
        match self {
            StorageInstance::Memory(storage) => storage.get(job_id).await,
            #[cfg(feature = "redis")]
            StorageInstance::Redis(storage) => storage.get(job_id).await,
        }
    }

    async fn complete(&self, job_id: &str, state: JobState) -> Result<bool, StorageError> {
        match self {
            StorageInstance::Memory(storage) => storage.complete(job_id, state).await,
            #[cfg(feature = "redis")]
            StorageInstance::Redis(storage) => storage.complete(job_id, state).await,
        }
    }

    async fn delete(&self, job_id: &str) -> Result<bool, StorageError> {
        match self {
            StorageInstance::Memory(storage) => storage.delete(job_id).await,
            #[cfg(feature = "redis")]
            StorageInstance::Redis(storage) => storage.delete(job_id).await,
        }
    }
}
