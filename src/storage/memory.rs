use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::{MemoryConfig, ResultStore, StorageError, TaskQueue};
use crate::core::{Job, JobState, QueueMessage};

/// Job record plus the moment it stops being readable
#[derive(Debug, Clone)]
struct StoredJob {
    job: Job,
    expires_at: Option<DateTime<Utc>>,
}

impl StoredJob {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process queue and result store
///
/// Queues are `VecDeque`s behind a mutex, records live in a `HashMap` behind
/// an `RwLock`. Poppers park on a [`Notify`] instead of spinning. Nothing
/// survives the process, so this backend only makes sense when the workers
/// run inside the same process as the dispatcher (development and tests).
#[derive(Debug)]
pub struct MemoryStorage {
    queues: Mutex<HashMap<String, VecDeque<QueueMessage>>>,
    jobs: RwLock<HashMap<String, StoredJob>>,
    arrivals: Notify,
    config: MemoryConfig,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::with_config(MemoryConfig::default())
    }

    pub fn with_config(config: MemoryConfig) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            jobs: RwLock::new(HashMap::new()),
            arrivals: Notify::new(),
            config,
        }
    }

    /// Number of job records currently held, expired ones included until purged
    pub fn job_count(&self) -> usize {
        self.jobs.read().map(|jobs| jobs.len()).unwrap_or(0)
    }

    /// Drop every record whose retention period has passed
    pub fn purge_expired(&self) -> Result<usize, StorageError> {
        let now = Utc::now();
        let mut jobs = self.write_jobs()?;
        let before = jobs.len();
        jobs.retain(|_, stored| !stored.is_expired(now));
        Ok(before - jobs.len())
    }

    fn expiry_from_now(&self) -> Option<DateTime<Utc>> {
        self.config
            .result_ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .map(|ttl| Utc::now() + ttl)
    }

    fn lock_queues(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<String, VecDeque<QueueMessage>>>, StorageError> {
        self.queues
            .lock()
            .map_err(|_| StorageError::unavailable("memory queue lock poisoned"))
    }

    fn read_jobs(&self) -> Result<RwLockReadGuard<'_, HashMap<String, StoredJob>>, StorageError> {
        self.jobs
            .read()
            .map_err(|_| StorageError::unavailable("memory result store lock poisoned"))
    }

    fn write_jobs(
        &self,
    ) -> Result<RwLockWriteGuard<'_, HashMap<String, StoredJob>>, StorageError> {
        self.jobs
            .write()
            .map_err(|_| StorageError::unavailable("memory result store lock poisoned"))
    }

    /// Drop up to `count` finished records, oldest first
    ///
    /// Pending records are never evicted; a worker still has to complete them.
    fn evict_finished(jobs: &mut HashMap<String, StoredJob>, count: usize) {
        let mut finished: Vec<(DateTime<Utc>, String)> = jobs
            .values()
            .filter_map(|stored| {
                let finished_at = stored.job.state.finished_at()?;
                Some((finished_at, stored.job.id.clone()))
            })
            .collect();
        finished.sort_unstable();

        for (_, id) in finished.into_iter().take(count) {
            jobs.remove(&id);
        }
    }

    /// Take the head of the first non-empty queue, in the order given
    fn try_pop(&self, queues: &[String]) -> Result<Option<QueueMessage>, StorageError> {
        let mut guard = self.lock_queues()?;
        for name in queues {
            if let Some(message) = guard.get_mut(name).and_then(|queue| queue.pop_front()) {
                return Ok(Some(message));
            }
        }
        Ok(None)
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskQueue for MemoryStorage {
    async fn push(&self, message: &QueueMessage) -> Result<(), StorageError> {
        {
            let mut queues = self.lock_queues()?;
            queues
                .entry(message.queue.clone())
                .or_default()
                .push_back(message.clone());
        }

        self.arrivals.notify_waiters();
        Ok(())
    }

    async fn pop(
        &self,
        queues: &[String],
        wait: Duration,
    ) -> Result<Option<QueueMessage>, StorageError> {
        let deadline = Instant::now() + wait;

        loop {
            // Register interest before looking so a push between the check
            // and the await still wakes us.
            let notified = self.arrivals.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(message) = self.try_pop(queues)? {
                return Ok(Some(message));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.try_pop(queues);
            }
        }
    }

    async fn len(&self, queue: &str) -> Result<usize, StorageError> {
        let queues = self.lock_queues()?;
        Ok(queues.get(queue).map(VecDeque::len).unwrap_or(0))
    }
}

#[async_trait]
impl ResultStore for MemoryStorage {
    async fn create(&self, job: &Job) -> Result<(), StorageError> {
        let now = Utc::now();
        let expires_at = self.expiry_from_now();
        let mut jobs = self.write_jobs()?;

        if let Some(max_jobs) = self.config.max_jobs {
            if jobs.len() >= max_jobs {
                jobs.retain(|_, stored| !stored.is_expired(now));
            }
            if jobs.len() >= max_jobs {
                let excess = jobs.len() + 1 - max_jobs;
                Self::evict_finished(&mut jobs, excess);
            }
            if jobs.len() >= max_jobs {
                return Err(StorageError::capacity_exceeded(format!(
                    "Memory storage holds {} pending jobs",
                    jobs.len()
                )));
            }
        }

        jobs.insert(
            job.id.clone(),
            StoredJob {
                job: job.clone(),
                expires_at,
            },
        );

        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<Job>, StorageError> {
        let now = Utc::now();
        let expired = {
            let jobs = self.read_jobs()?;
            match jobs.get(job_id) {
                Some(stored) if !stored.is_expired(now) => return Ok(Some(stored.job.clone())),
                Some(_) => true,
                None => false,
            }
        };

        if expired {
            self.write_jobs()?.remove(job_id);
        }
        Ok(None)
    }

    async fn complete(&self, job_id: &str, state: JobState) -> Result<bool, StorageError> {
        let now = Utc::now();
        let expires_at = self.expiry_from_now();
        let mut jobs = self.write_jobs()?;

        let stored = match jobs.get_mut(job_id) {
            Some(stored) if !stored.is_expired(now) => stored,
            _ => return Err(StorageError::job_not_found(job_id)),
        };

        if stored.job.set_state(state).is_err() {
            return Ok(false);
        }
        stored.expires_at = expires_at;

        Ok(true)
    }

    async fn delete(&self, job_id: &str) -> Result<bool, StorageError> {
        let mut jobs = self.write_jobs()?;
        Ok(jobs.remove(job_id).is_some())
    }
}
