use async_trait::async_trait;
use redis::{
    AsyncCommands, Client, RedisResult,
    aio::{ConnectionManager, MultiplexedConnection},
};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;

use super::{RedisConfig, ResultStore, StorageError, TaskQueue, redact_url};
use crate::core::{Job, JobState, QueueMessage};

/// Compare-and-set for terminal states: only a PENDING record is overwritten,
/// and the record's expiry is reset from the moment it finished.
const COMPLETE_SCRIPT: &str = r#"
    local job_key = KEYS[1]
    local new_job = ARGV[1]
    local ttl = tonumber(ARGV[2])

    local current = redis.call('GET', job_key)
    if not current then
        return -1
    end

    local job = cjson.decode(current)
    if job.state.status ~= 'PENDING' then
        return 0
    end

    if ttl > 0 then
        redis.call('SET', job_key, new_job, 'EX', ttl)
    else
        redis.call('SET', job_key, new_job)
    end
    return 1
"#;

/// Redis-backed queue and result store
///
/// Each queue is a Redis list (`LPUSH` to enqueue, `BRPOP` to consume, which
/// gives FIFO order). Each job record is a JSON string under its own key with
/// an optional expiry. The [`ConnectionManager`] is cheap to clone and safe
/// to use from many tasks at once.
///
/// `BRPOP` blocks the whole connection it is sent on, so blocking pops never
/// use the shared manager. Each pop borrows a dedicated connection from
/// `blocking` and hands it back once the command has returned.
pub struct RedisStorage {
    client: Client,
    connection_manager: ConnectionManager,
    blocking: Mutex<Vec<MultiplexedConnection>>,
    config: RedisConfig,
}

impl RedisStorage {
    pub async fn with_config(config: RedisConfig) -> Result<Self, StorageError> {
        let client = Client::open(config.url.as_str()).map_err(|e| {
            StorageError::connection_with_source("Failed to create Redis client", Box::new(e))
        })?;

        let connection_manager = timeout(
            config.connection_timeout,
            ConnectionManager::new(client.clone()),
        )
            .await
            .map_err(|_| StorageError::timeout(config.connection_timeout.as_millis() as u64))?
            .map_err(|e| {
                StorageError::connection_with_source(
                    "Failed to create connection manager",
                    Box::new(e),
                )
            })?;

        tracing::debug!(url = %redact_url(&config.url), prefix = %config.key_prefix, "Connected to Redis");

        Ok(Self {
            client,
            connection_manager,
            blocking: Mutex::new(Vec::new()),
            config,
        })
    }

    /// An idle connection reserved for blocking commands, opened on demand
    async fn blocking_connection(&self) -> Result<MultiplexedConnection, StorageError> {
        if let Some(conn) = self.blocking.lock().await.pop() {
            return Ok(conn);
        }

        timeout(
            self.config.connection_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| StorageError::timeout(self.config.connection_timeout.as_millis() as u64))?
        .map_err(|e| {
            StorageError::connection_with_source(
                "Failed to open blocking connection",
                Box::new(e),
            )
        })
    }

    /// Execute a Redis command with the configured timeout
    async fn with_timeout<F, T>(&self, limit: Duration, operation: F) -> Result<T, StorageError>
    where
        F: std::future::Future<Output = RedisResult<T>>,
    {
        timeout(limit, operation)
            .await
            .map_err(|_| StorageError::timeout(limit.as_millis() as u64))?
            .map_err(|e| {
                StorageError::operation_failed_with_source(
                    "Redis command",
                    e.to_string(),
                    Box::new(e),
                )
            })
    }

    fn job_key(&self, job_id: &str) -> String {
        format!("{}:job:{}", self.config.key_prefix, job_id)
    }

    fn queue_key(&self, queue: &str) -> String {
        format!("{}:queue:{}", self.config.key_prefix, queue)
    }

    fn queue_name<'a>(&self, key: &'a str) -> &'a str {
        key.rsplit_once(":queue:")
            .map(|(_, name)| name)
            .unwrap_or(key)
    }

    fn ttl_seconds(&self) -> u64 {
        self.config
            .result_ttl
            .map(|ttl| ttl.as_secs().max(1))
            .unwrap_or(0)
    }

    fn encode_job(job: &Job) -> Result<String, StorageError> {
        serde_json::to_string(job).map_err(|e| {
            StorageError::serialization_with_source("Failed to serialize job", Box::new(e))
        })
    }
}

#[async_trait]
impl TaskQueue for RedisStorage {
    async fn push(&self, message: &QueueMessage) -> Result<(), StorageError> {
        let mut conn = self.connection_manager.clone();
        let payload = serde_json::to_string(message).map_err(|e| {
            StorageError::serialization_with_source("Failed to encode queue message", Box::new(e))
        })?;

        self.with_timeout::<_, ()>(
            self.config.command_timeout,
            conn.lpush(self.queue_key(&message.queue), payload),
        )
        .await
    }

    async fn pop(
        &self,
        queues: &[String],
        wait: Duration,
    ) -> Result<Option<QueueMessage>, StorageError> {
        if queues.is_empty() {
            return Ok(None);
        }

        let mut conn = self.blocking_connection().await?;
        let keys: Vec<String> = queues.iter().map(|q| self.queue_key(q)).collect();

        // BRPOP with 0 blocks forever, so never send less than a millisecond.
        let block_secs = wait.as_secs_f64().max(0.001);
        let popped: Result<Option<(String, String)>, StorageError> = self
            .with_timeout(
                wait + self.config.command_timeout,
                conn.brpop(keys, block_secs),
            )
            .await;

        // A connection whose command failed or timed out may still be blocked
        // server side; drop it instead of reusing it.
        if popped.is_ok() {
            self.blocking.lock().await.push(conn);
        }

        let popped = popped?;

        match popped {
            Some((key, payload)) => {
                let message: QueueMessage = serde_json::from_str(&payload).map_err(|e| {
                    StorageError::serialization_with_source(
                        format!(
                            "Failed to decode message from queue {}",
                            self.queue_name(&key)
                        ),
                        Box::new(e),
                    )
                })?;
                Ok(Some(message))
            }
            None => Ok(None),
        }
    }

    async fn len(&self, queue: &str) -> Result<usize, StorageError> {
        let mut conn = self.connection_manager.clone();
        self.with_timeout(self.config.command_timeout, conn.llen(self.queue_key(queue)))
            .await
    }
}

#[async_trait]
impl ResultStore for RedisStorage {
    async fn create(&self, job: &Job) -> Result<(), StorageError> {
        let mut conn = self.connection_manager.clone();
        let job_key = self.job_key(&job.id);
        let job_json = Self::encode_job(job)?;

        match self.ttl_seconds() {
            0 => {
                self.with_timeout::<_, ()>(self.config.command_timeout, conn.set(&job_key, job_json))
                    .await
            }
            ttl => {
                self.with_timeout::<_, ()>(
                    self.config.command_timeout,
                    conn.set_ex(&job_key, job_json, ttl),
                )
                .await
            }
        }
    }

    async fn get(&self, job_id: &str) -> Result<Option<Job>, StorageError> {
        let mut conn = self.connection_manager.clone();
        let job_key = self.job_key(job_id);

        let job_json: Option<String> = self
            .with_timeout(self.config.command_timeout, conn.get(&job_key))
            .await?;

        match job_json {
            Some(json) => {
                let job: Job = serde_json::from_str(&json).map_err(|e| {
                    StorageError::serialization_with_source(
                        "Failed to deserialize job",
                        Box::new(e),
                    )
                })?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    async fn complete(&self, job_id: &str, state: JobState) -> Result<bool, StorageError> {
        let mut job = match self.get(job_id).await? {
            Some(job) => job,
            None => return Err(StorageError::job_not_found(job_id)),
        };

        if job.set_state(state).is_err() {
            return Ok(false);
        }

        let mut conn = self.connection_manager.clone();
        let job_json = Self::encode_job(&job)?;

        let outcome: i32 = self
            .with_timeout(
                self.config.command_timeout,
                redis::Script::new(COMPLETE_SCRIPT)
                    .key(self.job_key(job_id))
                    .arg(job_json)
                    .arg(self.ttl_seconds())
                    .invoke_async(&mut conn),
            )
            .await?;

        match outcome {
            1 => Ok(true),
            0 => Ok(false),
            _ => Err(StorageError::job_not_found(job_id)),
        }
    }

    async fn delete(&self, job_id: &str) -> Result<bool, StorageError> {
        let mut conn = self.connection_manager.clone();
        let deleted: i32 = self
            .with_timeout(self.config.command_timeout, conn.del(self.job_key(job_id)))
            .await?;
        Ok(deleted > 0)
    }
}
