//! Job queue using Redis Streams.

use async_trait::async_trait;
use redis::streams::{StreamClaimReply, StreamId, StreamPendingCountReply, StreamReadReply};
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::job::EditJob;

/// TTL of the per-job dedup marker.
const DEDUP_TTL_SECS: u64 = 3600;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for jobs
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Dead letter stream name
    pub dlq_stream_name: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "vedit:jobs".to_string(),
            consumer_group: "vedit:workers".to_string(),
            dlq_stream_name: "vedit:dlq".to_string(),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            stream_name: std::env::var("QUEUE_STREAM").unwrap_or(defaults.stream_name),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            dlq_stream_name: std::env::var("QUEUE_DLQ_STREAM").unwrap_or(defaults.dlq_stream_name),
        }
    }
}

/// Producer side of the queue, as seen by the API.
#[async_trait]
pub trait JobDispatch: Send + Sync {
    /// Enqueue a job, returning the stream message ID.
    async fn enqueue(&self, job: &EditJob) -> QueueResult<String>;

    /// Check the broker is reachable.
    async fn ping(&self) -> QueueResult<()>;
}

/// Job queue client.
#[derive(Clone)]
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl JobQueue {
    /// Create a new job queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())
            .map_err(|e| QueueError::connection_failed(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    async fn connection(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Initialize the queue (create consumer group if not exists).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Add a job to the stream. Rejects a job ID that was enqueued within the dedup window.
    pub async fn enqueue_edit(&self, job: &EditJob) -> QueueResult<String> {
        let mut conn = self.connection().await?;

        let payload = serde_json::to_string(job)?;
        let idempotency_key = job.idempotency_key();
        let dedup_key = format!("vedit:dedup:{}", idempotency_key);

        let fresh: bool = redis::cmd("SET")
            .arg(&dedup_key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(DEDUP_TTL_SECS)
            .query_async::<Option<String>>(&mut conn)
            .await?
            .is_some();
        if !fresh {
            warn!("Duplicate job rejected: {}", idempotency_key);
            return Err(QueueError::Duplicate(idempotency_key));
        }

        let added: Result<String, redis::RedisError> = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("key")
            .arg(&idempotency_key)
            .query_async(&mut conn)
            .await;

        let message_id = match added {
            Ok(id) => id,
            Err(e) => {
                // Let a retry through
                let _: Result<(), _> = conn.del(&dedup_key).await;
                return Err(QueueError::enqueue_failed(e.to_string()));
            }
        };

        info!(
            job_id = %job.job_id,
            project_id = %job.project_id,
            "Enqueued job with message ID {}",
            message_id
        );

        Ok(message_id)
    }

    /// Acknowledge a message and remove it from the stream.
    pub async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!("Acknowledged message: {}", message_id);
        Ok(())
    }

    /// Copy a job to the dead letter stream and acknowledge the original.
    pub async fn dlq(&self, message_id: &str, job: &EditJob, error: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        let payload = serde_json::to_string(job)?;

        redis::cmd("XADD")
            .arg(&self.config.dlq_stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(message_id).await?;

        warn!(job_id = %job.job_id, "Moved job to DLQ: {}", error);
        Ok(())
    }

    /// Get queue length.
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.connection().await?;
        let len: u64 = conn.xlen(&self.config.stream_name).await?;
        Ok(len)
    }

    /// Get DLQ length.
    pub async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.connection().await?;
        let len: u64 = conn.xlen(&self.config.dlq_stream_name).await?;
        Ok(len)
    }

    /// Read new messages for this consumer, blocking up to `block_ms`.
    pub async fn consume(
        &self,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<(String, EditJob)>> {
        let mut conn = self.connection().await?;

        let result: Option<StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let entries = result
            .map(|reply| reply.keys.into_iter().flat_map(|key| key.ids).collect())
            .unwrap_or_default();

        Ok(self.decode_entries(entries).await)
    }

    /// Claim messages another consumer has held for at least `min_idle_ms`.
    ///
    /// Used to reap jobs from crashed workers; the caller decides what to do
    /// with them.
    pub async fn claim_stale(
        &self,
        consumer_name: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<(String, EditJob)>> {
        let mut conn = self.connection().await?;

        let pending: StreamPendingCountReply = conn
            .xpending_count(
                &self.config.stream_name,
                &self.config.consumer_group,
                "-",
                "+",
                count,
            )
            .await?;

        let stale: Vec<String> = pending
            .ids
            .into_iter()
            .filter(|p| p.last_delivered_ms as u64 >= min_idle_ms)
            .map(|p| p.id)
            .collect();

        if stale.is_empty() {
            return Ok(Vec::new());
        }

        let claimed: StreamClaimReply = conn
            .xclaim(
                &self.config.stream_name,
                &self.config.consumer_group,
                consumer_name,
                min_idle_ms,
                &stale,
            )
            .await?;

        let jobs = self.decode_entries(claimed.ids).await;
        for (message_id, job) in &jobs {
            info!(job_id = %job.job_id, "Claimed stale message {}", message_id);
        }
        Ok(jobs)
    }

    async fn decode_entries(&self, entries: Vec<StreamId>) -> Vec<(String, EditJob)> {
        let mut jobs = Vec::with_capacity(entries.len());

        for entry in entries {
            match decode_entry(&entry) {
                Ok(job) => {
                    debug!(job_id = %job.job_id, "Consumed job from stream");
                    jobs.push((entry.id, job));
                }
                Err(e) => {
                    warn!("Failed to parse job payload {}: {}", entry.id, e);
                    // Ack the malformed message to prevent reprocessing
                    self.ack(&entry.id).await.ok();
                }
            }
        }

        jobs
    }

    /// Check the connection.
    pub async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

fn decode_entry(entry: &StreamId) -> QueueResult<EditJob> {
    let payload: String = entry
        .get("job")
        .ok_or_else(|| QueueError::MalformedMessage(format!("{} has no job field", entry.id)))?;
    Ok(serde_json::from_str(&payload)?)
}

#[async_trait]
impl JobDispatch for JobQueue {
    async fn enqueue(&self, job: &EditJob) -> QueueResult<String> {
        self.enqueue_edit(job).await
    }

    async fn ping(&self) -> QueueResult<()> {
        JobQueue::ping(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use vedit_models::{JobId, ProjectId};

    #[test]
    fn test_default_config() {
        let config = QueueConfig::default();
        assert_eq!(config.stream_name, "vedit:jobs");
        assert_eq!(config.consumer_group, "vedit:workers");
        assert_eq!(config.dlq_stream_name, "vedit:dlq");
    }

    #[test]
    fn test_decode_entry() {
        let job = EditJob::new(JobId::from_string("j1"), ProjectId::from_string("p1"));
        let mut map = HashMap::new();
        map.insert(
            "job".to_string(),
            redis::Value::BulkString(serde_json::to_vec(&job).unwrap()),
        );
        let entry = StreamId {
            id: "1-0".to_string(),
            map,
        };
        assert_eq!(decode_entry(&entry).unwrap(), job);
    }

    #[test]
    fn test_decode_entry_rejects_garbage() {
        let mut map = HashMap::new();
        map.insert(
            "job".to_string(),
            redis::Value::BulkString(b"not json".to_vec()),
        );
        let entry = StreamId {
            id: "1-0".to_string(),
            map,
        };
        assert!(matches!(decode_entry(&entry), Err(QueueError::Json(_))));

        let empty = StreamId {
            id: "2-0".to_string(),
            map: HashMap::new(),
        };
        assert!(decode_entry(&empty).is_err());
    }

    #[test]
    fn test_invalid_url() {
        let config = QueueConfig {
            redis_url: "not a url".to_string(),
            ..QueueConfig::default()
        };
        assert!(matches!(
            JobQueue::new(config),
            Err(QueueError::ConnectionFailed(_))
        ));
    }
}
