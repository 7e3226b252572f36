use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::diagnosis::DiagnosisResult;
use crate::models::job::{DiagnosisJob, QueuedJob};

const QUEUE_KEY: &str = "agri_diagnose:jobs";
const PROCESSING_KEY: &str = "agri_diagnose:processing";
const JOB_KEY_PREFIX: &str = "agri_diagnose:job:";

/// Job queue plus the result store pollers read from.
///
/// A job record is written as `Pending` before its payload is queued, so a
/// submitted id is always pollable.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Record a `Pending` job and queue it.
    async fn submit(&self, job: &QueuedJob) -> Result<DiagnosisJob, QueueError>;

    /// Hand the oldest queued job to the caller, if any.
    async fn dequeue(&self) -> Result<Option<QueuedJob>, QueueError>;

    async fn get(&self, job_id: Uuid) -> Result<Option<DiagnosisJob>, QueueError>;

    async fn mark_running(&self, job: &QueuedJob) -> Result<(), QueueError>;

    /// Write the terminal record and release the job from the processing list.
    async fn finish(
        &self,
        job: &QueuedJob,
        outcome: Result<DiagnosisResult, String>,
    ) -> Result<DiagnosisJob, QueueError>;

    /// Number of jobs waiting for a worker.
    async fn queue_depth(&self) -> Result<u64, QueueError>;

    /// Jobs handed to a worker and not yet finished. A job stays here if its
    /// worker died mid-run.
    async fn processing_depth(&self) -> Result<u64, QueueError>;

    async fn health_check(&self) -> Result<(), QueueError>;
}

fn job_key(job_id: Uuid) -> String {
    format!("{JOB_KEY_PREFIX}{job_id}")
}

/// Redis-backed queue (list + processing list) and result store (JSON keys with TTL).
pub struct RedisJobQueue {
    client: redis::Client,
    ttl_secs: u64,
}

impl RedisJobQueue {
    pub fn new(redis_url: &str, ttl_secs: u64) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self { client, ttl_secs })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, QueueError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)
    }

    async fn load(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        job_id: Uuid,
    ) -> Result<Option<DiagnosisJob>, QueueError> {
        let raw: Option<String> = conn.get(job_key(job_id)).await.map_err(QueueError::Redis)?;
        raw.map(|payload| serde_json::from_str(&payload).map_err(QueueError::Serialize))
            .transpose()
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn submit(&self, job: &QueuedJob) -> Result<DiagnosisJob, QueueError> {
        let mut conn = self.connection().await?;
        let record = DiagnosisJob::pending(job);
        let record_json = serde_json::to_string(&record).map_err(QueueError::Serialize)?;
        let payload = serde_json::to_string(job).map_err(QueueError::Serialize)?;

        redis::pipe()
            .atomic()
            .set_ex(job_key(job.job_id), record_json, self.ttl_secs)
            .ignore()
            .lpush(QUEUE_KEY, payload)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;

        Ok(record)
    }

    async fn dequeue(&self) -> Result<Option<QueuedJob>, QueueError> {
        let mut conn = self.connection().await?;
        let result: Option<String> = conn
            .rpoplpush(QUEUE_KEY, PROCESSING_KEY)
            .await
            .map_err(QueueError::Redis)?;

        match result {
            Some(payload) => {
                let job: QueuedJob =
                    serde_json::from_str(&payload).map_err(QueueError::Serialize)?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<DiagnosisJob>, QueueError> {
        let mut conn = self.connection().await?;
        self.load(&mut conn, job_id).await
    }

    async fn mark_running(&self, job: &QueuedJob) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let mut record = self
            .load(&mut conn, job.job_id)
            .await?
            .unwrap_or_else(|| DiagnosisJob::pending(job));
        record.mark_running();

        let record_json = serde_json::to_string(&record).map_err(QueueError::Serialize)?;
        conn.set_ex::<_, _, ()>(job_key(job.job_id), record_json, self.ttl_secs)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    async fn finish(
        &self,
        job: &QueuedJob,
        outcome: Result<DiagnosisResult, String>,
    ) -> Result<DiagnosisJob, QueueError> {
        let mut conn = self.connection().await?;
        let mut record = self
            .load(&mut conn, job.job_id)
            .await?
            .unwrap_or_else(|| DiagnosisJob::pending(job));
        record.finish(outcome);

        let record_json = serde_json::to_string(&record).map_err(QueueError::Serialize)?;
        let payload = serde_json::to_string(job).map_err(QueueError::Serialize)?;

        redis::pipe()
            .atomic()
            .set_ex(job_key(job.job_id), record_json, self.ttl_secs)
            .ignore()
            .lrem(PROCESSING_KEY, 1, payload)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;

        Ok(record)
    }

    async fn queue_depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;
        let depth: u64 = conn.llen(QUEUE_KEY).await.map_err(QueueError::Redis)?;
        Ok(depth)
    }

    async fn processing_depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;
        let depth: u64 = conn.llen(PROCESSING_KEY).await.map_err(QueueError::Redis)?;
        Ok(depth)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }
}

#[derive(Default)]
struct MemoryState {
    jobs: HashMap<Uuid, DiagnosisJob>,
    queued: VecDeque<QueuedJob>,
    processing: Vec<Uuid>,
}

/// In-process queue with the same contract as [`RedisJobQueue`].
#[derive(Default)]
pub struct MemoryJobQueue {
    state: Mutex<MemoryState>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn submit(&self, job: &QueuedJob) -> Result<DiagnosisJob, QueueError> {
        let mut state = self.state.lock().await;
        let record = DiagnosisJob::pending(job);
        state.jobs.insert(job.job_id, record.clone());
        state.queued.push_back(job.clone());
        Ok(record)
    }

    async fn dequeue(&self) -> Result<Option<QueuedJob>, QueueError> {
        let mut state = self.state.lock().await;
        let job = state.queued.pop_front();
        if let Some(job) = &job {
            state.processing.push(job.job_id);
        }
        Ok(job)
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<DiagnosisJob>, QueueError> {
        Ok(self.state.lock().await.jobs.get(&job_id).cloned())
    }

    async fn mark_running(&self, job: &QueuedJob) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        state
            .jobs
            .entry(job.job_id)
            .or_insert_with(|| DiagnosisJob::pending(job))
            .mark_running();
        Ok(())
    }

    async fn finish(
        &self,
        job: &QueuedJob,
        outcome: Result<DiagnosisResult, String>,
    ) -> Result<DiagnosisJob, QueueError> {
        let mut state = self.state.lock().await;
        let record = state
            .jobs
            .entry(job.job_id)
            .or_insert_with(|| DiagnosisJob::pending(job));
        record.finish(outcome);
        let record = record.clone();
        state.processing.retain(|id| *id != job.job_id);
        Ok(record)
    }

    async fn queue_depth(&self) -> Result<u64, QueueError> {
        Ok(self.state.lock().await.queued.len() as u64)
    }

    async fn processing_depth(&self) -> Result<u64, QueueError> {
        Ok(self.state.lock().await.processing.len() as u64)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
