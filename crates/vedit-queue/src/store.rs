//! Job and project records.
//!
//! Records are JSON documents; the latest-job index per project is a sorted
//! set scored by job creation time so a late write from an older job never
//! hides a newer one.

use std::collections::HashMap;

use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::sync::RwLock;
use tracing::debug;
use vedit_models::{Job, JobId, Project, ProjectId};

use crate::error::QueueResult;

/// Persistence for job and project records.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn get_job(&self, id: &JobId) -> QueueResult<Option<Job>>;

    /// Insert or replace a job and index it under its project.
    async fn save_job(&self, job: &Job) -> QueueResult<()>;

    async fn get_project(&self, id: &ProjectId) -> QueueResult<Option<Project>>;

    async fn save_project(&self, project: &Project) -> QueueResult<()>;

    /// Most recently created job for a project.
    async fn latest_job_for_project(&self, id: &ProjectId) -> QueueResult<Option<Job>>;
}

fn job_key(id: &JobId) -> String {
    format!("vedit:job:{}", id)
}

fn project_key(id: &ProjectId) -> String {
    format!("vedit:project:{}", id)
}

fn latest_job_key(id: &ProjectId) -> String {
    format!("vedit:project:{}:latest_job", id)
}

/// Redis-backed record store.
#[derive(Clone)]
pub struct RedisJobStore {
    client: redis::Client,
}

impl RedisJobStore {
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    pub fn from_env() -> QueueResult<Self> {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        Self::new(&url)
    }

    async fn connection(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> QueueResult<Option<T>> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.get(key).await?;
        raw.map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(Into::into)
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn get_job(&self, id: &JobId) -> QueueResult<Option<Job>> {
        self.get_json(&job_key(id)).await
    }

    async fn save_job(&self, job: &Job) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(job)?;

        redis::pipe()
            .atomic()
            .set(job_key(&job.id), payload)
            .ignore()
            .zadd(
                latest_job_key(&job.project_id),
                job.id.as_str(),
                job.created_at.timestamp_millis(),
            )
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        debug!(job_id = %job.id, status = %job.status, "Saved job");
        Ok(())
    }

    async fn get_project(&self, id: &ProjectId) -> QueueResult<Option<Project>> {
        self.get_json(&project_key(id)).await
    }

    async fn save_project(&self, project: &Project) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(project)?;
        conn.set::<_, _, ()>(project_key(&project.id), payload).await?;
        debug!(project_id = %project.id, "Saved project");
        Ok(())
    }

    async fn latest_job_for_project(&self, id: &ProjectId) -> QueueResult<Option<Job>> {
        let mut conn = self.connection().await?;
        let newest: Vec<String> = conn.zrevrange(latest_job_key(id), 0, 0).await?;
        match newest.into_iter().next() {
            Some(job_id) => self.get_job(&JobId::from_string(job_id)).await,
            None => Ok(None),
        }
    }
}

/// In-process record store for tests and single-node development.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    projects: RwLock<HashMap<ProjectId, Project>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn get_job(&self, id: &JobId) -> QueueResult<Option<Job>> {
        Ok(self.jobs.read().await.get(id).cloned())
    }

    async fn save_job(&self, job: &Job) -> QueueResult<()> {
        self.jobs.write().await.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get_project(&self, id: &ProjectId) -> QueueResult<Option<Project>> {
        Ok(self.projects.read().await.get(id).cloned())
    }

    async fn save_project(&self, project: &Project) -> QueueResult<()> {
        self.projects
            .write()
            .await
            .insert(project.id.clone(), project.clone());
        Ok(())
    }

    async fn latest_job_for_project(&self, id: &ProjectId) -> QueueResult<Option<Job>> {
        Ok(self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| &job.project_id == id)
            .max_by_key(|job| job.created_at)
            .cloned())
    }
}
