//! Edit job records.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::{Directive, ProjectId};

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Created, waiting for a worker
    #[default]
    Pending,
    /// A worker is running the pipeline
    Processing,
    /// Output rendered and uploaded
    Completed,
    /// Terminated with an error
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected state change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid job transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: JobState,
    pub to: JobState,
}

/// Payload stored on a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobResult {
    /// Storage key of the rendered video
    pub output_key: String,
    /// Directive the prompt was interpreted into
    pub parsed_prompt: Directive,
    /// Number of clips that made it into the render
    pub clips_count: usize,
}

/// An edit job for one project.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    pub id: JobId,
    pub project_id: ProjectId,

    #[serde(default)]
    pub status: JobState,

    /// Queue message ID the job was dispatched under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,

    /// Progress (0-100)
    #[serde(default)]
    pub progress: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a pending job for a project.
    pub fn new(project_id: ProjectId) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            project_id,
            status: JobState::Pending,
            task_id: None,
            progress: 0.0,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    fn transition(&mut self, to: JobState) -> Result<(), InvalidTransition> {
        let allowed = match (self.status, to) {
            (JobState::Pending, JobState::Processing) => true,
            (JobState::Processing, JobState::Completed) => true,
            (JobState::Pending | JobState::Processing, JobState::Failed) => true,
            _ => false,
        };
        if !allowed {
            return Err(InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Start processing the job.
    pub fn start(&mut self) -> Result<(), InvalidTransition> {
        self.transition(JobState::Processing)?;
        self.started_at = Some(self.updated_at);
        Ok(())
    }

    /// Mark job as completed.
    pub fn complete(&mut self, result: JobResult) -> Result<(), InvalidTransition> {
        self.transition(JobState::Completed)?;
        self.result = Some(result);
        self.progress = 100.0;
        self.completed_at = Some(self.updated_at);
        Ok(())
    }

    /// Mark job as failed.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), InvalidTransition> {
        self.transition(JobState::Failed)?;
        self.error = Some(error.into());
        self.completed_at = Some(self.updated_at);
        Ok(())
    }

    /// Update progress. Ignored once the job is terminal.
    pub fn set_progress(&mut self, progress: f32) {
        if self.status.is_terminal() {
            return;
        }
        self.progress = progress.clamp(0.0, 100.0);
        self.updated_at = Utc::now();
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
