//! Queue message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vedit_models::{JobId, ProjectId};

/// Request to run the edit pipeline for one project.
///
/// The prompt and assets are resolved from the project record when the
/// job runs, so the message stays small.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditJob {
    pub job_id: JobId,
    pub project_id: ProjectId,
    pub created_at: DateTime<Utc>,
}

impl EditJob {
    pub fn new(job_id: JobId, project_id: ProjectId) -> Self {
        Self {
            job_id,
            project_id,
            created_at: Utc::now(),
        }
    }

    /// Generate idempotency key for deduplication.
    pub fn idempotency_key(&self) -> String {
        format!("edit:{}", self.job_id)
    }
}
