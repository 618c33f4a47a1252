//! Structured job logging.

use tracing::{error, info, warn, Span};
use vedit_models::{JobId, ProjectId};

/// Logs job lifecycle events with the job and project attached.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    project_id: String,
    operation: &'static str,
}

impl JobLogger {
    pub fn new(job_id: &JobId, project_id: &ProjectId, operation: &'static str) -> Self {
        Self {
            job_id: job_id.to_string(),
            project_id: project_id.to_string(),
            operation,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            project_id = %self.project_id,
            operation = self.operation,
            "Job started: {}", message
        );
    }

    pub fn log_progress(&self, progress: f32, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            progress,
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            operation = self.operation,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            project_id = %self.project_id,
            operation = self.operation,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            project_id = %self.project_id,
            operation = self.operation,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn operation(&self) -> &str {
        self.operation
    }

    /// Span wrapping the whole job future.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            project_id = %self.project_id,
            operation = self.operation
        )
    }
}
