//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// Job-fatal pipeline failure; the message is shown to the user as-is.
    #[error("{0}")]
    JobFailed(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Job exceeded the {0}s time limit")]
    Timeout(u64),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid job state: {0}")]
    InvalidState(#[from] vedit_models::InvalidTransition),

    #[error("Storage error: {0}")]
    Storage(#[from] vedit_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] vedit_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] vedit_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Label used for the `reason` dimension of the failure counter.
    pub fn reason(&self) -> &'static str {
        match self {
            WorkerError::JobFailed(_) => "pipeline",
            WorkerError::JobNotFound(_) | WorkerError::ProjectNotFound(_) => "missing_record",
            WorkerError::Timeout(_) => "timeout",
            WorkerError::ConfigError(_) => "config",
            WorkerError::InvalidState(_) => "invalid_state",
            WorkerError::Storage(_) => "storage",
            WorkerError::Media(_) => "media",
            WorkerError::Queue(_) => "queue",
            WorkerError::Io(_) => "io",
        }
    }
}
