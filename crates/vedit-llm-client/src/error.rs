//! LLM client error types.

use thiserror::Error;

/// Result type for completion calls.
pub type LlmResult<T> = Result<T, LlmError>;

/// Errors from the language-model service.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Language model is not configured")]
    Disabled,

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    pub fn request(msg: impl Into<String>) -> Self {
        Self::Request(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }
}
