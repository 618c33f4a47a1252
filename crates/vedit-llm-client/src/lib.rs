//! Client for an Ollama-compatible text-completion service.
//!
//! The edit pipeline only needs "prompt in, free text out", so the
//! [`CompletionService`] trait is the seam; [`OllamaClient`] is the
//! production implementation.

pub mod client;
pub mod error;

pub use client::{CompletionService, OllamaClient, OllamaConfig};
#[cfg(any(test, feature = "mock"))]
pub use client::MockCompletionService;
pub use error::{LlmError, LlmResult};
