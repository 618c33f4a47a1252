//! Edit pipeline worker.
//!
//! This crate provides:
//! - Directive interpretation (language model with a rule-based fallback)
//! - Shot selection by 0/1 knapsack over tagged scenes
//! - The per-job pipeline orchestrator
//! - A job executor with a wall-clock budget, dead-lettering and graceful shutdown

pub mod config;
pub mod error;
pub mod executor;
pub mod interpreter;
pub mod logging;
pub mod metrics;
pub mod processor;
pub mod retry;
pub mod selector;

#[cfg(test)]
mod testing;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::{run_with_timeout, JobExecutor};
pub use interpreter::{interpret_rules, DirectiveInterpreter, ModelUnavailable};
pub use logging::JobLogger;
pub use processor::{fail_job, run_edit_job, EditContext};
pub use selector::{knapsack, select_shot_indices, select_shots};
