//! Axum HTTP API for the edit pipeline.
//!
//! This crate provides:
//! - Project registration with validated asset lists
//! - Edit dispatch onto the Redis Streams queue and job polling
//! - Health, readiness and Prometheus metrics endpoints

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
