//! Prometheus metrics for the worker.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_COMPLETED_TOTAL: &str = "vedit_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "vedit_jobs_failed_total";
    pub const JOB_DURATION_SECONDS: &str = "vedit_job_duration_seconds";
    pub const CLIPS_RENDERED_TOTAL: &str = "vedit_clips_rendered_total";
    pub const INTERPRETER_FALLBACK_TOTAL: &str = "vedit_interpreter_fallback_total";
}

/// Install the recorder and serve `/metrics` on `port`.
pub fn init_metrics(port: u16) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .install()
}

pub fn record_job_completed(duration_secs: f64, clips: usize) {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
    histogram!(names::JOB_DURATION_SECONDS).record(duration_secs);
    counter!(names::CLIPS_RENDERED_TOTAL).increment(clips as u64);
}

pub fn record_job_failed(reason: &'static str) {
    counter!(names::JOBS_FAILED_TOTAL, "reason" => reason).increment(1);
}

pub fn record_interpreter_fallback(cause: &'static str) {
    counter!(names::INTERPRETER_FALLBACK_TOTAL, "cause" => cause).increment(1);
}
