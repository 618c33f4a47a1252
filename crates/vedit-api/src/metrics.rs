//! Prometheus metrics for the API server.

use std::sync::OnceLock;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use regex::Regex;

/// Install the Prometheus recorder and return the handle used to render `/metrics`.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "vedit_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "vedit_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "vedit_http_requests_in_flight";
    pub const JOBS_ENQUEUED_TOTAL: &str = "vedit_jobs_enqueued_total";
}

pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_job_enqueued() {
    counter!(names::JOBS_ENQUEUED_TOTAL).increment(1);
}

fn uuid_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
                .ok()
        })
        .as_ref()
}

/// Collapse record IDs so label cardinality stays bounded.
fn sanitize_path(path: &str) -> String {
    match uuid_pattern() {
        Some(re) => re.replace_all(path, ":id").into_owned(),
        None => path.to_string(),
    }
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/api/jobs/550e8400-e29b-41d4-a716-446655440000"),
            "/api/jobs/:id"
        );
        assert_eq!(
            sanitize_path("/api/jobs/project/550e8400-e29b-41d4-a716-446655440000/latest"),
            "/api/jobs/project/:id/latest"
        );
        assert_eq!(sanitize_path("/health"), "/health");
    }
}
