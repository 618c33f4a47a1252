//! API routes.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{
    create_project, get_job, get_latest_job, get_project, health, ready, start_edit,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, request_id, request_logging};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let project_routes = Router::new()
        .route("/projects", post(create_project))
        .route("/projects/:project_id", get(get_project));

    let job_routes = Router::new()
        .route("/jobs/project/:project_id/start-edit", post(start_edit))
        .route("/jobs/project/:project_id/latest", get(get_latest_job))
        .route("/jobs/:job_id", get(get_job));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready));

    let metrics_routes = match metrics_handle {
        Some(handle) => Router::new().route("/metrics", get(move || async move { handle.render() })),
        None => Router::new(),
    };

    Router::new()
        .nest("/api", project_routes.merge(job_routes))
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use vedit_models::{Job, JobState, Project};
    use vedit_queue::{EditJob, JobDispatch, JobStore, MemoryJobStore, QueueError, QueueResult};

    use crate::config::ApiConfig;

    #[derive(Default)]
    struct FakeQueue {
        down: bool,
        sent: Mutex<Vec<EditJob>>,
    }

    #[async_trait]
    impl JobDispatch for FakeQueue {
        async fn enqueue(&self, job: &EditJob) -> QueueResult<String> {
            if self.down {
                return Err(QueueError::enqueue_failed("broker unreachable"));
            }
            let mut sent = self.sent.lock().unwrap();
            sent.push(job.clone());
            Ok(format!("{}-0", sent.len()))
        }

        async fn ping(&self) -> QueueResult<()> {
            if self.down {
                Err(QueueError::connection_failed("broker unreachable"))
            } else {
                Ok(())
            }
        }
    }

    struct TestApp {
        router: Router,
        store: Arc<MemoryJobStore>,
        queue: Arc<FakeQueue>,
    }

    fn app(queue: FakeQueue) -> TestApp {
        let store = Arc::new(MemoryJobStore::new());
        let queue = Arc::new(queue);
        let state = AppState::with_services(ApiConfig::default(), store.clone(), queue.clone());
        TestApp {
            router: create_router(state, None),
            store,
            queue,
        }
    }

    async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn seeded_project(store: &MemoryJobStore, prompt: Option<&str>, with_assets: bool) -> Project {
        let assets = if with_assets {
            vec![vedit_models::Asset::new(
                vedit_models::AssetKind::Video,
                "uploads/a.mp4",
                "a.mp4",
            )]
        } else {
            vec![]
        };
        let project = Project::new("Trip", prompt.map(str::to_string), assets);
        store.save_project(&project).await.unwrap();
        project
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = app(FakeQueue::default());
        let (status, body) = send(&app.router, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_ready_reflects_broker() {
        let (status, _) = send(&app(FakeQueue::default()).router, "GET", "/ready", None).await;
        assert_eq!(status, StatusCode::OK);

        let down = FakeQueue {
            down: true,
            ..FakeQueue::default()
        };
        let (status, body) = send(&app(down).router, "GET", "/ready", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["redis"]["status"], "error");
    }

    #[tokio::test]
    async fn test_request_id_is_echoed() {
        let app = app(FakeQueue::default());
        let request = Request::builder()
            .uri("/health")
            .header("X-Request-ID", "abc-123")
            .body(Body::empty())
            .unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.headers()["X-Request-ID"], "abc-123");
    }

    #[tokio::test]
    async fn test_create_and_get_project() {
        let app = app(FakeQueue::default());
        let (status, created) = send(
            &app.router,
            "POST",
            "/api/projects",
            Some(json!({
                "title": "Beach day",
                "prompt": "make it 30 seconds",
                "assets": [
                    {"kind": "video", "storage_key": "uploads/a.mp4", "original_filename": "a.mp4"},
                    {"kind": "image", "storage_key": "uploads/b.jpg", "original_filename": "b.jpg"}
                ]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["status"], "draft");
        assert_eq!(created["assets"].as_array().unwrap().len(), 2);

        let id = created["id"].as_str().unwrap();
        let (status, fetched) = send(&app.router, "GET", &format!("/api/projects/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["title"], "Beach day");
    }

    #[tokio::test]
    async fn test_create_project_validation() {
        let app = app(FakeQueue::default());
        let (status, body) = send(
            &app.router,
            "POST",
            "/api/projects",
            Some(json!({"title": "", "assets": []})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["detail"].as_str().unwrap().contains("title"));

        let (status, _) = send(
            &app.router,
            "POST",
            "/api/projects",
            Some(json!({
                "title": "ok",
                "assets": [{"kind": "video", "storage_key": "", "original_filename": "a.mp4"}]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_unknown_records_are_404() {
        let app = app(FakeQueue::default());
        for uri in [
            "/api/projects/missing",
            "/api/jobs/missing",
            "/api/jobs/project/missing/latest",
        ] {
            let (status, body) = send(&app.router, "GET", uri, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
            assert!(body["detail"].is_string());
        }
        let (status, _) = send(&app.router, "POST", "/api/jobs/project/missing/start-edit", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_start_edit_dispatches_pending_job() {
        let app = app(FakeQueue::default());
        let project = seeded_project(&app.store, Some("vintage"), true).await;

        let uri = format!("/api/jobs/project/{}/start-edit", project.id);
        let (status, job) = send(&app.router, "POST", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(job["status"], "pending");
        assert_eq!(job["task_id"], "1-0");

        let sent = app.queue.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].project_id, project.id);
        assert_eq!(job["id"], sent[0].job_id.as_str());

        let latest_uri = format!("/api/jobs/project/{}/latest", project.id);
        let (status, latest) = send(&app.router, "GET", &latest_uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(latest["id"], job["id"]);

        let (status, polled) = send(&app.router, "GET", &format!("/api/jobs/{}", sent[0].job_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(polled["progress"], 0.0);
    }

    #[tokio::test]
    async fn test_start_edit_prompt_override() {
        let app = app(FakeQueue::default());
        let project = seeded_project(&app.store, None, true).await;
        let uri = format!("/api/jobs/project/{}/start-edit", project.id);

        let (status, body) = send(&app.router, "POST", &uri, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Project has no prompt");

        let (status, _) = send(&app.router, "POST", &uri, Some(json!({"prompt": "black and white"}))).await;
        assert_eq!(status, StatusCode::OK);
        let stored = app.store.get_project(&project.id).await.unwrap().unwrap();
        assert_eq!(stored.prompt.as_deref(), Some("black and white"));
    }

    #[tokio::test]
    async fn test_start_edit_requires_assets() {
        let app = app(FakeQueue::default());
        let project = seeded_project(&app.store, Some("vintage"), false).await;

        let uri = format!("/api/jobs/project/{}/start-edit", project.id);
        let (status, body) = send(&app.router, "POST", &uri, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Project has no assets");
        assert!(app.queue.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_start_edit_enqueue_failure_marks_job_failed() {
        let app = app(FakeQueue {
            down: true,
            ..FakeQueue::default()
        });
        let project = seeded_project(&app.store, Some("vintage"), true).await;

        let uri = format!("/api/jobs/project/{}/start-edit", project.id);
        let (status, body) = send(&app.router, "POST", &uri, None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["detail"].as_str().unwrap().starts_with("Failed to start job"));

        let latest = tokio_test::assert_ok!(app.store.latest_job_for_project(&project.id).await);
        let job: Job = latest.unwrap();
        assert_eq!(job.status, JobState::Failed);
        assert!(job.error.is_some());
    }

    #[tokio::test]
    async fn test_malformed_body_is_rejected() {
        let app = app(FakeQueue::default());
        let project = seeded_project(&app.store, Some("vintage"), true).await;
        let uri = format!("/api/jobs/project/{}/start-edit", project.id);

        let request = Request::builder()
            .method("POST")
            .uri(&uri)
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
