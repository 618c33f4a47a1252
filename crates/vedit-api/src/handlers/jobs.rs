//! Edit dispatch and job polling.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use tracing::{error, info};
use validator::Validate;

use vedit_models::{Job, JobId, ProjectId};
use vedit_queue::EditJob;

use crate::error::{ApiError, ApiResult};
use crate::handlers::projects::load_project;
use crate::metrics;
use crate::state::AppState;

/// Optional body of a start-edit request.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct StartEditRequest {
    /// Replaces the project's stored prompt
    #[validate(length(max = 4000))]
    pub prompt: Option<String>,
}

/// POST /api/jobs/project/:project_id/start-edit
///
/// Creates a pending job and enqueues it. The body may be empty.
pub async fn start_edit(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Job>> {
    let req: StartEditRequest = if body.iter().all(u8::is_ascii_whitespace) {
        StartEditRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("Invalid request body: {}", e)))?
    };
    req.validate()?;

    let mut project = load_project(&state, &ProjectId::from_string(project_id)).await?;

    if project.assets.is_empty() {
        return Err(ApiError::bad_request("Project has no assets"));
    }
    if let Some(prompt) = req.prompt.filter(|p| !p.trim().is_empty()) {
        project.prompt = Some(prompt);
        state.store.save_project(&project).await?;
    }
    if project.prompt_text().trim().is_empty() {
        return Err(ApiError::bad_request("Project has no prompt"));
    }

    let mut job = Job::new(project.id.clone());
    state.store.save_job(&job).await?;

    match state.queue.enqueue(&EditJob::new(job.id.clone(), project.id.clone())).await {
        Ok(message_id) => {
            job.task_id = Some(message_id);
            state.store.save_job(&job).await?;
            metrics::record_job_enqueued();
            info!(job_id = %job.id, project_id = %project.id, "Edit job dispatched");
            Ok(Json(job))
        }
        Err(e) => {
            let message = format!("Failed to start job: {}", e);
            error!(job_id = %job.id, "{}", message);
            // A pending job can always fail
            if job.fail(message.clone()).is_ok() {
                state.store.save_job(&job).await?;
            }
            Err(ApiError::internal(message))
        }
    }
}

/// GET /api/jobs/:job_id
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<Job>> {
    state
        .store
        .get_job(&JobId::from_string(job_id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Job not found"))
}

/// GET /api/jobs/project/:project_id/latest
pub async fn get_latest_job(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiResult<Json<Job>> {
    let project = load_project(&state, &ProjectId::from_string(project_id)).await?;
    state
        .store
        .latest_job_for_project(&project.id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("No jobs found for this project"))
}
