//! Project registration and lookup.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use vedit_models::{Asset, AssetKind, Project, ProjectId};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProjectRequest {
    #[validate(length(min = 1, max = 255))]
    pub title: String,

    #[validate(length(max = 4000))]
    pub prompt: Option<String>,

    #[serde(default)]
    #[validate(nested)]
    pub assets: Vec<AssetRequest>,
}

/// An uploaded file already present in object storage.
#[derive(Debug, Deserialize, Validate)]
pub struct AssetRequest {
    pub kind: AssetKind,

    #[validate(length(min = 1, max = 1024))]
    pub storage_key: String,

    #[validate(length(min = 1, max = 255))]
    pub original_filename: String,
}

/// POST /api/projects
pub async fn create_project(
    State(state): State<AppState>,
    Json(req): Json<CreateProjectRequest>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    req.validate()?;
    if req.title.trim().is_empty() {
        return Err(ApiError::bad_request("Title must not be blank"));
    }

    let assets = req
        .assets
        .into_iter()
        .map(|a| Asset::new(a.kind, a.storage_key, a.original_filename))
        .collect();
    let prompt = req.prompt.filter(|p| !p.trim().is_empty());
    let project = Project::new(req.title.trim(), prompt, assets);

    state.store.save_project(&project).await?;
    info!(
        project_id = %project.id,
        assets = project.assets.len(),
        "Project created"
    );

    Ok((StatusCode::CREATED, Json(project)))
}

/// GET /api/projects/:project_id
pub async fn get_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiResult<Json<Project>> {
    let project = load_project(&state, &ProjectId::from_string(project_id)).await?;
    Ok(Json(project))
}

pub(crate) async fn load_project(state: &AppState, id: &ProjectId) -> ApiResult<Project> {
    state
        .store
        .get_project(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Project not found"))
}
