//! Operator control of the surfaces held by jobs.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use multipost_core::orchestrator::{JobSummary, SurfaceControlError, SurfaceInfo};
use multipost_core::SurfaceError;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// API error wrapping the registry's control errors.
pub struct ApiError(SurfaceControlError);

impl From<SurfaceControlError> for ApiError {
    fn from(e: SurfaceControlError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SurfaceControlError::JobNotFound(_) | SurfaceControlError::SurfaceNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            SurfaceControlError::Surface(SurfaceError::Closed) => StatusCode::CONFLICT,
            SurfaceControlError::Surface(_) => StatusCode::BAD_GATEWAY,
        };
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

/// GET /jobs
pub async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<Vec<JobSummary>> {
    Json(state.surfaces().jobs().await)
}

/// GET /jobs/{job_id}/surfaces
pub async fn list_surfaces(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<Vec<SurfaceInfo>>, ApiError> {
    Ok(Json(state.surfaces().surfaces(&job_id).await?))
}

/// POST /jobs/{job_id}/surfaces/{surface_id}/activate
pub async fn activate_surface(
    State(state): State<Arc<AppState>>,
    Path((job_id, surface_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.surfaces().activate(&job_id, &surface_id).await?;
    Ok(Json(json!({ "activated": surface_id })))
}

/// POST /jobs/{job_id}/surfaces/{surface_id}/reload
pub async fn reload_surface(
    State(state): State<Arc<AppState>>,
    Path((job_id, surface_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.surfaces().reload(&job_id, &surface_id).await?;
    Ok(Json(json!({ "reloaded": surface_id })))
}

/// POST /jobs/{job_id}/surfaces/{surface_id}/close
pub async fn close_surface(
    State(state): State<Arc<AppState>>,
    Path((job_id, surface_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.surfaces().close(&job_id, &surface_id).await?;
    Ok(Json(json!({ "closed": surface_id })))
}
