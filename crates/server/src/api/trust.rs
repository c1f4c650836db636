//! Operator answers to pending trust prompts.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use multipost_core::trust::PendingPrompt;
use multipost_core::TrustError;
use serde::Deserialize;
use std::sync::Arc;

use super::surfaces::ErrorResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PromptAnswer {
    pub grant: bool,
}

pub struct PromptError(TrustError);

impl IntoResponse for PromptError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            TrustError::PromptNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
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

/// GET /trust/prompts
pub async fn list_prompts(State(state): State<Arc<AppState>>) -> Json<Vec<PendingPrompt>> {
    Json(state.trust().pending_prompts())
}

/// POST /trust/prompts/{id}
pub async fn answer_prompt(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(answer): Json<PromptAnswer>,
) -> Result<Json<PendingPrompt>, PromptError> {
    state
        .trust()
        .resolve_prompt(&id, answer.grant)
        .map(Json)
        .map_err(PromptError)
}
