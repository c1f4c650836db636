//! Cross-context message endpoint.
//!
//! Every request envelope passes the trust gate before its action runs.
//! The HTTP status is always 200; the outcome is carried in the envelope's
//! `code` (0, 400, 403 or 500).

use axum::{body::Bytes, extract::State, Json};
use multipost_core::{
    messaging::MessageKind, trust::TrustRequestStatus, Action, Job, JobError, MessagingError,
    RequestEnvelope, ResponseEnvelope, TrustDecision, TrustError,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::middleware::RequestOrigin;
use crate::metrics::MESSAGES_TOTAL;
use crate::state::AppState;

/// Failure of an action after it passed the gate.
#[derive(Debug)]
enum ActionError {
    BadRequest(String),
    Internal(String),
}

impl ActionError {
    fn into_envelope(self, request: &RequestEnvelope) -> ResponseEnvelope {
        match self {
            ActionError::BadRequest(message) => ResponseEnvelope::bad_request(request, message),
            ActionError::Internal(message) => ResponseEnvelope::internal(request, message),
        }
    }
}

impl From<MessagingError> for ActionError {
    fn from(e: MessagingError) -> Self {
        ActionError::BadRequest(e.to_string())
    }
}

impl From<TrustError> for ActionError {
    fn from(e: TrustError) -> Self {
        match e {
            TrustError::InvalidPattern(_)
            | TrustError::NotFound(_)
            | TrustError::PromptNotFound(_) => ActionError::BadRequest(e.to_string()),
            TrustError::Storage(_) => ActionError::Internal(e.to_string()),
        }
    }
}

impl From<JobError> for ActionError {
    fn from(e: JobError) -> Self {
        ActionError::BadRequest(e.to_string())
    }
}

/// Logs when the caller stops waiting before its job finishes.
struct CallerWait {
    job_id: String,
    done: bool,
}

impl Drop for CallerWait {
    fn drop(&mut self) {
        if !self.done {
            warn!(job_id = %self.job_id, "Caller went away; job keeps running in the background");
        }
    }
}

#[derive(Debug, Deserialize)]
struct TrustDeletePayload {
    id: String,
}

/// POST /messages
pub async fn handle_message(
    State(state): State<Arc<AppState>>,
    RequestOrigin(origin): RequestOrigin,
    body: Bytes,
) -> Json<ResponseEnvelope> {
    let request: RequestEnvelope = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            debug!("Rejecting malformed envelope: {}", e);
            let response = ResponseEnvelope::malformed(format!("malformed request: {}", e));
            record("malformed", &response);
            return Json(response);
        }
    };

    let response = dispatch(&state, origin.as_deref(), &request).await;
    let label = request
        .parsed_action()
        .map(|a| a.as_str())
        .unwrap_or("unknown");
    record(label, &response);
    Json(response)
}

fn record(action: &str, response: &ResponseEnvelope) {
    MESSAGES_TOTAL
        .with_label_values(&[action, &response.code.to_string()])
        .inc();
}

async fn dispatch(
    state: &AppState,
    origin: Option<&str>,
    request: &RequestEnvelope,
) -> ResponseEnvelope {
    if request.kind != MessageKind::Request {
        return ResponseEnvelope::bad_request(request, "expected a request envelope");
    }
    if request.trace_id.is_empty() {
        return ResponseEnvelope::bad_request(request, "missing traceId");
    }

    match state.trust().authorize(origin, &request.action).await {
        Ok(TrustDecision::Denied { reason, .. }) => {
            return ResponseEnvelope::denied(request, reason);
        }
        Ok(_) => {}
        Err(e) => {
            error!(trace_id = %request.trace_id, "Trust gate failed: {}", e);
            return ResponseEnvelope::internal(request, e.to_string());
        }
    }

    let action = match request.parsed_action() {
        Ok(action) => action,
        Err(e) => return ResponseEnvelope::bad_request(request, e.to_string()),
    };

    debug!(trace_id = %request.trace_id, %action, "Dispatching message");
    let result = match action {
        Action::Publish => publish(state, request).await,
        Action::TrustList => trust_list(state).await,
        Action::TrustDelete => trust_delete(state, request).await,
        Action::RequestTrust => request_trust(state, origin).await,
        Action::Ping => Ok(json!({ "pong": true })),
    };

    match result {
        Ok(data) => ResponseEnvelope::ok(request, data),
        Err(e) => {
            if let ActionError::Internal(ref message) = e {
                error!(trace_id = %request.trace_id, %action, "Action failed: {}", message);
            }
            e.into_envelope(request)
        }
    }
}

async fn publish(state: &AppState, request: &RequestEnvelope) -> Result<Value, ActionError> {
    let job: Job = request.payload()?;
    if job.targets.is_empty() {
        return Err(ActionError::BadRequest("job has no targets".to_string()));
    }
    info!(trace_id = %request.trace_id, job_id = %job.job_id, targets = job.targets.len(), "Publish requested");

    let mut wait = CallerWait {
        job_id: job.job_id.clone(),
        done: false,
    };
    let handle = state.orchestrator().spawn_job(job).await?;
    let report = handle
        .await
        .map_err(|e| ActionError::Internal(format!("job task failed: {}", e)))?;
    wait.done = true;

    serde_json::to_value(&report)
        .map_err(|e| ActionError::Internal(format!("failed to serialize report: {}", e)))
}

async fn trust_list(state: &AppState) -> Result<Value, ActionError> {
    let entries = state.trust().list().await?;
    Ok(json!(entries))
}

async fn trust_delete(state: &AppState, request: &RequestEnvelope) -> Result<Value, ActionError> {
    let TrustDeletePayload { id } = request.payload()?;
    let removed = state.trust().delete(&id).await?;
    notify_trust_changed(state).await;
    Ok(json!(removed))
}

async fn request_trust(state: &AppState, origin: Option<&str>) -> Result<Value, ActionError> {
    let origin = origin
        .ok_or_else(|| ActionError::BadRequest("request has no origin".to_string()))?;
    let result = state.trust().request_trust(origin).await?;
    if result.status == TrustRequestStatus::Granted {
        notify_trust_changed(state).await;
    }
    Ok(json!(result))
}

async fn notify_trust_changed(state: &AppState) {
    if let Ok(entries) = state.trust().list().await {
        state.ws_broadcaster().trust_changed(entries.len());
    }
}
