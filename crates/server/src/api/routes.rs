use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::{handlers, messages, middleware::metrics_middleware, surfaces, trust, ws};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Health, config and metrics
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/metrics", get(handlers::metrics))
        // Cross-context messages (trust-gated)
        .route("/messages", post(messages::handle_message))
        // Operator surface control
        .route("/jobs", get(surfaces::list_jobs))
        .route("/jobs/{job_id}/surfaces", get(surfaces::list_surfaces))
        .route(
            "/jobs/{job_id}/surfaces/{surface_id}/activate",
            post(surfaces::activate_surface),
        )
        .route(
            "/jobs/{job_id}/surfaces/{surface_id}/reload",
            post(surfaces::reload_surface),
        )
        .route(
            "/jobs/{job_id}/surfaces/{surface_id}/close",
            post(surfaces::close_surface),
        )
        // Operator answers to trust prompts
        .route("/trust/prompts", get(trust::list_prompts))
        .route("/trust/prompts/{id}", post(trust::answer_prompt))
        // Live job progress
        .route("/ws", get(ws::ws_handler))
        .with_state(state);

    // Messages are authorized by the trust gate, not by CORS.
    Router::new()
        .nest("/api/v1", api_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
