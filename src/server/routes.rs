//! Axum router configuration

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers::{health_check, process_video};
use super::AppState;

/// Create the Axum router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = DefaultBodyLimit::max(state.max_upload_bytes);

    Router::new()
        .route("/health", get(health_check))
        .route("/process", post(process_video))
        .layer(body_limit)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
