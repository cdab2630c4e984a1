//! Router configuration for the agent's HTTP surface.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Upload bodies can be large; everything else stays at axum's default
/// limit.
const MAX_UPLOAD_BYTES: usize = 4 * 1024 * 1024 * 1024;

/// Create the agent router.
///
/// # Routes
///
/// - `GET /api/ping` - Reachability probe
/// - `GET /api/status` - Local inspection summary
/// - `GET /api/peers` - The peer list as this agent knows it
/// - `POST /api/approval` - Approval push fallback target (nexus)
/// - `POST /api/agents/rename` - Rename push fallback target (nexus)
/// - `GET /api/upload/check` - Upload preflight (peers)
/// - `POST /api/upload` - Multipart upload (peers)
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/ping", get(handlers::ping))
        .route("/api/status", get(handlers::status))
        .route("/api/peers", get(handlers::peers))
        .route("/api/approval", post(handlers::approval))
        .route("/api/agents/rename", post(handlers::rename))
        .route("/api/upload/check", get(handlers::upload_check))
        .route(
            "/api/upload",
            post(handlers::upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
