//! Router configuration.
//!
//! This module sets up the axum router with all routes and middleware.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::{admin, agents, files, health, logs, ws};
use crate::state::NexusState;

/// Create the nexus router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /api/ping` - Reachability probe
/// - `POST /api/agents/register` - Register (idempotent on address)
/// - `GET /api/agents/identify` - Identity resolution by address
/// - `GET /api/agents/{agent_id}/exists` - Existence probe
/// - `POST /api/auth/login` - Operator login
///
/// ## Agent (auth token)
/// - `POST /api/agents/status` - Status/heartbeat exchange
/// - `POST /api/agents/rename` - Request a rename
/// - `GET /api/peers` - Full peer list with version
/// - `POST /api/logs/sync` - Idempotent transfer-log merge
/// - `GET /api/upload/check` - Upload preflight
/// - `POST /api/upload` - Multipart upload
/// - `GET /ws/agents` - Persistent channel
///
/// ## Operator (admin token)
/// - `GET /api/admin/agents` (+ `/pending`, `/renames`)
/// - `POST /api/admin/agents/{agent_id}/approve` | `/reject` | `/remove`
/// - `POST /api/admin/agents/{agent_id}/rename/approve` | `/rename/reject`
/// - `GET /api/admin/stats`, `GET /api/admin/logs`
pub fn create_router(state: Arc<NexusState>) -> Router {
    let cors = build_cors_layer(&state.config.cors_origins);
    let max_upload_bytes = state.config.max_upload_bytes;

    Router::new()
        // Public
        .route("/api/ping", get(health::ping))
        .route("/api/agents/register", post(agents::register))
        .route("/api/agents/identify", get(agents::identify))
        .route("/api/agents/{agent_id}/exists", get(agents::exists))
        .route("/api/auth/login", post(admin::login))
        // Agent protocol
        .route("/api/agents/status", post(agents::status))
        .route("/api/agents/rename", post(agents::request_rename))
        .route("/api/peers", get(agents::peers))
        .route("/api/logs/sync", post(logs::sync))
        .route("/api/upload/check", get(files::upload_check))
        .route(
            "/api/upload",
            post(files::upload).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/ws/agents", get(ws::agent_channel))
        // Operator
        .route("/api/admin/agents", get(admin::list_agents))
        .route("/api/admin/agents/pending", get(admin::list_pending))
        .route("/api/admin/agents/renames", get(admin::list_pending_renames))
        .route("/api/admin/agents/{agent_id}/approve", post(admin::approve))
        .route("/api/admin/agents/{agent_id}/reject", post(admin::reject))
        .route("/api/admin/agents/{agent_id}/remove", post(admin::remove))
        .route(
            "/api/admin/agents/{agent_id}/rename/approve",
            post(admin::approve_rename),
        )
        .route(
            "/api/admin/agents/{agent_id}/rename/reject",
            post(admin::reject_rename),
        )
        .route("/api/admin/stats", get(admin::stats))
        .route("/api/admin/logs", get(admin::recent_logs))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_any_origin() {
        let origins = vec!["*".to_string()];
        let _layer = build_cors_layer(&origins);
    }

    #[test]
    fn cors_specific_origins() {
        let origins = vec![
            "http://localhost:3000".to_string(),
            "https://dashboard.example.com".to_string(),
        ];
        let _layer = build_cors_layer(&origins);
    }
}
