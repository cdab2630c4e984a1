//! Agent-facing protocol endpoints: registration, identity resolution,
//! status exchange, rename requests and peer-list fetch.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use nexlink_core::{
    AgentAddress, IdentityResponse, PeerListResponse, RegisterRequest, RegisterResponse,
    RenameRequest, StatusRequest, StatusResponse,
};

use crate::auth::ApprovedAgent;
use crate::error::ApiError;
use crate::handlers::parse_agent_id;
use crate::state::NexusState;

/// Register an agent. Idempotent on `(host, port)`.
///
/// # Errors
///
/// Returns an error only on storage failure.
pub async fn register(
    State(state): State<Arc<NexusState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let address = AgentAddress::new(request.host, request.port);
    let response = state.registry.register(&request.name, address)?;
    Ok(Json(response))
}

/// Query parameters for identity resolution.
#[derive(Debug, Deserialize)]
pub struct IdentifyQuery {
    /// Host the agent registered under.
    pub host: String,
    /// Port the agent registered under.
    pub port: u16,
}

/// Resolve an identity by address. 404 means "unknown, register fresh".
///
/// # Errors
///
/// Returns `NotFound` when no record exists at the address.
pub async fn identify(
    State(state): State<Arc<NexusState>>,
    Query(query): Query<IdentifyQuery>,
) -> Result<Json<IdentityResponse>, ApiError> {
    let address = AgentAddress::new(query.host, query.port);
    state
        .registry
        .identify(&address)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no agent at {address}")))
}

/// Existence probe by id; pending agents use this to detect a wiped registry.
///
/// # Errors
///
/// Returns `NotFound` when no record exists.
pub async fn exists(
    State(state): State<Arc<NexusState>>,
    Path(agent_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let agent_id = parse_agent_id(&agent_id)?;
    if state.registry.exists(&agent_id)? {
        Ok(StatusCode::OK)
    } else {
        Err(ApiError::NotFound(format!("agent {agent_id}")))
    }
}

/// Status/heartbeat exchange over HTTP (the channel fallback path).
///
/// # Errors
///
/// Returns `BadRequest` when the body id does not match the token, and
/// `NotFound` for ids the registry no longer knows.
pub async fn status(
    State(state): State<Arc<NexusState>>,
    agent: ApprovedAgent,
    Json(request): Json<StatusRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    if request.agent_id != agent.record.id {
        return Err(ApiError::BadRequest(
            "status body does not match authenticated agent".into(),
        ));
    }
    tracing::debug!(
        agent_id = %request.agent_id,
        unsynced_logs = request.unsynced_logs,
        "Status report received"
    );
    let response = state.registry.update_status(&request)?;
    Ok(Json(response))
}

/// Agent-initiated rename request, queued for operator approval.
///
/// # Errors
///
/// Returns `BadRequest`/`Conflict` per the rename validation rules.
pub async fn request_rename(
    State(state): State<Arc<NexusState>>,
    agent: ApprovedAgent,
    Json(request): Json<RenameRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .registry
        .request_rename(&agent.record.id, &request.new_name)?;
    Ok(StatusCode::ACCEPTED)
}

/// Full peer-list fetch, always including the synthetic nexus entry.
///
/// # Errors
///
/// Returns an error only on storage failure.
pub async fn peers(
    State(state): State<Arc<NexusState>>,
    agent: ApprovedAgent,
) -> Result<Json<PeerListResponse>, ApiError> {
    let response = state.registry.peer_list_for(&agent.record.id)?;
    Ok(Json(response))
}
