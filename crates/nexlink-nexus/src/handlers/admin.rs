//! Operator API: login, approval decisions, rename decisions, fleet stats
//! and the transfer history.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use nexlink_core::{AgentState, TransferLogEntry};
use nexlink_store::AgentRecord;

use crate::auth::AdminUser;
use crate::error::ApiError;
use crate::handlers::parse_agent_id;
use crate::registry::NexusStats;
use crate::state::NexusState;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Operator login request.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Configured operator username.
    pub username: String,
    /// Configured operator password.
    pub password: String,
}

/// Operator login response.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    /// Admin-scope token for subsequent calls.
    pub token: String,
}

/// Dashboard view of one agent record. Credentials are never exposed here.
#[derive(Debug, Serialize)]
pub struct AgentView {
    /// Stable agent id.
    pub agent_id: String,
    /// Current display name.
    pub name: String,
    /// Pending rename, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_name: Option<String>,
    /// Registered host.
    pub host: String,
    /// Registered port.
    pub port: u16,
    /// Approval state.
    pub state: AgentState,
    /// Computed from last contact at serialization time.
    pub online: bool,
    /// Whether the current approval has reached the agent.
    pub approval_pushed: bool,
    /// When the record was created.
    pub registered_at: DateTime<Utc>,
    /// Last authenticated contact.
    pub last_seen_at: DateTime<Utc>,
}

impl From<AgentRecord> for AgentView {
    fn from(record: AgentRecord) -> Self {
        let online = record.is_online(Utc::now());
        Self {
            agent_id: record.id.to_string(),
            name: record.name,
            requested_name: record.requested_name,
            host: record.address.host,
            port: record.address.port,
            state: record.state,
            online,
            approval_pushed: record.approval_pushed,
            registered_at: record.registered_at,
            last_seen_at: record.last_seen_at,
        }
    }
}

/// Query parameters for the transfer history.
#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    /// Maximum number of entries to return.
    #[serde(default = "default_log_limit")]
    pub limit: usize,
}

const fn default_log_limit() -> usize {
    50
}

// =============================================================================
// Handlers
// =============================================================================

/// Operator login. Issues an admin-scope token on success.
///
/// # Errors
///
/// Returns `Unauthorized` when the credentials do not match the configured
/// operator account.
pub async fn login(
    State(state): State<Arc<NexusState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    if request.username != state.config.admin_username
        || request.password != state.config.admin_password
    {
        tracing::warn!(username = %request.username, "Rejected operator login");
        return Err(ApiError::Unauthorized);
    }

    let token = state.tokens.issue_admin(&request.username)?;
    tracing::info!(username = %request.username, "Operator logged in");
    Ok(Json(LoginResponse { token }))
}

/// List every record, pending and approved.
///
/// # Errors
///
/// Returns an error only on storage failure.
pub async fn list_agents(
    State(state): State<Arc<NexusState>>,
    _admin: AdminUser,
) -> Result<Json<Vec<AgentView>>, ApiError> {
    let agents = state.registry.list_all()?;
    Ok(Json(agents.into_iter().map(AgentView::from).collect()))
}

/// List records awaiting approval.
///
/// # Errors
///
/// Returns an error only on storage failure.
pub async fn list_pending(
    State(state): State<Arc<NexusState>>,
    _admin: AdminUser,
) -> Result<Json<Vec<AgentView>>, ApiError> {
    let agents = state.registry.list_by_state(AgentState::PendingApproval)?;
    Ok(Json(agents.into_iter().map(AgentView::from).collect()))
}

/// List approved records with a pending rename.
///
/// # Errors
///
/// Returns an error only on storage failure.
pub async fn list_pending_renames(
    State(state): State<Arc<NexusState>>,
    _admin: AdminUser,
) -> Result<Json<Vec<AgentView>>, ApiError> {
    let agents = state.registry.list_pending_renames()?;
    Ok(Json(agents.into_iter().map(AgentView::from).collect()))
}

/// Approve a pending agent and wake push delivery immediately.
///
/// # Errors
///
/// Returns `Conflict` unless the record is pending.
pub async fn approve(
    State(state): State<Arc<NexusState>>,
    _admin: AdminUser,
    Path(agent_id): Path<String>,
) -> Result<Json<AgentView>, ApiError> {
    let agent_id = parse_agent_id(&agent_id)?;
    let record = state.registry.approve(&agent_id)?;
    state.push.trigger();
    Ok(Json(AgentView::from(record)))
}

/// Reject (and delete) a pending agent.
///
/// # Errors
///
/// Returns `Conflict` unless the record is pending.
pub async fn reject(
    State(state): State<Arc<NexusState>>,
    _admin: AdminUser,
    Path(agent_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let agent_id = parse_agent_id(&agent_id)?;
    state.registry.reject(&agent_id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Remove a record entirely, approved or not.
///
/// # Errors
///
/// Returns `NotFound` when no record exists.
pub async fn remove(
    State(state): State<Arc<NexusState>>,
    _admin: AdminUser,
    Path(agent_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let agent_id = parse_agent_id(&agent_id)?;
    state.registry.remove(&agent_id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Approve a pending rename and notify the agent (best-effort).
///
/// # Errors
///
/// Returns `Conflict` when no rename is pending.
pub async fn approve_rename(
    State(state): State<Arc<NexusState>>,
    _admin: AdminUser,
    Path(agent_id): Path<String>,
) -> Result<Json<AgentView>, ApiError> {
    let agent_id = parse_agent_id(&agent_id)?;
    let record = state.registry.approve_rename(&agent_id)?;

    let push = Arc::clone(&state.push);
    let pushed = record.clone();
    tokio::spawn(async move {
        push.push_rename(&pushed).await;
    });

    Ok(Json(AgentView::from(record)))
}

/// Reject a pending rename.
///
/// # Errors
///
/// Returns `Conflict` when no rename is pending.
pub async fn reject_rename(
    State(state): State<Arc<NexusState>>,
    _admin: AdminUser,
    Path(agent_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let agent_id = parse_agent_id(&agent_id)?;
    state.registry.reject_rename(&agent_id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Fleet counters for the dashboard.
///
/// # Errors
///
/// Returns an error only on storage failure.
pub async fn stats(
    State(state): State<Arc<NexusState>>,
    _admin: AdminUser,
) -> Result<Json<NexusStats>, ApiError> {
    Ok(Json(state.registry.stats()?))
}

/// Recent transfer history, newest first.
///
/// # Errors
///
/// Returns an error only on storage failure.
pub async fn recent_logs(
    State(state): State<Arc<NexusState>>,
    _admin: AdminUser,
    Query(query): Query<LogsQuery>,
) -> Result<Json<Vec<TransferLogEntry>>, ApiError> {
    let logs = state.registry.store().list_recent_logs(query.limit)?;
    Ok(Json(logs))
}
