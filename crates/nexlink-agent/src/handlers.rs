//! The agent's own HTTP surface.
//!
//! Two audiences call it: the nexus (approval and rename pushes, when no
//! channel is open) and other agents (direct file uploads, authenticated by
//! the sender's public token against the local peer cache).

use std::sync::Arc;

use axum::extract::{Multipart, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::io::StreamReader;

use nexlink_core::{
    AgentState, ApprovalPush, LogId, PeerInfo, RenamePush, TransferLogEntry, UploadReceipt,
};

use crate::error::ApiError;
use crate::state::AppState;

/// Header peers and the nexus use against this surface.
const AUTH_HEADER: &str = "x-auth-token";

/// Apply a pushed approval (the HTTP fallback delivery path).
///
/// Idempotent: reapplying the same approval is a no-op. A fresh approval
/// triggers the channel to connect with the new token.
///
/// # Errors
///
/// Returns `Internal` only if the identity record cannot be persisted.
pub async fn approval(
    State(state): State<Arc<AppState>>,
    Json(push): Json<ApprovalPush>,
) -> Result<StatusCode, ApiError> {
    let changed = state
        .identity
        .apply_approval(&push)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    if changed {
        tracing::info!(name = %push.approved_name, "Approval received via HTTP push");
        let connection = Arc::clone(&state.connection);
        tokio::spawn(async move {
            connection.connect().await;
        });
    } else {
        tracing::debug!("Approval push was already applied");
    }
    Ok(StatusCode::OK)
}

/// Apply a pushed rename (the HTTP fallback delivery path).
///
/// # Errors
///
/// Returns `Internal` only if the identity record cannot be persisted.
pub async fn rename(
    State(state): State<Arc<AppState>>,
    Json(push): Json<RenamePush>,
) -> Result<StatusCode, ApiError> {
    state
        .identity
        .apply_name(&push.agent_name)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(StatusCode::OK)
}

/// Query parameters for the upload preflight.
#[derive(Debug, Deserialize)]
pub struct UploadCheckQuery {
    /// Name the file will be stored under.
    pub filename: String,
    /// Declared size in bytes.
    pub file_size: u64,
}

/// Upload preflight from a peer.
///
/// # Errors
///
/// Returns `Unauthorized` for unknown senders, `BadRequest` for invalid
/// filenames and `InsufficientStorage` when space does not cover the
/// declared size plus the safety margin.
pub async fn upload_check(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<UploadCheckQuery>,
) -> Result<StatusCode, ApiError> {
    authenticate_peer(&state, &headers)?;
    state.receiver.preflight(&query.filename, query.file_size)?;
    Ok(StatusCode::OK)
}

/// Receive a file from a peer through the crash-safe receive path.
///
/// On success a transfer-log entry is appended and reconciled with the nexus
/// on the next log sync; a logging failure after a successful transfer is
/// swallowed.
///
/// # Errors
///
/// Returns `Unauthorized` for unknown senders, `BadRequest` for malformed
/// bodies and `InsufficientStorage` on disk exhaustion.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadReceipt>, ApiError> {
    let sender = authenticate_peer(&state, &headers)?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .map(ToString::to_string)
            .ok_or_else(|| ApiError::BadRequest("file field has no filename".into()))?;

        let reader = StreamReader::new(
            field.map_err(|e| std::io::Error::new(std::io::ErrorKind::BrokenPipe, e)),
        );
        let size = state.receiver.receive(&filename, 0, reader).await?;

        record_transfer(&state, &sender, &filename, size);

        return Ok(Json(UploadReceipt { filename, size }));
    }

    Err(ApiError::BadRequest(
        "missing 'file' field in multipart body".into(),
    ))
}

/// Local inspection summary.
#[derive(Debug, Serialize)]
pub struct AgentStatusSummary {
    /// The agent's id, once registered.
    pub agent_id: Option<String>,
    /// Current display name.
    pub name: String,
    /// Lifecycle state.
    pub state: AgentState,
    /// Whether the channel to the nexus is open.
    pub connected: bool,
    /// Number of cached peers.
    pub peer_count: usize,
    /// The peer-list version the cache corresponds to.
    pub peer_version: u64,
    /// Transfer-log entries awaiting nexus confirmation.
    pub unsynced_logs: u64,
}

/// The peer list as this agent knows it, refreshing from the nexus when the
/// cache is empty.
pub async fn peers(State(state): State<Arc<AppState>>) -> Json<Vec<PeerInfo>> {
    Json(crate::tasks::all_peers(&state).await)
}

/// Local status summary for inspection.
pub async fn status(State(state): State<Arc<AppState>>) -> Json<AgentStatusSummary> {
    let identity = state.identity.snapshot();
    Json(AgentStatusSummary {
        agent_id: identity.id.map(|id| id.to_string()),
        name: identity.name,
        state: identity.state,
        connected: state.connection.is_connected(),
        peer_count: state.peers.get_all().len(),
        peer_version: state.peers.current_version(),
        unsynced_logs: state.logs.unsynced_count(),
    })
}

/// Reachability probe.
pub async fn ping() -> StatusCode {
    StatusCode::OK
}

/// Identify the sender of an incoming request by matching its token against
/// the cached peer credentials.
fn authenticate_peer(state: &AppState, headers: &HeaderMap) -> Result<PeerInfo, ApiError> {
    let token = headers
        .get(AUTH_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    state
        .peers
        .find_by_public_token(token)
        .ok_or(ApiError::Unauthorized)
}

/// Append the transfer-log entry for a completed receive. Failures are
/// logged and swallowed; the file is already safely on disk.
fn record_transfer(state: &AppState, sender: &PeerInfo, filename: &str, size: u64) {
    let identity = state.identity.snapshot();
    let entry = TransferLogEntry {
        id: LogId::generate(),
        from_agent_id: sender.agent_id,
        from_agent_name: sender.name.clone(),
        to_agent_id: identity.id,
        to_agent_name: identity.name,
        filename: filename.to_string(),
        file_size: size,
        timestamp: Utc::now(),
    };

    if let Err(e) = state.logs.append(entry) {
        tracing::warn!(
            filename = %filename,
            error = %e,
            "Failed to log transfer, but file was saved successfully"
        );
    }
}
