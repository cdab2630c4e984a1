//! Upload preflight and the upload endpoint itself.

use std::sync::Arc;

use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::io::StreamReader;

use nexlink_core::{LogId, TransferLogEntry, UploadReceipt};

use crate::auth::ApprovedAgent;
use crate::error::ApiError;
use crate::state::NexusState;

/// Query parameters for the upload preflight.
#[derive(Debug, Deserialize)]
pub struct UploadCheckQuery {
    /// Name the file will be stored under.
    pub filename: String,
    /// Declared size in bytes.
    pub file_size: u64,
}

/// Preflight response body.
#[derive(Debug, Serialize)]
pub struct UploadCheckResponse {
    /// Whether the transfer is admitted.
    pub success: bool,
    /// Operator-readable outcome.
    pub message: &'static str,
}

/// Upload preflight: filename validation and disk-space admission, before the
/// caller streams a single byte.
///
/// # Errors
///
/// Returns `BadRequest` for invalid filenames and `InsufficientStorage` when
/// usable space does not cover the declared size plus the safety margin.
pub async fn upload_check(
    State(state): State<Arc<NexusState>>,
    _agent: ApprovedAgent,
    Query(query): Query<UploadCheckQuery>,
) -> Result<Json<UploadCheckResponse>, ApiError> {
    state.receiver.preflight(&query.filename, query.file_size)?;
    Ok(Json(UploadCheckResponse {
        success: true,
        message: "Ready to receive file",
    }))
}

/// Receive a file from an agent.
///
/// The body streams through the crash-safe receive path: temp file, then an
/// atomic rename. On success a transfer-log entry is appended; a logging
/// failure after a successful transfer is swallowed because the file is
/// already safely on disk.
///
/// # Errors
///
/// Returns `BadRequest` when no `file` field is present or the filename is
/// invalid, `InsufficientStorage` on disk exhaustion, and `Internal` for
/// other I/O failures.
pub async fn upload(
    State(state): State<Arc<NexusState>>,
    agent: ApprovedAgent,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadReceipt>), ApiError> {
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

        record_transfer(&state, &agent, &filename, size);

        return Ok((
            StatusCode::OK,
            Json(UploadReceipt { filename, size }),
        ));
    }

    Err(ApiError::BadRequest(
        "missing 'file' field in multipart body".into(),
    ))
}

/// Append the transfer-log entry for a completed upload. Failures are logged
/// and swallowed.
fn record_transfer(state: &NexusState, agent: &ApprovedAgent, filename: &str, size: u64) {
    let entry = TransferLogEntry {
        id: LogId::generate(),
        from_agent_id: Some(agent.record.id),
        from_agent_name: agent.record.name.clone(),
        to_agent_id: None,
        to_agent_name: "Nexus".to_string(),
        filename: filename.to_string(),
        file_size: size,
        timestamp: Utc::now(),
    };

    if let Err(e) = state.registry.store().insert_log_if_absent(&entry) {
        tracing::warn!(
            filename = %filename,
            error = %e,
            "Failed to log transfer, but file was saved successfully"
        );
    }
}
