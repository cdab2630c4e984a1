//! Transfer-log sync: the idempotent set-difference merge.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use nexlink_core::{LogSyncResponse, TransferLogEntry};

use crate::auth::ApprovedAgent;
use crate::error::ApiError;
use crate::state::NexusState;

/// Merge a batch of transfer-log entries from an agent.
///
/// Entries whose id is already stored are silently skipped, so retransmitting
/// a batch (or receiving it twice) stores exactly one copy per unique id. The
/// response lists every submitted id now present on the nexus, including
/// ones that were already there, so a sender whose previous response was
/// lost still learns it can prune.
///
/// The sender's identity comes from the auth token, not the batch: incoming
/// `from` fields are overwritten with the authenticated record.
///
/// # Errors
///
/// Returns an error only on storage failure.
pub async fn sync(
    State(state): State<Arc<NexusState>>,
    agent: ApprovedAgent,
    Json(batch): Json<Vec<TransferLogEntry>>,
) -> Result<Json<LogSyncResponse>, ApiError> {
    let mut merged_ids = Vec::with_capacity(batch.len());
    let mut fresh = 0usize;
    let total = batch.len();

    for mut entry in batch {
        entry.from_agent_id = Some(agent.record.id);
        entry.from_agent_name = agent.record.name.clone();

        if state.registry.store().insert_log_if_absent(&entry)? {
            fresh += 1;
        }
        merged_ids.push(entry.id);
    }

    if fresh > 0 {
        tracing::info!(
            agent_id = %agent.record.id,
            fresh,
            total,
            "Synced new transfer logs from agent"
        );
    }

    Ok(Json(LogSyncResponse { merged_ids }))
}
