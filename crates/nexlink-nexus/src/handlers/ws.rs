//! The persistent agent channel.
//!
//! An approved agent holds one WebSocket session against the nexus. Inbound
//! frames are typed envelopes; the only one the nexus acts on is
//! `status_update`, which refreshes liveness and, when the agent's peer-list
//! version is behind, answers with a `peer_update` carrying the full list and
//! its version together. Unknown tags are logged and ignored.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use nexlink_core::{AgentId, ChannelMessage, StatusReport};

use crate::auth::ApprovedAgent;
use crate::state::NexusState;

/// WebSocket upgrade handler for `GET /ws/agents`.
///
/// Authentication happens before the upgrade: only an approved agent's auth
/// token opens a channel.
pub async fn agent_channel(
    ws: WebSocketUpgrade,
    State(state): State<Arc<NexusState>>,
    agent: ApprovedAgent,
) -> Response {
    let agent_id = agent.record.id;
    tracing::info!(agent_id = %agent_id, "Agent channel upgrade");
    ws.on_upgrade(move |socket| handle_socket(socket, state, agent_id))
}

/// Drive one agent session until either side terminates it.
async fn handle_socket(socket: WebSocket, state: Arc<NexusState>, agent_id: AgentId) {
    let (tx, mut rx) = mpsc::unbounded_channel::<ChannelMessage>();
    state.channels.register(agent_id, tx.clone());

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                let Some(message) = outbound else { break };
                match message.encode() {
                    Ok(text) => {
                        if sink.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(agent_id = %agent_id, error = %e, "Dropped unencodable channel message");
                    }
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        handle_frame(&state, agent_id, &tx, text.as_str());
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // control frames
                    Some(Err(e)) => {
                        tracing::debug!(agent_id = %agent_id, error = %e, "Channel read error");
                        break;
                    }
                }
            }
        }
    }

    state.channels.unregister(&agent_id, &tx);
    tracing::info!(agent_id = %agent_id, "Agent channel closed");
}

/// Dispatch one inbound frame.
fn handle_frame(
    state: &NexusState,
    agent_id: AgentId,
    tx: &mpsc::UnboundedSender<ChannelMessage>,
    raw: &str,
) {
    match ChannelMessage::decode(raw) {
        Ok(ChannelMessage::StatusUpdate(report)) => {
            handle_status_update(state, agent_id, tx, &report);
        }
        Ok(ChannelMessage::Unknown(tag)) => {
            tracing::warn!(agent_id = %agent_id, tag = %tag, "Unknown channel message type");
        }
        Ok(other) => {
            tracing::debug!(agent_id = %agent_id, message = ?other, "Ignoring unexpected inbound message");
        }
        Err(e) => {
            tracing::warn!(agent_id = %agent_id, error = %e, "Failed to decode channel frame");
        }
    }
}

fn handle_status_update(
    state: &NexusState,
    agent_id: AgentId,
    tx: &mpsc::UnboundedSender<ChannelMessage>,
    report: &StatusReport,
) {
    if let Err(e) = state.registry.touch(&agent_id) {
        tracing::warn!(agent_id = %agent_id, error = %e, "Failed to refresh agent liveness");
        return;
    }

    let current = match state.registry.current_version() {
        Ok(version) => version,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read peer-list version");
            return;
        }
    };

    if report.peer_version >= current {
        return;
    }

    match state.registry.peer_list_for(&agent_id) {
        Ok(list) => {
            // The list and its version travel in one frame; the agent
            // installs them together.
            let _ = tx.send(ChannelMessage::PeerUpdate {
                peers: list.peers,
                version: list.version,
            });
            tracing::debug!(agent_id = %agent_id, version = list.version, "Pushed peer update over channel");
        }
        Err(e) => {
            tracing::warn!(agent_id = %agent_id, error = %e, "Failed to build peer update");
        }
    }
}
