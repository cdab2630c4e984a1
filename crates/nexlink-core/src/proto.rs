//! Wire DTOs for the agent/nexus HTTP protocol.
//!
//! These are the request and response bodies of the external interfaces:
//! registration, identity resolution, status exchange, peer-list fetch, log
//! sync and upload. Both binaries serialize them with `serde_json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, LogId};
use crate::state::AgentState;

/// Registration request, idempotent on `(host, port)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Display name; the nexus substitutes `host:port` when blank.
    pub name: String,
    /// Host the agent is reachable at.
    pub host: String,
    /// Port the agent's HTTP surface listens on.
    pub port: u16,
}

/// Registration response: the assigned (or pre-existing) record identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    /// The stable agent id.
    pub agent_id: AgentId,
    /// Current approval state of the record.
    pub state: AgentState,
}

/// Identity resolution response for agent startup, queried by address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityResponse {
    /// The stable agent id.
    pub agent_id: AgentId,
    /// Current display name.
    pub name: String,
    /// Privileged token; present only when approved.
    pub auth_token: Option<String>,
    /// Peer credential; present only when approved.
    pub public_token: Option<String>,
    /// Current approval state.
    pub state: AgentState,
}

/// Periodic status/heartbeat request from an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRequest {
    /// The reporting agent's id.
    pub agent_id: AgentId,
    /// Current host, so address moves propagate.
    pub host: String,
    /// Current port.
    pub port: u16,
    /// The peer-list version the agent believes is current.
    pub peer_version: u64,
    /// Number of transfer-log entries not yet confirmed by the nexus.
    pub unsynced_logs: u64,
}

/// Status/heartbeat response.
///
/// `peers` and `version` are attached together whenever the agent's known
/// version is behind; the agent must install both atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// The record's approval state as the nexus sees it.
    pub state: AgentState,
    /// Whether the agent's peer-list version is behind the nexus.
    pub peer_outdated: bool,
    /// The authoritative display name, so renames land even without a push.
    pub approved_name: Option<String>,
    /// Full peer list, present when `peer_outdated` and the agent is approved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peers: Option<Vec<PeerInfo>>,
    /// The version describing `peers`, present exactly when `peers` is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

/// One entry of the approved-peer view distributed to agents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    /// The peer's agent id; `None` for the synthetic nexus entry.
    pub agent_id: Option<AgentId>,
    /// Display name.
    pub name: String,
    /// Host the peer accepts uploads at.
    pub host: String,
    /// Port of the peer's HTTP surface.
    pub port: u16,
    /// Computed from last contact at serialization time; never authoritative.
    pub online: bool,
    /// The peer credential other agents present when uploading to it.
    pub public_token: Option<String>,
}

/// Full peer-list fetch response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerListResponse {
    /// Approved peers plus the synthetic nexus entry.
    pub peers: Vec<PeerInfo>,
    /// The version this snapshot corresponds to.
    pub version: u64,
}

/// Agent-initiated rename request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameRequest {
    /// The requested new display name.
    pub new_name: String,
}

/// One record of a completed file transfer.
///
/// Created the instant a file-receive completes, by whichever side received
/// the file. The nexus's copy is permanent; the producer prunes its local
/// copy once the nexus confirms it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLogEntry {
    /// Globally unique entry id, assigned by the producer.
    pub id: LogId,
    /// Sending agent, when known.
    pub from_agent_id: Option<AgentId>,
    /// Sending agent's display name at transfer time.
    pub from_agent_name: String,
    /// Receiving agent; `None` when the nexus itself received the file.
    pub to_agent_id: Option<AgentId>,
    /// Receiving side's display name at transfer time.
    pub to_agent_name: String,
    /// Name the file was stored under.
    pub filename: String,
    /// Bytes written.
    pub file_size: u64,
    /// Completion time.
    pub timestamp: DateTime<Utc>,
}

/// Log-sync response: the submitted ids now present on the nexus.
///
/// The sender marks exactly these as synced and prunes them locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSyncResponse {
    /// Ids confirmed present remotely (newly merged or already known).
    pub merged_ids: Vec<LogId>,
}

/// Upload success response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadReceipt {
    /// Final filename the upload landed at.
    pub filename: String,
    /// Bytes written to disk.
    pub size: u64,
}
