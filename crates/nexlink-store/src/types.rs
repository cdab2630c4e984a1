//! Durable record types for the nexus store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use nexlink_core::{is_online, AgentAddress, AgentId, AgentState, PeerInfo};

/// The nexus's durable record of one physical agent.
///
/// Invariants maintained by the registry layer:
///
/// - `auth_token`/`public_token` are `Some` if and only if `state` is
///   `Approved`.
/// - `requested_name` is `Some` only while `state` is `Approved`.
/// - `Unregistered` never appears here; it is implicit in "no record exists".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Stable identifier, assigned once at registration.
    pub id: AgentId,
    /// Current display name.
    pub name: String,
    /// A rename awaiting operator approval, orthogonal to `state`.
    pub requested_name: Option<String>,
    /// Last address the agent registered or reported from.
    pub address: AgentAddress,
    /// Approval state; only `PendingApproval` and `Approved` are persisted.
    pub state: AgentState,
    /// Privileged token, issued on approval.
    pub auth_token: Option<String>,
    /// Peer credential, issued on approval.
    pub public_token: Option<String>,
    /// False until push delivery confirms the current approval reached the
    /// agent.
    pub approval_pushed: bool,
    /// When the record was created.
    pub registered_at: DateTime<Utc>,
    /// Last authenticated contact; `online` is derived from this, never
    /// stored.
    pub last_seen_at: DateTime<Utc>,
}

impl AgentRecord {
    /// Create a fresh pending record for a new registration.
    #[must_use]
    pub fn new_pending(name: String, address: AgentAddress) -> Self {
        let now = Utc::now();
        Self {
            id: AgentId::generate(),
            name,
            requested_name: None,
            address,
            state: AgentState::PendingApproval,
            auth_token: None,
            public_token: None,
            approval_pushed: false,
            registered_at: now,
            last_seen_at: now,
        }
    }

    /// Whether the agent has been seen recently enough to count as online.
    #[must_use]
    pub fn is_online(&self, now: DateTime<Utc>) -> bool {
        is_online(self.last_seen_at, now)
    }

    /// Project this record into the peer view distributed to agents.
    #[must_use]
    pub fn to_peer_info(&self, now: DateTime<Utc>) -> PeerInfo {
        PeerInfo {
            agent_id: Some(self.id),
            name: self.name.clone(),
            host: self.address.host.clone(),
            port: self.address.port,
            online: self.is_online(now),
            public_token: self.public_token.clone(),
        }
    }
}
