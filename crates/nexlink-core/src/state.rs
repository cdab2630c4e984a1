//! Agent lifecycle state and addressing.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How long an agent may go without authenticated contact before it is
/// considered offline, in seconds. Online is always computed from
/// `last_seen_at`, never stored.
pub const ONLINE_THRESHOLD_SECS: i64 = 120;

/// Lifecycle state of an agent record.
///
/// `Unregistered` only ever exists on the agent's own side; the nexus
/// represents it implicitly as "no record".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentState {
    /// No registration has been performed (or the record was wiped).
    Unregistered,
    /// Registered with the nexus, awaiting operator approval.
    PendingApproval,
    /// Admitted into the trusted peer set; credentials issued.
    Approved,
}

impl AgentState {
    /// Whether this state carries credentials.
    #[must_use]
    pub const fn is_approved(self) -> bool {
        matches!(self, Self::Approved)
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unregistered => "UNREGISTERED",
            Self::PendingApproval => "PENDING_APPROVAL",
            Self::Approved => "APPROVED",
        };
        write!(f, "{s}")
    }
}

/// A network address an agent registers under.
///
/// The address is the natural dedup key during registration, before the agent
/// has been assigned an id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentAddress {
    /// Host or IP the agent is reachable at.
    pub host: String,
    /// Port the agent's HTTP surface listens on.
    pub port: u16,
}

impl AgentAddress {
    /// Create a new address.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Base URL for direct requests to this agent.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for AgentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Compute whether a peer is online from its last authenticated contact.
#[must_use]
pub fn is_online(last_seen_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(last_seen_at) < Duration::seconds(ONLINE_THRESHOLD_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_wire_form() {
        let json = serde_json::to_string(&AgentState::PendingApproval).unwrap();
        assert_eq!(json, "\"PENDING_APPROVAL\"");
        let parsed: AgentState = serde_json::from_str("\"APPROVED\"").unwrap();
        assert_eq!(parsed, AgentState::Approved);
    }

    #[test]
    fn address_display() {
        let addr = AgentAddress::new("192.168.1.20", 8081);
        assert_eq!(addr.to_string(), "192.168.1.20:8081");
        assert_eq!(addr.base_url(), "http://192.168.1.20:8081");
    }

    #[test]
    fn online_threshold_boundary() {
        let now = Utc::now();
        assert!(is_online(now - Duration::seconds(119), now));
        // Exactly at the threshold counts as offline.
        assert!(!is_online(now - Duration::seconds(120), now));
        assert!(!is_online(now - Duration::minutes(10), now));
    }
}
