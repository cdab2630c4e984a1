//! Typed envelope codec for the persistent agent/nexus channel.
//!
//! Every frame on the channel is a JSON envelope `{type, version?, payload}`.
//! Decoding is a two-step dispatch: parse the raw envelope, then look up the
//! `type` tag to decode the payload into its concrete shape. Unknown tags
//! decode to [`ChannelMessage::Unknown`] so receivers can log and ignore them
//! instead of dropping the connection (forward compatibility).

use serde::{Deserialize, Serialize};

use crate::ids::AgentId;
use crate::proto::PeerInfo;
use crate::state::AgentState;

/// Approval notification payload, pushed nexus → agent.
///
/// Reapplying the same approval is a no-op on the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalPush {
    /// The id the nexus assigned this agent.
    pub agent_id: AgentId,
    /// The display name the record was approved under.
    pub approved_name: String,
    /// Privileged token for authenticated calls.
    pub auth_token: String,
    /// Peer credential broadcast to other agents.
    pub public_token: String,
    /// Always `Approved`; carried so the agent applies state atomically.
    pub state: AgentState,
}

/// Rename notification payload, pushed nexus → agent (best-effort).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenamePush {
    /// The newly approved display name.
    pub agent_name: String,
}

/// Status report payload, sent agent → nexus over the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    /// The reporting agent's id.
    pub agent_id: AgentId,
    /// The peer-list version the agent believes is current.
    pub peer_version: u64,
    /// Transfer-log entries awaiting confirmation.
    pub unsynced_logs: u64,
}

/// A decoded channel message.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelMessage {
    /// Nexus → agent: approval granted, credentials attached.
    ApprovalPush(ApprovalPush),
    /// Nexus → agent: wholesale peer-list replacement at `version`.
    PeerUpdate {
        /// The full replacement peer list.
        peers: Vec<PeerInfo>,
        /// The version describing `peers`.
        version: u64,
    },
    /// Nexus → agent: an approved rename to apply locally.
    RenameRequest(RenamePush),
    /// Agent → nexus: periodic status over the channel.
    StatusUpdate(StatusReport),
    /// A tag this build does not know. Logged and ignored by receivers.
    Unknown(String),
}

/// The raw wire envelope before payload dispatch.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<u64>,
    payload: serde_json::Value,
}

/// Errors from encoding or decoding channel envelopes.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// The frame was not a valid envelope, or its payload did not match the
    /// shape its tag promises.
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A `peer_update` arrived without the version its list belongs to.
    #[error("peer_update envelope missing version")]
    MissingVersion,

    /// [`ChannelMessage::Unknown`] cannot be re-encoded.
    #[error("cannot encode unknown message tag: {0}")]
    UnknownTag(String),
}

impl ChannelMessage {
    /// Decode a channel frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a valid envelope, if a known tag
    /// carries a payload of the wrong shape, or if a `peer_update` lacks its
    /// version. An unknown tag is **not** an error.
    pub fn decode(raw: &str) -> Result<Self, EnvelopeError> {
        let envelope: Envelope = serde_json::from_str(raw)?;
        let msg = match envelope.kind.as_str() {
            "approval_push" => Self::ApprovalPush(serde_json::from_value(envelope.payload)?),
            "peer_update" => Self::PeerUpdate {
                peers: serde_json::from_value(envelope.payload)?,
                version: envelope.version.ok_or(EnvelopeError::MissingVersion)?,
            },
            "rename_request" => Self::RenameRequest(serde_json::from_value(envelope.payload)?),
            "status_update" => Self::StatusUpdate(serde_json::from_value(envelope.payload)?),
            other => Self::Unknown(other.to_string()),
        };
        Ok(msg)
    }

    /// Encode this message as a channel frame.
    ///
    /// # Errors
    ///
    /// Returns an error for [`ChannelMessage::Unknown`], which has no payload
    /// to re-encode.
    pub fn encode(&self) -> Result<String, EnvelopeError> {
        let envelope = match self {
            Self::ApprovalPush(payload) => Envelope {
                kind: "approval_push".into(),
                version: None,
                payload: serde_json::to_value(payload)?,
            },
            Self::PeerUpdate { peers, version } => Envelope {
                kind: "peer_update".into(),
                version: Some(*version),
                payload: serde_json::to_value(peers)?,
            },
            Self::RenameRequest(payload) => Envelope {
                kind: "rename_request".into(),
                version: None,
                payload: serde_json::to_value(payload)?,
            },
            Self::StatusUpdate(payload) => Envelope {
                kind: "status_update".into(),
                version: None,
                payload: serde_json::to_value(payload)?,
            },
            Self::Unknown(tag) => return Err(EnvelopeError::UnknownTag(tag.clone())),
        };
        Ok(serde_json::to_string(&envelope)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approval_push_roundtrip() {
        let msg = ChannelMessage::ApprovalPush(ApprovalPush {
            agent_id: AgentId::generate(),
            approved_name: "ws-archive".into(),
            auth_token: "auth.tok".into(),
            public_token: "pub.tok".into(),
            state: AgentState::Approved,
        });
        let raw = msg.encode().unwrap();
        assert!(raw.contains("\"type\":\"approval_push\""));
        assert_eq!(ChannelMessage::decode(&raw).unwrap(), msg);
    }

    #[test]
    fn peer_update_carries_version_on_envelope() {
        let msg = ChannelMessage::PeerUpdate {
            peers: vec![PeerInfo {
                agent_id: None,
                name: "Nexus".into(),
                host: "10.0.0.1".into(),
                port: 8080,
                online: true,
                public_token: None,
            }],
            version: 7,
        };
        let raw = msg.encode().unwrap();
        assert!(raw.contains("\"version\":7"));
        match ChannelMessage::decode(&raw).unwrap() {
            ChannelMessage::PeerUpdate { peers, version } => {
                assert_eq!(version, 7);
                assert_eq!(peers.len(), 1);
            }
            other => panic!("expected PeerUpdate, got {other:?}"),
        }
    }

    #[test]
    fn peer_update_without_version_rejected() {
        let raw = r#"{"type":"peer_update","payload":[]}"#;
        assert!(matches!(
            ChannelMessage::decode(raw),
            Err(EnvelopeError::MissingVersion)
        ));
    }

    #[test]
    fn unknown_tag_is_not_an_error() {
        let raw = r#"{"type":"metrics_snapshot","payload":{"cpu":0.3}}"#;
        match ChannelMessage::decode(raw).unwrap() {
            ChannelMessage::Unknown(tag) => assert_eq!(tag, "metrics_snapshot"),
            other => panic!("expected Unknown, got {other:?}"),
        }
    }

    #[test]
    fn unknown_tag_cannot_encode() {
        let msg = ChannelMessage::Unknown("metrics_snapshot".into());
        assert!(matches!(msg.encode(), Err(EnvelopeError::UnknownTag(_))));
    }

    #[test]
    fn malformed_payload_rejected() {
        let raw = r#"{"type":"approval_push","payload":{"agent_id":12}}"#;
        assert!(matches!(
            ChannelMessage::decode(raw),
            Err(EnvelopeError::Malformed(_))
        ));
    }
}
