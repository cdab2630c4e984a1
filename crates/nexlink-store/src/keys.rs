//! Key encoding utilities for RocksDB.
//!
//! All index keys are designed to support efficient prefix scans.

use nexlink_core::{AgentAddress, AgentId, AgentState, LogId};

/// The `meta` cell holding the peer-list version (u64 big-endian).
pub const PEER_LIST_VERSION_KEY: &[u8] = b"peer_list_version";

/// Encode an agent key (just the agent id bytes).
#[must_use]
pub fn agent_key(agent_id: &AgentId) -> Vec<u8> {
    agent_id.as_bytes().to_vec()
}

/// Encode an address index key: the `host:port` string bytes.
#[must_use]
pub fn addr_key(address: &AgentAddress) -> Vec<u8> {
    address.to_string().into_bytes()
}

/// The index byte for an approval state.
///
/// `Unregistered` is never persisted; it maps to 0 only so the function is
/// total.
#[must_use]
pub const fn state_byte(state: AgentState) -> u8 {
    match state {
        AgentState::Unregistered => 0,
        AgentState::PendingApproval => 1,
        AgentState::Approved => 2,
    }
}

/// Encode a state index key: `state_byte || agent_id`.
#[must_use]
pub fn state_agent_key(state: AgentState, agent_id: &AgentId) -> Vec<u8> {
    let mut key = Vec::with_capacity(17);
    key.push(state_byte(state));
    key.extend_from_slice(agent_id.as_bytes());
    key
}

/// Encode a state prefix for scanning all agents in a state.
#[must_use]
pub fn state_prefix(state: AgentState) -> Vec<u8> {
    vec![state_byte(state)]
}

/// Extract the agent id from a state index key.
///
/// # Panics
///
/// Panics if the key is not at least 17 bytes.
#[must_use]
pub fn extract_agent_id_from_state_key(key: &[u8]) -> AgentId {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[1..17]);
    AgentId::from_uuid(uuid_from_bytes(bytes))
}

/// Encode a transfer-log key (just the log id bytes).
#[must_use]
pub fn log_key(log_id: &LogId) -> Vec<u8> {
    log_id.as_bytes().to_vec()
}

fn uuid_from_bytes(bytes: [u8; 16]) -> uuid::Uuid {
    uuid::Uuid::from_bytes(bytes)
}
