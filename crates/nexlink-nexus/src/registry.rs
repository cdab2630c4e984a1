//! Agent registration, approval and peer-list versioning.
//!
//! The registry drives every durable agent record through
//! `PENDING_APPROVAL -> APPROVED` and owns the peer-list version counter.
//! Structural changes to the approved set (approve, remove-while-approved,
//! rename-approve, address change) increment the version by exactly one, and
//! every increment happens under a single mutex so concurrent changes can
//! never lose an update.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

use nexlink_auth::{AuthError, TokenService, TokenScope};
use nexlink_core::{
    AgentAddress, AgentId, AgentState, IdentityResponse, PeerInfo, PeerListResponse,
    RegisterResponse, StatusRequest, StatusResponse,
};
use nexlink_store::{AgentRecord, Store, StoreError};

/// A result type using `RegistryError`.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors from registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No record exists for this id.
    #[error("unknown agent: {0}")]
    AgentNotFound(AgentId),

    /// The operation requires a different approval state.
    #[error("agent {agent_id} is {actual}, operation requires {expected}")]
    InvalidState {
        /// The record the operation targeted.
        agent_id: AgentId,
        /// The state the operation requires.
        expected: &'static str,
        /// The state the record is actually in.
        actual: AgentState,
    },

    /// A rename name failed validation.
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// The requested name is taken by an approved agent or another pending
    /// rename.
    #[error("name already in use: {0}")]
    NameTaken(String),

    /// Rename approval/rejection without a pending request.
    #[error("agent {0} has no pending rename")]
    NoPendingRename(AgentId),

    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Token issuance failure.
    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Fleet-level counters for the operator dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct NexusStats {
    /// All records, pending and approved.
    pub total_agents: u64,
    /// Agents seen within the online threshold.
    pub online: u64,
    /// Agents not seen recently.
    pub offline: u64,
    /// Records awaiting approval.
    pub pending: u64,
    /// Approved records with a rename awaiting approval.
    pub pending_renames: u64,
    /// Transfer-log entries stored on the nexus.
    pub total_transfers: u64,
    /// Total bytes across all logged transfers.
    pub total_bytes: u64,
}

/// The registration & approval state machine over the durable store.
pub struct Registry {
    store: Arc<dyn Store>,
    tokens: TokenService,
    nexus_name: String,
    nexus_address: AgentAddress,
    // Serializes structural mutations and the version read-modify-write; a
    // lost increment is a correctness bug.
    structural: Mutex<()>,
}

impl Registry {
    /// Create a registry over a store.
    ///
    /// `nexus_address` is advertised in the synthetic nexus entry of every
    /// peer list.
    pub fn new(store: Arc<dyn Store>, tokens: TokenService, nexus_address: AgentAddress) -> Self {
        Self {
            store,
            tokens,
            nexus_name: "Nexus".to_string(),
            nexus_address,
            structural: Mutex::new(()),
        }
    }

    /// Get a reference to the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register an agent, idempotent on address.
    ///
    /// A retransmitted registration from an agent that lost the response
    /// returns the existing record's `(id, state)` unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error only on storage failure.
    pub fn register(&self, name: &str, address: AgentAddress) -> Result<RegisterResponse> {
        let _guard = self.structural.lock();

        if let Some(existing) = self.store.find_agent_by_address(&address)? {
            tracing::info!(agent_id = %existing.id, %address, "Agent already registered, returning existing record");
            return Ok(RegisterResponse {
                agent_id: existing.id,
                state: existing.state,
            });
        }

        let name = if name.trim().is_empty() {
            address.to_string()
        } else {
            name.trim().to_string()
        };

        let record = AgentRecord::new_pending(name, address);
        self.store.put_agent(&record)?;
        tracing::info!(agent_id = %record.id, name = %record.name, "New agent pending approval");

        Ok(RegisterResponse {
            agent_id: record.id,
            state: record.state,
        })
    }

    /// Resolve an identity by registered address (agent startup).
    ///
    /// # Errors
    ///
    /// Returns an error only on storage failure. An unknown address is
    /// `Ok(None)`, which the HTTP layer maps to 404.
    pub fn identify(&self, address: &AgentAddress) -> Result<Option<IdentityResponse>> {
        let record = self.store.find_agent_by_address(address)?;
        Ok(record.map(|r| IdentityResponse {
            agent_id: r.id,
            name: r.name,
            auth_token: r.auth_token,
            public_token: r.public_token,
            state: r.state,
        }))
    }

    /// Whether a record with this id exists.
    ///
    /// # Errors
    ///
    /// Returns an error only on storage failure.
    pub fn exists(&self, agent_id: &AgentId) -> Result<bool> {
        Ok(self.store.get_agent(agent_id)?.is_some())
    }

    /// Fetch a record by id.
    ///
    /// # Errors
    ///
    /// Returns `AgentNotFound` if no record exists.
    pub fn get(&self, agent_id: &AgentId) -> Result<AgentRecord> {
        self.store
            .get_agent(agent_id)?
            .ok_or(RegistryError::AgentNotFound(*agent_id))
    }

    // =========================================================================
    // Approval
    // =========================================================================

    /// Approve a pending agent: issue both tokens, admit it into the peer
    /// set, and leave it flagged for push delivery.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` unless the record is `PENDING_APPROVAL`.
    pub fn approve(&self, agent_id: &AgentId) -> Result<AgentRecord> {
        let _guard = self.structural.lock();

        let mut record = self.get(agent_id)?;
        if record.state != AgentState::PendingApproval {
            return Err(RegistryError::InvalidState {
                agent_id: *agent_id,
                expected: "PENDING_APPROVAL",
                actual: record.state,
            });
        }

        record.state = AgentState::Approved;
        record.auth_token = Some(self.tokens.issue(record.id, &record.name, TokenScope::Auth)?);
        record.public_token = Some(self.tokens.issue(record.id, &record.name, TokenScope::Public)?);
        record.approval_pushed = false;
        self.store.put_agent(&record)?;

        let version = self.bump_version()?;
        tracing::info!(agent_id = %record.id, name = %record.name, version, "Agent approved");

        Ok(record)
    }

    /// Reject a pending agent: delete the record.
    ///
    /// No version change; the agent was never part of the approved set.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` unless the record is `PENDING_APPROVAL`.
    pub fn reject(&self, agent_id: &AgentId) -> Result<()> {
        let _guard = self.structural.lock();

        let record = self.get(agent_id)?;
        if record.state != AgentState::PendingApproval {
            return Err(RegistryError::InvalidState {
                agent_id: *agent_id,
                expected: "PENDING_APPROVAL",
                actual: record.state,
            });
        }

        self.store.delete_agent(agent_id)?;
        tracing::info!(agent_id = %agent_id, name = %record.name, "Agent rejected and removed");
        Ok(())
    }

    /// Remove a record entirely, approved or not.
    ///
    /// Deletion is the only path back to unregistered; removing an approved
    /// agent is a structural change and increments the version.
    ///
    /// # Errors
    ///
    /// Returns `AgentNotFound` if no record exists.
    pub fn remove(&self, agent_id: &AgentId) -> Result<()> {
        let _guard = self.structural.lock();

        let record = self.get(agent_id)?;
        self.store.delete_agent(agent_id)?;

        if record.state == AgentState::Approved {
            let version = self.bump_version()?;
            tracing::info!(agent_id = %agent_id, name = %record.name, version, "Approved agent removed");
        } else {
            tracing::info!(agent_id = %agent_id, name = %record.name, "Pending agent removed");
        }
        Ok(())
    }

    // =========================================================================
    // Rename
    // =========================================================================

    /// Record a rename request for later operator approval.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` unless approved, `InvalidName` for blank names,
    /// and `NameTaken` when the name collides with an approved agent or
    /// another pending rename.
    pub fn request_rename(&self, agent_id: &AgentId, new_name: &str) -> Result<()> {
        let _guard = self.structural.lock();

        let mut record = self.get(agent_id)?;
        if record.state != AgentState::Approved {
            return Err(RegistryError::InvalidState {
                agent_id: *agent_id,
                expected: "APPROVED",
                actual: record.state,
            });
        }

        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(RegistryError::InvalidName("name cannot be blank".into()));
        }
        if record.name.eq_ignore_ascii_case(new_name) {
            return Err(RegistryError::InvalidName(
                "name is unchanged".into(),
            ));
        }

        for other in self.store.list_all_agents()? {
            let taken = other.name.eq_ignore_ascii_case(new_name)
                || other
                    .requested_name
                    .as_deref()
                    .is_some_and(|r| r.eq_ignore_ascii_case(new_name));
            if taken && other.id != *agent_id {
                return Err(RegistryError::NameTaken(new_name.to_string()));
            }
        }

        record.requested_name = Some(new_name.to_string());
        self.store.put_agent(&record)?;
        tracing::info!(agent_id = %agent_id, from = %record.name, to = %new_name, "Rename requested");
        Ok(())
    }

    /// Approve a pending rename; the new name becomes structural.
    ///
    /// # Errors
    ///
    /// Returns `NoPendingRename` if nothing is pending.
    pub fn approve_rename(&self, agent_id: &AgentId) -> Result<AgentRecord> {
        let _guard = self.structural.lock();

        let mut record = self.get(agent_id)?;
        let Some(requested) = record.requested_name.take() else {
            return Err(RegistryError::NoPendingRename(*agent_id));
        };

        let old_name = std::mem::replace(&mut record.name, requested);
        self.store.put_agent(&record)?;

        let version = self.bump_version()?;
        tracing::info!(agent_id = %agent_id, from = %old_name, to = %record.name, version, "Rename approved");
        Ok(record)
    }

    /// Reject a pending rename; the current name stands, no version change.
    ///
    /// # Errors
    ///
    /// Returns `NoPendingRename` if nothing is pending.
    pub fn reject_rename(&self, agent_id: &AgentId) -> Result<()> {
        let _guard = self.structural.lock();

        let mut record = self.get(agent_id)?;
        let Some(requested) = record.requested_name.take() else {
            return Err(RegistryError::NoPendingRename(*agent_id));
        };

        self.store.put_agent(&record)?;
        tracing::info!(agent_id = %agent_id, rejected = %requested, "Rename rejected");
        Ok(())
    }

    // =========================================================================
    // Status & Peers
    // =========================================================================

    /// Process a status/heartbeat exchange.
    ///
    /// Always refreshes `last_seen_at`. An address change while approved is
    /// structural and bumps the version. When the agent's known version is
    /// behind, the response carries the full peer list together with the
    /// version that describes it.
    ///
    /// # Errors
    ///
    /// Returns `AgentNotFound` for unknown ids, which agents interpret as
    /// lost identity.
    pub fn update_status(&self, request: &StatusRequest) -> Result<StatusResponse> {
        let _guard = self.structural.lock();

        let mut record = self.get(&request.agent_id)?;

        let new_address = AgentAddress::new(request.host.clone(), request.port);
        let address_changed = record.address != new_address;
        if address_changed {
            record.address = new_address;
        }
        record.last_seen_at = Utc::now();
        self.store.put_agent(&record)?;

        if address_changed && record.state == AgentState::Approved {
            let version = self.bump_version()?;
            tracing::info!(agent_id = %record.id, address = %record.address, version, "Agent address changed");
        }

        let current = self.store.peer_list_version()?;
        let peer_outdated = request.peer_version < current;

        let (peers, version) = if peer_outdated && record.state == AgentState::Approved {
            (Some(self.peers_excluding(&record.id)?), Some(current))
        } else {
            (None, None)
        };

        Ok(StatusResponse {
            state: record.state,
            peer_outdated,
            approved_name: Some(record.name),
            peers,
            version,
        })
    }

    /// Refresh `last_seen_at` only (channel-borne status).
    ///
    /// # Errors
    ///
    /// Returns `AgentNotFound` for unknown ids.
    pub fn touch(&self, agent_id: &AgentId) -> Result<()> {
        let mut record = self.get(agent_id)?;
        record.last_seen_at = Utc::now();
        self.store.put_agent(&record)?;
        Ok(())
    }

    /// The full peer list for an agent, with the version describing it.
    ///
    /// # Errors
    ///
    /// Returns an error only on storage failure.
    pub fn peer_list_for(&self, agent_id: &AgentId) -> Result<PeerListResponse> {
        let _guard = self.structural.lock();
        Ok(PeerListResponse {
            peers: self.peers_excluding(agent_id)?,
            version: self.store.peer_list_version()?,
        })
    }

    /// The current peer-list version.
    ///
    /// # Errors
    ///
    /// Returns an error only on storage failure.
    pub fn current_version(&self) -> Result<u64> {
        Ok(self.store.peer_list_version()?)
    }

    /// Approved agents whose approval has not yet been delivered.
    ///
    /// # Errors
    ///
    /// Returns an error only on storage failure.
    pub fn unpushed_approvals(&self) -> Result<Vec<AgentRecord>> {
        Ok(self
            .store
            .list_agents_by_state(AgentState::Approved)?
            .into_iter()
            .filter(|a| !a.approval_pushed)
            .collect())
    }

    /// Persist that the current approval reached the agent.
    ///
    /// # Errors
    ///
    /// Returns `AgentNotFound` if the record was removed meanwhile.
    pub fn mark_approval_pushed(&self, agent_id: &AgentId) -> Result<()> {
        let mut record = self.get(agent_id)?;
        record.approval_pushed = true;
        self.store.put_agent(&record)?;
        Ok(())
    }

    /// All records, for the operator dashboard.
    ///
    /// # Errors
    ///
    /// Returns an error only on storage failure.
    pub fn list_all(&self) -> Result<Vec<AgentRecord>> {
        Ok(self.store.list_all_agents()?)
    }

    /// Records in one approval state, for the operator dashboard.
    ///
    /// # Errors
    ///
    /// Returns an error only on storage failure.
    pub fn list_by_state(&self, state: AgentState) -> Result<Vec<AgentRecord>> {
        Ok(self.store.list_agents_by_state(state)?)
    }

    /// Approved records with a pending rename.
    ///
    /// # Errors
    ///
    /// Returns an error only on storage failure.
    pub fn list_pending_renames(&self) -> Result<Vec<AgentRecord>> {
        Ok(self
            .store
            .list_agents_by_state(AgentState::Approved)?
            .into_iter()
            .filter(|a| a.requested_name.is_some())
            .collect())
    }

    /// Fleet counters for the dashboard.
    ///
    /// # Errors
    ///
    /// Returns an error only on storage failure.
    pub fn stats(&self) -> Result<NexusStats> {
        let now = Utc::now();
        let all = self.store.list_all_agents()?;
        let total_agents = all.len() as u64;
        let online = all.iter().filter(|a| a.is_online(now)).count() as u64;
        let pending = all
            .iter()
            .filter(|a| a.state == AgentState::PendingApproval)
            .count() as u64;
        let pending_renames = all
            .iter()
            .filter(|a| a.state == AgentState::Approved && a.requested_name.is_some())
            .count() as u64;

        Ok(NexusStats {
            total_agents,
            online,
            offline: total_agents - online,
            pending,
            pending_renames,
            total_transfers: self.store.count_logs()?,
            total_bytes: self.store.total_log_bytes()?,
        })
    }

    // =========================================================================
    // Internal
    // =========================================================================

    /// Approved peers minus the caller, plus the synthetic nexus entry.
    fn peers_excluding(&self, agent_id: &AgentId) -> Result<Vec<PeerInfo>> {
        let now = Utc::now();
        let mut peers = vec![self.nexus_peer()];
        peers.extend(
            self.store
                .list_agents_by_state(AgentState::Approved)?
                .iter()
                .filter(|a| a.id != *agent_id)
                .map(|a| a.to_peer_info(now)),
        );
        Ok(peers)
    }

    /// The synthetic entry representing the nexus itself as a peer.
    fn nexus_peer(&self) -> PeerInfo {
        PeerInfo {
            agent_id: None,
            name: self.nexus_name.clone(),
            host: self.nexus_address.host.clone(),
            port: self.nexus_address.port,
            online: true,
            public_token: None,
        }
    }

    /// Increment the version cell. Callers must hold `structural`.
    fn bump_version(&self) -> Result<u64> {
        let version = self.store.peer_list_version()? + 1;
        self.store.put_peer_list_version(version)?;
        Ok(version)
    }
}
