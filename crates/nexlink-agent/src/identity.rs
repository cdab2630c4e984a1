//! The agent's single durable identity record.
//!
//! Every protocol transition mutates this record under one lock and persists
//! it with the atomic-replace discipline, so a crash mid-write never corrupts
//! the on-disk state and concurrent tasks never interleave read-modify-write
//! cycles.

use std::path::PathBuf;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use nexlink_core::{AgentId, AgentState, ApprovalPush};

use crate::persist::{read_json, write_json_atomic, Result};

const IDENTITY_FILE: &str = "agent_identity.json";

/// The agent's view of its own identity, mirrored from the nexus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentIdentity {
    /// Assigned by the nexus at registration; `None` until then.
    pub id: Option<AgentId>,
    /// Current display name.
    pub name: String,
    /// Host this agent registered under.
    pub host: String,
    /// Port this agent registered under.
    pub port: u16,
    /// Lifecycle state as last confirmed by the nexus.
    pub state: AgentState,
    /// Privileged token; present only once approved.
    pub auth_token: Option<String>,
    /// Peer credential; present only once approved.
    pub public_token: Option<String>,
}

impl AgentIdentity {
    fn fresh(name: String, host: String, port: u16) -> Self {
        Self {
            id: None,
            name,
            host,
            port,
            state: AgentState::Unregistered,
            auth_token: None,
            public_token: None,
        }
    }
}

/// Durable, lock-guarded owner of the identity record.
pub struct IdentityStore {
    path: PathBuf,
    inner: Mutex<AgentIdentity>,
}

impl IdentityStore {
    /// Load the identity from `data_dir`, or create a fresh unregistered one.
    ///
    /// A corrupt or unreadable file is replaced with a fresh record rather
    /// than failing startup; the agent will simply re-register.
    ///
    /// # Errors
    ///
    /// Returns an error only if the fresh record cannot be persisted.
    pub fn load_or_create(data_dir: &std::path::Path, name: String, host: String, port: u16) -> Result<Self> {
        let path = data_dir.join(IDENTITY_FILE);

        let identity = match read_json::<AgentIdentity>(&path) {
            Ok(Some(identity)) => {
                tracing::info!(
                    name = %identity.name,
                    id = ?identity.id,
                    state = %identity.state,
                    "Loaded agent identity"
                );
                identity
            }
            Ok(None) => {
                let fresh = AgentIdentity::fresh(name, host, port);
                write_json_atomic(&path, &fresh)?;
                tracing::info!(name = %fresh.name, "Generated new agent identity");
                fresh
            }
            Err(e) => {
                tracing::warn!(error = %e, "Corrupted identity file, creating fresh identity");
                let fresh = AgentIdentity::fresh(name, host, port);
                write_json_atomic(&path, &fresh)?;
                fresh
            }
        };

        Ok(Self {
            path,
            inner: Mutex::new(identity),
        })
    }

    /// A copy of the current record.
    #[must_use]
    pub fn snapshot(&self) -> AgentIdentity {
        self.inner.lock().clone()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> AgentState {
        self.inner.lock().state
    }

    /// Current auth token, if approved.
    #[must_use]
    pub fn auth_token(&self) -> Option<String> {
        self.inner.lock().auth_token.clone()
    }

    /// Assigned id, if registered.
    #[must_use]
    pub fn id(&self) -> Option<AgentId> {
        self.inner.lock().id
    }

    /// Record the id the nexus assigned at registration.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be persisted.
    pub fn set_id(&self, id: AgentId) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.id = Some(id);
        write_json_atomic(&self.path, &*inner)
    }

    /// Apply a normal state transition.
    ///
    /// The direct path `APPROVED -> UNREGISTERED` is rejected and logged; the
    /// only way back to unregistered is [`IdentityStore::force_reset`].
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be persisted.
    pub fn transition_to(&self, new_state: AgentState) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state == AgentState::Approved && new_state == AgentState::Unregistered {
            tracing::warn!(
                from = %inner.state,
                to = %new_state,
                "Ignoring invalid state transition"
            );
            return Ok(());
        }
        if inner.state != new_state {
            tracing::info!(from = %inner.state, to = %new_state, "Agent state transition");
            inner.state = new_state;
        }
        write_json_atomic(&self.path, &*inner)
    }

    /// Apply an approval push: id, name, both tokens and state in one atomic
    /// write. Reapplying an identical approval is a no-op.
    ///
    /// Returns whether anything changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be persisted.
    pub fn apply_approval(&self, push: &ApprovalPush) -> Result<bool> {
        self.apply_remote_identity(
            push.agent_id,
            &push.approved_name,
            Some(push.auth_token.clone()),
            Some(push.public_token.clone()),
            push.state,
        )
    }

    /// Apply an identity resolved from the nexus (startup, or approval).
    ///
    /// Returns whether anything changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be persisted.
    pub fn apply_remote_identity(
        &self,
        id: AgentId,
        name: &str,
        auth_token: Option<String>,
        public_token: Option<String>,
        state: AgentState,
    ) -> Result<bool> {
        let mut inner = self.inner.lock();

        let updated = AgentIdentity {
            id: Some(id),
            name: name.to_string(),
            host: inner.host.clone(),
            port: inner.port,
            state,
            auth_token,
            public_token,
        };
        if *inner == updated {
            return Ok(false);
        }

        *inner = updated;
        write_json_atomic(&self.path, &*inner)?;
        tracing::info!(id = %id, name = %name, state = %state, "Applied nexus identity");
        Ok(true)
    }

    /// Apply an approved rename.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be persisted.
    pub fn apply_name(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.name == name {
            return Ok(());
        }
        inner.name = name.to_string();
        write_json_atomic(&self.path, &*inner)?;
        tracing::info!(name = %name, "Agent renamed");
        Ok(())
    }

    /// Clear id, tokens and state back to unregistered, bypassing the
    /// transition guard.
    ///
    /// Only used when the nexus reports it has lost this agent's record; the
    /// agent then re-registers from scratch.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be persisted.
    pub fn force_reset(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state == AgentState::Unregistered && inner.id.is_none() {
            tracing::debug!("Identity already clean, skipping reset");
            return Ok(());
        }
        inner.id = None;
        inner.state = AgentState::Unregistered;
        inner.auth_token = None;
        inner.public_token = None;
        write_json_atomic(&self.path, &*inner)?;
        tracing::info!("Agent force reset to UNREGISTERED");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> IdentityStore {
        IdentityStore::load_or_create(dir.path(), "ws-lab".into(), "10.0.0.5".into(), 8081)
            .unwrap()
    }

    fn approval(id: AgentId) -> ApprovalPush {
        ApprovalPush {
            agent_id: id,
            approved_name: "ws-lab".into(),
            auth_token: "auth.tok".into(),
            public_token: "pub.tok".into(),
            state: AgentState::Approved,
        }
    }

    #[test]
    fn fresh_identity_is_unregistered() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let identity = store.snapshot();
        assert_eq!(identity.state, AgentState::Unregistered);
        assert!(identity.id.is_none());
        assert!(identity.auth_token.is_none());
    }

    #[test]
    fn identity_survives_restart() {
        let dir = TempDir::new().unwrap();
        let id = AgentId::generate();
        {
            let store = store(&dir);
            store.apply_approval(&approval(id)).unwrap();
        }

        let reloaded = store(&dir).snapshot();
        assert_eq!(reloaded.id, Some(id));
        assert_eq!(reloaded.state, AgentState::Approved);
        assert_eq!(reloaded.auth_token.as_deref(), Some("auth.tok"));
    }

    #[test]
    fn corrupt_file_recreates_fresh_identity() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(IDENTITY_FILE), b"{garbage").unwrap();

        let store = store(&dir);
        assert_eq!(store.state(), AgentState::Unregistered);
    }

    #[test]
    fn approved_to_unregistered_is_guarded() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.apply_approval(&approval(AgentId::generate())).unwrap();

        store.transition_to(AgentState::Unregistered).unwrap();
        assert_eq!(store.state(), AgentState::Approved);
    }

    #[test]
    fn force_reset_bypasses_the_guard() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.apply_approval(&approval(AgentId::generate())).unwrap();

        store.force_reset().unwrap();
        let identity = store.snapshot();
        assert_eq!(identity.state, AgentState::Unregistered);
        assert!(identity.id.is_none());
        assert!(identity.auth_token.is_none());
        assert!(identity.public_token.is_none());
    }

    #[test]
    fn reapplying_same_approval_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let push = approval(AgentId::generate());

        assert!(store.apply_approval(&push).unwrap());
        assert!(!store.apply_approval(&push).unwrap());
    }

    #[test]
    fn rename_applies_and_persists() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.apply_name("ws-archive").unwrap();
        assert_eq!(store.snapshot().name, "ws-archive");

        let reloaded = store_reload(&dir);
        assert_eq!(reloaded.snapshot().name, "ws-archive");
    }

    fn store_reload(dir: &TempDir) -> IdentityStore {
        IdentityStore::load_or_create(dir.path(), "unused".into(), "10.0.0.5".into(), 8081)
            .unwrap()
    }
}
