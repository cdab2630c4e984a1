//! Agent application state.
//!
//! One struct owns every long-lived component; periodic tasks and HTTP
//! handlers all work through it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nexlink_transfer::FileReceiver;

use crate::config::AgentConfig;
use crate::connection::ConnectionManager;
use crate::identity::IdentityStore;
use crate::logs::TransferLogStore;
use crate::nexus_client::NexusClient;
use crate::peers::PeerCache;

/// Shared state for the agent daemon.
pub struct AppState {
    /// Daemon configuration.
    pub config: AgentConfig,
    /// The durable identity record.
    pub identity: Arc<IdentityStore>,
    /// Local peer-list snapshot.
    pub peers: Arc<PeerCache>,
    /// Local transfer log.
    pub logs: Arc<TransferLogStore>,
    /// HTTP client for the nexus.
    pub client: NexusClient,
    /// The persistent channel.
    pub connection: Arc<ConnectionManager>,
    /// The crash-safe receive path for incoming files.
    pub receiver: FileReceiver,
    // Single-flight guard: a scheduled tick and a reconnect-triggered
    // registration must never race to register twice.
    registration_inflight: AtomicBool,
}

impl AppState {
    /// Assemble the agent state from its components.
    #[must_use]
    pub fn new(
        config: AgentConfig,
        identity: Arc<IdentityStore>,
        peers: Arc<PeerCache>,
        logs: Arc<TransferLogStore>,
        client: NexusClient,
        connection: Arc<ConnectionManager>,
        receiver: FileReceiver,
    ) -> Self {
        Self {
            config,
            identity,
            peers,
            logs,
            client,
            connection,
            receiver,
            registration_inflight: AtomicBool::new(false),
        }
    }

    /// Try to claim the registration single-flight slot.
    #[must_use]
    pub fn begin_registration(&self) -> bool {
        self.registration_inflight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Release the registration single-flight slot.
    pub fn end_registration(&self) {
        self.registration_inflight.store(false, Ordering::SeqCst);
    }
}
