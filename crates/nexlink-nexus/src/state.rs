//! Nexus application state.
//!
//! This module defines the shared state available to all request handlers.

use std::sync::Arc;

use nexlink_auth::TokenService;
use nexlink_transfer::FileReceiver;

use crate::channels::Channels;
use crate::config::NexusConfig;
use crate::push::PushService;
use crate::registry::Registry;

/// Shared application state for the nexus.
pub struct NexusState {
    /// The registration & approval state machine.
    pub registry: Arc<Registry>,
    /// Open agent channels.
    pub channels: Arc<Channels>,
    /// Push delivery for approvals and renames.
    pub push: Arc<PushService>,
    /// Token issuance/verification.
    pub tokens: TokenService,
    /// The crash-safe upload path.
    pub receiver: FileReceiver,
    /// Service configuration.
    pub config: NexusConfig,
}

impl NexusState {
    /// Assemble the full service state from its components.
    #[must_use]
    pub fn new(
        registry: Arc<Registry>,
        channels: Arc<Channels>,
        push: Arc<PushService>,
        tokens: TokenService,
        receiver: FileReceiver,
        config: NexusConfig,
    ) -> Self {
        Self {
            registry,
            channels,
            push,
            tokens,
            receiver,
            config,
        }
    }
}
