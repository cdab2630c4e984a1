//! Open-channel registry: one live session per agent.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use nexlink_core::{AgentId, ChannelMessage};

/// Tracks the currently open channel per agent.
///
/// Exactly one physical session is owned per agent at any time: registering a
/// new sender replaces the previous one, and a session only unregisters
/// itself if it is still the current one (a stale session must not tear down
/// its replacement).
#[derive(Default)]
pub struct Channels {
    senders: Mutex<HashMap<AgentId, mpsc::UnboundedSender<ChannelMessage>>>,
}

impl Channels {
    /// Create an empty channel registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the open channel for an agent, replacing any previous one.
    pub fn register(&self, agent_id: AgentId, sender: mpsc::UnboundedSender<ChannelMessage>) {
        let replaced = self.senders.lock().insert(agent_id, sender).is_some();
        if replaced {
            tracing::info!(agent_id = %agent_id, "Replaced existing agent channel");
        } else {
            tracing::info!(agent_id = %agent_id, "Agent channel registered");
        }
    }

    /// Drop the channel for an agent, but only if `sender` is still current.
    pub fn unregister(&self, agent_id: &AgentId, sender: &mpsc::UnboundedSender<ChannelMessage>) {
        let mut senders = self.senders.lock();
        if senders
            .get(agent_id)
            .is_some_and(|current| current.same_channel(sender))
        {
            senders.remove(agent_id);
            tracing::info!(agent_id = %agent_id, "Agent channel unregistered");
        }
    }

    /// Whether the agent currently has an open channel.
    #[must_use]
    pub fn is_connected(&self, agent_id: &AgentId) -> bool {
        self.senders.lock().contains_key(agent_id)
    }

    /// Send a message over the agent's open channel.
    ///
    /// Returns `false` when no channel is open or the session has already
    /// gone away; callers fall back to the direct request path themselves.
    pub fn send(&self, agent_id: &AgentId, message: ChannelMessage) -> bool {
        let mut senders = self.senders.lock();
        let Some(sender) = senders.get(agent_id) else {
            return false;
        };
        if sender.send(message).is_err() {
            // Receiver dropped without unregistering; clean up the entry.
            senders.remove(agent_id);
            return false;
        }
        true
    }

    /// Number of currently open channels.
    #[must_use]
    pub fn connected_count(&self) -> usize {
        self.senders.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexlink_core::RenamePush;

    fn rename_msg(name: &str) -> ChannelMessage {
        ChannelMessage::RenameRequest(RenamePush {
            agent_name: name.into(),
        })
    }

    #[test]
    fn send_without_channel_is_a_noop() {
        let channels = Channels::new();
        assert!(!channels.send(&AgentId::generate(), rename_msg("ws-lab")));
    }

    #[test]
    fn send_reaches_registered_channel() {
        let channels = Channels::new();
        let agent_id = AgentId::generate();
        let (tx, mut rx) = mpsc::unbounded_channel();

        channels.register(agent_id, tx);
        assert!(channels.is_connected(&agent_id));
        assert!(channels.send(&agent_id, rename_msg("ws-lab")));
        assert!(matches!(
            rx.try_recv().unwrap(),
            ChannelMessage::RenameRequest(_)
        ));
    }

    #[test]
    fn new_session_replaces_old_one() {
        let channels = Channels::new();
        let agent_id = AgentId::generate();
        let (old_tx, _old_rx) = mpsc::unbounded_channel();
        let (new_tx, mut new_rx) = mpsc::unbounded_channel();

        channels.register(agent_id, old_tx.clone());
        channels.register(agent_id, new_tx);

        // The stale session's unregister must not remove the replacement.
        channels.unregister(&agent_id, &old_tx);
        assert!(channels.is_connected(&agent_id));

        assert!(channels.send(&agent_id, rename_msg("ws-lab")));
        assert!(new_rx.try_recv().is_ok());
    }

    #[test]
    fn dropped_receiver_cleans_up_on_send() {
        let channels = Channels::new();
        let agent_id = AgentId::generate();
        let (tx, rx) = mpsc::unbounded_channel();

        channels.register(agent_id, tx);
        drop(rx);

        assert!(!channels.send(&agent_id, rename_msg("ws-lab")));
        assert!(!channels.is_connected(&agent_id));
    }
}
