//! Push delivery: approval and rename notifications, nexus -> agent.
//!
//! Approval delivery is at-least-once and eventually consistent: a fixed
//! sweep period doubles as the retry interval, and `approval_pushed` is only
//! persisted after a delivery succeeds. Each sweep prefers the agent's open
//! channel and falls back to a direct request against its last-known address.
//! Rename pushes ride the same preference but are best-effort: the
//! authoritative name still reaches the agent on its next status exchange.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use nexlink_core::{AgentId, ApprovalPush, ChannelMessage, RenamePush};
use nexlink_store::AgentRecord;

use crate::channels::Channels;
use crate::registry::Registry;

/// Delivers approval and rename notifications to agents.
pub struct PushService {
    registry: Arc<Registry>,
    channels: Arc<Channels>,
    http: reqwest::Client,
    trigger: Notify,
    period: Duration,
}

impl PushService {
    /// Create a push service.
    ///
    /// `period` is both the sweep interval and the retry interval;
    /// `timeout` bounds each direct request to an agent.
    #[must_use]
    pub fn new(
        registry: Arc<Registry>,
        channels: Arc<Channels>,
        period: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            channels,
            http: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            trigger: Notify::new(),
            period,
        }
    }

    /// Wake the sweep loop early, e.g. right after an approval.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// Run the periodic sweep until the process exits.
    ///
    /// A failing cycle is logged and never kills the loop.
    pub async fn run(self: Arc<Self>) {
        loop {
            tokio::select! {
                () = tokio::time::sleep(self.period) => {}
                () = self.trigger.notified() => {}
            }
            self.sweep().await;
        }
    }

    /// Deliver every pending approval once.
    pub async fn sweep(&self) {
        let unpushed = match self.registry.unpushed_approvals() {
            Ok(list) => list,
            Err(e) => {
                tracing::warn!(error = %e, "Approval sweep could not list records");
                return;
            }
        };
        if unpushed.is_empty() {
            return;
        }

        tracing::info!(count = unpushed.len(), "Pushing approval to agent(s)");
        for agent in unpushed {
            self.push_approval(&agent).await;
        }
    }

    /// Deliver one approval, channel-first with HTTP fallback.
    pub async fn push_approval(&self, agent: &AgentRecord) {
        let (Some(auth_token), Some(public_token)) =
            (agent.auth_token.clone(), agent.public_token.clone())
        else {
            // Tokens are issued on approval; a record here without them is a bug.
            tracing::error!(agent_id = %agent.id, "Approved record missing tokens, skipping push");
            return;
        };

        let payload = ApprovalPush {
            agent_id: agent.id,
            approved_name: agent.name.clone(),
            auth_token,
            public_token,
            state: agent.state,
        };

        if self
            .channels
            .send(&agent.id, ChannelMessage::ApprovalPush(payload.clone()))
        {
            tracing::info!(agent_id = %agent.id, "Approval pushed via channel");
            self.mark_pushed(&agent.id);
            return;
        }

        let url = format!("{}/api/approval", agent.address.base_url());
        match self.http.post(&url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::info!(agent_id = %agent.id, url = %url, "Approval pushed via HTTP");
                self.mark_pushed(&agent.id);
            }
            Ok(response) => {
                tracing::warn!(
                    agent_id = %agent.id,
                    url = %url,
                    status = %response.status(),
                    "HTTP approval push rejected, will retry"
                );
            }
            Err(e) => {
                tracing::warn!(
                    agent_id = %agent.id,
                    url = %url,
                    error = %e,
                    "HTTP approval push failed, will retry"
                );
            }
        }
    }

    /// Deliver a rename notification, channel-first with HTTP fallback.
    ///
    /// Best-effort: no flag tracks delivery, the next status exchange carries
    /// the authoritative name regardless.
    pub async fn push_rename(&self, agent: &AgentRecord) {
        let payload = RenamePush {
            agent_name: agent.name.clone(),
        };

        if self
            .channels
            .send(&agent.id, ChannelMessage::RenameRequest(payload.clone()))
        {
            tracing::info!(agent_id = %agent.id, name = %agent.name, "Rename pushed via channel");
            return;
        }

        let url = format!("{}/api/agents/rename", agent.address.base_url());
        match self.http.post(&url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::info!(agent_id = %agent.id, url = %url, "Rename pushed via HTTP");
            }
            Ok(response) => {
                tracing::warn!(agent_id = %agent.id, status = %response.status(), "HTTP rename push rejected");
            }
            Err(e) => {
                tracing::warn!(agent_id = %agent.id, error = %e, "HTTP rename push failed");
            }
        }
    }

    fn mark_pushed(&self, agent_id: &AgentId) {
        if let Err(e) = self.registry.mark_approval_pushed(agent_id) {
            tracing::warn!(agent_id = %agent_id, error = %e, "Failed to persist approval_pushed");
        }
    }
}
