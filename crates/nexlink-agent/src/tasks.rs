//! Periodic tasks: registration/heartbeat check, status report, log sync.
//!
//! Each task is an independent interval loop whose body catches and logs its
//! own failures, so one bad cycle never kills the scheduler. Transient nexus
//! unavailability is logged and retried on the next tick; authentication
//! rejections mean the nexus lost this agent's record and trigger a forced
//! reset plus fresh registration.

use std::sync::Arc;
use std::time::Duration;

use nexlink_core::{
    AgentState, ChannelMessage, PeerInfo, RegisterRequest, StatusReport, StatusRequest,
};

use crate::state::AppState;

/// Spawn all periodic tasks.
pub fn spawn_all(state: Arc<AppState>) {
    let registration_period = Duration::from_secs(state.config.registration_period_seconds);
    let status_period = Duration::from_secs(state.config.status_period_seconds);
    let log_sync_period = Duration::from_secs(state.config.log_sync_period_seconds);

    tokio::spawn(registration_loop(Arc::clone(&state), registration_period));
    tokio::spawn(status_loop(Arc::clone(&state), status_period));
    tokio::spawn(log_sync_loop(state, log_sync_period));
}

async fn registration_loop(state: Arc<AppState>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        registration_tick(&state).await;
    }
}

async fn status_loop(state: Arc<AppState>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        status_tick(&state).await;
    }
}

async fn log_sync_loop(state: Arc<AppState>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        log_sync_tick(&state).await;
    }
}

/// One registration/heartbeat check cycle.
pub async fn registration_tick(state: &Arc<AppState>) {
    match state.identity.state() {
        AgentState::Unregistered => {
            if !state.client.ping().await {
                tracing::debug!("Nexus offline, registration deferred");
                return;
            }
            resolve_or_register(state).await;
        }
        AgentState::PendingApproval => {
            if !state.client.ping().await {
                return;
            }
            let Some(agent_id) = state.identity.id() else {
                resolve_or_register(state).await;
                return;
            };
            match state.client.exists(agent_id).await {
                Ok(true) => {
                    tracing::debug!("Still pending approval");
                }
                Ok(false) => {
                    lost_identity(state, "nexus lost the agent record").await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Existence check failed, will retry");
                }
            }
        }
        AgentState::Approved => {
            if !state.connection.is_connected() {
                tracing::info!("Approved but channel down, connecting");
                state.connection.connect().await;
            }
        }
    }
}

/// Resolve identity by address (the nexus may already know us); 404 means
/// register fresh. Guarded by the registration single-flight flag so a
/// scheduled tick and a reconnect-triggered attempt never race.
pub async fn resolve_or_register(state: &Arc<AppState>) {
    if !state.begin_registration() {
        tracing::debug!("Registration already in progress, skipping");
        return;
    }

    let result = resolve_or_register_inner(state).await;
    state.end_registration();

    if let Err(e) = result {
        tracing::warn!(error = %e, "Registration failed, will retry next cycle");
    }
}

async fn resolve_or_register_inner(
    state: &Arc<AppState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let snapshot = state.identity.snapshot();

    match state
        .client
        .identify(&snapshot.host, snapshot.port)
        .await
    {
        Ok(Some(identity)) => {
            state.identity.apply_remote_identity(
                identity.agent_id,
                &identity.name,
                identity.auth_token,
                identity.public_token,
                identity.state,
            )?;
            tracing::info!(
                name = %identity.name,
                state = %identity.state,
                "Identity resolved from nexus"
            );
            if identity.state == AgentState::Approved {
                state.connection.connect().await;
            }
            Ok(())
        }
        Ok(None) => {
            tracing::info!("No existing identity on nexus, registering fresh");
            let response = state
                .client
                .register(&RegisterRequest {
                    name: snapshot.name.clone(),
                    host: snapshot.host.clone(),
                    port: snapshot.port,
                })
                .await?;
            state.identity.set_id(response.agent_id)?;
            state.identity.transition_to(response.state)?;
            tracing::info!(agent_id = %response.agent_id, state = %response.state, "Registered with nexus");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// One status report cycle: channel preferred, HTTP fallback.
pub async fn status_tick(state: &Arc<AppState>) {
    let snapshot = state.identity.snapshot();
    if snapshot.state != AgentState::Approved {
        return;
    }
    let Some(agent_id) = snapshot.id else { return };

    if state.connection.is_connected() {
        let sent = state.connection.send(ChannelMessage::StatusUpdate(StatusReport {
            agent_id,
            peer_version: state.peers.current_version(),
            unsynced_logs: state.logs.unsynced_count(),
        }));
        if sent {
            tracing::debug!("Status reported over channel");
            return;
        }
        // The channel closed under us; fall through to HTTP.
    }

    let Some(auth_token) = snapshot.auth_token else { return };
    let request = StatusRequest {
        agent_id,
        host: snapshot.host.clone(),
        port: snapshot.port,
        peer_version: state.peers.current_version(),
        unsynced_logs: state.logs.unsynced_count(),
    };

    match state.client.report_status(&auth_token, &request).await {
        Ok(response) => {
            if let Some(name) = &response.approved_name {
                if *name != snapshot.name {
                    if let Err(e) = state.identity.apply_name(name) {
                        tracing::warn!(error = %e, "Failed to apply approved name");
                    }
                }
            }
            // The list and its version always land together.
            if let (Some(peers), Some(version)) = (response.peers, response.version) {
                state.peers.install(peers, version);
            }
            tracing::debug!("Status reported over HTTP");
        }
        Err(e) if e.is_identity_loss() => {
            lost_identity(state, "status report rejected").await;
        }
        Err(e) => {
            tracing::warn!(error = %e, "Status report failed, will retry next cycle");
        }
    }
}

/// One transfer-log sync cycle.
pub async fn log_sync_tick(state: &Arc<AppState>) {
    let snapshot = state.identity.snapshot();
    if snapshot.state != AgentState::Approved {
        return;
    }
    let Some(auth_token) = snapshot.auth_token else { return };

    let unsynced = state.logs.unsynced();
    if unsynced.is_empty() {
        return;
    }

    match state.client.sync_logs(&auth_token, &unsynced).await {
        Ok(response) => {
            // Mark exactly the ids the nexus confirmed; the rest are retried.
            if let Err(e) = state.logs.mark_synced(&response.merged_ids) {
                tracing::warn!(error = %e, "Failed to prune synced logs");
            }
            tracing::debug!(count = response.merged_ids.len(), "Logs synced to nexus");
        }
        Err(e) if e.is_identity_loss() => {
            lost_identity(state, "log sync rejected").await;
        }
        Err(e) => {
            tracing::warn!(error = %e, "Log sync failed, will retry next cycle");
        }
    }
}

/// The peer list as this agent knows it: the in-memory cache, then a live
/// refresh when it is empty, then the persisted snapshot.
pub async fn all_peers(state: &Arc<AppState>) -> Vec<PeerInfo> {
    let cached = state.peers.get_all();
    if !cached.is_empty() {
        return cached;
    }
    refresh_peers(state).await;
    state.peers.get_all()
}

/// Refresh the peer cache from the nexus; only meaningful once approved.
pub async fn refresh_peers(state: &Arc<AppState>) {
    let snapshot = state.identity.snapshot();
    if snapshot.state != AgentState::Approved {
        tracing::debug!("Not approved yet, skipping peer refresh");
        return;
    }
    let Some(auth_token) = snapshot.auth_token else { return };

    match state.client.fetch_peers(&auth_token).await {
        Ok(list) => state.peers.install(list.peers, list.version),
        Err(e) if e.is_identity_loss() => {
            lost_identity(state, "peer fetch rejected").await;
        }
        Err(e) => {
            tracing::warn!(error = %e, "Peer refresh failed, using cached list");
        }
    }
}

/// The nexus no longer knows us: wipe local identity and start over.
async fn lost_identity(state: &Arc<AppState>, reason: &str) {
    tracing::warn!(reason, "Lost identity, forcing reset and re-registering");
    if let Err(e) = state.identity.force_reset() {
        tracing::error!(error = %e, "Failed to reset identity");
        return;
    }
    state.peers.clear();
    resolve_or_register(state).await;
}
