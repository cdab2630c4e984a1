//! Nexlink Agent - peer node daemon.
//!
//! Registers with the nexus, waits for approval, then holds a persistent
//! channel, mirrors the peer list, accepts direct uploads from peers and
//! reconciles its transfer log.
//!
//! Configuration is read from environment variables; `AGENT_NEXUS_URL`,
//! `AGENT_HOST` and `AGENT_PORT` are required, everything else has defaults.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nexlink_agent::{
    create_router, tasks, AgentConfig, AppState, ConnectionManager, IdentityStore, NexusClient,
    PeerCache, TransferLogStore,
};
use nexlink_transfer::FileReceiver;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,nexlink=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Nexlink Agent");

    let config = AgentConfig::from_env()?;
    tracing::info!(
        nexus_url = %config.nexus_url,
        host = %config.host,
        port = config.port,
        data_dir = %config.data_dir.display(),
        "Agent configuration loaded"
    );

    std::fs::create_dir_all(&config.data_dir)?;

    let identity = Arc::new(IdentityStore::load_or_create(
        &config.data_dir,
        config.display_name(),
        config.host.clone(),
        config.port,
    )?);
    let peers = Arc::new(PeerCache::new(&config.data_dir));
    let logs = Arc::new(TransferLogStore::load_or_default(&config.data_dir));
    let client = NexusClient::new(&config.nexus_url, config.request_timeout());
    let connection = ConnectionManager::new(
        &config.nexus_url,
        config.reconnect_delay(),
        Arc::clone(&identity),
        Arc::clone(&peers),
    );
    let receiver = FileReceiver::new(&config.upload_dir);

    let listen_addr = format!("0.0.0.0:{}", config.port);
    let state = Arc::new(AppState::new(
        config, identity, peers, logs, client, connection, receiver,
    ));

    // Resolve or register immediately, then let the periodic tasks keep
    // everything converged.
    tasks::registration_tick(&state).await;
    tasks::spawn_all(Arc::clone(&state));

    let app = create_router(state);
    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
