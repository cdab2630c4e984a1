//! Nexlink Nexus - central coordination service.
//!
//! Tracks agent identity and approval, versions the approved peer set,
//! pushes credentials to agents and accepts uploads.
//!
//! Configuration is read from environment variables; `NEXUS_SECRET` and
//! `NEXUS_ADMIN_PASSWORD` are required, everything else has defaults.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nexlink_auth::TokenService;
use nexlink_core::AgentAddress;
use nexlink_nexus::{create_router, Channels, NexusConfig, NexusState, PushService, Registry};
use nexlink_store::RocksStore;
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

    tracing::info!("Starting Nexlink Nexus");

    let config = NexusConfig::from_env()?;
    tracing::info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir,
        upload_dir = %config.upload_dir,
        "Nexus configuration loaded"
    );

    tracing::info!(path = %config.data_dir, "Opening RocksDB store");
    let store = Arc::new(RocksStore::open(&config.data_dir)?);

    let tokens = TokenService::new(&config.secret);
    let nexus_address = AgentAddress::new(config.public_host.clone(), config.public_port);
    let registry = Arc::new(Registry::new(store, tokens.clone(), nexus_address));
    let channels = Arc::new(Channels::new());

    let push = Arc::new(PushService::new(
        Arc::clone(&registry),
        Arc::clone(&channels),
        config.push_period(),
        config.push_timeout(),
    ));
    tokio::spawn(Arc::clone(&push).run());
    tracing::info!(period_seconds = config.push_period_seconds, "Approval push sweep started");

    let receiver = FileReceiver::new(&config.upload_dir);
    let listen_addr = config.listen_addr.clone();
    let state = Arc::new(NexusState::new(
        registry, channels, push, tokens, receiver, config,
    ));

    let app = create_router(state);
    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
