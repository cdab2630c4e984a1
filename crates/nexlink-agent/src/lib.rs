//! Peer node daemon for the nexlink fleet.
//!
//! An agent keeps a single durable identity record, registers with the nexus
//! and waits for operator approval, then holds one authenticated channel to
//! the nexus (reconnecting with a fixed backoff), mirrors the approved peer
//! list, exchanges files with peers directly, and reconciles its transfer log
//! with the nexus.

#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod connection;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod logs;
pub mod nexus_client;
pub mod peers;
pub mod persist;
pub mod routes;
pub mod state;
pub mod tasks;

pub use config::AgentConfig;
pub use connection::ConnectionManager;
pub use error::ApiError;
pub use identity::{AgentIdentity, IdentityStore};
pub use logs::TransferLogStore;
pub use nexus_client::{ClientError, NexusClient};
pub use peers::PeerCache;
pub use routes::create_router;
pub use state::AppState;
