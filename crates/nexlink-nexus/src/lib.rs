//! Central coordination service for the nexlink agent fleet.
//!
//! The nexus tracks agent identity and approval, versions the approved peer
//! set, pushes approval and rename notifications to agents (over their open
//! channel, or directly to their HTTP surface as a fallback), merges transfer
//! logs idempotently, and accepts file uploads through the crash-safe receive
//! path.

#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod auth;
pub mod channels;
pub mod config;
pub mod error;
pub mod handlers;
pub mod push;
pub mod registry;
pub mod routes;
pub mod state;

pub use channels::Channels;
pub use config::NexusConfig;
pub use error::ApiError;
pub use push::PushService;
pub use registry::{Registry, RegistryError};
pub use routes::create_router;
pub use state::NexusState;
