//! Core types and wire protocol for nexlink.
//!
//! This crate provides the foundational types shared by the nexus and agent
//! binaries:
//!
//! - **Identifiers**: strongly-typed IDs for agents and transfer-log entries
//! - **Agent lifecycle state**: the registration/approval state machine states
//! - **Wire DTOs**: request/response bodies for the HTTP protocol
//! - **Channel envelopes**: the typed message codec for the persistent channel
//!
//! # Example
//!
//! ```
//! use nexlink_core::{AgentAddress, AgentId, AgentState};
//!
//! let id = AgentId::generate();
//! let addr = AgentAddress::new("10.0.0.5", 8081);
//! assert_eq!(addr.to_string(), "10.0.0.5:8081");
//! assert!(!AgentState::PendingApproval.is_approved());
//! # let _ = id;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod envelope;
pub mod ids;
pub mod proto;
pub mod state;

pub use envelope::{ApprovalPush, ChannelMessage, EnvelopeError, RenamePush, StatusReport};
pub use ids::{AgentId, IdError, LogId};
pub use proto::{
    IdentityResponse, LogSyncResponse, PeerInfo, PeerListResponse, RegisterRequest,
    RegisterResponse, RenameRequest, StatusRequest, StatusResponse, TransferLogEntry,
    UploadReceipt,
};
pub use state::{is_online, AgentAddress, AgentState, ONLINE_THRESHOLD_SECS};
