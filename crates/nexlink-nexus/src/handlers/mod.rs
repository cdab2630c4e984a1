//! HTTP request handlers.

pub mod admin;
pub mod agents;
pub mod files;
pub mod health;
pub mod logs;
pub mod ws;

use std::str::FromStr;

use nexlink_core::AgentId;

use crate::error::ApiError;

/// Parse an agent id from a path segment.
pub(crate) fn parse_agent_id(raw: &str) -> Result<AgentId, ApiError> {
    AgentId::from_str(raw).map_err(|_| ApiError::BadRequest(format!("invalid agent id: {raw}")))
}
