//! Authentication extractors for the nexus HTTP surface.
//!
//! Agents and operators both present tokens in the `X-Auth-Token` header.
//! [`ApprovedAgent`] resolves an agent token to its live record and rejects
//! anything the registry no longer recognizes; agents interpret that
//! rejection as lost identity and re-register.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use nexlink_auth::TokenScope;
use nexlink_core::AgentState;
use nexlink_store::AgentRecord;

use crate::error::ApiError;
use crate::state::NexusState;

/// Header carrying agent and operator tokens.
pub const AUTH_HEADER: &str = "x-auth-token";

/// An authenticated, approved agent extracted from the auth token.
#[derive(Debug, Clone)]
pub struct ApprovedAgent {
    /// The live record the token resolved to.
    pub record: AgentRecord,
}

impl FromRequestParts<Arc<NexusState>> for ApprovedAgent {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<NexusState>,
    ) -> Result<Self, Self::Rejection> {
        let token = header_token(parts)?;
        let record = resolve_agent(state, token)?;
        Ok(Self { record })
    }
}

/// An authenticated operator session.
#[derive(Debug, Clone)]
pub struct AdminUser {
    /// Operator username from the token subject.
    pub username: String,
}

impl FromRequestParts<Arc<NexusState>> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<NexusState>,
    ) -> Result<Self, Self::Rejection> {
        let token = header_token(parts)?;
        let claims = state.tokens.verify_scope(token, TokenScope::Admin)?;
        Ok(Self {
            username: claims.sub,
        })
    }
}

/// Resolve an agent auth token to its approved record.
///
/// The presented token must verify, belong to a record the registry still
/// knows, and match the token that record was issued: a token from a wiped
/// and re-created registry is rejected even though its signature is valid.
pub fn resolve_agent(state: &NexusState, token: &str) -> Result<AgentRecord, ApiError> {
    let claims = state.tokens.verify_scope(token, TokenScope::Auth)?;
    let agent_id = claims.agent_id().map_err(|_| ApiError::Unauthorized)?;

    let record = state
        .registry
        .get(&agent_id)
        .map_err(|_| ApiError::Unauthorized)?;

    if record.auth_token.as_deref() != Some(token) {
        return Err(ApiError::Unauthorized);
    }
    if record.state != AgentState::Approved {
        return Err(ApiError::Forbidden);
    }
    Ok(record)
}

fn header_token(parts: &Parts) -> Result<&str, ApiError> {
    parts
        .headers
        .get(AUTH_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)
}
