//! HMAC token signing and verification.
//!
//! Agent tokens carry no expiry: a credential stays valid until the record it
//! belongs to is deleted and reissued. Verification therefore checks the
//! signature and scope only.

use std::str::FromStr;

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use nexlink_core::AgentId;

use crate::error::{AuthError, Result};

/// The privilege level a token grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenScope {
    /// Bound to an agent; required for privileged agent calls.
    Auth,
    /// Broadcast to other agents as a peer credential.
    Public,
    /// Operator dashboard session.
    Admin,
}

impl TokenScope {
    /// The wire form of the scope claim.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Public => "public",
            Self::Admin => "admin",
        }
    }
}

/// Claims carried by every nexlink token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Agent id for agent tokens, operator username for admin tokens.
    pub sub: String,
    /// Display name at issue time; informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// The privilege level this token grants.
    pub scope: TokenScope,
    /// Issue time, seconds since the epoch.
    pub iat: u64,
}

impl Claims {
    /// Parse the subject as an agent id.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidSubject` for admin tokens or corrupt
    /// subjects.
    pub fn agent_id(&self) -> Result<AgentId> {
        AgentId::from_str(&self.sub).map_err(|_| AuthError::InvalidSubject)
    }
}

/// Issues and verifies HMAC-signed tokens from a shared secret.
///
/// Stateless: two services constructed from the same secret accept each
/// other's tokens.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenService {
    /// Create a token service from the shared secret.
    #[must_use]
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Issue a token for an agent with the given scope.
    ///
    /// # Errors
    ///
    /// Returns an error only if signing fails.
    pub fn issue(&self, agent_id: AgentId, name: &str, scope: TokenScope) -> Result<String> {
        self.sign(Claims {
            sub: agent_id.to_string(),
            name: Some(name.to_string()),
            scope,
            iat: now_secs(),
        })
    }

    /// Issue an operator dashboard token.
    ///
    /// # Errors
    ///
    /// Returns an error only if signing fails.
    pub fn issue_admin(&self, username: &str) -> Result<String> {
        self.sign(Claims {
            sub: username.to_string(),
            name: None,
            scope: TokenScope::Admin,
            iat: now_secs(),
        })
    }

    /// Verify a token's signature and return its claims.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` on any signature or structural
    /// failure.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS512);
        // Agent credentials never expire; there is no exp claim to check.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let data = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        Ok(data.claims)
    }

    /// Verify a token and require a specific scope.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::WrongScope` when the signature is valid but the
    /// scope does not match.
    pub fn verify_scope(&self, token: &str, scope: TokenScope) -> Result<Claims> {
        let claims = self.verify(token)?;
        if claims.scope != scope {
            return Err(AuthError::WrongScope {
                expected: scope.as_str().to_string(),
                got: claims.scope.as_str().to_string(),
            });
        }
        Ok(claims)
    }

    fn sign(&self, claims: Claims) -> Result<String> {
        encode(&Header::new(Algorithm::HS512), &claims, &self.encoding)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }
}

#[allow(clippy::cast_sign_loss)]
fn now_secs() -> u64 {
    Utc::now().timestamp().max(0) as u64
}
