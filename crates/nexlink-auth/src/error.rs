//! Error types for token issuance and verification.

use thiserror::Error;

/// A result type using `AuthError`.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors that can occur when issuing or verifying tokens.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The token failed signature or structural validation.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// The token is valid but carries a different scope than required.
    #[error("wrong token scope: expected {expected}, got {got}")]
    WrongScope {
        /// The scope the call requires.
        expected: String,
        /// The scope the token actually carries.
        got: String,
    },

    /// The token subject is not a valid agent id.
    #[error("invalid token subject")]
    InvalidSubject,

    /// Signing failed; only possible with a malformed secret.
    #[error("token signing failed: {0}")]
    Signing(String),
}
