//! Agent token issuance and verification for nexlink.
//!
//! The token service is a pure function of a shared secret: the nexus signs
//! short HMAC tokens and every holder of the secret can verify them. Agents
//! get two scopes, `auth` for privileged calls and `public` as the peer
//! credential broadcast to other agents; the `admin` scope covers the
//! operator dashboard login.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod tokens;

pub use error::{AuthError, Result};
pub use tokens::{Claims, TokenScope, TokenService};
