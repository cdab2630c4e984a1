//! API error types and responses.
//!
//! This module defines the standard error format for all API responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use nexlink_auth::AuthError;
use nexlink_store::StoreError;
use nexlink_transfer::TransferError;

use crate::registry::RegistryError;

/// API error type that implements `IntoResponse`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or invalid authentication token, or a token for a record the
    /// nexus no longer knows.
    #[error("unauthorized")]
    Unauthorized,

    /// The caller is known but not approved for this operation.
    #[error("forbidden")]
    Forbidden,

    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request conflicts with the record's current state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Invalid request body or parameters.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Disk space admission failed.
    #[error("insufficient storage")]
    InsufficientStorage,

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

/// Error details.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl ApiError {
    /// Get the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::InsufficientStorage => StatusCode::INSUFFICIENT_STORAGE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::BadRequest(_) => "bad_request",
            Self::InsufficientStorage => "insufficient_storage",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        let body = ErrorResponse {
            error: ErrorBody { code, message },
        };

        (status, Json(body)).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::AgentNotFound(id) => Self::NotFound(format!("agent {id}")),
            RegistryError::InvalidState { expected, actual, agent_id } => Self::Conflict(format!(
                "agent {agent_id} is {actual}, operation requires {expected}"
            )),
            RegistryError::InvalidName(reason) => Self::BadRequest(reason),
            RegistryError::NameTaken(name) => Self::Conflict(format!("name already in use: {name}")),
            RegistryError::NoPendingRename(id) => {
                Self::Conflict(format!("agent {id} has no pending rename"))
            }
            RegistryError::Store(store_err) => Self::from(store_err),
            RegistryError::Auth(auth_err) => {
                tracing::error!(error = %auth_err, "Token issuance failed");
                Self::Internal("token issuance failed".to_string())
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound("record".to_string()),
            other => {
                tracing::error!(error = %other, "Store error");
                Self::Internal("storage error".to_string())
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidToken(_) | AuthError::InvalidSubject => Self::Unauthorized,
            AuthError::WrongScope { .. } => Self::Forbidden,
            AuthError::Signing(msg) => {
                tracing::error!(error = %msg, "Token signing failed");
                Self::Internal("token signing failed".to_string())
            }
        }
    }
}

impl From<TransferError> for ApiError {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::InvalidFilename(reason) => {
                Self::BadRequest(format!("invalid filename: {reason}"))
            }
            TransferError::InsufficientSpace { .. } => Self::InsufficientStorage,
            TransferError::Failed(e) => {
                tracing::error!(error = %e, "File transfer failed");
                Self::Internal("file transfer failed".to_string())
            }
        }
    }
}
