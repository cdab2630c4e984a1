//! Error types for the file receive path.

use thiserror::Error;

/// A result type using `TransferError`.
pub type Result<T> = std::result::Result<T, TransferError>;

/// Errors that can occur while receiving a file.
///
/// Disk exhaustion is a distinct kind from generic failure so callers can
/// react differently: an exhausted disk should surface `507 Insufficient
/// Storage` and is not worth an immediate retry.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The filename is empty, contains path separators or parent-directory
    /// segments, or embeds a NUL byte.
    #[error("invalid filename: {0}")]
    InvalidFilename(String),

    /// Usable disk space does not cover the declared size plus the safety
    /// margin, or the device filled up mid-write.
    #[error("insufficient disk space: required {required} bytes plus margin")]
    InsufficientSpace {
        /// Bytes the transfer declared it needs.
        required: u64,
    },

    /// Any other I/O failure along the write path.
    #[error("file transfer failed: {0}")]
    Failed(#[from] std::io::Error),
}
