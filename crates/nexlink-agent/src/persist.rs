//! Atomic-replace persistence for the agent's local JSON files.
//!
//! Every durable agent file (identity record, peer cache, transfer log) is
//! written by serializing to a temporary file in the same directory and then
//! renaming over the target, so a crash mid-write never leaves a corrupt
//! record behind.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// A result type using `PersistError`.
pub type Result<T> = std::result::Result<T, PersistError>;

/// Errors from reading or writing a persisted file.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Filesystem failure.
    #[error("persistence I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file exists but does not decode.
    #[error("persistence decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Write a value as pretty JSON via temp-file-then-atomic-rename.
///
/// # Errors
///
/// Returns an error if serialization or any filesystem step fails; the
/// previous file contents survive every failure mode.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&tmp, &json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Read a persisted JSON value; `Ok(None)` when the file does not exist.
///
/// # Errors
///
/// Returns an error for unreadable or undecodable files; callers decide
/// whether that means "recreate" or "fail".
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_slice(&bytes)?))
}
