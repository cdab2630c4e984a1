//! Admission-controlled, crash-safe file receive path.
//!
//! Both the nexus and every agent accept incoming files through this crate.
//! The discipline is identical on both sides:
//!
//! 1. **Preflight**: validate the filename and check that usable disk space
//!    covers the declared size plus a fixed safety margin, before any write.
//! 2. **Stream**: write the body to a hidden temporary file in the
//!    destination directory.
//! 3. **Commit**: atomically rename the temporary file to its final name, so
//!    no observer ever sees a partially written file at the final path. An
//!    interrupted transfer leaves nothing at the final name.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod receiver;

pub use error::{Result, TransferError};
pub use receiver::{has_capacity, validate_filename, FileReceiver, SAFETY_MARGIN_BYTES};
