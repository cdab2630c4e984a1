//! RocksDB storage layer for the nexlink nexus.
//!
//! This crate provides persistent storage for agent records, transfer logs
//! and the peer-list version cell, using RocksDB with column families for
//! efficient indexing.
//!
//! # Architecture
//!
//! The storage uses the following column families:
//!
//! - `agents`: primary agent records, keyed by `agent_id`
//! - `agents_by_addr`: index for registration dedup by `host:port`
//! - `agents_by_state`: index for listing agents by approval state
//! - `transfer_logs`: permanent transfer-log entries, keyed by `log_id`
//! - `meta`: single-cell values, currently only the peer-list version
//!
//! # Example
//!
//! ```no_run
//! use nexlink_store::{RocksStore, Store};
//!
//! let store = RocksStore::open("/var/lib/nexlink").unwrap();
//! let version = store.peer_list_version().unwrap();
//! assert!(version >= 1);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;
pub mod types;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;
pub use types::AgentRecord;

use nexlink_core::{AgentAddress, AgentId, AgentState, LogId, TransferLogEntry};

/// The storage trait defining all nexus database operations.
///
/// This abstracts the storage layer so the registry can run against an
/// in-memory implementation in tests.
pub trait Store: Send + Sync {
    // =========================================================================
    // Agent Operations
    // =========================================================================

    /// Insert or update an agent record, maintaining the address and state
    /// indexes.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_agent(&self, agent: &AgentRecord) -> Result<()>;

    /// Get an agent by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_agent(&self, agent_id: &AgentId) -> Result<Option<AgentRecord>>;

    /// Look up an agent by its registered address.
    ///
    /// This is the registration dedup path: an agent that lost its response
    /// re-registers with the same address and must get the same record back.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_agent_by_address(&self, address: &AgentAddress) -> Result<Option<AgentRecord>>;

    /// Delete an agent and its index entries.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the agent doesn't exist.
    fn delete_agent(&self, agent_id: &AgentId) -> Result<()>;

    /// List all agents in a given approval state.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_agents_by_state(&self, state: AgentState) -> Result<Vec<AgentRecord>>;

    /// List every agent record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_all_agents(&self) -> Result<Vec<AgentRecord>>;

    // =========================================================================
    // Transfer Log Operations
    // =========================================================================

    /// Insert a transfer-log entry unless one with the same id exists.
    ///
    /// Returns `true` if the entry was newly inserted. This is the primitive
    /// behind the idempotent log merge: resubmitting a batch inserts nothing
    /// the second time.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn insert_log_if_absent(&self, entry: &TransferLogEntry) -> Result<bool>;

    /// Whether an entry with this id is already stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn has_log(&self, log_id: &LogId) -> Result<bool>;

    /// Count all stored transfer-log entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn count_logs(&self) -> Result<u64>;

    /// Sum of `file_size` over all stored entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn total_log_bytes(&self) -> Result<u64>;

    /// The most recent entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_recent_logs(&self, limit: usize) -> Result<Vec<TransferLogEntry>>;

    // =========================================================================
    // Peer List Version
    // =========================================================================

    /// Read the current peer-list version. An empty database reads as 1.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn peer_list_version(&self) -> Result<u64>;

    /// Persist a new peer-list version.
    ///
    /// Callers serialize the read-modify-write around this; the store only
    /// provides the cell.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_peer_list_version(&self, version: u64) -> Result<()>;
}
