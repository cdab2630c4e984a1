//! Database schema definitions and column families.

/// Column family names for the RocksDB database.
pub mod cf {
    /// Primary agent records, keyed by `agent_id`.
    pub const AGENTS: &str = "agents";

    /// Index: agents by address, keyed by `host:port` bytes.
    pub const AGENTS_BY_ADDR: &str = "agents_by_addr";

    /// Index: agents by approval state, keyed by `state_byte || agent_id`.
    pub const AGENTS_BY_STATE: &str = "agents_by_state";

    /// Permanent transfer-log entries, keyed by `log_id`.
    pub const TRANSFER_LOGS: &str = "transfer_logs";

    /// Single-cell values: the peer-list version.
    pub const META: &str = "meta";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::AGENTS,
        cf::AGENTS_BY_ADDR,
        cf::AGENTS_BY_STATE,
        cf::TRANSFER_LOGS,
        cf::META,
    ]
}
