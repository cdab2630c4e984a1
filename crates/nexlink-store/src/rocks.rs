//! RocksDB storage implementation.

use std::path::Path;
use std::sync::Arc;

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};

use nexlink_core::{AgentAddress, AgentId, AgentState, LogId, TransferLogEntry};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::types::AgentRecord;
use crate::Store;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
}

impl RocksStore {
    /// Open or create a RocksDB database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Agent Operations
    // =========================================================================

    fn put_agent(&self, agent: &AgentRecord) -> Result<()> {
        let cf_agents = self.cf(cf::AGENTS)?;
        let cf_by_addr = self.cf(cf::AGENTS_BY_ADDR)?;
        let cf_by_state = self.cf(cf::AGENTS_BY_STATE)?;

        let agent_key = keys::agent_key(&agent.id);
        let value = Self::serialize(agent)?;

        // Check for an existing record to maintain address and state indexes
        // across updates.
        let old = self
            .db
            .get_cf(&cf_agents, &agent_key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize::<AgentRecord>(&data))
            .transpose()?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_agents, &agent_key, &value);

        if let Some(old) = &old {
            if old.address != agent.address {
                batch.delete_cf(&cf_by_addr, keys::addr_key(&old.address));
            }
            if old.state != agent.state {
                batch.delete_cf(&cf_by_state, keys::state_agent_key(old.state, &agent.id));
            }
        }
        batch.put_cf(&cf_by_addr, keys::addr_key(&agent.address), agent_key.clone());
        batch.put_cf(&cf_by_state, keys::state_agent_key(agent.state, &agent.id), []);

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn get_agent(&self, agent_id: &AgentId) -> Result<Option<AgentRecord>> {
        let cf = self.cf(cf::AGENTS)?;

        self.db
            .get_cf(&cf, keys::agent_key(agent_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn find_agent_by_address(&self, address: &AgentAddress) -> Result<Option<AgentRecord>> {
        let cf_by_addr = self.cf(cf::AGENTS_BY_ADDR)?;
        let cf_agents = self.cf(cf::AGENTS)?;

        let Some(agent_key) = self
            .db
            .get_cf(&cf_by_addr, keys::addr_key(address))
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(None);
        };

        self.db
            .get_cf(&cf_agents, agent_key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn delete_agent(&self, agent_id: &AgentId) -> Result<()> {
        let cf_agents = self.cf(cf::AGENTS)?;
        let cf_by_addr = self.cf(cf::AGENTS_BY_ADDR)?;
        let cf_by_state = self.cf(cf::AGENTS_BY_STATE)?;

        let agent = self.get_agent(agent_id)?.ok_or(StoreError::NotFound)?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(&cf_agents, keys::agent_key(agent_id));
        batch.delete_cf(&cf_by_addr, keys::addr_key(&agent.address));
        batch.delete_cf(&cf_by_state, keys::state_agent_key(agent.state, agent_id));

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn list_agents_by_state(&self, state: AgentState) -> Result<Vec<AgentRecord>> {
        let cf_by_state = self.cf(cf::AGENTS_BY_STATE)?;
        let prefix = keys::state_prefix(state);

        let mut agents = Vec::new();
        let iter = self.db.iterator_cf(
            &cf_by_state,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );

        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            if !key.starts_with(&prefix) {
                break;
            }

            let agent_id = keys::extract_agent_id_from_state_key(&key);
            if let Some(agent) = self.get_agent(&agent_id)? {
                agents.push(agent);
            }
        }

        Ok(agents)
    }

    fn list_all_agents(&self) -> Result<Vec<AgentRecord>> {
        let cf = self.cf(cf::AGENTS)?;

        let mut agents = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            agents.push(Self::deserialize(&value)?);
        }

        Ok(agents)
    }

    // =========================================================================
    // Transfer Log Operations
    // =========================================================================

    fn insert_log_if_absent(&self, entry: &TransferLogEntry) -> Result<bool> {
        let cf = self.cf(cf::TRANSFER_LOGS)?;
        let key = keys::log_key(&entry.id);

        let exists = self
            .db
            .get_cf(&cf, &key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .is_some();
        if exists {
            return Ok(false);
        }

        let value = Self::serialize(entry)?;
        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(true)
    }

    fn has_log(&self, log_id: &LogId) -> Result<bool> {
        let cf = self.cf(cf::TRANSFER_LOGS)?;
        Ok(self
            .db
            .get_cf(&cf, keys::log_key(log_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .is_some())
    }

    fn count_logs(&self) -> Result<u64> {
        let cf = self.cf(cf::TRANSFER_LOGS)?;

        let mut count = 0u64;
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            item.map_err(|e| StoreError::Database(e.to_string()))?;
            count += 1;
        }
        Ok(count)
    }

    fn total_log_bytes(&self) -> Result<u64> {
        let cf = self.cf(cf::TRANSFER_LOGS)?;

        let mut total = 0u64;
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            let entry: TransferLogEntry = Self::deserialize(&value)?;
            total = total.saturating_add(entry.file_size);
        }
        Ok(total)
    }

    fn list_recent_logs(&self, limit: usize) -> Result<Vec<TransferLogEntry>> {
        let cf = self.cf(cf::TRANSFER_LOGS)?;

        let mut entries = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            entries.push(Self::deserialize::<TransferLogEntry>(&value)?);
        }

        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(limit);
        Ok(entries)
    }

    // =========================================================================
    // Peer List Version
    // =========================================================================

    fn peer_list_version(&self) -> Result<u64> {
        let cf = self.cf(cf::META)?;

        let value = self
            .db
            .get_cf(&cf, keys::PEER_LIST_VERSION_KEY)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        match value {
            Some(bytes) => {
                let arr: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| StoreError::Serialization("bad version cell".into()))?;
                Ok(u64::from_be_bytes(arr))
            }
            None => Ok(1),
        }
    }

    fn put_peer_list_version(&self, version: u64) -> Result<()> {
        let cf = self.cf(cf::META)?;
        self.db
            .put_cf(&cf, keys::PEER_LIST_VERSION_KEY, version.to_be_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nexlink_core::LogId;
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn create_test_agent(host: &str, port: u16) -> AgentRecord {
        AgentRecord::new_pending(format!("{host}:{port}"), AgentAddress::new(host, port))
    }

    fn create_test_log(filename: &str) -> TransferLogEntry {
        TransferLogEntry {
            id: LogId::generate(),
            from_agent_id: Some(AgentId::generate()),
            from_agent_name: "ws-lab".into(),
            to_agent_id: None,
            to_agent_name: "Nexus".into(),
            filename: filename.into(),
            file_size: 1024,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn agent_crud() {
        let (store, _dir) = create_test_store();
        let agent = create_test_agent("10.0.0.5", 8081);

        store.put_agent(&agent).unwrap();

        let retrieved = store.get_agent(&agent.id).unwrap().unwrap();
        assert_eq!(retrieved, agent);

        store.delete_agent(&agent.id).unwrap();
        assert!(store.get_agent(&agent.id).unwrap().is_none());
        assert!(store
            .find_agent_by_address(&agent.address)
            .unwrap()
            .is_none());
    }

    #[test]
    fn find_by_address() {
        let (store, _dir) = create_test_store();
        let agent = create_test_agent("10.0.0.5", 8081);
        store.put_agent(&agent).unwrap();

        let found = store
            .find_agent_by_address(&AgentAddress::new("10.0.0.5", 8081))
            .unwrap()
            .unwrap();
        assert_eq!(found.id, agent.id);

        assert!(store
            .find_agent_by_address(&AgentAddress::new("10.0.0.5", 9000))
            .unwrap()
            .is_none());
    }

    #[test]
    fn addr_index_follows_address_change() {
        let (store, _dir) = create_test_store();
        let mut agent = create_test_agent("10.0.0.5", 8081);
        store.put_agent(&agent).unwrap();

        let old_address = agent.address.clone();
        agent.address = AgentAddress::new("10.0.0.9", 8081);
        store.put_agent(&agent).unwrap();

        assert!(store.find_agent_by_address(&old_address).unwrap().is_none());
        assert_eq!(
            store
                .find_agent_by_address(&agent.address)
                .unwrap()
                .unwrap()
                .id,
            agent.id
        );
    }

    #[test]
    fn state_index_follows_state_change() {
        let (store, _dir) = create_test_store();
        let mut agent = create_test_agent("10.0.0.5", 8081);
        store.put_agent(&agent).unwrap();

        assert_eq!(
            store
                .list_agents_by_state(AgentState::PendingApproval)
                .unwrap()
                .len(),
            1
        );
        assert!(store
            .list_agents_by_state(AgentState::Approved)
            .unwrap()
            .is_empty());

        agent.state = AgentState::Approved;
        agent.auth_token = Some("auth".into());
        agent.public_token = Some("pub".into());
        store.put_agent(&agent).unwrap();

        assert!(store
            .list_agents_by_state(AgentState::PendingApproval)
            .unwrap()
            .is_empty());
        assert_eq!(
            store.list_agents_by_state(AgentState::Approved).unwrap().len(),
            1
        );
    }

    #[test]
    fn log_merge_is_idempotent() {
        let (store, _dir) = create_test_store();
        let entry = create_test_log("report.pdf");

        assert!(store.insert_log_if_absent(&entry).unwrap());
        assert!(!store.insert_log_if_absent(&entry).unwrap());
        assert_eq!(store.count_logs().unwrap(), 1);
        assert!(store.has_log(&entry.id).unwrap());
    }

    #[test]
    fn log_totals() {
        let (store, _dir) = create_test_store();
        for name in ["a.bin", "b.bin", "c.bin"] {
            store.insert_log_if_absent(&create_test_log(name)).unwrap();
        }
        assert_eq!(store.count_logs().unwrap(), 3);
        assert_eq!(store.total_log_bytes().unwrap(), 3 * 1024);
    }

    #[test]
    fn recent_logs_newest_first() {
        let (store, _dir) = create_test_store();
        let mut older = create_test_log("older.bin");
        older.timestamp = Utc::now() - chrono::Duration::hours(1);
        let newer = create_test_log("newer.bin");

        store.insert_log_if_absent(&older).unwrap();
        store.insert_log_if_absent(&newer).unwrap();

        let recent = store.list_recent_logs(1).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].filename, "newer.bin");
    }

    #[test]
    fn version_cell_defaults_to_one() {
        let (store, _dir) = create_test_store();
        assert_eq!(store.peer_list_version().unwrap(), 1);

        store.put_peer_list_version(5).unwrap();
        assert_eq!(store.peer_list_version().unwrap(), 5);
    }
}
