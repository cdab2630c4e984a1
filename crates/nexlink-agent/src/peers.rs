//! Local, versioned snapshot of the approved peer list.
//!
//! The cache is never independently authoritative: it is replaced wholesale
//! by whatever the nexus sends, and the list is always installed together
//! with the version that describes it, never the version alone.

use std::path::PathBuf;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use nexlink_core::PeerInfo;

use crate::persist::{read_json, write_json_atomic, Result};

const CACHE_FILE: &str = "peers_cache.json";

/// Persisted form of the cache.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PeerCacheSnapshot {
    peers: Vec<PeerInfo>,
    version: u64,
}

/// In-memory peer list plus its persisted snapshot.
pub struct PeerCache {
    path: PathBuf,
    inner: Mutex<PeerCacheSnapshot>,
}

impl PeerCache {
    /// Create an empty cache persisting into `data_dir`.
    #[must_use]
    pub fn new(data_dir: &std::path::Path) -> Self {
        Self {
            path: data_dir.join(CACHE_FILE),
            inner: Mutex::new(PeerCacheSnapshot::default()),
        }
    }

    /// The peer-list version this cache corresponds to.
    #[must_use]
    pub fn current_version(&self) -> u64 {
        self.inner.lock().version
    }

    /// The cached peers; falls back to the persisted snapshot when the
    /// in-memory list is empty (e.g. right after a restart).
    #[must_use]
    pub fn get_all(&self) -> Vec<PeerInfo> {
        {
            let inner = self.inner.lock();
            if !inner.peers.is_empty() {
                return inner.peers.clone();
            }
        }
        self.load_snapshot();
        self.inner.lock().peers.clone()
    }

    /// Cached peers currently marked online.
    #[must_use]
    pub fn get_online(&self) -> Vec<PeerInfo> {
        self.get_all().into_iter().filter(|p| p.online).collect()
    }

    /// Look up a peer by its public token; identifies the sender of an
    /// incoming upload.
    #[must_use]
    pub fn find_by_public_token(&self, token: &str) -> Option<PeerInfo> {
        self.get_all()
            .into_iter()
            .find(|p| p.public_token.as_deref() == Some(token))
    }

    /// Replace the whole cache with a fresher snapshot.
    ///
    /// List and version are installed in one step and persisted together.
    pub fn install(&self, peers: Vec<PeerInfo>, version: u64) {
        let mut inner = self.inner.lock();
        inner.peers = peers;
        inner.version = version;

        if let Err(e) = write_json_atomic(&self.path, &*inner) {
            tracing::warn!(error = %e, "Failed to persist peer cache");
        }
        tracing::info!(
            count = inner.peers.len(),
            version = inner.version,
            "Peer list installed"
        );
    }

    /// Drop the in-memory list (the persisted snapshot stays).
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.peers.clear();
        inner.version = 0;
        tracing::info!("Peer cache cleared");
    }

    /// Populate the in-memory cache from the persisted snapshot, if any.
    fn load_snapshot(&self) {
        match read_json::<PeerCacheSnapshot>(&self.path) {
            Ok(Some(snapshot)) => {
                let mut inner = self.inner.lock();
                // Don't clobber a list another task installed meanwhile.
                if inner.peers.is_empty() {
                    tracing::info!(
                        count = snapshot.peers.len(),
                        version = snapshot.version,
                        "Loaded peer list from cache snapshot"
                    );
                    *inner = snapshot;
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load peer cache snapshot");
            }
        }
    }
}
