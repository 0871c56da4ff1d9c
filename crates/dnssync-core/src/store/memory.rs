// # Memory Sync Store
//
// In-memory implementation of SyncStore.
//
// ## Purpose
//
// Provides a simple, fast store that doesn't persist across restarts.
// Useful for testing and for deployments where a cold cache after restart
// is acceptable.
//
// ## Crash Behavior
//
// - All state is lost on restart/crash
// - The first cycle after a restart needs a reachable hub: there is no
//   stale cache to fall back to

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::StoreData;
use crate::Error;
use crate::record::RecordSet;
use crate::traits::{Snapshot, SyncRun, SyncStore};

/// In-memory sync store implementation
///
/// Clones share the same underlying data.
///
/// # Example
///
/// ```rust,no_run
/// use dnssync_core::store::MemorySyncStore;
/// use dnssync_core::traits::SyncStore;
/// use dnssync_core::{DnsRecord, RecordSet};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemorySyncStore::new();
///
///     let records: RecordSet = vec![DnsRecord::a("1.2.3.4", "nas.home")].into_iter().collect();
///     store.save_hub_records("pihole-main", &records).await?;
///
///     let cached = store.get_cached_hub_records("pihole-main").await?;
///     assert_eq!(cached, Some(records));
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemorySyncStore {
    inner: Arc<RwLock<StoreData>>,
}

impl MemorySyncStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of history entries held
    pub async fn history_len(&self) -> usize {
        self.inner.read().await.history.len()
    }

    /// Drop everything
    pub async fn clear(&self) {
        *self.inner.write().await = StoreData::default();
    }
}

#[async_trait]
impl SyncStore for MemorySyncStore {
    async fn save_hub_records(&self, hub_name: &str, records: &RecordSet) -> Result<(), Error> {
        let mut data = self.inner.write().await;
        data.hub_cache
            .insert(hub_name.to_string(), Snapshot::now(records.clone()));
        Ok(())
    }

    async fn get_hub_snapshot(&self, hub_name: &str) -> Result<Option<Snapshot>, Error> {
        Ok(self.inner.read().await.hub_cache.get(hub_name).cloned())
    }

    async fn save_spoke_records(&self, spoke_name: &str, records: &RecordSet) -> Result<(), Error> {
        let mut data = self.inner.write().await;
        data.spoke_state
            .insert(spoke_name.to_string(), Snapshot::now(records.clone()));
        Ok(())
    }

    async fn get_spoke_snapshot(&self, spoke_name: &str) -> Result<Option<Snapshot>, Error> {
        Ok(self.inner.read().await.spoke_state.get(spoke_name).cloned())
    }

    async fn record_sync_run(&self, run: &SyncRun) -> Result<(), Error> {
        self.inner.write().await.push_run(run.clone());
        Ok(())
    }

    async fn history(
        &self,
        limit: usize,
        server_name: Option<&str>,
    ) -> Result<Vec<SyncRun>, Error> {
        Ok(self.inner.read().await.history(limit, server_name))
    }

    async fn clear_history(&self, server_name: Option<&str>) -> Result<usize, Error> {
        Ok(self.inner.write().await.clear_history(server_name))
    }

    async fn flush(&self) -> Result<(), Error> {
        Ok(())
    }
}
