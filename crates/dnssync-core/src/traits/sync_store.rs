// # Sync Store Trait
//
// Defines the interface for the record cache and sync history.
//
// ## Purpose
//
// The sync store durably holds:
// - The authoritative hub snapshot (served stale when the hub is down)
// - The last snapshot pushed to each spoke
// - An append-only history of sync runs
//
// ## Implementations
//
// - File-based: JSON file with atomic write-then-rename
// - In-memory: tests and ephemeral deployments
//
// ## Usage
//
// ```rust,ignore
// use dnssync_core::SyncStore;
//
// async fn show(store: &dyn SyncStore) -> dnssync_core::Result<()> {
//     if let Some(records) = store.get_cached_hub_records("pihole-main").await? {
//         println!("{} cached records", records.len());
//     }
//     Ok(())
// }
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::SyncMode;
use crate::engine::SyncStats;
use crate::record::{RecordSet, RecordType};

/// Outcome of a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Run completed (individual conflicts may still have occurred)
    Success,
    /// Run aborted before or during reconciliation
    Error,
}

/// One immutable history entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRun {
    /// Server the run targeted
    pub server_name: String,
    /// Adapter type of that server
    pub server_type: String,
    /// Whether the server was acting as hub or spoke
    pub role: SyncMode,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run finished
    pub finished_at: DateTime<Utc>,
    /// Records added
    pub added: usize,
    /// Records removed
    pub removed: usize,
    /// Per-record failures
    pub conflicts: usize,
    /// A records in the target snapshot after the run
    pub a_records: usize,
    /// CNAME records in the target snapshot after the run
    pub cname_records: usize,
    /// Success or error
    pub status: SyncStatus,
    /// Causal error message when `status` is `Error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncRun {
    /// Build a successful run
    pub fn success(
        server_name: impl Into<String>,
        server_type: impl Into<String>,
        role: SyncMode,
        started_at: DateTime<Utc>,
        stats: &SyncStats,
    ) -> Self {
        Self::build(server_name, server_type, role, started_at, stats, None)
    }

    /// Build a failed run
    pub fn failure(
        server_name: impl Into<String>,
        server_type: impl Into<String>,
        role: SyncMode,
        started_at: DateTime<Utc>,
        stats: &SyncStats,
        error: impl Into<String>,
    ) -> Self {
        Self::build(
            server_name,
            server_type,
            role,
            started_at,
            stats,
            Some(error.into()),
        )
    }

    fn build(
        server_name: impl Into<String>,
        server_type: impl Into<String>,
        role: SyncMode,
        started_at: DateTime<Utc>,
        stats: &SyncStats,
        error: Option<String>,
    ) -> Self {
        Self {
            server_name: server_name.into(),
            server_type: server_type.into(),
            role,
            started_at,
            finished_at: Utc::now(),
            added: stats.added,
            removed: stats.removed,
            conflicts: stats.conflicts,
            a_records: stats.a_records,
            cname_records: stats.cname_records,
            status: if error.is_some() {
                SyncStatus::Error
            } else {
                SyncStatus::Success
            },
            error,
        }
    }

    /// Whether the run succeeded
    pub fn is_success(&self) -> bool {
        self.status == SyncStatus::Success
    }
}

/// A persisted record snapshot with its write time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Records in canonical form
    pub records: RecordSet,
    /// When the snapshot was written
    pub updated_at: DateTime<Utc>,
}

impl Snapshot {
    /// Stamp a record set with the current time
    pub fn now(records: RecordSet) -> Self {
        Self {
            records,
            updated_at: Utc::now(),
        }
    }
}

/// Trait for record cache / history store implementations
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple tasks.
///
/// # Atomicity
///
/// `save_hub_records` and `save_spoke_records` are full replaces: no reader
/// may observe a partially written record set.
///
/// # Read accessors
///
/// Every `get_*`, `history` and `last_sync` call is side-effect-free.
#[async_trait]
pub trait SyncStore: Send + Sync {
    /// Replace the authoritative snapshot for a hub
    async fn save_hub_records(&self, hub_name: &str, records: &RecordSet)
    -> Result<(), crate::Error>;

    /// Load the authoritative snapshot for a hub
    ///
    /// # Returns
    ///
    /// - `Ok(Some(Snapshot))`: the last persisted snapshot
    /// - `Ok(None)`: the hub has never been cached
    /// - `Err(Error)`: storage error
    async fn get_hub_snapshot(&self, hub_name: &str) -> Result<Option<Snapshot>, crate::Error>;

    /// Replace the last-applied snapshot for a spoke
    async fn save_spoke_records(
        &self,
        spoke_name: &str,
        records: &RecordSet,
    ) -> Result<(), crate::Error>;

    /// Load the last-applied snapshot for a spoke
    async fn get_spoke_snapshot(&self, spoke_name: &str)
    -> Result<Option<Snapshot>, crate::Error>;

    /// Append a history entry
    async fn record_sync_run(&self, run: &SyncRun) -> Result<(), crate::Error>;

    /// History entries, newest first, optionally filtered to one server
    async fn history(
        &self,
        limit: usize,
        server_name: Option<&str>,
    ) -> Result<Vec<SyncRun>, crate::Error>;

    /// Delete history entries, optionally for one server only
    ///
    /// # Returns
    ///
    /// The number of entries removed
    async fn clear_history(&self, server_name: Option<&str>) -> Result<usize, crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;

    /// Cached hub records, if any
    async fn get_cached_hub_records(
        &self,
        hub_name: &str,
    ) -> Result<Option<RecordSet>, crate::Error> {
        Ok(self.get_hub_snapshot(hub_name).await?.map(|s| s.records))
    }

    /// When the hub cache was last refreshed
    async fn get_cache_last_updated(
        &self,
        hub_name: &str,
    ) -> Result<Option<DateTime<Utc>>, crate::Error> {
        Ok(self.get_hub_snapshot(hub_name).await?.map(|s| s.updated_at))
    }

    /// Per-type counts of the cached hub records
    async fn get_cache_record_counts(
        &self,
        hub_name: &str,
    ) -> Result<BTreeMap<RecordType, usize>, crate::Error> {
        Ok(self
            .get_hub_snapshot(hub_name)
            .await?
            .map(|s| s.records.counts())
            .unwrap_or_default())
    }

    /// Last-applied spoke records, if any
    async fn get_spoke_records(
        &self,
        spoke_name: &str,
    ) -> Result<Option<RecordSet>, crate::Error> {
        Ok(self.get_spoke_snapshot(spoke_name).await?.map(|s| s.records))
    }

    /// Per-type counts of the last-applied spoke records
    async fn get_spoke_record_counts(
        &self,
        spoke_name: &str,
    ) -> Result<BTreeMap<RecordType, usize>, crate::Error> {
        Ok(self
            .get_spoke_snapshot(spoke_name)
            .await?
            .map(|s| s.records.counts())
            .unwrap_or_default())
    }

    /// Most recent history entry for a server
    async fn last_sync(&self, server_name: &str) -> Result<Option<SyncRun>, crate::Error> {
        Ok(self.history(1, Some(server_name)).await?.into_iter().next())
    }
}
