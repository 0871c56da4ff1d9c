// # File Sync Store
//
// File-based implementation of SyncStore with crash recovery.
//
// ## Purpose
//
// Keeps the authoritative hub cache, per-spoke state and sync history
// across daemon restarts, so a spoke can be reconciled from the cache while
// the hub is down.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: Validates JSON on load
// - Automatic backup: Keeps .backup of last known good state
// - Recovery: Falls back to backup if corruption detected
//
// ## Transactions
//
// Every mutation is applied to a copy of the in-memory data, written to
// disk, and only then swapped in. A failed write leaves both the file and
// the in-memory view untouched.
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "hub_cache": {
//     "pihole-main": {
//       "records": { "A": ["1.2.3.4 nas.home"], "CNAME": [] },
//       "updated_at": "2025-01-09T12:00:00Z"
//     }
//   },
//   "spoke_state": {},
//   "history": []
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use super::StoreData;
use crate::Error;
use crate::record::RecordSet;
use crate::traits::{Snapshot, SyncRun, SyncStore};

/// State file format version
/// Used for future migration if format changes
const STATE_FILE_VERSION: &str = "1.0";

/// File-based sync store with crash recovery
///
/// # Example
///
/// ```rust,no_run
/// use dnssync_core::store::FileSyncStore;
/// use dnssync_core::traits::SyncStore;
/// use dnssync_core::{DnsRecord, RecordSet};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileSyncStore::new("/var/lib/dns-sync/state.json").await?;
///
///     let records: RecordSet = vec![DnsRecord::a("1.2.3.4", "nas.home")].into_iter().collect();
///     store.save_hub_records("pihole-main", &records).await?;
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileSyncStore {
    path: PathBuf,
    state: RwLock<StoreData>,
}

/// Serializable state file format
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StateFileFormat {
    version: String,
    #[serde(default)]
    hub_cache: BTreeMap<String, Snapshot>,
    #[serde(default)]
    spoke_state: BTreeMap<String, Snapshot>,
    #[serde(default)]
    history: Vec<SyncRun>,
}

impl FileSyncStore {
    /// Create or load a file sync store
    ///
    /// This will:
    /// 1. Create parent directories if needed
    /// 2. Try to load existing state file
    /// 3. If corruption detected, try to load from backup
    /// 4. If both fail, start with empty state
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "Failed to create state directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let data = Self::load_state_with_recovery(&path).await?;

        Ok(Self {
            path,
            state: RwLock::new(data),
        })
    }

    /// Path of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load state from file with automatic recovery
    ///
    /// Only a parse failure counts as corruption; I/O errors are returned.
    async fn load_state_with_recovery(path: &Path) -> Result<StoreData, Error> {
        let err = match Self::load_state(path).await {
            Ok(data) => {
                tracing::debug!(
                    "Loaded state from file: {} hubs, {} spokes, {} history entries",
                    data.hub_cache.len(),
                    data.spoke_state.len(),
                    data.history.len()
                );
                return Ok(data);
            }
            Err(Error::Json(e)) => e,
            Err(e) => return Err(e),
        };

        tracing::warn!(
            "State file {} appears corrupted: {}. Attempting recovery from backup.",
            path.display(),
            err
        );

        let backup_path = Self::backup_path(path);
        if !backup_path.exists() {
            tracing::warn!("No backup file found. Starting with empty state.");
            return Ok(StoreData::default());
        }

        match Self::load_state(&backup_path).await {
            Ok(data) => {
                tracing::info!(
                    "Recovered state from backup: {} hubs, {} spokes",
                    data.hub_cache.len(),
                    data.spoke_state.len()
                );
                if let Err(restore_err) = Self::restore_from_backup(path, &backup_path).await {
                    tracing::error!(
                        "Failed to restore state file from backup: {}",
                        restore_err
                    );
                }
                Ok(data)
            }
            Err(backup_err) => {
                tracing::error!(
                    "Backup also unreadable: {}. Starting with empty state.",
                    backup_err
                );
                Ok(StoreData::default())
            }
        }
    }

    /// Load state from file
    async fn load_state(path: &Path) -> Result<StoreData, Error> {
        if !path.exists() {
            tracing::debug!("State file does not exist: {}", path.display());
            return Ok(StoreData::default());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::persistence(format!(
                "Failed to read state file {}: {}",
                path.display(),
                e
            ))
        })?;

        let state_file: StateFileFormat = serde_json::from_str(&content)?;

        if state_file.version != STATE_FILE_VERSION {
            tracing::warn!(
                "State file version mismatch: expected {}, got {}. \
                Attempting to load anyway.",
                STATE_FILE_VERSION,
                state_file.version
            );
        }

        Ok(StoreData {
            hub_cache: state_file.hub_cache,
            spoke_state: state_file.spoke_state,
            history: state_file.history,
        })
    }

    /// Apply a mutation and persist it before making it visible
    async fn update<T>(&self, mutate: impl FnOnce(&mut StoreData) -> T) -> Result<T, Error> {
        let mut guard = self.state.write().await;
        let mut next = guard.clone();
        let out = mutate(&mut next);
        self.write_state(&next).await?;
        *guard = next;
        Ok(out)
    }

    /// Write state to file atomically
    async fn write_state(&self, data: &StoreData) -> Result<(), Error> {
        let state_file = StateFileFormat {
            version: STATE_FILE_VERSION.to_string(),
            hub_cache: data.hub_cache.clone(),
            spoke_state: data.spoke_state.clone(),
            history: data.history.clone(),
        };

        let json = serde_json::to_string_pretty(&state_file)
            .map_err(|e| Error::persistence(format!("Failed to serialize state: {}", e)))?;

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::persistence(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::persistence(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.sync_all().await.map_err(|e| {
                Error::persistence(format!(
                    "Failed to sync temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::persistence(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("State written to file: {}", self.path.display());
        Ok(())
    }

    /// Restore state file from backup
    async fn restore_from_backup(path: &Path, backup_path: &Path) -> Result<(), Error> {
        fs::copy(backup_path, path).await.map_err(|e| {
            Error::persistence(format!(
                "Failed to restore from backup {} to {}: {}",
                backup_path.display(),
                path.display(),
                e
            ))
        })?;

        tracing::info!("Restored state file from backup");
        Ok(())
    }

    /// Get path to temporary file for atomic writes
    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    /// Get path to backup file
    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl SyncStore for FileSyncStore {
    async fn save_hub_records(&self, hub_name: &str, records: &RecordSet) -> Result<(), Error> {
        let snapshot = Snapshot::now(records.clone());
        self.update(|data| {
            data.hub_cache.insert(hub_name.to_string(), snapshot);
        })
        .await
    }

    async fn get_hub_snapshot(&self, hub_name: &str) -> Result<Option<Snapshot>, Error> {
        Ok(self.state.read().await.hub_cache.get(hub_name).cloned())
    }

    async fn save_spoke_records(&self, spoke_name: &str, records: &RecordSet) -> Result<(), Error> {
        let snapshot = Snapshot::now(records.clone());
        self.update(|data| {
            data.spoke_state.insert(spoke_name.to_string(), snapshot);
        })
        .await
    }

    async fn get_spoke_snapshot(&self, spoke_name: &str) -> Result<Option<Snapshot>, Error> {
        Ok(self.state.read().await.spoke_state.get(spoke_name).cloned())
    }

    async fn record_sync_run(&self, run: &SyncRun) -> Result<(), Error> {
        let run = run.clone();
        self.update(|data| data.push_run(run)).await
    }

    async fn history(
        &self,
        limit: usize,
        server_name: Option<&str>,
    ) -> Result<Vec<SyncRun>, Error> {
        Ok(self.state.read().await.history(limit, server_name))
    }

    async fn clear_history(&self, server_name: Option<&str>) -> Result<usize, Error> {
        self.update(|data| data.clear_history(server_name)).await
    }

    async fn flush(&self) -> Result<(), Error> {
        // Exclusive so two writers never share the temp file.
        let guard = self.state.write().await;
        self.write_state(&guard).await
    }
}
