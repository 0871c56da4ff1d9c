// # Sync Store Implementations
//
// This module provides implementations of the SyncStore trait for
// different persistence strategies.

pub mod file;
pub mod memory;
pub mod settings;

pub use file::FileSyncStore;
pub use memory::MemorySyncStore;
pub use settings::ScheduleSettingsFile;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::StoreConfig;
use crate::error::Result;
use crate::traits::{Snapshot, SyncRun, SyncStore};

/// Oldest history entries beyond this count are pruned on append
pub const MAX_HISTORY_ENTRIES: usize = 10_000;

/// Open the store described by the configuration
pub async fn open(config: &StoreConfig) -> Result<Arc<dyn SyncStore>> {
    match config {
        StoreConfig::File { path } => {
            tracing::info!("Using file store at {}", path);
            Ok(Arc::new(FileSyncStore::new(path).await?))
        }
        StoreConfig::Memory => {
            tracing::warn!("Using in-memory store: the hub cache will not survive restarts");
            Ok(Arc::new(MemorySyncStore::new()))
        }
    }
}

/// Everything a store holds, shared by both implementations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct StoreData {
    /// Authoritative snapshot per hub
    pub hub_cache: BTreeMap<String, Snapshot>,
    /// Last-applied snapshot per spoke
    pub spoke_state: BTreeMap<String, Snapshot>,
    /// Sync runs, oldest first
    pub history: Vec<SyncRun>,
}

impl StoreData {
    pub fn push_run(&mut self, run: SyncRun) {
        self.history.push(run);
        if self.history.len() > MAX_HISTORY_ENTRIES {
            let excess = self.history.len() - MAX_HISTORY_ENTRIES;
            self.history.drain(..excess);
        }
    }

    pub fn history(&self, limit: usize, server_name: Option<&str>) -> Vec<SyncRun> {
        self.history
            .iter()
            .rev()
            .filter(|run| server_name.is_none_or(|name| run.server_name == name))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn clear_history(&mut self, server_name: Option<&str>) -> usize {
        let before = self.history.len();
        match server_name {
            Some(name) => self.history.retain(|run| run.server_name != name),
            None => self.history.clear(),
        }
        before - self.history.len()
    }
}
