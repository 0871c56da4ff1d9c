//! Sync orchestrator
//!
//! The orchestrator sequences one reconciliation cycle:
//!
//! ```text
//! RefreshHub ──┬── Fresh ─────────┐
//!              ├── Stale fallback ├──► per spoke: Connect → Diff/Apply → Persist
//!              └── Unavailable ───┘    (each spoke isolated)
//! ```
//!
//! ## Failure isolation
//!
//! Adapter errors are caught here, per hub and per spoke, and turned into a
//! history row, a notification and a [`SyncEvent`]. They never reach the
//! caller, and one spoke's failure never prevents the others from running.
//! Store failures are logged and never undo a reconciliation that already
//! happened on the live server.
//!
//! ## Mutual exclusion
//!
//! Hub refreshes never overlap. Two operations against the same spoke never
//! interleave; different spokes proceed independently. Each batch drops the
//! spoke locks and cached adapter sessions of servers that have left the
//! inventory, so both maps stay bounded by the configured fleet.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, PoisonError};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

use crate::config::{EngineConfig, ServerConfig, SyncMode};
use crate::engine::{self, SyncStats};
use crate::error::{Error, Result};
use crate::inventory::ServerInventory;
use crate::record::RecordSet;
use crate::registry::AdapterRegistry;
use crate::traits::{AdapterContext, Notifier, SyncRun, SyncStore};

/// Events emitted by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Hub records fetched and cached
    HubRefreshed { hub: String, records: usize },

    /// Hub unreachable; the cached snapshot is served instead
    HubStale {
        hub: String,
        error: String,
        last_updated: DateTime<Utc>,
    },

    /// Hub unreachable and nothing cached
    HubUnavailable { hub: String, error: String },

    /// A spoke was reconciled
    SpokeSynced { spoke: String, stats: SyncStats },

    /// A spoke sync failed at the adapter level
    SpokeFailed { spoke: String, error: String },

    /// A spoke was not attempted
    SpokeSkipped { spoke: String, reason: String },

    /// Every record was removed from a spoke
    SpokeCleared { spoke: String, removed: usize },

    /// A full cycle finished
    CycleCompleted { succeeded: usize, failed: usize },
}

/// Result of a hub cache refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubRefresh {
    /// No enabled hub is configured
    NoHub,

    /// Records fetched from the hub just now
    Fresh(RecordSet),

    /// Hub unreachable; last persisted snapshot
    Stale {
        records: RecordSet,
        error: String,
        last_updated: DateTime<Utc>,
    },

    /// Hub unreachable and no snapshot exists
    Unavailable { error: String },
}

impl HubRefresh {
    /// Records to reconcile spokes against, if any
    pub fn records(&self) -> Option<&RecordSet> {
        match self {
            HubRefresh::Fresh(records) | HubRefresh::Stale { records, .. } => Some(records),
            HubRefresh::NoHub | HubRefresh::Unavailable { .. } => None,
        }
    }

    /// Whether the hub answered this time
    pub fn is_fresh(&self) -> bool {
        matches!(self, HubRefresh::Fresh(_))
    }
}

/// Outcome of one spoke sync
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpokeReport {
    /// Counters (all zero on error)
    pub stats: SyncStats,
    /// Causal message when the sync failed or was skipped
    pub error: Option<String>,
}

impl SpokeReport {
    fn ok(stats: SyncStats) -> Self {
        Self { stats, error: None }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            stats: SyncStats::default(),
            error: Some(error.into()),
        }
    }

    /// Whether the spoke was reconciled
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of a refresh followed by a batch sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Hub refresh result
    pub hub: HubRefresh,
    /// Per-spoke outcome; disabled spokes are absent
    pub spokes: BTreeMap<String, SpokeReport>,
}

/// Hub-and-spoke sync orchestrator
///
/// Share it behind an `Arc` between the scheduler and the worker.
pub struct SyncOrchestrator {
    inventory: Arc<dyn ServerInventory>,
    registry: Arc<AdapterRegistry>,
    store: Arc<dyn SyncStore>,
    ctx: AdapterContext,
    notifier: Arc<dyn Notifier>,
    dry_run: bool,
    hub_lock: Mutex<()>,
    spoke_locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
    event_tx: mpsc::Sender<SyncEvent>,
}

impl SyncOrchestrator {
    /// Create a new orchestrator
    ///
    /// # Returns
    ///
    /// A tuple of (orchestrator, event_receiver)
    pub fn new(
        inventory: Arc<dyn ServerInventory>,
        registry: Arc<AdapterRegistry>,
        store: Arc<dyn SyncStore>,
        ctx: AdapterContext,
        notifier: Arc<dyn Notifier>,
        engine: &EngineConfig,
    ) -> (Self, mpsc::Receiver<SyncEvent>) {
        let (tx, rx) = mpsc::channel(engine.event_channel_capacity.max(1));

        let orchestrator = Self {
            inventory,
            registry,
            store,
            ctx,
            notifier,
            dry_run: engine.dry_run,
            hub_lock: Mutex::new(()),
            spoke_locks: std::sync::Mutex::new(HashMap::new()),
            event_tx: tx,
        };

        (orchestrator, rx)
    }

    /// The backing store
    pub fn store(&self) -> &Arc<dyn SyncStore> {
        &self.store
    }

    /// The server inventory
    pub fn inventory(&self) -> &Arc<dyn ServerInventory> {
        &self.inventory
    }

    /// Number of spokes with a sync lock allocated
    pub fn spoke_lock_count(&self) -> usize {
        self.spoke_locks
            .lock()
            .map(|locks| locks.len())
            .unwrap_or_default()
    }

    /// Whether mutations are suppressed
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Fetch the hub's records and persist them as the authoritative cache
    ///
    /// Never fails: an unreachable hub degrades to the cached snapshot, or
    /// to [`HubRefresh::Unavailable`] when nothing is cached.
    pub async fn refresh_hub_cache(&self) -> HubRefresh {
        let Some(hub) = self.inventory.hub().await else {
            info!("No hub configured, nothing to refresh");
            return HubRefresh::NoHub;
        };

        let _guard = self.hub_lock.lock().await;
        let started_at = Utc::now();

        match self.fetch_records(&hub).await {
            Ok(records) => {
                if let Err(e) = self.store.save_hub_records(&hub.name, &records).await {
                    error!("Failed to persist hub cache for {}: {}", hub.name, e);
                }
                info!("Hub cache refreshed for {} ({} records)", hub.name, records.len());

                let stats = SyncStats::for_snapshot(&records);
                self.record(SyncRun::success(
                    &hub.name,
                    &hub.server_type,
                    SyncMode::Hub,
                    started_at,
                    &stats,
                ))
                .await;
                self.emit_event(SyncEvent::HubRefreshed {
                    hub: hub.name.clone(),
                    records: records.len(),
                });
                HubRefresh::Fresh(records)
            }
            Err(e) => {
                let err = e.to_string();
                error!("Hub cache refresh failed ({}): {}", hub.name, err);
                self.notifier
                    .notify_hub_unreachable(&hub.name, &hub.server_type, &err);

                let snapshot = match self.store.get_hub_snapshot(&hub.name).await {
                    Ok(snapshot) => snapshot,
                    Err(store_err) => {
                        error!("Failed to read hub cache for {}: {}", hub.name, store_err);
                        None
                    }
                };

                match snapshot {
                    Some(snapshot) => {
                        warn!(
                            "Using cached records for hub {} from {}",
                            hub.name, snapshot.updated_at
                        );
                        let stats = SyncStats::for_snapshot(&snapshot.records);
                        self.record(SyncRun::failure(
                            &hub.name,
                            &hub.server_type,
                            SyncMode::Hub,
                            started_at,
                            &stats,
                            format!(
                                "{}; serving cached records from {}",
                                err,
                                snapshot.updated_at.to_rfc3339()
                            ),
                        ))
                        .await;
                        self.emit_event(SyncEvent::HubStale {
                            hub: hub.name.clone(),
                            error: err.clone(),
                            last_updated: snapshot.updated_at,
                        });
                        HubRefresh::Stale {
                            records: snapshot.records,
                            error: err,
                            last_updated: snapshot.updated_at,
                        }
                    }
                    None => {
                        self.record(SyncRun::failure(
                            &hub.name,
                            &hub.server_type,
                            SyncMode::Hub,
                            started_at,
                            &SyncStats::default(),
                            format!("{}; no cached records available", err),
                        ))
                        .await;
                        self.emit_event(SyncEvent::HubUnavailable {
                            hub: hub.name.clone(),
                            error: err.clone(),
                        });
                        HubRefresh::Unavailable { error: err }
                    }
                }
            }
        }
    }

    /// Reconcile every enabled spoke against the cached hub snapshot
    ///
    /// The hub is not contacted. Each spoke's outcome is independent.
    pub async fn sync_all_enabled_spokes(&self) -> BTreeMap<String, SpokeReport> {
        let Some(hub) = self.inventory.hub().await else {
            info!("No hub configured, skipping spoke sync");
            return BTreeMap::new();
        };

        let source = self.cached_hub_records(&hub.name).await;
        self.sync_spokes_from(&hub.name, source.as_ref()).await
    }

    /// Refresh the hub, then reconcile every enabled spoke
    pub async fn run_cycle(&self) -> CycleReport {
        let hub = self.refresh_hub_cache().await;
        let spokes = match (&hub, self.inventory.hub().await) {
            (HubRefresh::NoHub, _) | (_, None) => BTreeMap::new(),
            (refresh, Some(hub_cfg)) => self.sync_spokes_from(&hub_cfg.name, refresh.records()).await,
        };

        let succeeded = spokes.values().filter(|r| r.is_success()).count();
        self.emit_event(SyncEvent::CycleCompleted {
            succeeded,
            failed: spokes.len() - succeeded,
        });
        CycleReport { hub, spokes }
    }

    /// Reconcile one spoke against the cached hub snapshot
    ///
    /// # Returns
    ///
    /// - `Ok(Some(report))`: The spoke was attempted
    /// - `Ok(None)`: The spoke is disabled
    /// - `Err(Error::NotFound)`: No such spoke, or no hub configured
    pub async fn sync_spoke(&self, spoke_name: &str) -> Result<Option<SpokeReport>> {
        let spoke = self.find_spoke(spoke_name).await?;
        let hub = self.require_hub().await?;
        let source = self.cached_hub_records(&hub.name).await;
        Ok(self.sync_one(&hub.name, &spoke, source.as_ref()).await)
    }

    /// Refresh the hub, then reconcile exactly one spoke
    ///
    /// The refresh always runs first so the diff never uses stale data when
    /// the hub is reachable.
    pub async fn perform_sync(&self, spoke_name: &str) -> Result<Option<SpokeReport>> {
        let spoke = self.find_spoke(spoke_name).await?;
        if !spoke.enabled {
            info!("Skipping disabled spoke: {}", spoke.name);
            return Ok(None);
        }
        let hub = self.require_hub().await?;

        let refresh = self.refresh_hub_cache().await;
        Ok(self.sync_one(&hub.name, &spoke, refresh.records()).await)
    }

    /// Delete every A/CNAME record on a spoke
    ///
    /// Persists an empty spoke state and appends a history row. Adapter
    /// failures are recorded, notified and returned.
    pub async fn clear_spoke(&self, spoke_name: &str) -> Result<SyncStats> {
        let spoke = self.find_spoke(spoke_name).await?;
        let lock = self.spoke_lock(&spoke.name);
        let _guard = lock.lock().await;
        let started_at = Utc::now();

        let empty = RecordSet::new();
        let result: Result<SyncStats> = async {
            let mut adapter = self.registry.create_adapter(&spoke, &self.ctx).await?;
            let outcome = match adapter.connect().await {
                Ok(()) => engine::reconcile(&empty, adapter.as_ref(), self.dry_run).await,
                Err(e) => Err(e),
            };
            adapter.disconnect().await;
            outcome
        }
        .await;

        match result {
            Ok(stats) => {
                if !self.dry_run {
                    if let Err(e) = self.store.save_spoke_records(&spoke.name, &empty).await {
                        error!("Failed to persist spoke state for {}: {}", spoke.name, e);
                    }
                }
                info!(
                    "Cleared {} records from {} ({} conflicts)",
                    stats.removed, spoke.name, stats.conflicts
                );
                self.record(SyncRun::success(
                    &spoke.name,
                    &spoke.server_type,
                    SyncMode::Spoke,
                    started_at,
                    &stats,
                ))
                .await;
                self.emit_event(SyncEvent::SpokeCleared {
                    spoke: spoke.name.clone(),
                    removed: stats.removed,
                });
                Ok(stats)
            }
            Err(e) => {
                let err = e.to_string();
                error!("Clear failed for {}: {}", spoke.name, err);
                self.record(SyncRun::failure(
                    &spoke.name,
                    &spoke.server_type,
                    SyncMode::Spoke,
                    started_at,
                    &SyncStats::default(),
                    &err,
                ))
                .await;
                self.notifier
                    .notify_sync_failed(&spoke.name, &spoke.server_type, &err);
                self.emit_event(SyncEvent::SpokeFailed {
                    spoke: spoke.name.clone(),
                    error: err,
                });
                Err(e)
            }
        }
    }

    async fn sync_spokes_from(
        &self,
        hub_name: &str,
        source: Option<&RecordSet>,
    ) -> BTreeMap<String, SpokeReport> {
        let servers = self.inventory.servers().await;
        self.prune_retired_servers(&servers);

        let mut results = BTreeMap::new();
        for spoke in servers.into_iter().filter(|s| !s.is_hub()) {
            if let Some(report) = self.sync_one(hub_name, &spoke, source).await {
                results.insert(spoke.name.clone(), report);
            }
        }
        results
    }

    /// Reconcile one spoke; `None` when it is disabled
    async fn sync_one(
        &self,
        hub_name: &str,
        spoke: &ServerConfig,
        source: Option<&RecordSet>,
    ) -> Option<SpokeReport> {
        if !spoke.enabled {
            info!("Skipping disabled spoke: {}", spoke.name);
            return None;
        }

        let lock = self.spoke_lock(&spoke.name);
        let _guard = lock.lock().await;
        let started_at = Utc::now();

        let Some(source) = source else {
            let err = Error::cache_unavailable(format!(
                "no authoritative records for hub {}; skipping spoke sync",
                hub_name
            ))
            .to_string();
            warn!("{}: {}", spoke.name, err);
            self.record(SyncRun::failure(
                &spoke.name,
                &spoke.server_type,
                SyncMode::Spoke,
                started_at,
                &SyncStats::default(),
                &err,
            ))
            .await;
            self.emit_event(SyncEvent::SpokeSkipped {
                spoke: spoke.name.clone(),
                reason: err.clone(),
            });
            return Some(SpokeReport::failed(err));
        };

        let result: Result<SyncStats> = async {
            let mut adapter = self.registry.create_adapter(spoke, &self.ctx).await?;
            let outcome = match adapter.connect().await {
                Ok(()) => engine::reconcile(source, adapter.as_ref(), self.dry_run).await,
                Err(e) => Err(e),
            };
            adapter.disconnect().await;
            outcome
        }
        .await;

        match result {
            Ok(stats) => {
                if !self.dry_run {
                    // The post-sync view is the hub snapshot, not what the spoke had.
                    if let Err(e) = self.store.save_spoke_records(&spoke.name, source).await {
                        error!("Failed to persist spoke state for {}: {}", spoke.name, e);
                    }
                }
                info!(
                    "Synced {}: +{} -{} ({} conflicts){}",
                    spoke.name,
                    stats.added,
                    stats.removed,
                    stats.conflicts,
                    if self.dry_run { " [dry run]" } else { "" }
                );
                self.record(SyncRun::success(
                    &spoke.name,
                    &spoke.server_type,
                    SyncMode::Spoke,
                    started_at,
                    &stats,
                ))
                .await;
                self.emit_event(SyncEvent::SpokeSynced {
                    spoke: spoke.name.clone(),
                    stats,
                });
                Some(SpokeReport::ok(stats))
            }
            Err(e) => {
                let err = e.to_string();
                error!("Sync failed for {}: {}", spoke.name, err);
                self.record(SyncRun::failure(
                    &spoke.name,
                    &spoke.server_type,
                    SyncMode::Spoke,
                    started_at,
                    &SyncStats::default(),
                    &err,
                ))
                .await;
                self.notifier
                    .notify_sync_failed(&spoke.name, &spoke.server_type, &err);
                self.emit_event(SyncEvent::SpokeFailed {
                    spoke: spoke.name.clone(),
                    error: err.clone(),
                });
                Some(SpokeReport::failed(err))
            }
        }
    }

    async fn fetch_records(&self, server: &ServerConfig) -> Result<RecordSet> {
        let mut adapter = self.registry.create_adapter(server, &self.ctx).await?;
        let result = match adapter.connect().await {
            Ok(()) => adapter.get_records().await,
            Err(e) => Err(e),
        };
        adapter.disconnect().await;
        result
    }

    async fn cached_hub_records(&self, hub_name: &str) -> Option<RecordSet> {
        match self.store.get_cached_hub_records(hub_name).await {
            Ok(records) => records,
            Err(e) => {
                error!("Failed to read hub cache for {}: {}", hub_name, e);
                None
            }
        }
    }

    async fn find_spoke(&self, name: &str) -> Result<ServerConfig> {
        self.inventory
            .server(name)
            .await
            .filter(|s| !s.is_hub())
            .ok_or_else(|| Error::not_found(format!("Spoke '{}'", name)))
    }

    async fn require_hub(&self) -> Result<ServerConfig> {
        self.inventory
            .hub()
            .await
            .ok_or_else(|| Error::not_found("No hub configured"))
    }

    fn spoke_lock(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .spoke_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks.entry(name.to_string()).or_default().clone()
    }

    /// Forget per-server locks and sessions of servers no longer configured
    fn prune_retired_servers(&self, servers: &[ServerConfig]) {
        let names: HashSet<&str> = servers.iter().map(|s| s.name.as_str()).collect();
        let urls: HashSet<&str> = servers.iter().map(ServerConfig::base_url).collect();

        let mut locks = self
            .spoke_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks.retain(|name, lock| names.contains(name.as_str()) || Arc::strong_count(lock) > 1);
        drop(locks);

        let dropped = self.ctx.sessions.retain(|url| urls.contains(url));
        if dropped > 0 {
            debug!("Dropped {} cached session(s) of removed servers", dropped);
        }
    }

    /// Append a history row; failures are logged only
    async fn record(&self, run: SyncRun) {
        if let Err(e) = self.store.record_sync_run(&run).await {
            error!(
                "Failed to record sync history for {}: {}",
                run.server_name, e
            );
        }
    }

    /// Emit an orchestrator event
    fn emit_event(&self, event: SyncEvent) {
        debug!("Sync event: {:?}", event);
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!(
                "Event channel full, dropping event. Consider increasing event_channel_capacity."
            ),
            Err(TrySendError::Closed(_)) => {}
        }
    }
}
