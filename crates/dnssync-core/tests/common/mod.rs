//! Test doubles and common utilities for contract tests
//!
//! A `ScriptedServer` stands in for one remote DNS-admin server: it holds a
//! live record set, counts every call, and can be told to fail or reject.
//! `ScriptedFactory` hands out adapters bound to those servers by name.

#![allow(dead_code)]

use async_trait::async_trait;
use dnssync_core::error::{Error, Result};
use dnssync_core::traits::{
    AdapterContext, Notifier, ServerAdapter, ServerAdapterFactory, Snapshot, SyncRun, SyncStore,
};
use dnssync_core::{
    AdapterRegistry, EngineConfig, MemoryCredentialStore, MemorySyncStore, RecordSet, RecordType,
    ServerConfig, SessionCache, SharedInventory, SyncEvent, SyncOrchestrator,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Adapter type tag used by every test server
pub const SCRIPTED: &str = "scripted";

/// Build a record set from canonical strings
pub fn records(a: &[&str], cname: &[&str]) -> RecordSet {
    let mut set = RecordSet::new();
    for s in a {
        set.insert_canonical(RecordType::A, s).unwrap();
    }
    for s in cname {
        set.insert_canonical(RecordType::Cname, s).unwrap();
    }
    set
}

/// A hub config backed by a scripted server
pub fn hub(name: &str) -> ServerConfig {
    ServerConfig::new(name, SCRIPTED, format!("http://{}.test", name)).as_hub()
}

/// A spoke config backed by a scripted server
pub fn spoke(name: &str) -> ServerConfig {
    ServerConfig::new(name, SCRIPTED, format!("http://{}.test", name))
}

#[derive(Default)]
struct ServerState {
    records: Mutex<RecordSet>,
    fail_connect: AtomicBool,
    fail_get: AtomicBool,
    reject: Mutex<HashSet<String>>,
    error_on: Mutex<HashSet<String>>,
    op_delay: Mutex<Duration>,
    connect_calls: AtomicUsize,
    get_calls: AtomicUsize,
    add_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

/// One fake remote server
#[derive(Clone, Default)]
pub struct ScriptedServer {
    state: Arc<ServerState>,
}

impl ScriptedServer {
    /// Replace the live record set
    pub fn set_records(&self, records: RecordSet) {
        *self.state.records.lock().unwrap() = records;
    }

    /// Current live record set
    pub fn records(&self) -> RecordSet {
        self.state.records.lock().unwrap().clone()
    }

    /// Make `connect` fail with a connection error
    pub fn fail_connect(&self, fail: bool) {
        self.state.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Make `get_records` fail with a transport error
    pub fn fail_get(&self, fail: bool) {
        self.state.fail_get.store(fail, Ordering::SeqCst);
    }

    /// Add/delete of this canonical string returns `Ok(false)`
    pub fn reject(&self, canonical: &str) {
        self.state.reject.lock().unwrap().insert(canonical.to_string());
    }

    /// Add/delete of this canonical string returns an error
    pub fn error_on(&self, canonical: &str) {
        self.state
            .error_on
            .lock()
            .unwrap()
            .insert(canonical.to_string());
    }

    /// Delay every add/delete
    pub fn set_op_delay(&self, delay: Duration) {
        *self.state.op_delay.lock().unwrap() = delay;
    }

    pub fn connect_calls(&self) -> usize {
        self.state.connect_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.state.get_calls.load(Ordering::SeqCst)
    }

    pub fn add_calls(&self) -> usize {
        self.state.add_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.state.delete_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.state.disconnect_calls.load(Ordering::SeqCst)
    }

    /// Add plus delete calls
    pub fn mutation_calls(&self) -> usize {
        self.add_calls() + self.delete_calls()
    }

    /// Highest number of simultaneously connected adapters seen
    pub fn max_concurrent_sessions(&self) -> usize {
        self.state.max_active.load(Ordering::SeqCst)
    }

    /// A standalone adapter bound to this server
    pub fn adapter(&self, name: &str) -> ScriptedAdapter {
        ScriptedAdapter {
            name: name.to_string(),
            server: self.clone(),
            connected: false,
        }
    }

    async fn mutate(&self, canonical: &str, apply: impl FnOnce(&mut RecordSet) -> bool) -> Result<bool> {
        let delay = *self.state.op_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.state.error_on.lock().unwrap().contains(canonical) {
            return Err(Error::record_operation(format!("scripted error for {}", canonical)));
        }
        if self.state.reject.lock().unwrap().contains(canonical) {
            return Ok(false);
        }
        Ok(apply(&mut self.state.records.lock().unwrap()))
    }
}

/// Adapter driving a `ScriptedServer`
pub struct ScriptedAdapter {
    name: String,
    server: ScriptedServer,
    connected: bool,
}

#[async_trait]
impl ServerAdapter for ScriptedAdapter {
    async fn connect(&mut self) -> Result<()> {
        let state = &self.server.state;
        state.connect_calls.fetch_add(1, Ordering::SeqCst);
        if state.fail_connect.load(Ordering::SeqCst) {
            return Err(Error::connection(format!("{} unreachable", self.name)));
        }
        if !self.connected {
            let active = state.active.fetch_add(1, Ordering::SeqCst) + 1;
            state.max_active.fetch_max(active, Ordering::SeqCst);
            self.connected = true;
        }
        Ok(())
    }

    async fn get_records(&self) -> Result<RecordSet> {
        self.server.state.get_calls.fetch_add(1, Ordering::SeqCst);
        if self.server.state.fail_get.load(Ordering::SeqCst) {
            return Err(Error::transport("connection reset"));
        }
        Ok(self.server.records())
    }

    async fn add_record(&self, record: &dnssync_core::DnsRecord) -> Result<bool> {
        self.server.state.add_calls.fetch_add(1, Ordering::SeqCst);
        let canonical = record.canonical();
        let owned = record.clone();
        self.server
            .mutate(&canonical, move |set| set.insert(&owned))
            .await
    }

    async fn delete_record(&self, record: &dnssync_core::DnsRecord) -> Result<bool> {
        self.server.state.delete_calls.fetch_add(1, Ordering::SeqCst);
        let canonical = record.canonical();
        let record_type = record.record_type;
        let key = canonical.clone();
        self.server
            .mutate(&canonical, move |set| {
                let mut next = RecordSet::new();
                let mut removed = false;
                for (ty, s) in set.iter() {
                    if ty == record_type && s == key {
                        removed = true;
                    } else {
                        next.insert_canonical(ty, s).unwrap();
                    }
                }
                *set = next;
                removed
            })
            .await
    }

    async fn disconnect(&mut self) {
        self.server
            .state
            .disconnect_calls
            .fetch_add(1, Ordering::SeqCst);
        if self.connected {
            self.server.state.active.fetch_sub(1, Ordering::SeqCst);
            self.connected = false;
        }
    }

    fn server_name(&self) -> &str {
        &self.name
    }

    fn adapter_type(&self) -> &'static str {
        SCRIPTED
    }
}

/// Factory handing out adapters bound to named scripted servers
#[derive(Default)]
pub struct ScriptedFactory {
    servers: Mutex<HashMap<String, ScriptedServer>>,
    created: AtomicUsize,
}

impl ScriptedFactory {
    /// The scripted server for a name (created on first use)
    pub fn server(&self, name: &str) -> ScriptedServer {
        self.servers
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    /// Adapters created so far
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServerAdapterFactory for ScriptedFactory {
    async fn create(
        &self,
        config: &ServerConfig,
        _ctx: &AdapterContext,
    ) -> Result<Box<dyn ServerAdapter>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.server(&config.name).adapter(&config.name)))
    }
}

/// A notifier that counts calls
#[derive(Default)]
pub struct CountingNotifier {
    sync_failed: AtomicUsize,
    hub_unreachable: AtomicUsize,
    messages: Mutex<Vec<String>>,
}

impl CountingNotifier {
    pub fn sync_failed_count(&self) -> usize {
        self.sync_failed.load(Ordering::SeqCst)
    }

    pub fn hub_unreachable_count(&self) -> usize {
        self.hub_unreachable.load(Ordering::SeqCst)
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl Notifier for CountingNotifier {
    fn notify_sync_failed(&self, server_name: &str, _server_type: &str, error: &str) {
        self.sync_failed.fetch_add(1, Ordering::SeqCst);
        self.messages
            .lock()
            .unwrap()
            .push(format!("sync failed: {}: {}", server_name, error));
    }

    fn notify_hub_unreachable(&self, server_name: &str, _server_type: &str, error: &str) {
        self.hub_unreachable.fetch_add(1, Ordering::SeqCst);
        self.messages
            .lock()
            .unwrap()
            .push(format!("hub unreachable: {}: {}", server_name, error));
    }
}

/// A store wrapper that counts flushes and can fail writes
#[derive(Default)]
pub struct FlakyStore {
    inner: MemorySyncStore,
    fail_writes: AtomicBool,
    flush_calls: AtomicUsize,
}

impl FlakyStore {
    /// Make every write return a persistence error
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn flush_call_count(&self) -> usize {
        self.flush_calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(Error::persistence("disk full"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SyncStore for FlakyStore {
    async fn save_hub_records(&self, hub_name: &str, records: &RecordSet) -> Result<()> {
        self.check()?;
        self.inner.save_hub_records(hub_name, records).await
    }

    async fn get_hub_snapshot(&self, hub_name: &str) -> Result<Option<Snapshot>> {
        self.inner.get_hub_snapshot(hub_name).await
    }

    async fn save_spoke_records(&self, spoke_name: &str, records: &RecordSet) -> Result<()> {
        self.check()?;
        self.inner.save_spoke_records(spoke_name, records).await
    }

    async fn get_spoke_snapshot(&self, spoke_name: &str) -> Result<Option<Snapshot>> {
        self.inner.get_spoke_snapshot(spoke_name).await
    }

    async fn record_sync_run(&self, run: &SyncRun) -> Result<()> {
        self.check()?;
        self.inner.record_sync_run(run).await
    }

    async fn history(&self, limit: usize, server_name: Option<&str>) -> Result<Vec<SyncRun>> {
        self.inner.history(limit, server_name).await
    }

    async fn clear_history(&self, server_name: Option<&str>) -> Result<usize> {
        self.check()?;
        self.inner.clear_history(server_name).await
    }

    async fn flush(&self) -> Result<()> {
        self.flush_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Fully wired orchestrator over scripted servers
pub struct Harness {
    pub orchestrator: Arc<SyncOrchestrator>,
    pub events: mpsc::Receiver<SyncEvent>,
    pub factory: Arc<ScriptedFactory>,
    pub notifier: Arc<CountingNotifier>,
    pub store: Arc<FlakyStore>,
    pub inventory: SharedInventory,
    pub sessions: SessionCache,
}

impl Harness {
    pub fn new(servers: Vec<ServerConfig>) -> Self {
        Self::with_engine(servers, EngineConfig::default())
    }

    pub fn with_engine(servers: Vec<ServerConfig>, engine: EngineConfig) -> Self {
        let inventory = SharedInventory::new(servers).unwrap();
        let factory = Arc::new(ScriptedFactory::default());
        let registry = Arc::new(AdapterRegistry::new());
        registry.register_adapter(SCRIPTED, factory.clone());
        let notifier = Arc::new(CountingNotifier::default());
        let store = Arc::new(FlakyStore::default());
        let sessions = SessionCache::new();
        let ctx = AdapterContext::new(Arc::new(MemoryCredentialStore::new()), sessions.clone());

        let (orchestrator, events) = SyncOrchestrator::new(
            Arc::new(inventory.clone()),
            registry,
            store.clone(),
            ctx,
            notifier.clone(),
            &engine,
        );

        Self {
            orchestrator: Arc::new(orchestrator),
            events,
            factory,
            notifier,
            store,
            inventory,
            sessions,
        }
    }

    /// The scripted server behind a configured name
    pub fn server(&self, name: &str) -> ScriptedServer {
        self.factory.server(name)
    }

    /// Drain every event emitted so far
    pub fn drain_events(&mut self) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}
