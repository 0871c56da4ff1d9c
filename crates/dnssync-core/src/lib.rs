// # dnssync-core
//
// Core library for hub-and-spoke DNS rewrite synchronization.
//
// ## Architecture Overview
//
// One authoritative "hub" server's A/CNAME rewrite records are mirrored to
// any number of "spoke" servers, each possibly a different product:
// - **ServerAdapter**: Trait for reading and mutating one server's records
// - **SyncStore**: Trait for the hub cache, spoke state and sync history
// - **CredentialStore** / **Notifier**: Secret lookup and failure alerts
// - **engine**: Pure diff plus per-record apply with conflict counting
// - **SyncOrchestrator**: Hub refresh, stale-cache fallback, per-spoke isolation
// - **Scheduler** / **SyncWorker**: Periodic and on-demand triggers
// - **AdapterRegistry**: Plugin-based registry keyed by server type
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from vendor adapters
// 2. **Degrade, don't fail**: An unreachable hub falls back to its cache
// 3. **Plugin-Based**: Adapters are registered dynamically, no hard-coded if-else
// 4. **Library-First**: All core functionality can be used as a library
// 5. **Full-set replacement**: Every cycle diffs complete record sets

pub mod config;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod inventory;
pub mod notify;
pub mod orchestrator;
pub mod record;
pub mod registry;
pub mod retry;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod traits;
pub mod worker;

// Re-export core types for convenience
pub use config::{EngineConfig, ScheduleConfig, ServerConfig, StoreConfig, SyncConfig, SyncMode};
pub use credentials::{EnvCredentialStore, MemoryCredentialStore, resolve_auth};
pub use engine::{DiffPlan, SyncStats};
pub use error::{Error, Result};
pub use inventory::{ServerInventory, SharedInventory};
pub use notify::{FanoutNotifier, LogNotifier};
pub use orchestrator::{CycleReport, HubRefresh, SpokeReport, SyncEvent, SyncOrchestrator};
pub use record::{DnsRecord, RecordSet, RecordType};
pub use registry::AdapterRegistry;
pub use retry::RetryPolicy;
pub use scheduler::{ScheduleHandle, Scheduler};
pub use session::{Session, SessionCache};
pub use store::{FileSyncStore, MemorySyncStore, ScheduleSettingsFile};
pub use traits::{
    AdapterContext, CredentialStore, Notifier, ServerAdapter, ServerAdapterFactory, SyncRun,
    SyncStatus, SyncStore,
};
pub use worker::{SyncHandle, SyncWorker};
