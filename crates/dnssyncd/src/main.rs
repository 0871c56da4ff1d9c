// # dnssyncd - DNS Sync Daemon
//
// Thin integration layer around dnssync-core. All reconciliation, retry and
// caching logic lives in the core and provider crates; the daemon only:
// 1. Reads configuration from environment variables and the server inventory file
// 2. Initializes logging and the runtime
// 3. Registers adapters and notification sinks
// 4. Runs a bootstrap cycle, then the scheduler, until a shutdown signal
//
// ## Configuration
//
// ### Inventory
// - `DNS_SYNC_CONFIG_PATH`: JSON file with `servers` (and optionally
//   `store`, `schedule`, `engine`) sections. Required.
//
// ### State Store
// - `DNS_SYNC_STORE_TYPE`: `file` or `memory` (overrides the file's `store`)
// - `DNS_SYNC_STATE_PATH`: Path to the state file (for the file store)
//
// ### Schedule
// - `DNS_SYNC_INTERVAL_MINUTES`: Minutes between cycles (1..=1440)
// - `DNS_SYNC_AUTO_SYNC`: Enable periodic sync (true/false)
// - `DNS_SYNC_SETTINGS_PATH`: Persisted schedule settings (default:
//   `settings.json` next to the state file; none with the memory store)
//
// Once the settings file exists it wins over the two variables above, which
// only seed it on first start.
//
// ### Engine
// - `DNS_SYNC_DRY_RUN`: Compute diffs without touching spokes (true/false)
// - `DNS_SYNC_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ### Notifications
// - `DNS_SYNC_DISCORD_WEBHOOK_URL`: Discord-compatible webhook for failure alerts
//
// Server secrets are read from `DNS_SYNC_{SERVER}_{FIELD}` when present
// (e.g. `DNS_SYNC_PI2_PASSWORD`), falling back to the inventory file.
//
// ## Signals
//
// - SIGTERM / SIGINT: graceful shutdown
// - SIGHUP: re-read the settings file, then sync every enabled spoke now
// - SIGUSR1: pause or resume periodic sync and persist the choice
//
// ## Example
//
// ```bash
// export DNS_SYNC_CONFIG_PATH=/etc/dns-sync/servers.json
// export DNS_SYNC_STATE_PATH=/var/lib/dns-sync/state.json
// export DNS_SYNC_INTERVAL_MINUTES=15
//
// dnssyncd
// ```

use anyhow::{Context, Result};
use dnssync_core::traits::{CredentialStore, Notifier};
use dnssync_core::{
    AdapterContext, AdapterRegistry, EnvCredentialStore, FanoutNotifier, LogNotifier,
    ScheduleConfig, ScheduleHandle, ScheduleSettingsFile, Scheduler, SessionCache,
    SharedInventory, StoreConfig, SyncConfig, SyncEvent, SyncHandle, SyncOrchestrator, SyncWorker,
};
use std::env;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Queued manual/bootstrap requests before callers wait
const WORKER_QUEUE_CAPACITY: usize = 16;

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum SyncExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<SyncExitCode> for ExitCode {
    fn from(code: SyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Daemon configuration from the environment
struct Config {
    config_path: String,
    store_type: Option<String>,
    state_path: Option<String>,
    settings_path: Option<String>,
    interval_minutes: Option<u64>,
    auto_sync: Option<bool>,
    dry_run: Option<bool>,
    log_level: String,
    webhook_url: Option<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("config_path", &self.config_path)
            .field("store_type", &self.store_type)
            .field("state_path", &self.state_path)
            .field("settings_path", &self.settings_path)
            .field("interval_minutes", &self.interval_minutes)
            .field("auto_sync", &self.auto_sync)
            .field("dry_run", &self.dry_run)
            .field("log_level", &self.log_level)
            .field(
                "webhook_url",
                &self.webhook_url.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through a variable lookup
    ///
    /// Blank values count as unset.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let interval_minutes = var("DNS_SYNC_INTERVAL_MINUTES")
            .map(|s| {
                s.parse::<u64>().with_context(|| {
                    format!("DNS_SYNC_INTERVAL_MINUTES must be a whole number. Got: {}", s)
                })
            })
            .transpose()?;

        Ok(Self {
            config_path: var("DNS_SYNC_CONFIG_PATH").context(
                "DNS_SYNC_CONFIG_PATH is required. \
                Set it via: export DNS_SYNC_CONFIG_PATH=/etc/dns-sync/servers.json",
            )?,
            store_type: var("DNS_SYNC_STORE_TYPE").map(|s| s.to_lowercase()),
            state_path: var("DNS_SYNC_STATE_PATH"),
            settings_path: var("DNS_SYNC_SETTINGS_PATH"),
            interval_minutes,
            auto_sync: var("DNS_SYNC_AUTO_SYNC")
                .map(|s| parse_bool("DNS_SYNC_AUTO_SYNC", &s))
                .transpose()?,
            dry_run: var("DNS_SYNC_DRY_RUN")
                .map(|s| parse_bool("DNS_SYNC_DRY_RUN", &s))
                .transpose()?,
            log_level: var("DNS_SYNC_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            webhook_url: var("DNS_SYNC_DISCORD_WEBHOOK_URL"),
        })
    }

    /// Validate the environment-level settings
    fn validate(&self) -> Result<()> {
        if let Some(store_type) = &self.store_type {
            match store_type.as_str() {
                "file" | "memory" => {}
                _ => anyhow::bail!(
                    "DNS_SYNC_STORE_TYPE '{}' is not supported. \
                    Supported types: file, memory",
                    store_type
                ),
            }
        }

        if self.store_type.as_deref() == Some("file") && self.state_path.is_none() {
            anyhow::bail!(
                "DNS_SYNC_STATE_PATH is required when DNS_SYNC_STORE_TYPE=file. \
                Set it via: export DNS_SYNC_STATE_PATH=/var/lib/dns-sync/state.json"
            );
        }

        if let Some(path) = &self.state_path
            && let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            anyhow::bail!(
                "DNS_SYNC_STATE_PATH parent directory does not exist: {}. \
                Create it first: sudo mkdir -p {}",
                parent.display(),
                parent.display()
            );
        }

        if let Some(interval) = self.interval_minutes
            && !(1..=1440).contains(&interval)
        {
            anyhow::bail!(
                "DNS_SYNC_INTERVAL_MINUTES must be between 1 and 1440. Got: {}",
                interval
            );
        }

        if let Some(url) = &self.webhook_url
            && !url.starts_with("https://")
            && !url.starts_with("http://")
        {
            anyhow::bail!("DNS_SYNC_DISCORD_WEBHOOK_URL must use HTTP or HTTPS scheme");
        }

        self.level()?;
        Ok(())
    }

    fn level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "DNS_SYNC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }

    /// Read the inventory file and apply environment overrides
    fn load_sync_config(&self) -> Result<SyncConfig> {
        let raw = std::fs::read_to_string(&self.config_path)
            .with_context(|| format!("Failed to read {}", self.config_path))?;
        let mut config: SyncConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse {}", self.config_path))?;

        match (self.store_type.as_deref(), &self.state_path) {
            (Some("memory"), _) => config.store = StoreConfig::Memory,
            (_, Some(path)) => config.store = StoreConfig::File { path: path.clone() },
            _ => {}
        }
        if let Some(minutes) = self.interval_minutes {
            config.schedule.interval_minutes = minutes;
        }
        if let Some(enabled) = self.auto_sync {
            config.schedule.enabled = enabled;
        }
        if let Some(dry_run) = self.dry_run {
            config.engine.dry_run = dry_run;
        }

        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", self.config_path))?;
        Ok(config)
    }

    /// Where runtime schedule changes are persisted, if anywhere
    fn settings_file(&self, store: &StoreConfig) -> Option<ScheduleSettingsFile> {
        match (&self.settings_path, store) {
            (Some(path), _) => Some(ScheduleSettingsFile::new(path)),
            (None, StoreConfig::File { path }) => Some(ScheduleSettingsFile::beside(path)),
            (None, StoreConfig::Memory) => None,
        }
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("{} must be true or false. Got: {}", name, value),
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return SyncExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return SyncExitCode::ConfigError.into();
    }

    let sync_config = match config.load_sync_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return SyncExitCode::ConfigError.into();
        }
    };

    let log_level = config.level().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return SyncExitCode::ConfigError.into();
    }

    info!("Starting dnssyncd");
    debug!("Daemon configuration: {:?}", config);
    info!(
        "Configuration loaded: {} server(s), hub: {}",
        sync_config.servers.len(),
        sync_config.hub().map(|h| h.name.as_str()).unwrap_or("<none>")
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return SyncExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        match run_daemon(config, sync_config).await {
            Ok(()) => SyncExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                SyncExitCode::RuntimeError
            }
        }
    });

    result.into()
}

/// Build the notification fan-out
fn build_notifier(config: &Config) -> Result<Arc<dyn Notifier>> {
    let mut notifier = FanoutNotifier::new().with(Arc::new(LogNotifier));

    #[cfg(feature = "webhook")]
    if let Some(webhook) =
        dnssync_notify_webhook::WebhookNotifier::from_optional(config.webhook_url.as_deref())?
    {
        info!("Webhook notifications enabled");
        notifier = notifier.with(Arc::new(webhook));
    }

    #[cfg(not(feature = "webhook"))]
    if config.webhook_url.is_some() {
        warn!("DNS_SYNC_DISCORD_WEBHOOK_URL is set but the webhook feature is disabled");
    }

    Ok(Arc::new(notifier))
}

/// Run the daemon
async fn run_daemon(config: Config, mut sync_config: SyncConfig) -> Result<()> {
    let registry = Arc::new(AdapterRegistry::new());
    dnssync_providers::register(&registry);

    for server in &sync_config.servers {
        if !registry.has_adapter(&server.server_type) {
            anyhow::bail!(
                "Server '{}' uses unsupported type '{}'. Available: {}",
                server.name,
                server.server_type,
                registry.list_adapters().join(", ")
            );
        }
    }

    let store = dnssync_core::store::open(&sync_config.store)
        .await
        .context("Failed to open state store")?;
    let inventory = Arc::new(SharedInventory::from_config(&sync_config)?);
    let credentials: Arc<dyn CredentialStore> = Arc::new(EnvCredentialStore::from_env());
    let ctx = AdapterContext::new(
        credentials,
        SessionCache::with_ttl(sync_config.engine.session_ttl()),
    );
    let notifier = build_notifier(&config)?;

    let settings = config.settings_file(&sync_config.store);
    match &settings {
        Some(file) => {
            sync_config.schedule = resolve_schedule(file, sync_config.schedule).await;
        }
        None => info!("No settings file; schedule changes will not survive a restart"),
    }

    if sync_config.engine.dry_run {
        warn!("Dry-run mode: spokes will not be modified");
    }

    let (orchestrator, events) = SyncOrchestrator::new(
        inventory,
        registry,
        store.clone(),
        ctx,
        notifier,
        &sync_config.engine,
    );
    let orchestrator = Arc::new(orchestrator);
    let event_task = tokio::spawn(log_events(events));

    let (worker, handle) = SyncWorker::new(orchestrator.clone(), WORKER_QUEUE_CAPACITY);
    let worker_task = tokio::spawn(worker.run());

    // Bootstrap: bring spokes in line with the hub right away.
    if sync_config.schedule.enabled {
        info!("Running bootstrap sync");
        trigger_cycle(&handle, "bootstrap").await;
    } else {
        info!("Periodic sync disabled; send SIGHUP to sync manually or SIGUSR1 to resume");
    }

    let grace = sync_config.engine.shutdown_grace();
    let (scheduler, schedule) = Scheduler::new(orchestrator, sync_config.schedule, grace);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let scheduler_task = tokio::spawn(scheduler.run(shutdown_rx));

    info!("Daemon initialized successfully");

    let signal = wait_for_signals(&handle, &schedule, settings.as_ref()).await?;
    info!("Received shutdown signal: {}", signal);
    info!("Shutting down daemon");

    // The scheduler waits out (or abandons) its own cycle and flushes.
    let _ = shutdown_tx.send(());
    let scheduler_result = scheduler_task
        .await
        .context("Scheduler task panicked")?;

    // Dropping the last handle lets the worker drain and exit.
    drop(handle);
    let mut worker_task = worker_task;
    if tokio::time::timeout(grace, &mut worker_task).await.is_err() {
        warn!("Manual sync still running after {:?}, abandoning it", grace);
        worker_task.abort();
    }

    if let Err(e) = store.flush().await {
        error!("Final store flush failed: {}", e);
        return Err(e.into());
    }
    event_task.abort();

    scheduler_result.context("Scheduler stopped with an error")?;
    info!("Shutdown complete");
    Ok(())
}

/// Queue a full cycle on the worker and log its outcome in the background
async fn trigger_cycle(handle: &SyncHandle, reason: &'static str) {
    match handle.run_cycle().await {
        Ok(reply) => {
            tokio::spawn(async move {
                match reply.await {
                    Ok(report) => {
                        let failed = report.spokes.values().filter(|r| !r.is_success()).count();
                        info!(
                            "{} sync finished: {} spoke(s), {} failed",
                            reason,
                            report.spokes.len(),
                            failed
                        );
                    }
                    Err(_) => debug!("{} sync dropped before completion", reason),
                }
            });
        }
        Err(e) => error!("Failed to queue {} sync: {}", reason, e),
    }
}

/// Schedule to start with: the saved one, or `fallback` saved as the seed
///
/// An unreadable settings file is reported and left untouched.
async fn resolve_schedule(
    file: &ScheduleSettingsFile,
    fallback: ScheduleConfig,
) -> ScheduleConfig {
    match file.load().await {
        Ok(Some(saved)) => {
            info!("Loaded schedule settings from {}", file.path().display());
            saved
        }
        Ok(None) => {
            if let Err(e) = file.save(&fallback).await {
                warn!("Failed to save initial schedule settings: {}", e);
            }
            fallback
        }
        Err(e) => {
            warn!("Ignoring schedule settings: {}", e);
            fallback
        }
    }
}

/// Apply the settings file to the running scheduler
///
/// # Returns
///
/// `true` if the running settings changed
async fn reload_schedule(schedule: &ScheduleHandle, file: &ScheduleSettingsFile) -> bool {
    match file.load().await {
        Ok(Some(saved)) if saved != schedule.settings() => {
            info!(
                "Schedule reloaded: every {} minutes, {}",
                saved.interval_minutes,
                if saved.enabled { "enabled" } else { "disabled" }
            );
            schedule.apply(saved);
            true
        }
        Ok(_) => false,
        Err(e) => {
            warn!("Keeping current schedule: {}", e);
            false
        }
    }
}

/// Flip periodic sync on or off, persisting the new settings
///
/// # Returns
///
/// The settings now in effect
async fn toggle_auto_sync(
    schedule: &ScheduleHandle,
    file: Option<&ScheduleSettingsFile>,
) -> ScheduleConfig {
    let enabled = !schedule.settings().enabled;
    schedule.set_enabled(enabled);
    let current = schedule.settings();
    info!(
        "Periodic sync {}",
        if enabled { "resumed" } else { "paused" }
    );

    if let Some(file) = file
        && let Err(e) = file.save(&current).await
    {
        error!("Failed to persist schedule settings: {}", e);
    }
    current
}

/// Log every orchestrator event
async fn log_events(mut events: mpsc::Receiver<SyncEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            SyncEvent::HubRefreshed { hub, records } => {
                info!("Hub {} refreshed: {} records cached", hub, records)
            }
            SyncEvent::HubStale {
                hub,
                error,
                last_updated,
            } => warn!(
                "Hub {} unreachable ({}), serving cache from {}",
                hub, error, last_updated
            ),
            SyncEvent::HubUnavailable { hub, error } => {
                error!("Hub {} unreachable and nothing cached: {}", hub, error)
            }
            SyncEvent::SpokeSynced { spoke, stats } => info!(
                "Spoke {} synced: +{} -{} ({} conflicts)",
                spoke, stats.added, stats.removed, stats.conflicts
            ),
            SyncEvent::SpokeFailed { spoke, error } => {
                error!("Spoke {} failed: {}", spoke, error)
            }
            SyncEvent::SpokeSkipped { spoke, reason } => {
                debug!("Spoke {} skipped: {}", spoke, reason)
            }
            SyncEvent::SpokeCleared { spoke, removed } => {
                info!("Spoke {} cleared: {} records removed", spoke, removed)
            }
            SyncEvent::CycleCompleted { succeeded, failed } => {
                info!("Cycle completed: {} succeeded, {} failed", succeeded, failed)
            }
        }
    }
}

/// Wait for a shutdown signal, serving SIGHUP and SIGUSR1 meanwhile
///
/// # Returns
///
/// The name of the shutdown signal received.
#[cfg(unix)]
async fn wait_for_signals(
    handle: &SyncHandle,
    schedule: &ScheduleHandle,
    settings: Option<&ScheduleSettingsFile>,
) -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;
    let mut sighup = signal(SignalKind::hangup())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGHUP handler: {}", e))?;
    let mut sigusr1 = signal(SignalKind::user_defined1())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGUSR1 handler: {}", e))?;

    loop {
        tokio::select! {
            _ = sigterm.recv() => return Ok("SIGTERM"),
            _ = sigint.recv() => return Ok("SIGINT"),
            _ = sighup.recv() => {
                info!("SIGHUP received, syncing now");
                if let Some(file) = settings {
                    reload_schedule(schedule, file).await;
                }
                trigger_cycle(handle, "manual").await;
            }
            _ = sigusr1.recv() => {
                toggle_auto_sync(schedule, settings).await;
            }
        }
    }
}

/// Wait for CTRL-C
///
/// Fallback implementation for non-Unix platforms; manual sync is unavailable.
#[cfg(not(unix))]
async fn wait_for_signals(
    _handle: &SyncHandle,
    _schedule: &ScheduleHandle,
    _settings: Option<&ScheduleSettingsFile>,
) -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
