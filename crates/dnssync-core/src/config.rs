//! Configuration types for the DNS sync system
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::time::Duration;

/// Main sync configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Server inventory (one hub, any number of spokes)
    #[serde(default)]
    pub servers: Vec<ServerConfig>,

    /// Record cache / history store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Periodic sync settings
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl SyncConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    ///
    /// Zero hubs is valid: every sync cycle becomes a logged no-op.
    pub fn validate(&self) -> Result<(), crate::Error> {
        let mut names = HashSet::new();
        for server in &self.servers {
            server.validate()?;
            if !names.insert(server.name.as_str()) {
                return Err(crate::Error::config(format!(
                    "Duplicate server name: {}",
                    server.name
                )));
            }
        }

        let hubs = self.servers.iter().filter(|s| s.is_hub()).count();
        if hubs > 1 {
            return Err(crate::Error::config(format!(
                "At most one hub may be configured, found {}",
                hubs
            )));
        }

        self.store.validate()?;
        Ok(())
    }

    /// The configured hub, if any
    pub fn hub(&self) -> Option<&ServerConfig> {
        self.servers.iter().find(|s| s.is_hub())
    }
}

/// Role of a server in the topology
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Authoritative source of records
    Hub,
    /// Mirrors the hub
    #[default]
    Spoke,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Hub => f.write_str("hub"),
            SyncMode::Spoke => f.write_str("spoke"),
        }
    }
}

/// One DNS-admin server
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Unique server name
    pub name: String,

    /// Adapter type tag (e.g., "pihole", "adguard")
    #[serde(rename = "type")]
    pub server_type: String,

    /// Base URL of the admin API
    pub url: String,

    /// Auth fields; values are literals or `encrypted:<field>` references
    #[serde(default)]
    pub auth: BTreeMap<String, String>,

    /// Hub or spoke
    #[serde(default)]
    pub sync_mode: SyncMode,

    /// Disabled servers are skipped entirely
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Per-request timeout (in seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Total attempts per request when transport failures are transient
    ///
    /// The first call counts; zero behaves like one.
    #[serde(default = "default_retries")]
    pub retries: u32,
}

impl ServerConfig {
    /// Create a spoke configuration with defaults
    pub fn new(
        name: impl Into<String>,
        server_type: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            server_type: server_type.into(),
            url: url.into(),
            auth: BTreeMap::new(),
            sync_mode: SyncMode::Spoke,
            enabled: true,
            timeout_secs: default_timeout_secs(),
            retries: default_retries(),
        }
    }

    /// Set the sync mode
    pub fn with_sync_mode(mut self, sync_mode: SyncMode) -> Self {
        self.sync_mode = sync_mode;
        self
    }

    /// Mark this server as the hub
    pub fn as_hub(self) -> Self {
        self.with_sync_mode(SyncMode::Hub)
    }

    /// Enable or disable the server
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Add an auth field
    pub fn with_auth(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.auth.insert(field.into(), value.into());
        self
    }

    /// Set the per-request timeout
    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Set the transient retry count
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Whether this server is the hub
    pub fn is_hub(&self) -> bool {
        self.sync_mode == SyncMode::Hub
    }

    /// Request timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// URL with any trailing slash removed
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// Validate one server entry
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.name.trim().is_empty() {
            return Err(crate::Error::config("Server name cannot be empty"));
        }
        if self.server_type.trim().is_empty() {
            return Err(crate::Error::config(format!(
                "Server '{}' has no type",
                self.name
            )));
        }
        if self.url.trim().is_empty() {
            return Err(crate::Error::config(format!(
                "Server '{}' has no URL",
                self.name
            )));
        }
        if self.timeout_secs == 0 {
            return Err(crate::Error::config(format!(
                "Server '{}' timeout must be > 0",
                self.name
            )));
        }
        Ok(())
    }
}

// Auth values may hold literal secrets.
impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("name", &self.name)
            .field("server_type", &self.server_type)
            .field("url", &self.url)
            .field("auth", &self.auth.keys().collect::<Vec<_>>())
            .field("sync_mode", &self.sync_mode)
            .field("enabled", &self.enabled)
            .field("timeout_secs", &self.timeout_secs)
            .field("retries", &self.retries)
            .finish()
    }
}

/// Record cache / history store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// File-based store
    File {
        /// Path to the state file
        path: String,
    },

    /// In-memory store (not persistent)
    #[default]
    Memory,
}

impl StoreConfig {
    /// Validate the store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StoreConfig::File { path } if path.trim().is_empty() => {
                Err(crate::Error::config("Store file path cannot be empty"))
            }
            _ => Ok(()),
        }
    }
}

/// Smallest allowed sync interval
pub const MIN_INTERVAL_MINUTES: u64 = 1;

/// Largest allowed sync interval (one day)
pub const MAX_INTERVAL_MINUTES: u64 = 1440;

/// Periodic sync settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Minutes between sync cycles
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,

    /// Whether periodic sync runs at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl ScheduleConfig {
    /// Create settings, clamping the interval into range
    pub fn new(interval_minutes: u64, enabled: bool) -> Self {
        Self {
            interval_minutes: interval_minutes.clamp(MIN_INTERVAL_MINUTES, MAX_INTERVAL_MINUTES),
            enabled,
        }
    }

    /// Interval as a `Duration`, clamped into range
    pub fn interval(&self) -> Duration {
        let minutes = self
            .interval_minutes
            .clamp(MIN_INTERVAL_MINUTES, MAX_INTERVAL_MINUTES);
        Duration::from_secs(minutes * 60)
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
            enabled: true,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Compute diffs but never mutate spokes
    #[serde(default)]
    pub dry_run: bool,

    /// Capacity of the sync event channel
    ///
    /// When full, new events are dropped (with a warning log).
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// How long shutdown waits for an in-flight cycle (in seconds)
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Maximum age of a cached adapter session before it is dropped
    ///
    /// `None` keeps sessions until a validity check fails.
    #[serde(default)]
    pub session_ttl_secs: Option<u64>,
}

impl EngineConfig {
    /// Shutdown grace period as a `Duration`
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Session TTL as a `Duration`
    pub fn session_ttl(&self) -> Option<Duration> {
        self.session_ttl_secs.map(Duration::from_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            event_channel_capacity: default_event_channel_capacity(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            session_ttl_secs: None,
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_retries() -> u32 {
    3
}

fn default_interval_minutes() -> u64 {
    30
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hub() -> ServerConfig {
        ServerConfig::new("main", "pihole", "http://10.0.0.2").as_hub()
    }

    #[test]
    fn server_defaults_from_json() {
        let server: ServerConfig = serde_json::from_str(
            r#"{"name":"backup","type":"adguard","url":"http://10.0.0.3/"}"#,
        )
        .unwrap();

        assert_eq!(server.sync_mode, SyncMode::Spoke);
        assert!(server.enabled);
        assert_eq!(server.timeout_secs, 10);
        assert_eq!(server.retries, 3);
        assert_eq!(server.base_url(), "http://10.0.0.3");
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let config = SyncConfig {
            servers: vec![hub(), ServerConfig::new("main", "adguard", "http://x")],
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn two_hubs_are_rejected() {
        let config = SyncConfig {
            servers: vec![hub(), ServerConfig::new("other", "pihole", "http://y").as_hub()],
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_hubs_is_valid() {
        let config = SyncConfig {
            servers: vec![ServerConfig::new("a", "adguard", "http://x")],
            ..SyncConfig::default()
        };
        assert!(config.validate().is_ok());
        assert!(config.hub().is_none());
    }

    #[test]
    fn empty_url_is_rejected() {
        assert!(ServerConfig::new("a", "adguard", " ").validate().is_err());
    }

    #[test]
    fn schedule_interval_is_clamped() {
        assert_eq!(ScheduleConfig::new(0, true).interval_minutes, 1);
        assert_eq!(ScheduleConfig::new(10_000, true).interval_minutes, 1440);
        assert_eq!(
            ScheduleConfig::default().interval(),
            Duration::from_secs(30 * 60)
        );
    }

    #[test]
    fn debug_hides_auth_values() {
        let server = hub().with_auth("password", "hunter2");
        let debug = format!("{:?}", server);
        assert!(debug.contains("password"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn store_config_is_tagged() {
        let store: StoreConfig =
            serde_json::from_str(r#"{"type":"file","path":"/var/lib/dns-sync/state.json"}"#)
                .unwrap();
        assert!(matches!(store, StoreConfig::File { .. }));
    }
}
