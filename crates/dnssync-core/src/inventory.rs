//! Server inventory
//!
//! The orchestrator re-reads the inventory on every operation, so enabling,
//! disabling or replacing servers takes effect on the next cycle without a
//! restart.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::{ServerConfig, SyncConfig};
use crate::error::{Error, Result};

/// Source of the current server list
#[async_trait]
pub trait ServerInventory: Send + Sync {
    /// Snapshot of every configured server
    async fn servers(&self) -> Vec<ServerConfig>;

    /// Enable or disable one server
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Flag updated
    /// - `Err(Error::NotFound)`: No server with that name
    async fn set_enabled(&self, name: &str, enabled: bool) -> Result<()>;

    /// The hub, if configured and enabled
    async fn hub(&self) -> Option<ServerConfig> {
        self.servers()
            .await
            .into_iter()
            .find(|s| s.is_hub() && s.enabled)
    }

    /// One server by name
    async fn server(&self, name: &str) -> Option<ServerConfig> {
        self.servers().await.into_iter().find(|s| s.name == name)
    }

    /// Every spoke, enabled or not, in configuration order
    async fn spokes(&self) -> Vec<ServerConfig> {
        self.servers()
            .await
            .into_iter()
            .filter(|s| !s.is_hub())
            .collect()
    }
}

/// In-process inventory shared between the daemon and the orchestrator
#[derive(Debug, Clone, Default)]
pub struct SharedInventory {
    servers: Arc<RwLock<Vec<ServerConfig>>>,
}

impl SharedInventory {
    /// Create an inventory after validating it
    pub fn new(servers: Vec<ServerConfig>) -> Result<Self> {
        Self::validate(&servers)?;
        Ok(Self {
            servers: Arc::new(RwLock::new(servers)),
        })
    }

    /// Create an inventory from a full configuration
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        Self::new(config.servers.clone())
    }

    /// Replace the whole server list
    pub async fn replace(&self, servers: Vec<ServerConfig>) -> Result<()> {
        Self::validate(&servers)?;
        info!("Server inventory replaced: {} servers", servers.len());
        *self.servers.write().await = servers;
        Ok(())
    }

    fn validate(servers: &[ServerConfig]) -> Result<()> {
        SyncConfig {
            servers: servers.to_vec(),
            ..SyncConfig::default()
        }
        .validate()
    }
}

#[async_trait]
impl ServerInventory for SharedInventory {
    async fn servers(&self) -> Vec<ServerConfig> {
        self.servers.read().await.clone()
    }

    async fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        let mut servers = self.servers.write().await;
        let server = servers
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| Error::not_found(format!("Server '{}'", name)))?;
        server.enabled = enabled;
        info!(
            "Server {} {}",
            name,
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }
}
