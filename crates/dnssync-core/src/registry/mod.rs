//! Plugin-based adapter registry
//!
//! The registry maps adapter type tags to factories, so the orchestrator
//! builds adapters from configuration without hardcoded if-else chains.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dnssync_core::registry::AdapterRegistry;
//!
//! let registry = AdapterRegistry::new();
//! dnssync_providers::register(&registry);
//!
//! let adapter = registry.create_adapter(&server_config, &ctx).await?;
//! ```
//!
//! ## Registration
//!
//! Vendor crates register themselves during initialization:
//!
//! ```rust,ignore
//! pub fn register(registry: &AdapterRegistry) {
//!     registry.register_adapter("pihole", Arc::new(PiholeFactory));
//! }
//! ```

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::traits::{AdapterContext, ServerAdapter, ServerAdapterFactory};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Adapter registry for plugin-based adapter creation
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes. Factories are reference-counted so the lock
/// is never held across an `.await`.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: RwLock<HashMap<String, Arc<dyn ServerAdapterFactory>>>,
}

impl AdapterRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter factory
    ///
    /// # Parameters
    ///
    /// - `server_type`: Type tag as used in `ServerConfig::server_type`
    /// - `factory`: Factory object for creating adapter instances
    ///
    /// Registering the same tag twice replaces the earlier factory.
    pub fn register_adapter(
        &self,
        server_type: impl Into<String>,
        factory: Arc<dyn ServerAdapterFactory>,
    ) {
        let mut adapters = self
            .adapters
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        adapters.insert(server_type.into(), factory);
    }

    /// Create an adapter from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn ServerAdapter>)`: Created adapter instance
    /// - `Err(Error)`: If the type is not registered or creation fails
    pub async fn create_adapter(
        &self,
        config: &ServerConfig,
        ctx: &AdapterContext,
    ) -> Result<Box<dyn ServerAdapter>> {
        let factory = {
            let adapters = self
                .adapters
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            adapters.get(&config.server_type).cloned().ok_or_else(|| {
                Error::config(format!(
                    "Unknown server type '{}' for server '{}'",
                    config.server_type, config.name
                ))
            })?
        };

        factory.create(config, ctx).await
    }

    /// List all registered adapter types, sorted
    pub fn list_adapters(&self) -> Vec<String> {
        let adapters = self
            .adapters
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = adapters.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if an adapter type is registered
    pub fn has_adapter(&self, server_type: &str) -> bool {
        let adapters = self
            .adapters
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        adapters.contains_key(server_type)
    }
}
