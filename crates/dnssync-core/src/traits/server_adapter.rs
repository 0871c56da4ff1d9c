// # Server Adapter Trait
//
// Defines the capability contract every DNS-admin product implements.
//
// ## Implementations
//
// - Pi-hole, AdGuard Home, Technitium, Cloudflare, OPNsense:
//   `dnssync-providers` crate (one cargo feature per vendor)
//
// ## Usage
//
// ```rust,ignore
// use dnssync_core::ServerAdapter;
//
// async fn dump(adapter: &mut dyn ServerAdapter) -> dnssync_core::Result<()> {
//     adapter.connect().await?;
//     let records = adapter.get_records().await?;
//     for (ty, canonical) in records.iter() {
//         println!("{ty} {canonical}");
//     }
//     adapter.disconnect().await;
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::ServerConfig;
use crate::record::{DnsRecord, RecordSet};
use crate::session::SessionCache;
use crate::traits::CredentialStore;

/// Trait for vendor-specific DNS server adapters
///
/// # Thread Safety
///
/// Implementations must be usable across async tasks.
///
/// # Failure contract
///
/// - `add_record`/`delete_record` return `Ok(false)` when the server
///   explicitly rejects the write without a transport error.
/// - Transport failures are returned as `Err`, never as `Ok(false)`.
/// - Transient transport failures are retried inside the adapter with the
///   bounded [`RetryPolicy`](crate::retry::RetryPolicy) from its
///   [`ServerConfig`]; authentication failures fail immediately.
/// - Every network call carries the configured timeout.
#[async_trait]
pub trait ServerAdapter: Send + Sync {
    /// Establish or refresh session/auth state
    ///
    /// Idempotent: calling it while already connected is safe.
    async fn connect(&mut self) -> Result<(), crate::Error>;

    /// Full snapshot of the live A/CNAME record set
    ///
    /// Must not mutate the remote server.
    async fn get_records(&self) -> Result<RecordSet, crate::Error>;

    /// Add one record
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: the server accepted the write
    /// - `Ok(false)`: the server rejected the write
    /// - `Err(Error)`: transport failure
    async fn add_record(&self, record: &DnsRecord) -> Result<bool, crate::Error>;

    /// Delete one record (same contract as [`add_record`](Self::add_record))
    async fn delete_record(&self, record: &DnsRecord) -> Result<bool, crate::Error>;

    /// Release local session resources
    ///
    /// A later `connect` must work whether or not this was called.
    async fn disconnect(&mut self) {}

    /// Configured server name (for logging/history)
    fn server_name(&self) -> &str;

    /// Adapter type tag (e.g., "pihole", "adguard")
    fn adapter_type(&self) -> &'static str;
}

/// Shared collaborators handed to every adapter at construction
#[derive(Clone)]
pub struct AdapterContext {
    /// Resolves secret auth fields
    pub credentials: Arc<dyn CredentialStore>,
    /// Process-wide session cache keyed by server base URL
    pub sessions: SessionCache,
}

impl AdapterContext {
    /// Create a context from a credential store and session cache
    pub fn new(credentials: Arc<dyn CredentialStore>, sessions: SessionCache) -> Self {
        Self {
            credentials,
            sessions,
        }
    }
}

/// Helper trait for constructing adapters from configuration
#[async_trait]
pub trait ServerAdapterFactory: Send + Sync {
    /// Create a ServerAdapter instance for one configured server
    ///
    /// Credentials are resolved here so a missing secret surfaces as a
    /// configuration error before any network I/O.
    async fn create(
        &self,
        config: &ServerConfig,
        ctx: &AdapterContext,
    ) -> Result<Box<dyn ServerAdapter>, crate::Error>;
}
