// # Credential Store Trait
//
// Resolves secret auth fields for adapters.
//
// ## Implementations
//
// - Environment: `DNS_SYNC_{SERVER}_{FIELD}` variables (read-only)
// - In-memory: provisioning and tests
//
// The core only ever reads; `set_credential`/`remove_credential` exist for
// provisioning tools.

use async_trait::async_trait;

/// Trait for secret storage backends
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up a secret
    ///
    /// # Parameters
    ///
    /// - `server_name`: Configured server name
    /// - `field`: Auth field name (e.g., "password", "api_token")
    ///
    /// # Returns
    ///
    /// - `Ok(Some(String))`: The stored secret
    /// - `Ok(None)`: Nothing stored for this server/field
    /// - `Err(Error)`: Backend failure
    async fn get_credential(
        &self,
        server_name: &str,
        field: &str,
    ) -> Result<Option<String>, crate::Error>;

    /// Store a secret
    async fn set_credential(
        &self,
        server_name: &str,
        field: &str,
        value: &str,
    ) -> Result<(), crate::Error>;

    /// Remove a secret
    ///
    /// # Returns
    ///
    /// `true` if something was removed
    async fn remove_credential(&self, server_name: &str, field: &str)
    -> Result<bool, crate::Error>;
}
