//! Credential store implementations and auth-field resolution
//!
//! - [`EnvCredentialStore`]: reads `DNS_SYNC_{SERVER}_{FIELD}` (read-only)
//! - [`MemoryCredentialStore`]: mutable, for provisioning and tests
//! - [`resolve_auth`]: turns a server's configured auth map into literal
//!   values before an adapter is built

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::traits::CredentialStore;

/// Prefix marking an auth value as a pure store reference
pub const REFERENCE_PREFIX: &str = "encrypted:";

/// Resolve every auth field of a server
///
/// - `encrypted:<field>` is a reference: the secret is looked up under
///   `<field>` and the entry is omitted when the store has nothing.
/// - Any other value is looked up in the store first and falls back to the
///   literal configured value.
pub async fn resolve_auth(
    server: &ServerConfig,
    store: &dyn CredentialStore,
) -> Result<BTreeMap<String, String>> {
    let mut resolved = BTreeMap::new();

    for (field, value) in &server.auth {
        if let Some(reference) = value.strip_prefix(REFERENCE_PREFIX) {
            match store.get_credential(&server.name, reference).await? {
                Some(secret) => {
                    resolved.insert(reference.to_string(), secret);
                }
                None => debug!(
                    "No stored credential '{}' for server {}",
                    reference, server.name
                ),
            }
        } else {
            let secret = store.get_credential(&server.name, field).await?;
            resolved.insert(field.clone(), secret.unwrap_or_else(|| value.clone()));
        }
    }

    Ok(resolved)
}

/// Fetch a required field from a resolved auth map
pub fn require<'a>(
    auth: &'a BTreeMap<String, String>,
    server: &ServerConfig,
    field: &str,
) -> Result<&'a str> {
    auth.get(field)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            Error::config(format!(
                "Server '{}' ({}) is missing auth field '{}'",
                server.name, server.server_type, field
            ))
        })
}

type Lookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Read-only credential store backed by environment variables
#[derive(Clone)]
pub struct EnvCredentialStore {
    prefix: String,
    lookup: Lookup,
}

impl EnvCredentialStore {
    /// Read from the process environment with the `DNS_SYNC` prefix
    pub fn from_env() -> Self {
        Self::with_lookup("DNS_SYNC", |key| std::env::var(key).ok())
    }

    /// Read through a custom lookup function
    pub fn with_lookup(
        prefix: impl Into<String>,
        lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            lookup: Arc::new(lookup),
        }
    }

    /// Variable name holding one server field
    pub fn var_name(&self, server_name: &str, field: &str) -> String {
        format!(
            "{}_{}_{}",
            self.prefix,
            env_segment(server_name),
            env_segment(field)
        )
    }
}

fn env_segment(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

impl fmt::Debug for EnvCredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvCredentialStore")
            .field("prefix", &self.prefix)
            .finish()
    }
}

#[async_trait]
impl CredentialStore for EnvCredentialStore {
    async fn get_credential(&self, server_name: &str, field: &str) -> Result<Option<String>> {
        let key = self.var_name(server_name, field);
        Ok((self.lookup)(&key).filter(|v| !v.is_empty()))
    }

    async fn set_credential(&self, server_name: &str, field: &str, _value: &str) -> Result<()> {
        Err(Error::config(format!(
            "Environment credentials are read-only; set {} instead",
            self.var_name(server_name, field)
        )))
    }

    async fn remove_credential(&self, server_name: &str, field: &str) -> Result<bool> {
        Err(Error::config(format!(
            "Environment credentials are read-only; unset {} instead",
            self.var_name(server_name, field)
        )))
    }
}

/// In-memory credential store
#[derive(Clone, Default)]
pub struct MemoryCredentialStore {
    secrets: Arc<RwLock<HashMap<(String, String), String>>>,
}

impl MemoryCredentialStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl fmt::Debug for MemoryCredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCredentialStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get_credential(&self, server_name: &str, field: &str) -> Result<Option<String>> {
        let secrets = self.secrets.read().await;
        Ok(secrets
            .get(&(server_name.to_string(), field.to_string()))
            .cloned())
    }

    async fn set_credential(&self, server_name: &str, field: &str, value: &str) -> Result<()> {
        let mut secrets = self.secrets.write().await;
        secrets.insert(
            (server_name.to_string(), field.to_string()),
            value.to_string(),
        );
        Ok(())
    }

    async fn remove_credential(&self, server_name: &str, field: &str) -> Result<bool> {
        let mut secrets = self.secrets.write().await;
        Ok(secrets
            .remove(&(server_name.to_string(), field.to_string()))
            .is_some())
    }
}
