// # OPNsense Adapter
//
// Unbound host overrides on OPNsense, API key/secret as HTTP basic auth.
// Only A records are managed: CNAME writes are rejected (`Ok(false)`) and
// listings never contain CNAMEs.
//
// ## API Reference
//
// - Liveness: `GET /api/core/firmware/info`
// - List: `GET /api/unbound/settings/get`
// - Search: `GET /api/unbound/settings/searchHost`
// - Add: `POST /api/unbound/settings/addHost`
// - Delete: `POST /api/unbound/settings/delHost/:uuid`

use async_trait::async_trait;
use dnssync_core::config::ServerConfig;
use dnssync_core::credentials::{require, resolve_auth};
use dnssync_core::retry::into_connection_error;
use dnssync_core::traits::{AdapterContext, ServerAdapter, ServerAdapterFactory};
use dnssync_core::{AdapterRegistry, DnsRecord, RecordSet, RecordType, Result};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::http::{HttpClient, accepted};

/// Adapter type tag
pub const TYPE: &str = "opnsense";

#[derive(Debug, Default, Deserialize)]
struct SearchResult {
    #[serde(default)]
    rows: Vec<HostRow>,
}

#[derive(Debug, Deserialize)]
struct HostRow {
    uuid: Option<String>,
    #[serde(default)]
    hostname: String,
    #[serde(default)]
    domain: String,
}

/// OPNsense Unbound adapter
pub struct OpnsenseAdapter {
    name: String,
    api_key: String,
    api_secret: String,
    http: HttpClient,
}

impl std::fmt::Debug for OpnsenseAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpnsenseAdapter")
            .field("name", &self.name)
            .field("base_url", &self.http.base_url())
            .field("api_key", &"<REDACTED>")
            .field("api_secret", &"<REDACTED>")
            .finish()
    }
}

impl OpnsenseAdapter {
    /// Create an adapter
    pub fn new(
        config: &ServerConfig,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            name: config.name.clone(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            http: HttpClient::new(config, TYPE, None)?,
        })
    }

    fn get(&self, client: &reqwest::Client, url: &str) -> reqwest::RequestBuilder {
        client
            .get(url)
            .basic_auth(&self.api_key, Some(&self.api_secret))
    }

    fn post(&self, client: &reqwest::Client, url: &str) -> reqwest::RequestBuilder {
        client
            .post(url)
            .basic_auth(&self.api_key, Some(&self.api_secret))
    }

    /// Split `nas.home` into (`nas`, `home`)
    fn split_fqdn(domain: &str) -> (&str, &str) {
        domain.split_once('.').unwrap_or((domain, ""))
    }

    fn a_only(&self, what: &str, record: &DnsRecord) -> bool {
        if record.record_type == RecordType::A {
            return true;
        }
        debug!(
            "OPNsense {} of {} on {} skipped: only A records are supported",
            what, record, self.name
        );
        false
    }
}

/// Host overrides from a settings document
///
/// `hosts.host` is either a list or a map keyed by uuid, and may sit under
/// a top-level `unbound` object.
fn parse_hosts(settings: &Value) -> RecordSet {
    let root = settings.get("unbound").unwrap_or(settings);
    let hosts: Vec<&Value> = match root.pointer("/hosts/host") {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(Value::Object(items)) => items.values().collect(),
        _ => Vec::new(),
    };

    let mut records = RecordSet::new();
    for host in hosts {
        let field = |key: &str| host.get(key).and_then(Value::as_str).unwrap_or_default();
        let (hostname, domain) = (field("hostname"), field("domain"));
        let ip = host
            .pointer("/rr/a")
            .or_else(|| host.get("server"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        if hostname.is_empty() || domain.is_empty() || ip.is_empty() {
            continue;
        }
        records.insert(&DnsRecord::a(ip, format!("{}.{}", hostname, domain)));
    }
    records
}

#[async_trait]
impl ServerAdapter for OpnsenseAdapter {
    async fn connect(&mut self) -> Result<()> {
        let url = self.http.url("/api/core/firmware/info");
        self.http
            .fetch("firmware info", |c| self.get(c, &url))
            .await
            .map_err(|e| into_connection_error(&self.name, e))?;
        debug!("Connected to OPNsense {}", self.name);
        Ok(())
    }

    async fn get_records(&self) -> Result<RecordSet> {
        let url = self.http.url("/api/unbound/settings/get");
        let settings: Value = self
            .http
            .fetch_json("read settings", |c| self.get(c, &url))
            .await?;
        Ok(parse_hosts(&settings))
    }

    async fn add_record(&self, record: &DnsRecord) -> Result<bool> {
        if !self.a_only("add", record) {
            return Ok(false);
        }
        let (hostname, domain) = Self::split_fqdn(&record.domain);
        let payload = json!({
            "host": {
                "enabled": "1",
                "hostname": hostname,
                "domain": domain,
                "rr": { "a": record.value },
            }
        });
        let url = self.http.url("/api/unbound/settings/addHost");
        let response = self
            .http
            .execute("add host", |c| self.post(c, &url).json(&payload))
            .await?;

        let status = response.status();
        if !accepted(status, &[200]) {
            warn!("OPNsense add {} on {} rejected (HTTP {})", record, self.name, status);
        }
        Ok(accepted(status, &[200]))
    }

    async fn delete_record(&self, record: &DnsRecord) -> Result<bool> {
        if !self.a_only("delete", record) {
            return Ok(false);
        }
        let (hostname, domain) = Self::split_fqdn(&record.domain);

        let search_url = self.http.url("/api/unbound/settings/searchHost");
        let response = self
            .http
            .execute("search hosts", |c| self.get(c, &search_url))
            .await?;
        if !response.status().is_success() {
            return Ok(false);
        }
        let search: SearchResult = self.http.json("search hosts", response).await?;

        let uuid = search
            .rows
            .into_iter()
            .find(|row| row.hostname == hostname && row.domain == domain)
            .and_then(|row| row.uuid);
        let Some(uuid) = uuid else {
            debug!("OPNsense host {} not found on {}", record.domain, self.name);
            return Ok(false);
        };

        let del_url = self
            .http
            .url(&format!("/api/unbound/settings/delHost/{}", uuid));
        let response = self
            .http
            .execute("delete host", |c| self.post(c, &del_url))
            .await?;
        Ok(accepted(response.status(), &[200]))
    }

    fn server_name(&self) -> &str {
        &self.name
    }

    fn adapter_type(&self) -> &'static str {
        TYPE
    }
}

/// Factory for OPNsense adapters
pub struct OpnsenseFactory;

#[async_trait]
impl ServerAdapterFactory for OpnsenseFactory {
    async fn create(
        &self,
        config: &ServerConfig,
        ctx: &AdapterContext,
    ) -> Result<Box<dyn ServerAdapter>> {
        let auth = resolve_auth(config, ctx.credentials.as_ref()).await?;
        let api_key = require(&auth, config, "api_key")?;
        let api_secret = require(&auth, config, "api_secret")?;
        Ok(Box::new(OpnsenseAdapter::new(config, api_key, api_secret)?))
    }
}

/// Register the OPNsense adapter with a registry
pub fn register(registry: &AdapterRegistry) {
    registry.register_adapter(TYPE, Arc::new(OpnsenseFactory));
}
