// # Technitium DNS Adapter
//
// Technitium organizes records by zone and authenticates with an API token
// passed as a query parameter. A record's zone is taken to be its domain
// minus the first label (`nas.home` → `home.`).
//
// ## API Reference
//
// - Liveness: `GET /api/stats?token=..`
// - Zones: `GET /api/zones/list?token=..`
// - Records: `GET /api/zone/records?token=..&zone=..`
// - Add / delete: `POST /api/zone/record/add`, `POST /api/zone/record/delete`
//   (form body: `zone`, `domain`, `type`, `ipAddress` | `cname`)

use async_trait::async_trait;
use dnssync_core::config::ServerConfig;
use dnssync_core::credentials::{require, resolve_auth};
use dnssync_core::retry::into_connection_error;
use dnssync_core::traits::{AdapterContext, ServerAdapter, ServerAdapterFactory};
use dnssync_core::{AdapterRegistry, DnsRecord, Error, RecordSet, RecordType, Result};
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::http::{HttpClient, accepted, form_encode};

/// Adapter type tag
pub const TYPE: &str = "technitium";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    status: Option<String>,
    #[serde(default, rename = "errorMessage")]
    error_message: Option<String>,
    response: Option<T>,
}

#[derive(Debug, Default, Deserialize)]
struct ZoneList {
    #[serde(default)]
    zones: Vec<Zone>,
}

#[derive(Debug, Deserialize)]
struct Zone {
    #[serde(alias = "zoneName")]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct ZoneRecords {
    #[serde(default)]
    records: Vec<ZoneRecord>,
}

#[derive(Debug, Deserialize)]
struct ZoneRecord {
    name: String,
    #[serde(rename = "type")]
    record_type: String,
    #[serde(rename = "rData", default)]
    rdata: RData,
}

#[derive(Debug, Default, Deserialize)]
struct RData {
    #[serde(rename = "ipAddress")]
    ip_address: Option<String>,
    cname: Option<String>,
}

/// Technitium DNS Server adapter
pub struct TechnitiumAdapter {
    name: String,
    token: String,
    http: HttpClient,
}

impl std::fmt::Debug for TechnitiumAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TechnitiumAdapter")
            .field("name", &self.name)
            .field("base_url", &self.http.base_url())
            .field("token", &"<REDACTED>")
            .finish()
    }
}

impl TechnitiumAdapter {
    /// Create an adapter
    pub fn new(config: &ServerConfig, token: impl Into<String>) -> Result<Self> {
        Ok(Self {
            name: config.name.clone(),
            token: token.into(),
            http: HttpClient::new(config, TYPE, None)?,
        })
    }

    /// Zone a domain is written to
    pub fn zone_for(domain: &str) -> String {
        match domain.split_once('.') {
            Some((_, parent)) if !parent.is_empty() => format!("{}.", parent),
            _ => format!("{}.", domain),
        }
    }

    fn api_url(&self, path: &str, params: &[(&str, &str)]) -> String {
        let mut pairs = vec![("token", self.token.as_str())];
        pairs.extend_from_slice(params);
        format!("{}?{}", self.http.url(path), form_encode(&pairs))
    }

    async fn get_api<T>(&self, what: &str, path: &str, params: &[(&str, &str)]) -> Result<T>
    where
        T: for<'de> Deserialize<'de> + Default,
    {
        let url = self.api_url(path, params);
        let envelope: Envelope<T> = self.http.fetch_json(what, |c| c.get(&url)).await?;
        match envelope.status.as_deref() {
            Some("invalid-token") => Err(Error::auth(format!(
                "{}: API token rejected",
                self.name
            ))),
            Some("error") => Err(Error::provider(
                TYPE,
                format!(
                    "{}: {}",
                    what,
                    envelope.error_message.unwrap_or_default()
                ),
            )),
            _ => Ok(envelope.response.unwrap_or_default()),
        }
    }

    async fn post_record(&self, what: &str, path: &str, record: &DnsRecord) -> Result<bool> {
        let zone = Self::zone_for(&record.domain);
        let value_field = match record.record_type {
            RecordType::A => "ipAddress",
            RecordType::Cname => "cname",
        };
        let body = form_encode(&[
            ("zone", zone.as_str()),
            ("domain", record.domain.as_str()),
            ("type", record.record_type.as_str()),
            (value_field, record.value.as_str()),
        ]);
        let url = self.api_url(path, &[]);

        let response = self
            .http
            .execute(what, |c| {
                c.post(&url)
                    .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(body.clone())
            })
            .await?;

        let status = response.status();
        if !accepted(status, &[200]) {
            warn!(
                "Technitium {} {} on {} rejected (HTTP {})",
                what, record, self.name, status
            );
            return Ok(false);
        }

        // Technitium reports API-level failures with HTTP 200.
        let envelope: Envelope<serde_json::Value> = self.http.json(what, response).await?;
        match envelope.status.as_deref() {
            Some("ok") | None => Ok(true),
            Some(other) => {
                warn!(
                    "Technitium {} {} on {} rejected ({}): {}",
                    what,
                    record,
                    self.name,
                    other,
                    envelope.error_message.unwrap_or_default()
                );
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl ServerAdapter for TechnitiumAdapter {
    async fn connect(&mut self) -> Result<()> {
        self.get_api::<serde_json::Value>("stats", "/api/stats", &[])
            .await
            .map_err(|e| into_connection_error(&self.name, e))?;
        debug!("Connected to Technitium {}", self.name);
        Ok(())
    }

    async fn get_records(&self) -> Result<RecordSet> {
        let zones: ZoneList = self.get_api("list zones", "/api/zones/list", &[]).await?;
        let mut records = RecordSet::new();

        for zone in zones.zones {
            let listing: ZoneRecords = self
                .get_api(
                    "list records",
                    "/api/zone/records",
                    &[("zone", zone.name.as_str())],
                )
                .await?;

            for record in listing.records {
                match (record.record_type.as_str(), record.rdata) {
                    ("A", RData { ip_address: Some(ip), .. }) => {
                        records.insert(&DnsRecord::a(ip, &record.name));
                    }
                    ("CNAME", RData { cname: Some(target), .. }) => {
                        records.insert(&DnsRecord::cname(&record.name, target));
                    }
                    _ => {}
                }
            }
        }

        Ok(records)
    }

    async fn add_record(&self, record: &DnsRecord) -> Result<bool> {
        self.post_record("add", "/api/zone/record/add", record).await
    }

    async fn delete_record(&self, record: &DnsRecord) -> Result<bool> {
        self.post_record("delete", "/api/zone/record/delete", record)
            .await
    }

    fn server_name(&self) -> &str {
        &self.name
    }

    fn adapter_type(&self) -> &'static str {
        TYPE
    }
}

/// Factory for Technitium adapters
pub struct TechnitiumFactory;

#[async_trait]
impl ServerAdapterFactory for TechnitiumFactory {
    async fn create(
        &self,
        config: &ServerConfig,
        ctx: &AdapterContext,
    ) -> Result<Box<dyn ServerAdapter>> {
        let auth = resolve_auth(config, ctx.credentials.as_ref()).await?;
        let token = require(&auth, config, "api_token")?;
        Ok(Box::new(TechnitiumAdapter::new(config, token)?))
    }
}

/// Register the Technitium adapter with a registry
pub fn register(registry: &AdapterRegistry) {
    registry.register_adapter(TYPE, Arc::new(TechnitiumFactory));
}
