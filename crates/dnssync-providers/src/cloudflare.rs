// # Cloudflare Adapter
//
// Cloudflare API v4, bearer token auth, one zone per configured server.
// Set the server `url` to `https://api.cloudflare.com/client/v4`.
//
// Record listings are paginated; every page is read before a snapshot is
// returned. Deletes look the record id up by (type, name, content) first.
//
// ## API Reference
//
// - Verify token: `GET /user/tokens/verify`
// - List: `GET /zones/:zone_id/dns_records?per_page=..&page=..`
// - Create: `POST /zones/:zone_id/dns_records`
// - Delete: `DELETE /zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use dnssync_core::config::ServerConfig;
use dnssync_core::credentials::{require, resolve_auth};
use dnssync_core::retry::into_connection_error;
use dnssync_core::traits::{AdapterContext, ServerAdapter, ServerAdapterFactory};
use dnssync_core::{AdapterRegistry, DnsRecord, Error, RecordSet, Result};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::http::{HttpClient, accepted, form_encode};

/// Adapter type tag
pub const TYPE: &str = "cloudflare";

/// Records requested per listing page
const PAGE_SIZE: &str = "5000";

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    #[serde(default)]
    success: bool,
    result: Option<T>,
    #[serde(default)]
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    #[serde(default = "one")]
    total_pages: u32,
}

fn one() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct CloudflareRecord {
    id: String,
    #[serde(rename = "type")]
    record_type: String,
    name: String,
    content: String,
}

/// Cloudflare zone adapter
pub struct CloudflareAdapter {
    name: String,
    api_token: String,
    zone_id: String,
    http: HttpClient,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareAdapter")
            .field("name", &self.name)
            .field("api_token", &"<REDACTED>")
            .field("zone_id", &self.zone_id)
            .finish()
    }
}

impl CloudflareAdapter {
    /// Create an adapter
    ///
    /// # Parameters
    ///
    /// - `config`: Server configuration; `url` is the API base
    /// - `api_token`: Token with Zone:DNS:Edit permission
    /// - `zone_id`: Zone to manage
    pub fn new(
        config: &ServerConfig,
        api_token: impl Into<String>,
        zone_id: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            name: config.name.clone(),
            api_token: api_token.into(),
            zone_id: zone_id.into(),
            http: HttpClient::new(config, TYPE, None)?,
        })
    }

    fn records_url(&self, query: &[(&str, &str)]) -> String {
        let base = self
            .http
            .url(&format!("/zones/{}/dns_records", self.zone_id));
        if query.is_empty() {
            base
        } else {
            format!("{}?{}", base, form_encode(query))
        }
    }

    /// Id of the first record matching (type, name, content)
    async fn find_record_id(&self, record: &DnsRecord) -> Result<Option<String>> {
        let url = self.records_url(&[
            ("type", record.record_type.as_str()),
            ("name", record.domain.as_str()),
            ("content", record.value.as_str()),
        ]);
        let response = self
            .http
            .execute("find record", |c| c.get(&url).bearer_auth(&self.api_token))
            .await?;
        if !response.status().is_success() {
            return Ok(None);
        }
        let page: ApiResponse<Vec<CloudflareRecord>> =
            self.http.json("find record", response).await?;
        if !page.success {
            return Ok(None);
        }
        Ok(page
            .result
            .and_then(|records| records.into_iter().next())
            .map(|r| r.id))
    }

    /// Whether a write response reports success
    async fn write_succeeded(&self, what: &str, response: reqwest::Response) -> bool {
        let status = response.status();
        if !accepted(status, &[200]) {
            warn!("Cloudflare {} on {} failed (HTTP {})", what, self.name, status);
            return false;
        }
        match self
            .http
            .json::<ApiResponse<serde_json::Value>>(what, response)
            .await
        {
            Ok(body) => body.success,
            Err(e) => {
                warn!("Cloudflare {} on {}: {}", what, self.name, e);
                false
            }
        }
    }
}

#[async_trait]
impl ServerAdapter for CloudflareAdapter {
    async fn connect(&mut self) -> Result<()> {
        let url = self.http.url("/user/tokens/verify");
        let verify: ApiResponse<serde_json::Value> = self
            .http
            .fetch_json("verify token", |c| c.get(&url).bearer_auth(&self.api_token))
            .await
            .map_err(|e| into_connection_error(&self.name, e))?;
        if !verify.success {
            return Err(Error::auth(format!("{}: API token not active", self.name)));
        }
        debug!("Cloudflare token verified for {}", self.name);
        Ok(())
    }

    async fn get_records(&self) -> Result<RecordSet> {
        let mut records = RecordSet::new();
        let mut page = 1u32;

        loop {
            let page_str = page.to_string();
            let url = self.records_url(&[("per_page", PAGE_SIZE), ("page", page_str.as_str())]);
            let body: ApiResponse<Vec<CloudflareRecord>> = self
                .http
                .fetch_json("list records", |c| c.get(&url).bearer_auth(&self.api_token))
                .await?;

            if !body.success {
                return Err(Error::provider(
                    TYPE,
                    format!("{}: listing page {} unsuccessful", self.name, page),
                ));
            }

            for record in body.result.unwrap_or_default() {
                match record.record_type.as_str() {
                    "A" => {
                        records.insert(&DnsRecord::a(&record.content, &record.name));
                    }
                    "CNAME" => {
                        records.insert(&DnsRecord::cname(&record.name, &record.content));
                    }
                    _ => {}
                }
            }

            let total_pages = body.result_info.map(|i| i.total_pages).unwrap_or(1);
            if page >= total_pages {
                break;
            }
            page += 1;
        }

        Ok(records)
    }

    async fn add_record(&self, record: &DnsRecord) -> Result<bool> {
        let url = self.records_url(&[]);
        let payload = json!({
            "type": record.record_type.as_str(),
            "name": record.domain,
            "content": record.value,
            "ttl": record.ttl.unwrap_or(1),
            "proxied": false,
        });
        let response = self
            .http
            .execute("create record", |c| {
                c.post(&url).bearer_auth(&self.api_token).json(&payload)
            })
            .await?;
        Ok(self.write_succeeded("create record", response).await)
    }

    async fn delete_record(&self, record: &DnsRecord) -> Result<bool> {
        let Some(id) = self.find_record_id(record).await? else {
            debug!("Cloudflare record {} not found on {}", record, self.name);
            return Ok(false);
        };
        let url = self
            .http
            .url(&format!("/zones/{}/dns_records/{}", self.zone_id, id));
        let response = self
            .http
            .execute("delete record", |c| {
                c.delete(&url).bearer_auth(&self.api_token)
            })
            .await?;
        Ok(self.write_succeeded("delete record", response).await)
    }

    fn server_name(&self) -> &str {
        &self.name
    }

    fn adapter_type(&self) -> &'static str {
        TYPE
    }
}

/// Factory for Cloudflare adapters
pub struct CloudflareFactory;

#[async_trait]
impl ServerAdapterFactory for CloudflareFactory {
    async fn create(
        &self,
        config: &ServerConfig,
        ctx: &AdapterContext,
    ) -> Result<Box<dyn ServerAdapter>> {
        let auth = resolve_auth(config, ctx.credentials.as_ref()).await?;
        let api_token = require(&auth, config, "api_token")?;
        let zone_id = require(&auth, config, "zone_id")?;
        Ok(Box::new(CloudflareAdapter::new(config, api_token, zone_id)?))
    }
}

/// Register the Cloudflare adapter with a registry
pub fn register(registry: &AdapterRegistry) {
    registry.register_adapter(TYPE, Arc::new(CloudflareFactory));
}
