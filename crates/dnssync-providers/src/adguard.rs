// # AdGuard Home Adapter
//
// DNS rewrites via the AdGuard Home control API, HTTP basic auth on every
// request. A rewrite whose answer parses as an IP address is an A record;
// any other answer is a CNAME target.
//
// ## API Reference
//
// - Status: `GET /control/status`
// - List: `GET /control/rewrite/list` → `[{"domain": .., "answer": ..}]`
// - Add / delete: `POST /control/rewrite/add`, `POST /control/rewrite/delete`

use async_trait::async_trait;
use dnssync_core::config::ServerConfig;
use dnssync_core::credentials::{require, resolve_auth};
use dnssync_core::retry::into_connection_error;
use dnssync_core::traits::{AdapterContext, ServerAdapter, ServerAdapterFactory};
use dnssync_core::{AdapterRegistry, DnsRecord, Error, RecordSet, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::http::{HttpClient, accepted, snippet};

/// Adapter type tag
pub const TYPE: &str = "adguard";

#[derive(Debug, Serialize, Deserialize)]
struct Rewrite {
    domain: String,
    answer: String,
}

/// AdGuard Home adapter
pub struct AdGuardAdapter {
    name: String,
    username: String,
    password: String,
    http: HttpClient,
}

impl std::fmt::Debug for AdGuardAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdGuardAdapter")
            .field("name", &self.name)
            .field("base_url", &self.http.base_url())
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .finish()
    }
}

impl AdGuardAdapter {
    /// Create an adapter
    pub fn new(
        config: &ServerConfig,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            name: config.name.clone(),
            username: username.into(),
            password: password.into(),
            http: HttpClient::new(config, TYPE, None)?,
        })
    }

    async fn post_rewrite(&self, what: &str, path: &str, record: &DnsRecord) -> Result<bool> {
        let url = self.http.url(path);
        let body = Rewrite {
            domain: record.domain.clone(),
            answer: record.value.clone(),
        };
        let response = self
            .http
            .execute(what, |c| {
                c.post(&url)
                    .basic_auth(&self.username, Some(&self.password))
                    .json(&body)
            })
            .await?;

        let status = response.status();
        if accepted(status, &[200]) {
            return Ok(true);
        }
        let text = response.text().await.unwrap_or_default();
        warn!(
            "AdGuard {} {} on {} rejected (HTTP {}): {}",
            what,
            record,
            self.name,
            status,
            snippet(&text)
        );
        Ok(false)
    }
}

#[async_trait]
impl ServerAdapter for AdGuardAdapter {
    async fn connect(&mut self) -> Result<()> {
        let url = self.http.url("/control/status");
        self.http
            .fetch("status", |c| {
                c.get(&url).basic_auth(&self.username, Some(&self.password))
            })
            .await
            .map_err(|e| into_connection_error(&self.name, e))?;
        debug!("Connected to AdGuard Home {}", self.name);
        Ok(())
    }

    async fn get_records(&self) -> Result<RecordSet> {
        let url = self.http.url("/control/rewrite/list");
        let rewrites: Vec<Rewrite> = self
            .http
            .fetch_json("list rewrites", |c| {
                c.get(&url).basic_auth(&self.username, Some(&self.password))
            })
            .await?;

        let mut records = RecordSet::new();
        for rewrite in rewrites {
            let answer = rewrite.answer.trim_end_matches('.');
            let record = if answer.parse::<IpAddr>().is_ok() {
                DnsRecord::a(answer, &rewrite.domain)
            } else {
                DnsRecord::cname(&rewrite.domain, answer)
            };
            if record.domain.is_empty() || record.value.is_empty() {
                debug!("Ignoring empty rewrite on {}", self.name);
                continue;
            }
            records.insert(&record);
        }
        Ok(records)
    }

    async fn add_record(&self, record: &DnsRecord) -> Result<bool> {
        self.post_rewrite("add", "/control/rewrite/add", record)
            .await
    }

    async fn delete_record(&self, record: &DnsRecord) -> Result<bool> {
        self.post_rewrite("delete", "/control/rewrite/delete", record)
            .await
    }

    fn server_name(&self) -> &str {
        &self.name
    }

    fn adapter_type(&self) -> &'static str {
        TYPE
    }
}

/// Factory for AdGuard Home adapters
pub struct AdGuardFactory;

#[async_trait]
impl ServerAdapterFactory for AdGuardFactory {
    async fn create(
        &self,
        config: &ServerConfig,
        ctx: &AdapterContext,
    ) -> Result<Box<dyn ServerAdapter>> {
        let auth = resolve_auth(config, ctx.credentials.as_ref()).await?;
        let username = require(&auth, config, "username")?;
        let password = require(&auth, config, "password")?;
        Ok(Box::new(AdGuardAdapter::new(config, username, password)?))
    }
}

/// Register the AdGuard Home adapter with a registry
pub fn register(registry: &AdapterRegistry) {
    registry.register_adapter(TYPE, Arc::new(AdGuardFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use dnssync_core::RecordType;
    use serde_json::json;
    use wiremock::matchers::{basic_auth, body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(server: &MockServer) -> AdGuardAdapter {
        let config = ServerConfig::new("adguard", TYPE, server.uri()).with_retries(0);
        AdGuardAdapter::new(&config, "admin", "hunter2").unwrap()
    }

    #[tokio::test]
    async fn rewrites_are_split_by_answer_kind() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/control/rewrite/list"))
            .and(basic_auth("admin", "hunter2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "domain": "nas.home", "answer": "1.2.3.4" },
                { "domain": "v6.home", "answer": "fd00::1" },
                { "domain": "www.home.", "answer": "nas.home." }
            ])))
            .mount(&server)
            .await;

        let records = adapter(&server).get_records().await.unwrap();

        assert!(records.contains(RecordType::A, "1.2.3.4 nas.home"));
        assert!(records.contains(RecordType::A, "fd00::1 v6.home"));
        assert!(records.contains(RecordType::Cname, "www.home -> nas.home"));
    }

    #[tokio::test]
    async fn add_posts_domain_and_answer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/control/rewrite/add"))
            .and(body_json(json!({ "domain": "www.home", "answer": "nas.home" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let ok = adapter(&server)
            .add_record(&DnsRecord::cname("www.home", "nas.home"))
            .await
            .unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn rejected_delete_returns_false() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/control/rewrite/delete"))
            .respond_with(ResponseTemplate::new(400).set_body_string("rewrite not found"))
            .mount(&server)
            .await;

        let ok = adapter(&server)
            .delete_record(&DnsRecord::a("1.2.3.4", "nas.home"))
            .await
            .unwrap();
        assert!(!ok);
    }

    #[tokio::test]
    async fn bad_credentials_fail_connect() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/control/status"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = adapter(&server).connect().await.unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_connection_error() {
        let config = ServerConfig::new("adguard", TYPE, "http://127.0.0.1:9").with_retries(0);
        let mut adapter = AdGuardAdapter::new(&config, "admin", "hunter2").unwrap();
        let err = adapter.connect().await.unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
    }
}
