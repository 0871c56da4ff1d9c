// # Pi-hole Adapter
//
// Pi-hole v6 REST API. Local DNS records live in the FTL config:
//
// - A records: `config.dns.hosts`, entries of the form `"<ip> <host> [<host>...]"`
// - CNAME records: `config.dns.cnameRecords`, entries of the form `"<name>,<target>[,<ttl>]"`
//
// ## Sessions
//
// Pi-hole caps concurrent API sessions, so logins are expensive. The session
// id is kept in the shared [`SessionCache`] keyed by base URL and reused
// across cycles after a cheap validity check. After a fresh login, stale
// sessions created by this tool (recognized by a fixed User-Agent) are
// deleted on a best-effort basis.
//
// ## Multi-name host lines
//
// A hosts line may carry several names (`"5.6.7.8 a.home b.home"`) and
// Pi-hole only addresses it as a whole. Each name is reported as its own A
// record; removing one name deletes the line and writes it back without
// that name.
//
// ## API Reference
//
// - Login / session check: `POST` / `GET /api/auth`
// - Sessions: `GET /api/auth/sessions`, `DELETE /api/auth/sessions/:id`
// - Read config: `GET /api/config`
// - Add / delete: `PUT` / `DELETE /api/config/dns/hosts/:entry`,
//   `PUT` / `DELETE /api/config/dns/cnameRecords/:entry`

use async_trait::async_trait;
use dnssync_core::config::ServerConfig;
use dnssync_core::credentials::{require, resolve_auth};
use dnssync_core::retry::into_connection_error;
use dnssync_core::traits::{AdapterContext, ServerAdapter, ServerAdapterFactory};
use dnssync_core::{
    AdapterRegistry, DnsRecord, Error, RecordSet, RecordType, Result, Session, SessionCache,
};
use reqwest::RequestBuilder;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

use crate::http::{HttpClient, accepted, snippet};

/// Adapter type tag
pub const TYPE: &str = "pihole";

/// User-Agent identifying sessions opened by this tool
pub const USER_AGENT: &str = "dns-rewrites-sync";

const SID_HEADER: &str = "X-FTL-SID";
const CSRF_HEADER: &str = "X-CSRF-TOKEN";

#[derive(Debug, Deserialize)]
struct AuthResponse {
    #[serde(default)]
    session: AuthSession,
}

#[derive(Debug, Default, Deserialize)]
struct AuthSession {
    #[serde(default)]
    valid: bool,
    sid: Option<String>,
    csrf: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionList {
    #[serde(default)]
    sessions: Vec<SessionEntry>,
}

#[derive(Debug, Deserialize)]
struct SessionEntry {
    id: u64,
    #[serde(default)]
    current_session: bool,
    #[serde(default)]
    sid: Option<String>,
    #[serde(default)]
    user_agent: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigResponse {
    #[serde(default)]
    config: FtlConfig,
}

#[derive(Debug, Default, Deserialize)]
struct FtlConfig {
    #[serde(default)]
    dns: DnsSection,
}

#[derive(Debug, Default, Deserialize)]
struct DnsSection {
    #[serde(default)]
    hosts: Vec<String>,
    #[serde(default, rename = "cnameRecords")]
    cname_records: Vec<String>,
}

/// Pi-hole v6 adapter
pub struct PiHoleAdapter {
    name: String,
    password: String,
    http: HttpClient,
    sessions: SessionCache,
    session: Option<Session>,
    /// Canonical A record -> the multi-name hosts line it was read from
    shared_lines: Mutex<HashMap<String, String>>,
}

impl std::fmt::Debug for PiHoleAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PiHoleAdapter")
            .field("name", &self.name)
            .field("base_url", &self.http.base_url())
            .field("password", &"<REDACTED>")
            .field("connected", &self.session.is_some())
            .finish()
    }
}

impl PiHoleAdapter {
    /// Create an adapter
    ///
    /// # Parameters
    ///
    /// - `config`: Server configuration
    /// - `password`: Resolved web/API password
    /// - `sessions`: Shared session cache
    pub fn new(
        config: &ServerConfig,
        password: impl Into<String>,
        sessions: SessionCache,
    ) -> Result<Self> {
        Ok(Self {
            name: config.name.clone(),
            password: password.into(),
            http: HttpClient::new(config, TYPE, Some(USER_AGENT))?,
            sessions,
            session: None,
            shared_lines: Mutex::new(HashMap::new()),
        })
    }

    fn session(&self) -> Result<&Session> {
        self.session
            .as_ref()
            .ok_or_else(|| Error::connection(format!("{}: not connected", self.name)))
    }

    /// Whether a cached session is still accepted by the server
    async fn session_valid(&self, session: &Session) -> bool {
        let url = self.http.url("/api/auth");
        let response = match self
            .http
            .execute_once(|c| c.get(&url).header(SID_HEADER, &session.token))
            .await
        {
            Ok(response) if response.status().is_success() => response,
            _ => return false,
        };
        self.http
            .json::<AuthResponse>("session check", response)
            .await
            .map(|r| r.session.valid)
            .unwrap_or(false)
    }

    async fn login(&self) -> Result<Session> {
        let url = self.http.url("/api/auth");
        let body = json!({ "password": self.password });
        let response = self
            .http
            .fetch("login", |c| c.post(&url).json(&body))
            .await?;
        let auth: AuthResponse = self.http.json("login", response).await?;

        match auth.session.sid {
            Some(sid) if auth.session.valid => Ok(Session::new(sid, auth.session.csrf)),
            _ => Err(Error::auth(format!("{}: password rejected", self.name))),
        }
    }

    /// Delete stale sessions opened by this tool; failures are only logged
    async fn cleanup_orphaned_sessions(&self, current: &Session) {
        let url = self.http.url("/api/auth/sessions");
        let listing = self
            .http
            .fetch_json::<SessionList, _>("list sessions", |c| {
                with_session(c.get(&url), current)
            })
            .await;

        let sessions = match listing {
            Ok(list) => list.sessions,
            Err(e) => {
                debug!("Session cleanup skipped for {}: {}", self.name, e);
                return;
            }
        };

        for entry in sessions {
            let ours = entry.user_agent.as_deref() == Some(USER_AGENT);
            let is_current =
                entry.current_session || entry.sid.as_deref() == Some(current.token.as_str());
            if !ours || is_current {
                continue;
            }
            let del_url = self.http.url(&format!("/api/auth/sessions/{}", entry.id));
            match self
                .http
                .execute_once(|c| with_session(c.delete(&del_url), current))
                .await
            {
                Ok(_) => debug!("Removed orphaned session {} on {}", entry.id, self.name),
                Err(e) => debug!("Could not remove session {} on {}: {}", entry.id, self.name, e),
            }
        }
    }

    fn entry_path(record: &DnsRecord) -> String {
        match record.record_type {
            RecordType::A => host_line_path(&format!("{} {}", record.value, record.domain)),
            RecordType::Cname => format!(
                "/api/config/dns/cnameRecords/{},{}",
                record.domain, record.value
            ),
        }
    }

    fn shared_line(&self, record: &DnsRecord) -> Option<String> {
        if record.record_type != RecordType::A {
            return None;
        }
        self.shared_lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&record.canonical())
            .cloned()
    }

    async fn put_entry(&self, what: &str, path: &str, session: &Session) -> Result<bool> {
        let url = self.http.url(path);
        let response = self
            .http
            .execute(what, |c| with_session(c.put(&url), session))
            .await?;

        let status = response.status();
        if accepted(status, &[200, 201, 204]) {
            return Ok(true);
        }
        let body = response.text().await.unwrap_or_default();
        warn!(
            "Pi-hole {} {} on {} rejected (HTTP {}): {}",
            what,
            path,
            self.name,
            status,
            snippet(&body)
        );
        Ok(false)
    }

    async fn delete_entry(&self, what: &str, path: &str, session: &Session) -> Result<bool> {
        let url = self.http.url(path);
        let response = self
            .http
            .execute(what, |c| with_session(c.delete(&url), session))
            .await?;

        let status = response.status();
        if accepted(status, &[200, 204]) {
            return Ok(true);
        }
        let body = response.text().await.unwrap_or_default();
        warn!(
            "Pi-hole {} {} on {} rejected (HTTP {}): {}",
            what,
            path,
            self.name,
            status,
            snippet(&body)
        );
        Ok(false)
    }

    /// Remove one name from a multi-name hosts line
    async fn remove_from_line(
        &self,
        record: &DnsRecord,
        line: &str,
        session: &Session,
    ) -> Result<bool> {
        if !self.delete_entry("delete host line", &host_line_path(line), session).await? {
            return Ok(false);
        }

        let mut fields = line.split_whitespace();
        let ip = fields.next().unwrap_or_default();
        let remaining: Vec<&str> = fields
            .filter(|name| name.trim_end_matches('.') != record.domain)
            .collect();

        let rewritten = (!remaining.is_empty()).then(|| format!("{} {}", ip, remaining.join(" ")));
        {
            let mut lines = self
                .shared_lines
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            lines.remove(&record.canonical());
            for name in &remaining {
                let key = DnsRecord::a(ip, *name).canonical();
                match &rewritten {
                    Some(new_line) if remaining.len() > 1 => {
                        lines.insert(key, new_line.clone());
                    }
                    _ => {
                        lines.remove(&key);
                    }
                }
            }
        }

        if let Some(new_line) = rewritten {
            // The target name is already gone; lost siblings are re-added
            // by the next cycle.
            match self
                .put_entry("rewrite host line", &host_line_path(&new_line), session)
                .await
            {
                Ok(true) => debug!("Rewrote Pi-hole hosts line as {:?} on {}", new_line, self.name),
                Ok(false) => warn!("Could not rewrite hosts line {:?} on {}", new_line, self.name),
                Err(e) => warn!(
                    "Could not rewrite hosts line {:?} on {}: {}",
                    new_line, self.name, e
                ),
            }
        }
        Ok(true)
    }
}

fn host_line_path(line: &str) -> String {
    format!("/api/config/dns/hosts/{}", urlencoding::encode(line))
}

fn with_session(request: RequestBuilder, session: &Session) -> RequestBuilder {
    let request = request.header(SID_HEADER, &session.token);
    match &session.csrf {
        Some(csrf) => request.header(CSRF_HEADER, csrf),
        None => request,
    }
}

/// Parse the FTL `dns` config section into a record set
///
/// # Returns
///
/// The records, plus the source line of every A record that shares its
/// hosts line with other names
fn parse_dns_section(section: &DnsSection) -> (RecordSet, HashMap<String, String>) {
    let mut records = RecordSet::new();
    let mut shared = HashMap::new();

    for host in &section.hosts {
        let mut fields = host.split_whitespace();
        let Some(ip) = fields.next() else { continue };
        let names: Vec<&str> = fields.collect();
        for name in &names {
            let record = DnsRecord::a(ip, *name);
            if names.len() > 1 {
                shared.insert(record.canonical(), host.clone());
            }
            records.insert(&record);
        }
    }

    for entry in &section.cname_records {
        let mut fields = entry.split(',').map(str::trim);
        match (fields.next(), fields.next()) {
            (Some(domain), Some(target)) if !domain.is_empty() && !target.is_empty() => {
                records.insert(&DnsRecord::cname(domain, target));
            }
            _ => debug!("Ignoring malformed CNAME entry {:?}", entry),
        }
    }

    (records, shared)
}

#[async_trait]
impl ServerAdapter for PiHoleAdapter {
    async fn connect(&mut self) -> Result<()> {
        let base_url = self.http.base_url().to_string();
        let mut slot = self.sessions.lock(&base_url).await;

        if let Some(cached) = slot.current().cloned() {
            if self.session_valid(&cached).await {
                debug!("Reusing cached Pi-hole session for {}", self.name);
                self.session = Some(cached);
                return Ok(());
            }
            debug!("Cached Pi-hole session for {} expired", self.name);
            slot.invalidate();
        }

        let session = self
            .login()
            .await
            .map_err(|e| into_connection_error(&self.name, e))?;
        info!("Authenticated to Pi-hole {}", self.name);
        slot.store(session.clone());
        drop(slot);

        self.cleanup_orphaned_sessions(&session).await;
        self.session = Some(session);
        Ok(())
    }

    async fn get_records(&self) -> Result<RecordSet> {
        let session = self.session()?;
        let url = self.http.url("/api/config");
        let config: ConfigResponse = self
            .http
            .fetch_json("read config", |c| with_session(c.get(&url), session))
            .await?;
        let (records, shared) = parse_dns_section(&config.config.dns);
        *self
            .shared_lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = shared;
        Ok(records)
    }

    async fn add_record(&self, record: &DnsRecord) -> Result<bool> {
        let session = self.session()?;
        self.put_entry("add", &Self::entry_path(record), session)
            .await
    }

    async fn delete_record(&self, record: &DnsRecord) -> Result<bool> {
        let session = self.session()?;
        match self.shared_line(record) {
            Some(line) => self.remove_from_line(record, &line, session).await,
            None => {
                self.delete_entry("delete", &Self::entry_path(record), session)
                    .await
            }
        }
    }

    async fn disconnect(&mut self) {
        // The cached session stays valid for the next cycle.
        self.session = None;
    }

    fn server_name(&self) -> &str {
        &self.name
    }

    fn adapter_type(&self) -> &'static str {
        TYPE
    }
}

/// Factory for Pi-hole adapters
pub struct PiHoleFactory;

#[async_trait]
impl ServerAdapterFactory for PiHoleFactory {
    async fn create(
        &self,
        config: &ServerConfig,
        ctx: &AdapterContext,
    ) -> Result<Box<dyn ServerAdapter>> {
        let auth = resolve_auth(config, ctx.credentials.as_ref()).await?;
        let password = require(&auth, config, "password")?;
        Ok(Box::new(PiHoleAdapter::new(
            config,
            password,
            ctx.sessions.clone(),
        )?))
    }
}

/// Register the Pi-hole adapter with a registry
pub fn register(registry: &AdapterRegistry) {
    registry.register_adapter(TYPE, Arc::new(PiHoleFactory));
}
