//! Shared HTTP transport for vendor adapters
//!
//! Every request carries the server's configured timeout. Transport
//! failures, `429` and `5xx` responses are retried with the server's
//! [`RetryPolicy`]; `401`/`403` fail immediately as authentication errors.
//! Any other status is handed back to the adapter, which decides whether it
//! means "rejected" or "broken".

use dnssync_core::config::ServerConfig;
use dnssync_core::{Error, Result, RetryPolicy};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

/// HTTP client bound to one configured server
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    retry: RetryPolicy,
    provider: &'static str,
    base_url: String,
}

impl HttpClient {
    /// Create a client for `config`
    ///
    /// # Parameters
    ///
    /// - `config`: Server configuration (timeout, retries, base URL)
    /// - `provider`: Adapter type tag used in error messages
    /// - `user_agent`: Optional fixed User-Agent header
    pub fn new(
        config: &ServerConfig,
        provider: &'static str,
        user_agent: Option<&str>,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(config.timeout());
        if let Some(agent) = user_agent {
            builder = builder.user_agent(agent);
        }
        let client = builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            retry: RetryPolicy::for_server(config),
            provider,
            base_url: config.base_url().to_string(),
        })
    }

    /// Replace the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Server base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an API path
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request with bounded retry
    ///
    /// # Parameters
    ///
    /// - `what`: Label for log lines and error messages
    /// - `build`: Builds a fresh request per attempt
    ///
    /// # Returns
    ///
    /// - `Ok(Response)`: Any status other than 401/403/429/5xx
    /// - `Err(Error)`: Authentication failure, or transient failure after
    ///   the last retry
    pub async fn execute<F>(&self, what: &str, build: F) -> Result<Response>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder,
    {
        let provider = self.provider;
        self.retry
            .run(what, || {
                let request = build(&self.client);
                async move {
                    let response = request.send().await.map_err(transport_error)?;
                    classify(provider, response)
                }
            })
            .await
    }

    /// Send once without retry; used for cheap liveness checks
    pub async fn execute_once<F>(&self, build: F) -> Result<Response>
    where
        F: FnOnce(&reqwest::Client) -> RequestBuilder,
    {
        let response = build(&self.client)
            .send()
            .await
            .map_err(transport_error)?;
        classify(self.provider, response)
    }

    /// Like [`execute`](Self::execute), but any non-2xx status is an error
    pub async fn fetch<F>(&self, what: &str, build: F) -> Result<Response>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder,
    {
        let response = self.execute(what, build).await?;
        self.ensure_success(what, response).await
    }

    /// Fetch and decode a JSON body
    pub async fn fetch_json<T, F>(&self, what: &str, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn(&reqwest::Client) -> RequestBuilder,
    {
        let response = self.fetch(what, build).await?;
        self.json(what, response).await
    }

    /// Decode a JSON body
    pub async fn json<T: DeserializeOwned>(&self, what: &str, response: Response) -> Result<T> {
        let body = response.text().await.map_err(transport_error)?;
        serde_json::from_str(&body).map_err(|e| {
            Error::provider(
                self.provider,
                format!("{}: unexpected response body: {}", what, e),
            )
        })
    }

    /// Turn a non-2xx response into a provider error
    pub async fn ensure_success(&self, what: &str, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::provider(
            self.provider,
            format!("{} returned HTTP {}: {}", what, status, snippet(&body)),
        ))
    }
}

/// Whether a write response means "accepted"
pub fn accepted(status: StatusCode, ok: &[u16]) -> bool {
    ok.contains(&status.as_u16())
}

/// First 200 characters of a response body, for log lines
pub fn snippet(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

/// URL-encoded `key=value&...` body or query string
pub fn form_encode(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn transport_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::timeout(err.to_string())
    } else {
        Error::transport(err.to_string())
    }
}

fn classify(provider: &'static str, response: Response) -> Result<Response> {
    let status = response.status();
    match status.as_u16() {
        401 | 403 => Err(Error::auth(format!(
            "{} rejected credentials (HTTP {})",
            provider, status
        ))),
        429 => Err(Error::rate_limited(format!(
            "{} rate limit hit (HTTP {})",
            provider, status
        ))),
        500..=599 => Err(Error::transport(format!(
            "{} server error (HTTP {})",
            provider, status
        ))),
        _ => {
            debug!("{} responded HTTP {}", provider, status);
            Ok(response)
        }
    }
}
