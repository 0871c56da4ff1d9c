//! Bounded retry for transient transport failures
//!
//! Delays grow linearly (`step`, `2 * step`, `3 * step`, ...) up to
//! `max_delay`. Only errors for which [`Error::is_transient`] holds are
//! retried; everything else is returned immediately.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::config::ServerConfig;
use crate::error::{Error, Result};

/// Retry settings for one server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay unit
    pub step: Duration,
    /// Upper bound on a single delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy
    pub fn new(max_retries: u32, step: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            step,
            max_delay,
        }
    }

    /// A policy that never retries
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO)
    }

    /// Standard policy for a server: 2s steps capped at 10s
    ///
    /// `ServerConfig::retries` counts total attempts, so `retries = 3` makes
    /// one call plus two retries. Zero still makes a single attempt.
    pub fn for_server(config: &ServerConfig) -> Self {
        Self::new(
            config.retries.saturating_sub(1),
            Duration::from_secs(2),
            Duration::from_secs(10),
        )
    }

    /// Upper bound on calls `run` makes, first attempt included
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `attempt` (zero-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        self.step
            .saturating_mul(attempt.saturating_add(1))
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails non-transiently, or retries run out
    ///
    /// # Parameters
    ///
    /// - `what`: Label for log lines
    /// - `op`: Produces a fresh future per attempt
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = self.delay(attempt);
                    warn!(
                        "{} failed (attempt {}/{}): {}; retrying in {:?}",
                        what,
                        attempt + 1,
                        self.max_attempts(),
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2), Duration::from_secs(10))
    }
}

/// Map an exhausted transient failure to a connection error
///
/// Adapters call this at the end of `connect` so the orchestrator sees one
/// uniform error kind for an unreachable server.
pub fn into_connection_error(server_name: &str, err: Error) -> Error {
    match err {
        Error::Transport(_) | Error::Timeout(_) | Error::RateLimited(_) | Error::Io(_) => {
            Error::connection(format!("{}: {}", server_name, err))
        }
        other => other,
    }
}
