//! Process-wide adapter session cache
//!
//! Adapters that authenticate with a session token share one cache keyed by
//! server base URL. Each key has its own async lock, so one adapter's
//! check-then-reauthenticate sequence cannot interleave with another's for
//! the same server while different servers proceed in parallel.
//!
//! ```rust,ignore
//! let mut slot = ctx.sessions.lock(&base_url).await;
//! if let Some(session) = slot.current() {
//!     if is_valid(session).await? {
//!         return Ok(());
//!     }
//! }
//! slot.store(login().await?);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// An authenticated session on a remote server
#[derive(Clone)]
pub struct Session {
    /// Session identifier sent with each request
    pub token: String,
    /// Anti-CSRF token, for servers that require one
    pub csrf: Option<String>,
    /// When the session was established
    pub created_at: Instant,
}

impl Session {
    /// Create a session stamped with the current time
    pub fn new(token: impl Into<String>, csrf: Option<String>) -> Self {
        Self {
            token: token.into(),
            csrf,
            created_at: Instant::now(),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("csrf", &self.csrf.as_ref().map(|_| "<redacted>"))
            .field("created_at", &self.created_at)
            .finish()
    }
}

type Slot = Arc<AsyncMutex<Option<Session>>>;

#[derive(Default)]
struct Inner {
    slots: Mutex<HashMap<String, Slot>>,
    ttl: Option<Duration>,
}

/// Shared, lock-guarded session cache
///
/// Cloning is cheap; all clones share the same entries.
#[derive(Clone, Default)]
pub struct SessionCache {
    inner: Arc<Inner>,
}

impl SessionCache {
    /// Create a cache whose entries live until a validity check rejects them
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache whose entries expire after `ttl`
    pub fn with_ttl(ttl: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(Inner {
                slots: Mutex::new(HashMap::new()),
                ttl,
            }),
        }
    }

    /// Lock the entry for one server
    ///
    /// The guard is held across the adapter's validity check and re-authentication.
    pub async fn lock(&self, base_url: &str) -> SessionGuard {
        let slot = self.slot(base_url);
        SessionGuard {
            guard: slot.lock_owned().await,
            ttl: self.inner.ttl,
        }
    }

    /// Copy of the current session for a server, if valid
    pub async fn get(&self, base_url: &str) -> Option<Session> {
        self.lock(base_url).await.current().cloned()
    }

    /// Drop the cached session for a server
    pub async fn invalidate(&self, base_url: &str) {
        self.lock(base_url).await.invalidate();
    }

    /// Drop entries for servers `keep` rejects
    ///
    /// Entries locked by an in-flight connect are kept regardless.
    ///
    /// # Returns
    ///
    /// Number of entries removed
    pub fn retain(&self, keep: impl Fn(&str) -> bool) -> usize {
        let mut slots = self
            .inner
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = slots.len();
        slots.retain(|url, slot| keep(url) || Arc::strong_count(slot) > 1);
        before - slots.len()
    }

    /// Number of servers with an entry
    pub fn len(&self) -> usize {
        self.inner
            .slots
            .lock()
            .map(|slots| slots.len())
            .unwrap_or_default()
    }

    /// Whether no server has an entry
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, base_url: &str) -> Slot {
        let mut slots = self
            .inner
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        slots
            .entry(base_url.trim_end_matches('/').to_string())
            .or_default()
            .clone()
    }
}

impl fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let servers = self
            .inner
            .slots
            .lock()
            .map(|slots| slots.len())
            .unwrap_or_default();
        f.debug_struct("SessionCache")
            .field("servers", &servers)
            .field("ttl", &self.inner.ttl)
            .finish()
    }
}

/// Exclusive access to one server's cached session
pub struct SessionGuard {
    guard: OwnedMutexGuard<Option<Session>>,
    ttl: Option<Duration>,
}

impl SessionGuard {
    /// The cached session, unless missing or expired
    pub fn current(&self) -> Option<&Session> {
        self.guard
            .as_ref()
            .filter(|s| self.ttl.is_none_or(|ttl| s.created_at.elapsed() < ttl))
    }

    /// Replace the cached session
    pub fn store(&mut self, session: Session) {
        *self.guard = Some(session);
    }

    /// Forget the cached session
    pub fn invalidate(&mut self) {
        *self.guard = None;
    }
}
