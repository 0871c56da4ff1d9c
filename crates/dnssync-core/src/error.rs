//! Error types for the DNS sync system
//!
//! This module defines all error types used throughout the crate.
//!
//! ## Taxonomy
//!
//! - [`Error::Connection`]: an adapter could not reach its server or the
//!   session could not be established
//! - [`Error::RecordOperation`]: a single add/delete failed; isolated to that
//!   record and counted as a conflict by the engine
//! - [`Error::CacheUnavailable`]: no authoritative snapshot exists and the hub
//!   is unreachable
//! - [`Error::Persistence`]: a cache or history write failed
//!
//! Transport-level variants ([`Error::Transport`], [`Error::Timeout`],
//! [`Error::RateLimited`], [`Error::Io`]) are transient and may be retried
//! by [`RetryPolicy`](crate::retry::RetryPolicy).

use thiserror::Error;

/// Result type alias for DNS sync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the DNS sync system
#[derive(Error, Debug)]
pub enum Error {
    /// Adapter unreachable or session could not be established
    #[error("Connection error: {0}")]
    Connection(String),

    /// Credentials rejected by the remote server
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Transient transport failure (connection refused, reset, 5xx gateway errors)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Request exceeded its timeout
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Rate limiting errors
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// A single record add/delete failed
    #[error("Record operation failed: {0}")]
    RecordOperation(String),

    /// No authoritative snapshot exists and the hub is unreachable
    #[error("Authoritative cache unavailable: {0}")]
    CacheUnavailable(String),

    /// Cache/history persistence errors
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A canonical record string could not be parsed
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Server or record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Vendor-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Adapter type name
        provider: String,
        /// Error message
        message: String,
    },

    /// Local I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create a record operation error
    pub fn record_operation(msg: impl Into<String>) -> Self {
        Self::RecordOperation(msg.into())
    }

    /// Create a cache unavailable error
    pub fn cache_unavailable(msg: impl Into<String>) -> Self {
        Self::CacheUnavailable(msg.into())
    }

    /// Create a persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid record error
    pub fn invalid_record(msg: impl Into<String>) -> Self {
        Self::InvalidRecord(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether a retry of the same request may succeed
    ///
    /// Authentication and configuration failures are never transient.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Timeout(_) | Self::RateLimited(_) | Self::Io(_)
        )
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
