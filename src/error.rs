//! Cache Errors
//!
//! Only programmer errors and loader failures are surfaced as `CacheError`.
//! Tier unavailability (breaker open, backend down, timeouts) is never an
//! error at the public API: reads degrade to a miss and writes to `false`.

use thiserror::Error;

/// Errors surfaced by the cache facade and its constructors
#[derive(Debug, Error)]
pub enum CacheError {
    /// Key type outside the closed set accepted by [`generate_key`](crate::keys::generate_key)
    #[error("invalid cache key type '{0}' (expected one of: user, jobs, referrals, session, api)")]
    InvalidKeyType(String),

    /// Invalid limits or unparsable configuration values
    #[error("invalid cache configuration: {0}")]
    Configuration(String),

    /// The loader passed to `get_or_set` failed
    #[error("cache factory failed: {0}")]
    Factory(#[source] anyhow::Error),

    /// A value could not be encoded to or decoded from JSON
    #[error("cache serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CacheError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

/// Result alias used across the crate's fallible constructors
pub type Result<T, E = CacheError> = std::result::Result<T, E>;
