//! Cache event observers
//!
//! Hit, miss, set, delete and error notifications are delivered to a
//! [`CacheObserver`] passed in at construction, keeping the cache independent
//! of any particular telemetry stack.

use std::fmt;

use serde::Serialize;
use tracing::{debug, trace, warn};

/// Cache tier identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTier {
    L1,
    L2,
}

impl fmt::Display for CacheTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheTier::L1 => f.write_str("L1"),
            CacheTier::L2 => f.write_str("L2"),
        }
    }
}

/// Receives cache events; every method defaults to a no-op
///
/// Called synchronously on the request path, so implementations should be
/// cheap (increment a counter, push to a channel).
pub trait CacheObserver: Send + Sync {
    fn on_hit(&self, _key: &str, _tier: CacheTier) {}

    fn on_miss(&self, _key: &str) {}

    fn on_set(&self, _key: &str) {}

    fn on_delete(&self, _key: &str) {}

    /// A tier operation failed and was degraded to a miss or `false`
    fn on_error(&self, _tier: CacheTier, _operation: &str, _error: &anyhow::Error) {}
}

/// Observer that drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl CacheObserver for NoopObserver {}

/// Default observer: forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl CacheObserver for TracingObserver {
    fn on_hit(&self, key: &str, tier: CacheTier) {
        trace!(key = %key, tier = %tier, "cache hit");
    }

    fn on_miss(&self, key: &str) {
        trace!(key = %key, "cache miss");
    }

    fn on_set(&self, key: &str) {
        debug!(key = %key, "cache set");
    }

    fn on_delete(&self, key: &str) {
        debug!(key = %key, "cache delete");
    }

    fn on_error(&self, tier: CacheTier, operation: &str, error: &anyhow::Error) {
        warn!(tier = %tier, operation, error = %error, "cache tier error");
    }
}
