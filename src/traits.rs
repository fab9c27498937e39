//! Distributed Backend Trait
//!
//! Raw key/value operations against a Redis-compatible service. Values cross
//! this boundary as already-serialized JSON strings; encoding, the circuit
//! breaker and timeouts are applied one level up by [`L2Cache`](crate::L2Cache).
//!
//! # Example: Custom Backend
//!
//! ```rust,ignore
//! use tiered_cache::{DistributedBackend, async_trait};
//! use anyhow::Result;
//!
//! struct MyKvStore {
//!     // Your client
//! }
//!
//! #[async_trait]
//! impl DistributedBackend for MyKvStore {
//!     async fn ping(&self) -> Result<()> { /* ... */ }
//!     async fn get(&self, key: &str) -> Result<Option<String>> { /* ... */ }
//!     async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> { /* ... */ }
//!     async fn del(&self, key: &str) -> Result<usize> { /* ... */ }
//!     async fn del_many(&self, keys: &[String]) -> Result<usize> { /* ... */ }
//!     async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> { /* ... */ }
//!     async fn flush_db(&self) -> Result<()> { /* ... */ }
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;

/// Backend contract for the distributed (L2) tier
///
/// Implementations must be `Send + Sync`: a single instance is shared by all
/// concurrent callers.
#[async_trait]
pub trait DistributedBackend: Send + Sync {
    /// Establish the connection. Called once by `CacheManager::init`.
    async fn connect(&self) -> Result<()> {
        self.ping().await
    }

    /// Release the connection. Called by `CacheManager::shutdown`.
    async fn disconnect(&self) {}

    /// Round-trip liveness check
    async fn ping(&self) -> Result<()>;

    /// Fetch a raw value; `Ok(None)` when the key is absent or expired
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a raw value with a native per-key expiry in seconds
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;

    /// Delete one key, returning how many keys were removed (0 or 1)
    async fn del(&self, key: &str) -> Result<usize>;

    /// Delete several keys in one round trip
    async fn del_many(&self, keys: &[String]) -> Result<usize>;

    /// List keys matching a glob pattern (`*`, `?`)
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Clear the whole database used by this service
    async fn flush_db(&self) -> Result<()>;

    /// Name used in logs
    fn name(&self) -> &'static str {
        "unknown"
    }
}
