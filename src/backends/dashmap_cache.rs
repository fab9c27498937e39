//! `DashMap` Backend - In-Process Distributed Stand-In
//!
//! A Redis-compatible backend kept in a concurrent `HashMap`. Useful for
//! single-process deployments, local development and tests. Supports fault
//! and latency injection so resilience paths can be exercised without a
//! real server.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::debug;

use crate::pattern::glob_to_regex;
use crate::traits::DistributedBackend;

/// Stored value with expiration tracking
#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Instant,
}

impl StoredValue {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Concurrent in-memory backend honouring per-key expiry
///
/// ```rust
/// use tiered_cache::backends::DashMapBackend;
/// use tiered_cache::DistributedBackend;
///
/// # async fn example() -> anyhow::Result<()> {
/// let backend = DashMapBackend::new();
/// backend.set_ex("user:1", r#"{"name":"alice"}"#, 60).await?;
/// assert!(backend.get("user:1").await?.is_some());
///
/// backend.set_failing(true);
/// assert!(backend.get("user:1").await.is_err());
/// # Ok(())
/// # }
/// ```
pub struct DashMapBackend {
    map: DashMap<String, StoredValue>,
    failing: AtomicBool,
    latency: RwLock<Option<Duration>>,
    /// Operations attempted against this backend, failed ones included
    calls: AtomicU64,
}

impl DashMapBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            map: DashMap::new(),
            failing: AtomicBool::new(false),
            latency: RwLock::new(None),
            calls: AtomicU64::new(0),
        }
    }

    /// Make every subsequent operation fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay every subsequent operation
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write() = latency;
    }

    /// Number of operations that reached this backend
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Live (non-expired) key count
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.iter().filter(|entry| !entry.is_expired()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining expiry of a live key
    #[must_use]
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.map
            .get(key)
            .filter(|stored| !stored.is_expired())
            .map(|stored| stored.expires_at.saturating_duration_since(Instant::now()))
    }

    /// Drop expired entries; returns how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let before = self.map.len();
        self.map.retain(|_, stored| !stored.is_expired());
        let removed = before.saturating_sub(self.map.len());
        if removed > 0 {
            debug!(count = removed, "[DashMap] Cleaned up expired entries");
        }
        removed
    }

    async fn enter(&self, op: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let latency = *self.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            bail!("DashMap backend unavailable ({op})");
        }
        Ok(())
    }
}

impl Default for DashMapBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DistributedBackend for DashMapBackend {
    async fn ping(&self) -> Result<()> {
        self.enter("PING").await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.enter("GET").await?;
        let expired = match self.map.get(key) {
            None => return Ok(None),
            Some(stored) if !stored.is_expired() => return Ok(Some(stored.value.clone())),
            Some(_) => true,
        };
        if expired {
            self.map.remove(key);
        }
        Ok(None)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        self.enter("SETEX").await?;
        if ttl_secs == 0 {
            return Err(anyhow!("invalid expire time in 'setex' command"));
        }
        self.map.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at: Instant::now() + Duration::from_secs(ttl_secs),
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<usize> {
        self.enter("DEL").await?;
        Ok(usize::from(
            self.map
                .remove(key)
                .is_some_and(|(_, stored)| !stored.is_expired()),
        ))
    }

    async fn del_many(&self, keys: &[String]) -> Result<usize> {
        self.enter("DEL").await?;
        Ok(keys
            .iter()
            .filter(|key| {
                self.map
                    .remove(key.as_str())
                    .is_some_and(|(_, stored)| !stored.is_expired())
            })
            .count())
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.enter("SCAN").await?;
        let regex = glob_to_regex(pattern)?;
        let mut keys: Vec<String> = self
            .map
            .iter()
            .filter(|entry| !entry.is_expired() && regex.is_match(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort_unstable();
        Ok(keys)
    }

    async fn flush_db(&self) -> Result<()> {
        self.enter("FLUSHDB").await?;
        self.map.clear();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "DashMap"
    }
}
