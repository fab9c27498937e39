//! L2 Cache - Distributed Tier
//!
//! Wraps a [`DistributedBackend`] with JSON encoding, a per-call timeout and
//! a circuit breaker. Nothing here returns an error: an open circuit, a
//! backend failure, a timeout or an undecodable payload all come back as a
//! miss (`None`), `false` or `0`.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use anyhow::anyhow;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerStats};
use crate::config::CircuitBreakerConfig;
use crate::error::CacheError;
use crate::l1_cache::hit_rate;
use crate::observer::{CacheObserver, CacheTier};
use crate::traits::DistributedBackend;

/// Records a breaker failure if an admitted call is dropped before it settles
struct InFlightGuard<'a> {
    breaker: &'a CircuitBreaker,
    operation: &'static str,
    settled: bool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            debug!(operation = self.operation, "[L2] In-flight call cancelled");
            self.breaker.record_failure();
        }
    }
}

/// Distributed tier guarded by a circuit breaker
pub struct L2Cache {
    backend: Arc<dyn DistributedBackend>,
    breaker: CircuitBreaker,
    observer: Arc<dyn CacheObserver>,
    timeout: Duration,
    connected: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    errors: AtomicU64,
    /// Calls short-circuited by the breaker
    unavailable: AtomicU64,
}

impl L2Cache {
    pub fn new(
        backend: Arc<dyn DistributedBackend>,
        breaker_config: CircuitBreakerConfig,
        timeout: Duration,
        observer: Arc<dyn CacheObserver>,
    ) -> Self {
        Self {
            backend,
            breaker: CircuitBreaker::new(breaker_config),
            observer,
            timeout,
            connected: AtomicBool::new(false),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            unavailable: AtomicU64::new(0),
        }
    }

    /// Run one backend call under breaker, timeout and cancellation accounting
    async fn execute<T, F>(&self, operation: &'static str, deadline: Option<Duration>, call: F) -> Option<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        if !self.breaker.can_execute() {
            self.unavailable.fetch_add(1, Ordering::Relaxed);
            debug!(operation, "[L2] Circuit open, skipping backend call");
            return None;
        }

        let mut guard = InFlightGuard {
            breaker: &self.breaker,
            operation,
            settled: false,
        };
        let limit = deadline.unwrap_or(self.timeout);
        let outcome = match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!("L2 {operation} timed out after {limit:?}")),
        };
        guard.settled = true;

        match outcome {
            Ok(value) => {
                self.breaker.record_success();
                self.connected.store(true, Ordering::Relaxed);
                Some(value)
            }
            Err(error) => {
                self.breaker.record_failure();
                self.errors.fetch_add(1, Ordering::Relaxed);
                // a bad payload still means the backend answered
                let decode_error = matches!(
                    error.downcast_ref::<CacheError>(),
                    Some(CacheError::Serialization(_))
                );
                self.connected.store(decode_error, Ordering::Relaxed);
                self.observer.on_error(CacheTier::L2, operation, &error);
                None
            }
        }
    }

    /// Open the backend connection; the tier stays usable-but-degraded on failure
    pub async fn connect(&self) -> bool {
        match tokio::time::timeout(self.timeout, self.backend.connect()).await {
            Ok(Ok(())) => {
                self.connected.store(true, Ordering::Relaxed);
                info!(backend = self.backend.name(), "[L2] Connected");
                true
            }
            Ok(Err(error)) => {
                self.connected.store(false, Ordering::Relaxed);
                warn!(backend = self.backend.name(), error = %error, "[L2] Connection failed, running degraded");
                self.observer.on_error(CacheTier::L2, "connect", &error);
                false
            }
            Err(_) => {
                self.connected.store(false, Ordering::Relaxed);
                let error = anyhow!("L2 connect timed out after {:?}", self.timeout);
                warn!(backend = self.backend.name(), error = %error, "[L2] Connection failed, running degraded");
                self.observer.on_error(CacheTier::L2, "connect", &error);
                false
            }
        }
    }

    pub async fn disconnect(&self) {
        self.backend.disconnect().await;
        self.connected.store(false, Ordering::Relaxed);
    }

    /// Liveness probe through the breaker
    pub async fn ping(&self) -> bool {
        self.execute("ping", None, self.backend.ping()).await.is_some()
    }

    /// Get and decode a value; every failure is a miss
    pub async fn get(&self, key: &str, deadline: Option<Duration>) -> Option<serde_json::Value> {
        let call = fetch_decoded(self.backend.as_ref(), key);
        if let Some(value) = self.execute("get", deadline, call).await.flatten() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            Some(value)
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    /// Encode and store a value with native expiry
    pub async fn set(
        &self,
        key: &str,
        value: &serde_json::Value,
        ttl: Duration,
        deadline: Option<Duration>,
    ) -> bool {
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                self.observer.on_error(CacheTier::L2, "set", &CacheError::from(e).into());
                return false;
            }
        };
        let ttl_secs = ttl_to_secs(ttl);

        let stored = self
            .execute("set", deadline, self.backend.set_ex(key, &payload, ttl_secs))
            .await
            .is_some();
        if stored {
            self.sets.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, ttl_secs, "[L2] Cached key with TTL");
        }
        stored
    }

    /// Delete a key; absence counts as success
    pub async fn delete(&self, key: &str, deadline: Option<Duration>) -> bool {
        let removed = self.execute("delete", deadline, self.backend.del(key)).await;
        if let Some(count) = removed {
            self.deletes.fetch_add(count as u64, Ordering::Relaxed);
        }
        removed.is_some()
    }

    /// Delete several keys; returns how many existed
    pub async fn delete_many(&self, keys: &[String], deadline: Option<Duration>) -> usize {
        if keys.is_empty() {
            return 0;
        }
        let removed = self
            .execute("delete_many", deadline, self.backend.del_many(keys))
            .await
            .unwrap_or(0);
        self.deletes.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Delete every key matching a glob pattern
    pub async fn invalidate_by_pattern(&self, pattern: &str, deadline: Option<Duration>) -> usize {
        let call = scan_and_delete(self.backend.as_ref(), pattern);
        let removed = self
            .execute("invalidate_by_pattern", deadline, call)
            .await
            .unwrap_or(0);
        self.deletes.fetch_add(removed as u64, Ordering::Relaxed);
        debug!(pattern = %pattern, count = removed, "[L2] Invalidated keys by pattern");
        removed
    }

    /// Clear the backend database
    pub async fn flush(&self, deadline: Option<Duration>) -> bool {
        self.execute("flush", deadline, self.backend.flush_db())
            .await
            .is_some()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn backend(&self) -> &Arc<dyn DistributedBackend> {
        &self.backend
    }

    pub fn stats(&self) -> L2Stats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        L2Stats {
            backend: self.backend.name(),
            connected: self.is_connected(),
            hits,
            misses,
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            unavailable: self.unavailable.load(Ordering::Relaxed),
            hit_rate: hit_rate(hits, misses),
            circuit_breaker: self.breaker.stats(),
        }
    }
}

async fn fetch_decoded(
    backend: &dyn DistributedBackend,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let Some(raw) = backend.get(key).await? else {
        return Ok(None);
    };
    let value = serde_json::from_str(&raw).map_err(CacheError::from)?;
    Ok(Some(value))
}

async fn scan_and_delete(backend: &dyn DistributedBackend, pattern: &str) -> anyhow::Result<usize> {
    let keys = backend.scan_keys(pattern).await?;
    if keys.is_empty() {
        return Ok(0);
    }
    backend.del_many(&keys).await
}

/// Whole seconds for the backend's native expiry, rounding partial seconds up
fn ttl_to_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

/// L2 statistics snapshot
#[derive(Debug, Clone, Serialize)]
pub struct L2Stats {
    pub backend: &'static str,
    pub connected: bool,
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub errors: u64,
    pub unavailable: u64,
    pub hit_rate: f64,
    pub circuit_breaker: CircuitBreakerStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::DashMapBackend;
    use crate::circuit_breaker::CircuitState;
    use crate::observer::NoopObserver;
    use serde_json::json;

    fn l2(threshold: u32) -> (Arc<DashMapBackend>, L2Cache) {
        let backend = Arc::new(DashMapBackend::new());
        let cache = L2Cache::new(
            backend.clone(),
            CircuitBreakerConfig {
                failure_threshold: threshold,
                reset_timeout: Duration::from_secs(30),
                half_open_requests: 1,
            },
            Duration::from_millis(200),
            Arc::new(NoopObserver),
        );
        (backend, cache)
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let (backend, cache) = l2(5);
        assert!(cache.set("user:1", &json!({"name": "alice"}), Duration::from_secs(60), None).await);
        assert_eq!(backend.get("user:1").await.unwrap().as_deref(), Some(r#"{"name":"alice"}"#));
        assert_eq!(cache.get("user:1", None).await, Some(json!({"name": "alice"})));
        assert!(cache.delete("user:1", None).await);
        assert!(cache.delete("user:1", None).await, "absence is success");
        assert_eq!(cache.get("user:1", None).await, None);

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.sets, stats.deletes), (1, 1, 1, 1));
        assert!(stats.connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_rounds_up_to_whole_seconds() {
        let (backend, cache) = l2(5);
        assert!(cache.set("k", &json!(1), Duration::from_millis(1500), None).await);
        assert_eq!(backend.ttl("k"), Some(Duration::from_secs(2)));
        assert_eq!(ttl_to_secs(Duration::ZERO), 1);
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_a_miss_and_a_failure() {
        let (backend, cache) = l2(5);
        backend.set_ex("k", "{not json", 60).await.unwrap();
        assert_eq!(cache.get("k", None).await, None);

        let stats = cache.stats();
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.circuit_breaker.failure_count, 1);
        assert!(stats.connected, "a backend that answered is reachable");
    }

    #[tokio::test]
    async fn test_undecodable_payload_after_outage_marks_connected() {
        let (backend, cache) = l2(5);
        backend.set_failing(true);
        assert_eq!(cache.get("k", None).await, None);
        assert!(!cache.is_connected());

        backend.set_failing(false);
        backend.set_ex("k", "{not json", 60).await.unwrap();
        assert_eq!(cache.get("k", None).await, None);
        assert!(cache.is_connected());
    }

    #[tokio::test]
    async fn test_open_circuit_skips_backend() {
        let (backend, cache) = l2(2);
        backend.set_failing(true);
        assert!(!cache.set("k", &json!(1), Duration::from_secs(60), None).await);
        assert_eq!(cache.get("k", None).await, None);
        assert_eq!(cache.circuit_breaker().state(), CircuitState::Open);
        assert!(!cache.is_connected());

        let calls = backend.calls();
        backend.set_failing(false);
        assert!(!cache.set("k", &json!(1), Duration::from_secs(60), None).await);
        assert_eq!(cache.invalidate_by_pattern("*", None).await, 0);
        assert!(!cache.flush(None).await);
        assert_eq!(backend.calls(), calls, "no I/O while the circuit is open");
        assert_eq!(cache.stats().unavailable, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let (backend, cache) = l2(5);
        backend.set_latency(Some(Duration::from_secs(5)));
        assert_eq!(cache.get("k", None).await, None);
        assert_eq!(cache.stats().circuit_breaker.failure_count, 1);

        // per-call deadline overrides the configured timeout
        assert!(cache.set("k", &json!(1), Duration::from_secs(60), Some(Duration::from_secs(10))).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_call_counts_as_failure() {
        let (backend, cache) = l2(5);
        backend.set_latency(Some(Duration::from_millis(150)));

        let abandoned = tokio::time::timeout(Duration::from_millis(50), cache.get("k", None)).await;
        assert!(abandoned.is_err());

        let stats = cache.circuit_breaker().stats();
        assert_eq!(stats.total_failures, 1);
        assert_eq!(stats.total_successes, 0);
    }

    #[tokio::test]
    async fn test_invalidate_by_pattern_and_flush() {
        let (_backend, cache) = l2(5);
        for key in ["jobs:1", "jobs:2", "user:1"] {
            assert!(cache.set(key, &json!(key), Duration::from_secs(60), None).await);
        }
        assert_eq!(cache.invalidate_by_pattern("jobs:*", None).await, 2);
        assert_eq!(cache.invalidate_by_pattern("jobs:*", None).await, 0);
        assert!(cache.flush(None).await);
        assert_eq!(cache.get("user:1", None).await, None);
    }

    #[tokio::test]
    async fn test_connect_failure_leaves_tier_degraded() {
        let (backend, cache) = l2(5);
        backend.set_failing(true);
        assert!(!cache.connect().await);
        assert!(!cache.is_connected());

        backend.set_failing(false);
        assert!(cache.connect().await);
        assert!(cache.ping().await);
    }
}
