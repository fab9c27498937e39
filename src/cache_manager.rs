//! Cache Manager - Unified Cache Operations
//!
//! Cache-aside facade over L1 (in-process) and L2 (distributed) tiers:
//!
//! ```text
//! get:  L1 hit ──────────────► value
//!       L1 miss → L2 hit ────► promote into L1 → value
//!       L1 miss → L2 miss ───► None (or run the factory in get_or_set)
//! set:  L1 write + L2 write (independent, L2 failure does not undo L1)
//! ```
//!
//! Neither tier failing makes an operation fail. Degradation shows up only in
//! [`CacheManager::get_health`] and in the miss rate.
//!
//! `get_or_set` does not coalesce concurrent misses: under a thundering herd
//! the factory runs once per caller that missed.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{CacheConfig, TtlConfig};
use crate::error::{CacheError, Result};
use crate::l1_cache::{L1Cache, L1Stats, hit_rate};
use crate::l2_cache::{L2Cache, L2Stats};
use crate::observer::{CacheObserver, CacheTier};
use crate::traits::DistributedBackend;

/// Per-call options for reads and writes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheOptions {
    /// L1 TTL; defaults to the configured L1 TTL and is clamped to it
    pub l1_ttl: Option<Duration>,
    /// L2 TTL; defaults to the configured L2 TTL
    pub l2_ttl: Option<Duration>,
    /// L1 tags for bulk invalidation
    pub tags: Vec<String>,
    /// Deadline for each L2 round trip made by this call
    pub timeout: Option<Duration>,
}

impl CacheOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn l1_ttl(mut self, ttl: Duration) -> Self {
        self.l1_ttl = Some(ttl);
        self
    }

    #[must_use]
    pub fn l2_ttl(mut self, ttl: Duration) -> Self {
        self.l2_ttl = Some(ttl);
        self
    }

    /// Same TTL for both tiers (L1 still clamped to its ceiling)
    #[must_use]
    pub fn ttl(self, ttl: Duration) -> Self {
        self.l1_ttl(ttl).l2_ttl(ttl)
    }

    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    #[must_use]
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Keys removed per tier by an invalidation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InvalidationCount {
    pub l1: usize,
    pub l2: usize,
}

/// Cache Manager - the single entry point for application code
pub struct CacheManager {
    l1: Arc<L1Cache>,
    l2: Arc<L2Cache>,
    observer: Arc<dyn CacheObserver>,
    ttl: TtlConfig,
    cleanup_interval: Duration,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    /// Statistics
    total_requests: AtomicU64,
    l1_hits: AtomicU64,
    l2_hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    promotions: AtomicU64,
}

impl CacheManager {
    /// Create a manager over the given backend
    ///
    /// Nothing is connected or spawned until [`CacheManager::init`].
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Configuration`] if `config` fails validation.
    pub fn new(
        config: CacheConfig,
        backend: Arc<dyn DistributedBackend>,
        observer: Arc<dyn CacheObserver>,
    ) -> Result<Self> {
        config.validate()?;

        let l1 = Arc::new(L1Cache::new(config.l1)?);
        let l2 = Arc::new(L2Cache::new(
            backend,
            config.circuit_breaker,
            config.l2_timeout,
            Arc::clone(&observer),
        ));

        Ok(Self {
            l1,
            l2,
            observer,
            ttl: config.ttl,
            cleanup_interval: config.l1.cleanup_interval,
            sweeper: Mutex::new(None),
            total_requests: AtomicU64::new(0),
            l1_hits: AtomicU64::new(0),
            l2_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            promotions: AtomicU64::new(0),
        })
    }

    /// Connect the L2 backend and start the L1 expiry sweep
    ///
    /// Must run inside a tokio runtime. A backend that cannot be reached
    /// leaves the manager running degraded on L1 alone. Calling it again
    /// reconnects without starting a second sweep.
    pub async fn init(&self) {
        info!("Initializing cache manager");
        let connected = self.l2.connect().await;

        let mut sweeper = self.sweeper.lock();
        if sweeper.is_none() {
            *sweeper = Some(spawn_sweeper(Arc::downgrade(&self.l1), self.cleanup_interval));
        }
        drop(sweeper);

        info!(l2_connected = connected, "Cache manager initialized");
    }

    /// Stop the sweep task and close the backend connection
    pub async fn shutdown(&self) {
        let sweeper = self.sweeper.lock().take();
        if let Some(handle) = sweeper {
            handle.abort();
        }
        self.l2.disconnect().await;
        info!("Cache manager shut down");
    }

    /// Resolve the L1 TTL for a call: requested or default, never above the ceiling
    fn l1_ttl(&self, opts: &CacheOptions) -> Duration {
        opts.l1_ttl.map_or(self.ttl.l1, |ttl| ttl.min(self.ttl.l1))
    }

    fn l2_ttl(&self, opts: &CacheOptions) -> Duration {
        opts.l2_ttl.unwrap_or(self.ttl.l2)
    }

    /// Look a key up in L1, then L2 with promotion, without hit/miss accounting
    async fn lookup(&self, key: &str, opts: &CacheOptions) -> Option<(serde_json::Value, CacheTier)> {
        if let Some(value) = self.l1.get(key) {
            return Some((value, CacheTier::L1));
        }

        let value = self.l2.get(key, opts.timeout).await?;
        self.l1.set(key, value.clone(), self.l1_ttl(opts), &opts.tags);
        self.promotions.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, "Promoted key from L2 to L1");
        Some((value, CacheTier::L2))
    }

    fn record_hit(&self, key: &str, tier: CacheTier) {
        match tier {
            CacheTier::L1 => self.l1_hits.fetch_add(1, Ordering::Relaxed),
            CacheTier::L2 => self.l2_hits.fetch_add(1, Ordering::Relaxed),
        };
        self.observer.on_hit(key, tier);
    }

    fn record_miss(&self, key: &str) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.observer.on_miss(key);
    }

    /// Get value from cache (L1 first, then L2 with promotion)
    pub async fn get_value(&self, key: &str, opts: &CacheOptions) -> Option<serde_json::Value> {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        if let Some((value, tier)) = self.lookup(key, opts).await {
            self.record_hit(key, tier);
            Some(value)
        } else {
            self.record_miss(key);
            None
        }
    }

    /// Get and deserialize a value
    ///
    /// A cached value that does not deserialize into `T` is reported to the
    /// observer and counted as a miss.
    pub async fn get<T>(&self, key: &str, opts: &CacheOptions) -> Option<T>
    where
        T: DeserializeOwned,
    {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        let Some((value, tier)) = self.lookup(key, opts).await else {
            self.record_miss(key);
            return None;
        };
        match serde_json::from_value(value) {
            Ok(typed) => {
                self.record_hit(key, tier);
                Some(typed)
            }
            Err(e) => {
                warn!(
                    key = %key,
                    type_name = std::any::type_name::<T>(),
                    error = %e,
                    "Cached value does not match requested type"
                );
                self.observer.on_error(tier, "decode", &CacheError::from(e).into());
                self.record_miss(key);
                None
            }
        }
    }

    /// Store a JSON value in both tiers
    ///
    /// Always `true`: the L1 write is authoritative and an L2 failure is only logged.
    pub async fn set_value(&self, key: &str, value: serde_json::Value, opts: &CacheOptions) -> bool {
        self.l1.set(key, value.clone(), self.l1_ttl(opts), &opts.tags);
        let l2_stored = self.l2.set(key, &value, self.l2_ttl(opts), opts.timeout).await;
        if !l2_stored {
            debug!(key = %key, "L2 write failed, continuing with L1 only");
        }

        self.sets.fetch_add(1, Ordering::Relaxed);
        self.observer.on_set(key);
        true
    }

    /// Serialize and store a value in both tiers
    ///
    /// Returns `false` only if the value cannot be serialized.
    pub async fn set<T>(&self, key: &str, value: &T, opts: &CacheOptions) -> bool
    where
        T: Serialize + ?Sized,
    {
        match serde_json::to_value(value) {
            Ok(json) => self.set_value(key, json, opts).await,
            Err(e) => {
                warn!(key = %key, error = %e, "Value could not be serialized for caching");
                self.observer.on_error(CacheTier::L1, "encode", &CacheError::from(e).into());
                false
            }
        }
    }

    /// Delete from both tiers; `true` if either succeeded
    pub async fn delete(&self, key: &str) -> bool {
        let l1_removed = self.l1.delete(key);
        let l2_removed = self.l2.delete(key, None).await;

        self.deletes.fetch_add(1, Ordering::Relaxed);
        self.observer.on_delete(key);
        l1_removed || l2_removed
    }

    /// Cache-aside read: return the cached value or compute, store and return it
    ///
    /// The factory's error propagates as [`CacheError::Factory`] and nothing is
    /// cached. A factory result that serializes to `null` is returned but not
    /// cached.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Factory`] when the factory fails.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let user: User = cache
    ///     .get_or_set("user:42", &CacheOptions::new().tag("user"), || async {
    ///         repo.find_user(42).await
    ///     })
    ///     .await?;
    /// ```
    pub async fn get_or_set<T, F, Fut>(&self, key: &str, opts: &CacheOptions, factory: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        if let Some(cached) = self.get::<T>(key, opts).await {
            return Ok(cached);
        }

        debug!(key = %key, "Computing value for cache miss");
        let value = factory().await.map_err(CacheError::Factory)?;

        match serde_json::to_value(&value) {
            Ok(serde_json::Value::Null) => {}
            Ok(json) => {
                self.set_value(key, json, opts).await;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Computed value could not be serialized for caching");
                self.observer.on_error(CacheTier::L1, "encode", &CacheError::from(e).into());
            }
        }

        Ok(value)
    }

    /// Drop every L1 key carrying `tag` (L2 has no tags)
    pub fn invalidate_by_tag(&self, tag: &str) -> InvalidationCount {
        let l1 = self.l1.invalidate_by_tag(tag);
        debug!(tag = %tag, l1, "Invalidated by tag");
        InvalidationCount { l1, l2: 0 }
    }

    /// Drop every key matching a glob pattern from both tiers
    pub async fn invalidate_by_pattern(&self, pattern: &str) -> InvalidationCount {
        let l1 = self.l1.invalidate_by_pattern(pattern);
        let l2 = self.l2.invalidate_by_pattern(pattern, None).await;
        debug!(pattern = %pattern, l1, l2, "Invalidated by pattern");
        InvalidationCount { l1, l2 }
    }

    /// Clear both tiers; `false` if L2 could not be flushed (L1 is cleared regardless)
    pub async fn flush(&self) -> bool {
        self.l1.flush();
        let l2_flushed = self.l2.flush(None).await;
        if l2_flushed {
            info!("Cache flushed (L1+L2)");
        } else {
            warn!("L1 flushed, L2 flush failed");
        }
        l2_flushed
    }

    /// Get comprehensive cache statistics
    pub fn get_stats(&self) -> CacheStats {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let l1_hits = self.l1_hits.load(Ordering::Relaxed);
        let l2_hits = self.l2_hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);

        CacheStats {
            overall: OverallStats {
                total_requests,
                hits: l1_hits + l2_hits,
                l1_hits,
                l2_hits,
                misses,
                sets: self.sets.load(Ordering::Relaxed),
                deletes: self.deletes.load(Ordering::Relaxed),
                promotions: self.promotions.load(Ordering::Relaxed),
                hit_rate: hit_rate(l1_hits + l2_hits, misses),
            },
            l1: self.l1.stats(),
            l2: self.l2.stats(),
        }
    }

    /// Health report: `healthy` when L2 is connected, `degraded` otherwise
    pub fn get_health(&self) -> HealthReport {
        let l2_connected = self.l2.is_connected();
        let breaker = self.l2.circuit_breaker().stats();
        let l1 = self.l1.stats();

        HealthReport {
            status: if l2_connected {
                HealthStatus::Healthy
            } else {
                HealthStatus::Degraded
            },
            l1: L1Health {
                status: HealthStatus::Healthy,
                keys: l1.keys,
                size_bytes: l1.size_bytes,
            },
            l2: L2Health {
                status: if l2_connected {
                    HealthStatus::Healthy
                } else {
                    HealthStatus::Degraded
                },
                connected: l2_connected,
                circuit_state: breaker.state,
            },
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |since| u64::try_from(since.as_millis()).unwrap_or(u64::MAX)),
        }
    }

    /// Direct access to the L1 tier
    pub fn l1(&self) -> &Arc<L1Cache> {
        &self.l1
    }

    /// Direct access to the L2 tier
    pub fn l2(&self) -> &Arc<L2Cache> {
        &self.l2
    }

    pub(crate) fn ttl_config(&self) -> &TtlConfig {
        &self.ttl
    }
}

impl Drop for CacheManager {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().take() {
            handle.abort();
        }
    }
}

fn spawn_sweeper(l1: std::sync::Weak<L1Cache>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(l1) = l1.upgrade() else {
                break;
            };
            let removed = l1.cleanup_expired();
            if removed > 0 {
                debug!(removed, "L1 expiry sweep");
            }
        }
    })
}

/// Facade-level counters
#[derive(Debug, Clone, Serialize)]
pub struct OverallStats {
    pub total_requests: u64,
    pub hits: u64,
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub promotions: u64,
    pub hit_rate: f64,
}

/// Cache statistics across both tiers
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub overall: OverallStats,
    pub l1: L1Stats,
    pub l2: L2Stats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
pub struct L1Health {
    pub status: HealthStatus,
    pub keys: usize,
    pub size_bytes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct L2Health {
    pub status: HealthStatus,
    pub connected: bool,
    pub circuit_state: crate::circuit_breaker::CircuitState,
}

/// Health snapshot; `timestamp` is milliseconds since the Unix epoch
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub l1: L1Health,
    pub l2: L2Health,
    pub timestamp: u64,
}
