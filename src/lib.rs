//! Tiered Cache
//!
//! A two-tier caching library for Rust services:
//! - **L1 Cache**: In-process LRU store with TTLs, a byte ceiling and tag-based invalidation
//! - **L2 Cache**: Distributed store (Redis by default) behind a circuit breaker and per-call timeout
//! - **Cache-Aside Facade**: `get_or_set` computes on miss and writes both tiers
//! - **Automatic L2-to-L1 Promotion**: L2 hits are copied into L1
//! - **Graceful Degradation**: L2 outages become misses, never errors
//! - **Statistics & Health**: Per-tier counters, hit rates and breaker state
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use tiered_cache::{CacheManagerBuilder, CacheOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Reads REDIS_URL / REDIS_HOST etc. from the environment
//!     let cache = CacheManagerBuilder::new().build()?;
//!     cache.init().await;
//!
//!     let data = serde_json::json!({"user": "alice", "score": 100});
//!     cache.set("user:1", &data, &CacheOptions::new().tag("user")).await;
//!
//!     // L1 first, then L2 fallback
//!     if let Some(cached) = cache.get::<serde_json::Value>("user:1", &CacheOptions::new()).await {
//!         tracing::info!("Cached data: {}", cached);
//!     }
//!
//!     let stats = cache.get_stats();
//!     tracing::info!("Hit rate: {:.2}%", stats.overall.hit_rate);
//!
//!     cache.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! Request → L1 Cache (LRU) → L2 Cache (Redis) → Compute/Fetch
//!           ↓ Hit             ↓ Hit              ↓ Miss
//!           Return            Promote to L1      Store in L1+L2
//!                             ↑
//!                   circuit breaker + timeout
//! ```

pub mod backends;
pub mod builder;
pub mod cache_manager;
pub mod circuit_breaker;
pub mod config;
pub mod entry;
pub mod error;
mod helpers;
pub mod keys;
pub mod l1_cache;
pub mod l2_cache;
pub mod logging;
pub mod observer;
pub mod pattern;
pub mod traits;

pub use builder::CacheManagerBuilder;
pub use cache_manager::{
    CacheManager, CacheOptions, CacheStats, HealthReport, HealthStatus, InvalidationCount, L1Health,
    L2Health, OverallStats,
};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerStats, CircuitState};
pub use config::{CacheConfig, CircuitBreakerConfig, L1Config, RedisConfig, TtlConfig};
pub use entry::CacheEntry;
pub use error::{CacheError, Result};
pub use keys::{KeyType, generate_key};
pub use l1_cache::{L1Cache, L1Stats};
pub use l2_cache::{L2Cache, L2Stats};
pub use observer::{CacheObserver, CacheTier, NoopObserver, TracingObserver};
pub use traits::DistributedBackend;

// Re-export async_trait for backend implementors
pub use async_trait::async_trait;
