//! Distributed Backend Implementations
//!
//! # Available Backends
//!
//! - **Redis** - Redis-compatible server through a shared `ConnectionManager` (feature: `redis`, default)
//! - **`DashMap`** - In-process stand-in with native-style expiry, fault and latency injection
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tiered_cache::backends::{DashMapBackend, RedisBackend};
//! use tiered_cache::{CacheConfig, DistributedBackend};
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = CacheConfig::from_env()?;
//! let redis: Arc<dyn DistributedBackend> = Arc::new(RedisBackend::new(&config.redis)?);
//! let local: Arc<dyn DistributedBackend> = Arc::new(DashMapBackend::new());
//! # Ok(())
//! # }
//! ```

pub mod dashmap_cache;

#[cfg(feature = "redis")]
pub mod redis_cache;

pub use dashmap_cache::DashMapBackend;

#[cfg(feature = "redis")]
pub use redis_cache::RedisBackend;
