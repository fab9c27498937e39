//! Cache Manager Builder
//!
//! Assembles a [`CacheManager`] from configuration, a distributed backend and
//! an observer. Anything left unset falls back to the environment-driven
//! defaults.
//!
//! # Example: Using Defaults
//!
//! ```rust,no_run
//! use tiered_cache::CacheManagerBuilder;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Config from env, Redis backend, tracing observer
//!     let cache = CacheManagerBuilder::new().build()?;
//!     cache.init().await;
//!     Ok(())
//! }
//! ```
//!
//! # Example: Custom Backend
//!
//! ```rust
//! use std::sync::Arc;
//! use tiered_cache::backends::DashMapBackend;
//! use tiered_cache::{CacheConfig, CacheManagerBuilder, NoopObserver};
//!
//! # fn main() -> anyhow::Result<()> {
//! let cache = CacheManagerBuilder::new()
//!     .with_config(CacheConfig::default())
//!     .with_backend(Arc::new(DashMapBackend::new()))
//!     .with_observer(Arc::new(NoopObserver))
//!     .build()?;
//! # drop(cache);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tracing::info;

use crate::cache_manager::CacheManager;
use crate::config::CacheConfig;
use crate::error::Result;
use crate::observer::{CacheObserver, TracingObserver};
use crate::traits::DistributedBackend;

/// Builder for [`CacheManager`]
///
/// # Default Behavior
///
/// - **Config**: [`CacheConfig::from_env`]
/// - **Backend**: `RedisBackend` built from the config's Redis settings
///   (requires the `redis` feature)
/// - **Observer**: [`TracingObserver`]
#[derive(Default)]
pub struct CacheManagerBuilder {
    config: Option<CacheConfig>,
    backend: Option<Arc<dyn DistributedBackend>>,
    observer: Option<Arc<dyn CacheObserver>>,
}

impl CacheManagerBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use explicit configuration instead of reading the environment
    #[must_use]
    pub fn with_config(mut self, config: CacheConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Configure a custom distributed (L2) backend
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn DistributedBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Receive hit/miss/set/delete/error events
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn CacheObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Build the manager; call [`CacheManager::init`] before use
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Configuration`](crate::CacheError::Configuration)
    /// if the configuration is invalid, the Redis URL is malformed, or no
    /// backend was given and the `redis` feature is disabled.
    pub fn build(self) -> Result<CacheManager> {
        let config = match self.config {
            Some(config) => config,
            None => CacheConfig::from_env()?,
        };

        let backend = match self.backend {
            Some(backend) => {
                info!(backend = backend.name(), "Using custom L2 backend");
                backend
            }
            None => default_backend(&config)?,
        };

        let observer = self
            .observer
            .unwrap_or_else(|| Arc::new(TracingObserver) as Arc<dyn CacheObserver>);

        CacheManager::new(config, backend, observer)
    }
}

#[cfg(feature = "redis")]
fn default_backend(config: &CacheConfig) -> Result<Arc<dyn DistributedBackend>> {
    let backend = crate::backends::RedisBackend::new(&config.redis)
        .map_err(|e| crate::error::CacheError::config(format!("{e:#}")))?;
    info!("Using default L2 backend (Redis)");
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "redis"))]
fn default_backend(_config: &CacheConfig) -> Result<Arc<dyn DistributedBackend>> {
    Err(crate::error::CacheError::config(
        "no L2 backend configured and the `redis` feature is disabled",
    ))
}
