//! Common utilities for integration tests
//!
//! Shared test infrastructure:
//! - Cache managers over the in-process `DashMap` backend
//! - Observer that records events
//! - Test data generators

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tiered_cache::backends::DashMapBackend;
use tiered_cache::{
    CacheConfig, CacheManager, CacheObserver, CacheTier, CircuitBreakerConfig, L1Config, TtlConfig,
};

/// Get Redis URL from environment or use default
pub fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

/// Create a test key with a random suffix
pub fn test_key(name: &str) -> String {
    format!("test_{}_{}", name, rand::random::<u32>())
}

/// Small, fast-tripping configuration for tests
pub fn test_config() -> CacheConfig {
    CacheConfig {
        ttl: TtlConfig {
            l1: Duration::from_secs(300),
            l2: Duration::from_secs(3600),
            session: Duration::from_secs(3600),
            user: Duration::from_secs(1800),
            jobs: Duration::from_secs(300),
        },
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(30),
            half_open_requests: 1,
        },
        l1: L1Config {
            max_keys: 1000,
            max_size_bytes: 10 * 1024 * 1024,
            cleanup_interval: Duration::from_secs(60),
        },
        l2_timeout: Duration::from_millis(500),
        ..CacheConfig::default()
    }
}

/// Initialize a cache manager over a fresh `DashMap` backend
pub async fn setup_cache() -> (CacheManager, Arc<DashMapBackend>) {
    setup_cache_with(test_config()).await
}

pub async fn setup_cache_with(config: CacheConfig) -> (CacheManager, Arc<DashMapBackend>) {
    setup_cache_observed(config, Arc::new(tiered_cache::NoopObserver)).await
}

pub async fn setup_cache_observed(
    config: CacheConfig,
    observer: Arc<dyn CacheObserver>,
) -> (CacheManager, Arc<DashMapBackend>) {
    tiered_cache::logging::init_tracing("tiered_cache=debug");
    let backend = Arc::new(DashMapBackend::new());
    let cache = CacheManager::new(config, backend.clone(), observer).expect("valid test config");
    cache.init().await;
    (cache, backend)
}

/// Observer event as recorded by [`RecordingObserver`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Hit(String, CacheTier),
    Miss(String),
    Set(String),
    Delete(String),
    Error(CacheTier, String),
}

/// Observer that keeps every event in order
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Event>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn errors(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| matches!(event, Event::Error(..)))
            .count()
    }
}

impl CacheObserver for RecordingObserver {
    fn on_hit(&self, key: &str, tier: CacheTier) {
        self.events.lock().push(Event::Hit(key.to_string(), tier));
    }

    fn on_miss(&self, key: &str) {
        self.events.lock().push(Event::Miss(key.to_string()));
    }

    fn on_set(&self, key: &str) {
        self.events.lock().push(Event::Set(key.to_string()));
    }

    fn on_delete(&self, key: &str) {
        self.events.lock().push(Event::Delete(key.to_string()));
    }

    fn on_error(&self, tier: CacheTier, operation: &str, _error: &anyhow::Error) {
        self.events.lock().push(Event::Error(tier, operation.to_string()));
    }
}

/// Generate test data of various types
pub mod test_data {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct User {
        pub id: u64,
        pub name: String,
        pub email: String,
    }

    impl User {
        pub fn new(id: u64) -> Self {
            Self {
                id,
                name: format!("User {id}"),
                email: format!("user{id}@example.com"),
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct Job {
        pub id: u64,
        pub title: String,
    }

    impl Job {
        pub fn new(id: u64) -> Self {
            Self {
                id,
                title: format!("Job {id}"),
            }
        }
    }

    /// Generate JSON test data
    pub fn json_user(id: u64) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "name": format!("User {id}"),
            "email": format!("user{id}@example.com"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_generation() {
        let key1 = test_key("user");
        let key2 = test_key("user");
        assert_ne!(key1, key2, "Keys should be unique");
        assert!(key1.starts_with("test_user_"));
    }
}
