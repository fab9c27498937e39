//! Integration tests against a live Redis server
//!
//! Ignored by default. Run with a server reachable at `REDIS_URL`:
//!
//! ```text
//! REDIS_URL=redis://127.0.0.1:6379/15 cargo test --test integration_redis -- --ignored
//! ```
//!
//! The database is flushed by these tests; point them at a scratch DB.

#![cfg(feature = "redis")]

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use tiered_cache::backends::RedisBackend;
use tiered_cache::{
    CacheManager, CacheOptions, DistributedBackend, HealthStatus, InvalidationCount, NoopObserver,
};

async fn setup_redis_cache() -> (CacheManager, Arc<RedisBackend>) {
    tiered_cache::logging::init_tracing("tiered_cache=debug");
    let backend = Arc::new(RedisBackend::with_url(&redis_url()).expect("valid REDIS_URL"));
    let cache = CacheManager::new(test_config(), backend.clone(), Arc::new(NoopObserver))
        .expect("valid test config");
    cache.init().await;
    assert!(cache.l2().is_connected(), "Redis not reachable at {}", redis_url());
    (cache, backend)
}

#[tokio::test]
#[ignore = "requires a running Redis server"]
async fn test_redis_round_trip_and_promotion() {
    let (cache, backend) = setup_redis_cache().await;
    let key = test_key("redis_rt");
    let user = test_data::User::new(1);

    assert!(cache.set(&key, &user, &CacheOptions::new().l2_ttl(Duration::from_secs(60))).await);

    let raw = backend.get(&key).await.expect("redis get").expect("stored");
    assert_eq!(serde_json::from_str::<test_data::User>(&raw).expect("json"), user);

    cache.l1().flush();
    let fetched: Option<test_data::User> = cache.get(&key, &CacheOptions::new()).await;
    assert_eq!(fetched, Some(user));
    assert!(cache.l1().contains_key(&key));

    assert!(cache.delete(&key).await);
    assert!(backend.get(&key).await.expect("redis get").is_none());
    assert_eq!(cache.get_health().status, HealthStatus::Healthy);
}

#[tokio::test]
#[ignore = "requires a running Redis server"]
async fn test_redis_pattern_invalidation() {
    let (cache, _backend) = setup_redis_cache().await;
    let prefix = test_key("redis_pattern");

    for i in 0..150 {
        cache.set(&format!("{prefix}:{i}"), &i, &CacheOptions::new()).await;
    }

    let removed = cache.invalidate_by_pattern(&format!("{prefix}:*")).await;
    assert_eq!(removed, InvalidationCount { l1: 150, l2: 150 });
}

#[tokio::test]
#[ignore = "requires a running Redis server"]
async fn test_redis_flush_and_shutdown() {
    let (cache, backend) = setup_redis_cache().await;
    cache.set(&test_key("flush"), &1, &CacheOptions::new()).await;

    assert!(cache.flush().await);
    assert!(backend.scan_keys("*").await.expect("scan").is_empty());

    cache.shutdown().await;
    assert!(!cache.l2().is_connected());
}
