//! Basic Usage Example
//!
//! Demonstrates the cache-aside facade, domain helpers, invalidation and
//! health reporting. Works without Redis too: the cache then runs degraded
//! on L1 alone.
//!
//! Run with: cargo run --example basic_usage

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tiered_cache::{CacheManagerBuilder, CacheOptions, KeyType};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct User {
    id: u64,
    name: String,
    email: String,
}

async fn load_user_from_db(id: u64) -> anyhow::Result<User> {
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(User {
        id,
        name: "Alice".to_string(),
        email: "alice@example.com".to_string(),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tiered_cache::logging::init_tracing("tiered_cache=info");
    println!("=== Tiered Cache: Basic Usage ===\n");

    // 1. Build from environment (REDIS_URL, CACHE_L1_TTL, ...) and connect
    let cache = CacheManagerBuilder::new().build()?;
    cache.init().await;

    let health = cache.get_health();
    println!("Health: {}\n", serde_json::to_string_pretty(&health)?);

    // 2. Cache-aside: the loader runs only on a miss
    let key = KeyType::User.key(1);
    let opts = CacheOptions::new().ttl(Duration::from_secs(600)).tag("user");
    for attempt in 1..=2 {
        let started = std::time::Instant::now();
        let user: User = cache.get_or_set(&key, &opts, || load_user_from_db(1)).await?;
        println!("Attempt {attempt}: {} in {:?}", user.name, started.elapsed());
    }
    println!();

    // 3. Domain helpers pick key, tags and TTL
    let referrals = vec![2_u64, 3, 5];
    cache.cache_referrals(1, &referrals).await;
    println!("Referrals: {:?}", cache.get_referrals::<Vec<u64>>(1).await);

    let removed = cache.invalidate_user(1).await;
    println!("invalidate_user(1) removed {removed:?}");
    println!("Referrals after invalidation: {:?}\n", cache.get_referrals::<Vec<u64>>(1).await);

    // 4. Statistics
    let stats = cache.get_stats();
    println!("=== Cache Statistics ===");
    println!("Requests: {}", stats.overall.total_requests);
    println!("L1 hits: {}", stats.overall.l1_hits);
    println!("L2 hits: {}", stats.overall.l2_hits);
    println!("Misses: {}", stats.overall.misses);
    println!("Hit rate: {:.2}%", stats.overall.hit_rate);
    println!("Circuit: {}", stats.l2.circuit_breaker.state);

    cache.shutdown().await;
    Ok(())
}
