//! L1 Cache - In-Process Store
//!
//! Hot-key cache bounded by key count and byte size. Eviction removes the
//! least recently accessed entry. Entries carry tags so related keys can be
//! dropped together.
//!
//! The map, the tag index and the running byte total live behind a single
//! mutex; every operation holds it only for one short, non-blocking section.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::L1Config;
use crate::entry::CacheEntry;
use crate::error::{CacheError, Result};
use crate::pattern::glob_to_regex;

#[derive(Default)]
struct Store {
    entries: HashMap<String, CacheEntry>,
    /// tag -> keys whose current entry carries the tag
    tags: HashMap<String, HashSet<String>>,
    total_size: usize,
    access_seq: u64,
}

impl Store {
    fn next_seq(&mut self) -> u64 {
        self.access_seq += 1;
        self.access_seq
    }

    /// Remove an entry and every index/size trace of it
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.total_size = self.total_size.saturating_sub(entry.size);
        for tag in &entry.tags {
            if let Some(keys) = self.tags.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.tags.remove(tag);
                }
            }
        }
        Some(entry)
    }

    fn least_recently_accessed(&self) -> Option<String> {
        self.entries
            .iter()
            .min_by_key(|(_, entry)| (entry.last_accessed, entry.access_seq))
            .map(|(key, _)| key.clone())
    }
}

/// L1 cache with LRU eviction under dual limits and a tag index
pub struct L1Cache {
    store: Mutex<Store>,
    max_keys: usize,
    max_size_bytes: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl L1Cache {
    /// Create a new L1 cache
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Configuration`] if either ceiling is zero.
    pub fn new(config: L1Config) -> Result<Self> {
        if config.max_keys == 0 || config.max_size_bytes == 0 {
            return Err(CacheError::config("L1 key and size ceilings must be greater than zero"));
        }

        debug!(
            max_keys = config.max_keys,
            max_size_bytes = config.max_size_bytes,
            "L1 cache initialized"
        );

        Ok(Self {
            store: Mutex::new(Store::default()),
            max_keys: config.max_keys,
            max_size_bytes: config.max_size_bytes,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        })
    }

    /// Get a value, lazily dropping it if expired
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        let mut store = self.store.lock();

        let expired = match store.entries.get(key) {
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Some(entry) => entry.is_expired(),
        };

        if expired {
            store.remove(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let seq = store.next_seq();
        let entry = store.entries.get_mut(key)?;
        entry.touch(seq);
        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(entry.value.clone())
    }

    /// Insert or replace a value, evicting LRU entries to make room
    pub fn set(&self, key: &str, value: serde_json::Value, ttl: Duration, tags: &[String]) {
        let size = serde_json::to_vec(&value).map_or(0, |bytes| bytes.len());
        let mut entry = CacheEntry::new(value, ttl, tags.iter().cloned().collect(), size);

        let mut store = self.store.lock();
        self.ensure_space(&mut store, key);

        // Drops the previous entry's size and stale tag associations
        store.remove(key);

        entry.access_seq = store.next_seq();
        for tag in &entry.tags {
            store
                .tags
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
        store.total_size += size;
        store.entries.insert(key.to_string(), entry);
        drop(store);

        self.sets.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, ttl_secs = ttl.as_secs(), size, "[L1] Cached key with TTL");
    }

    fn ensure_space(&self, store: &mut Store, key: &str) {
        if store.entries.contains_key(key) {
            return;
        }
        while store.entries.len() >= self.max_keys || store.total_size >= self.max_size_bytes {
            let Some(victim) = store.least_recently_accessed() else {
                break;
            };
            store.remove(&victim);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(key = %victim, "[L1] Evicted least recently accessed key");
        }
    }

    /// Remove a key; `true` if it was present
    pub fn delete(&self, key: &str) -> bool {
        let removed = self.store.lock().remove(key).is_some();
        if removed {
            self.deletes.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Remove every key carrying `tag`
    pub fn invalidate_by_tag(&self, tag: &str) -> usize {
        let mut store = self.store.lock();
        let Some(keys) = store.tags.remove(tag) else {
            return 0;
        };
        let removed = keys
            .iter()
            .filter(|key| store.remove(key).is_some())
            .count();
        drop(store);

        self.deletes.fetch_add(removed as u64, Ordering::Relaxed);
        debug!(tag = %tag, count = removed, "[L1] Invalidated keys by tag");
        removed
    }

    /// Remove every key matching a glob pattern
    pub fn invalidate_by_pattern(&self, pattern: &str) -> usize {
        let regex = match glob_to_regex(pattern) {
            Ok(regex) => regex,
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "[L1] Unusable invalidation pattern");
                return 0;
            }
        };

        let mut store = self.store.lock();
        let matching: Vec<String> = store
            .entries
            .keys()
            .filter(|key| regex.is_match(key))
            .cloned()
            .collect();
        for key in &matching {
            store.remove(key);
        }
        drop(store);

        self.deletes.fetch_add(matching.len() as u64, Ordering::Relaxed);
        debug!(pattern = %pattern, count = matching.len(), "[L1] Invalidated keys by pattern");
        matching.len()
    }

    /// Drop all entries, tags and size accounting
    pub fn flush(&self) {
        *self.store.lock() = Store::default();
        debug!("[L1] Flushed");
    }

    /// Remove every expired entry; one pass under the lock
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut store = self.store.lock();
        let expired: Vec<String> = store
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            store.remove(key);
        }
        drop(store);

        if !expired.is_empty() {
            self.expirations.fetch_add(expired.len() as u64, Ordering::Relaxed);
            debug!(count = expired.len(), "[L1] Cleaned up expired entries");
        }
        expired.len()
    }

    /// Presence check that does not touch access metadata or counters
    pub fn contains_key(&self, key: &str) -> bool {
        self.store
            .lock()
            .entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired())
    }

    /// Tags of a live entry, without touching it
    pub fn tags_of(&self, key: &str) -> Option<HashSet<String>> {
        self.store
            .lock()
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.tags.clone())
    }

    /// Keys currently indexed under `tag`
    pub fn keys_for_tag(&self, tag: &str) -> HashSet<String> {
        self.store.lock().tags.get(tag).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.store.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.lock().entries.is_empty()
    }

    /// Tracked byte size of all stored values
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.store.lock().total_size
    }

    pub fn stats(&self) -> L1Stats {
        let (keys, size_bytes, tags) = {
            let store = self.store.lock();
            (store.entries.len(), store.total_size, store.tags.len())
        };
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        L1Stats {
            hits,
            misses,
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            hit_rate: hit_rate(hits, misses),
            keys,
            size_bytes,
            tags,
            max_keys: self.max_keys,
            max_size_bytes: self.max_size_bytes,
        }
    }
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        (hits as f64 / total as f64) * 100.0
    }
}

/// L1 statistics snapshot
#[derive(Debug, Clone, Serialize)]
pub struct L1Stats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub hit_rate: f64,
    pub keys: usize,
    pub size_bytes: usize,
    pub tags: usize,
    pub max_keys: usize,
    pub max_size_bytes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache(max_keys: usize, max_size_bytes: usize) -> L1Cache {
        L1Cache::new(L1Config {
            max_keys,
            max_size_bytes,
            cleanup_interval: Duration::from_secs(60),
        })
        .unwrap()
    }

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| (*t).to_string()).collect()
    }

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn test_zero_ceiling_is_rejected() {
        assert!(L1Cache::new(L1Config { max_keys: 0, ..L1Config::default() }).is_err());
        assert!(L1Cache::new(L1Config { max_size_bytes: 0, ..L1Config::default() }).is_err());
    }

    #[test]
    fn test_set_then_get() {
        let l1 = cache(10, 1024);
        l1.set("a", json!({"n": 1}), TTL, &[]);
        assert_eq!(l1.get("a"), Some(json!({"n": 1})));
        assert_eq!(l1.get("b"), None);

        let stats = l1.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.sets, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_a_miss() {
        let l1 = cache(10, 1024);
        l1.set("a", json!(1), Duration::from_secs(1), &tags(&["t"]));

        tokio::time::advance(Duration::from_millis(1001)).await;

        assert_eq!(l1.get("a"), None);
        assert!(l1.is_empty());
        assert_eq!(l1.size_bytes(), 0);
        assert!(l1.keys_for_tag("t").is_empty());
        assert_eq!(l1.stats().expirations, 1);
    }

    #[test]
    fn test_lru_evicts_least_recently_accessed() {
        let l1 = cache(2, 1024 * 1024);
        l1.set("A", json!(1), TTL, &[]);
        l1.set("B", json!(2), TTL, &[]);
        assert!(l1.get("A").is_some());

        l1.set("C", json!(3), TTL, &[]);

        assert!(l1.contains_key("A"));
        assert!(!l1.contains_key("B"));
        assert!(l1.contains_key("C"));
        assert_eq!(l1.stats().evictions, 1);
    }

    #[test]
    fn test_overwrite_at_capacity_does_not_evict() {
        let l1 = cache(2, 1024 * 1024);
        l1.set("A", json!(1), TTL, &[]);
        l1.set("B", json!(2), TTL, &[]);
        l1.set("A", json!(10), TTL, &[]);

        assert_eq!(l1.len(), 2);
        assert_eq!(l1.get("A"), Some(json!(10)));
        assert!(l1.contains_key("B"));
        assert_eq!(l1.stats().evictions, 0);
    }

    #[test]
    fn test_size_ceiling_triggers_eviction() {
        // "aaaaaaaa" serializes to 10 bytes
        let l1 = cache(100, 25);
        l1.set("k1", json!("aaaaaaaa"), TTL, &[]);
        l1.set("k2", json!("aaaaaaaa"), TTL, &[]);
        assert_eq!(l1.size_bytes(), 20);

        l1.set("k3", json!("aaaaaaaa"), TTL, &[]);
        assert_eq!(l1.size_bytes(), 30);
        assert_eq!(l1.len(), 3);

        // total now at/above ceiling: next insert evicts until below it
        l1.set("k4", json!("aaaaaaaa"), TTL, &[]);
        assert!(!l1.contains_key("k1"));
        assert!(l1.contains_key("k2"));
        assert!(l1.contains_key("k4"));
        assert_eq!(l1.size_bytes(), 30);
        assert_eq!(l1.stats().evictions, 1);
    }

    #[test]
    fn test_overwrite_replaces_size_and_tags() {
        let l1 = cache(10, 1024);
        l1.set("a", json!("xxxx"), TTL, &tags(&["old", "shared"]));
        l1.set("a", json!("yy"), TTL, &tags(&["new", "shared"]));

        assert_eq!(l1.size_bytes(), 4);
        assert!(l1.keys_for_tag("old").is_empty());
        assert!(l1.keys_for_tag("new").contains("a"));
        assert!(l1.keys_for_tag("shared").contains("a"));
        assert_eq!(l1.stats().tags, 2);
    }

    #[test]
    fn test_delete_cleans_tag_index() {
        let l1 = cache(10, 1024);
        l1.set("a", json!(1), TTL, &tags(&["x"]));
        l1.set("b", json!(2), TTL, &tags(&["x"]));

        assert!(l1.delete("a"));
        assert!(!l1.delete("a"));
        assert_eq!(l1.keys_for_tag("x"), HashSet::from(["b".to_string()]));

        assert!(l1.delete("b"));
        assert_eq!(l1.stats().tags, 0);
        assert_eq!(l1.size_bytes(), 0);
    }

    #[test]
    fn test_invalidate_by_tag_is_isolated() {
        let l1 = cache(10, 1024);
        l1.set("a", json!(1), TTL, &tags(&["x"]));
        l1.set("b", json!(2), TTL, &tags(&["y"]));
        l1.set("c", json!(3), TTL, &tags(&["x", "y"]));

        assert_eq!(l1.invalidate_by_tag("x"), 2);
        assert_eq!(l1.get("a"), None);
        assert_eq!(l1.get("b"), Some(json!(2)));
        assert_eq!(l1.keys_for_tag("y"), HashSet::from(["b".to_string()]));
        assert_eq!(l1.invalidate_by_tag("x"), 0);
    }

    #[test]
    fn test_invalidate_by_pattern() {
        let l1 = cache(10, 1024);
        l1.set("user:1", json!(1), TTL, &tags(&["user"]));
        l1.set("user:2", json!(2), TTL, &[]);
        l1.set("session:user:3", json!(3), TTL, &[]);

        assert_eq!(l1.invalidate_by_pattern("user:*"), 2);
        assert!(l1.contains_key("session:user:3"));
        assert!(l1.keys_for_tag("user").is_empty());
    }

    #[test]
    fn test_flush_clears_everything() {
        let l1 = cache(10, 1024);
        l1.set("a", json!(1), TTL, &tags(&["x"]));
        l1.flush();
        assert!(l1.is_empty());
        assert_eq!(l1.size_bytes(), 0);
        assert_eq!(l1.stats().tags, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_expired_removes_unread_entries() {
        let l1 = cache(10, 1024);
        l1.set("short", json!(1), Duration::from_secs(1), &tags(&["t"]));
        l1.set("long", json!(2), Duration::from_secs(120), &tags(&["t"]));

        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(l1.cleanup_expired(), 1);
        assert_eq!(l1.len(), 1);
        assert_eq!(l1.keys_for_tag("t"), HashSet::from(["long".to_string()]));
    }
}
