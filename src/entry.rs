//! Cache Entry
//!
//! Value container stored by the L1 cache.

use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;

/// Cache entry with TTL, tag and access information
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: serde_json::Value,
    pub created_at: Instant,
    /// Always `created_at + ttl`
    pub expires_at: Instant,
    pub tags: HashSet<String>,
    /// Byte length of the serialized value
    pub size: usize,
    pub access_count: u64,
    pub last_accessed: Instant,
    /// Store-wide access sequence number, orders entries touched within the same instant
    pub(crate) access_seq: u64,
}

impl CacheEntry {
    pub fn new(value: serde_json::Value, ttl: Duration, tags: HashSet<String>, size: usize) -> Self {
        let now = Instant::now();
        Self {
            value,
            created_at: now,
            expires_at: now + ttl,
            tags,
            size,
            access_count: 0,
            last_accessed: now,
            access_seq: 0,
        }
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    #[must_use]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now > self.expires_at
    }

    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Time left before expiry, zero once expired
    #[must_use]
    pub fn remaining_ttl(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    pub(crate) fn touch(&mut self, seq: u64) {
        self.access_count += 1;
        self.last_accessed = Instant::now();
        self.access_seq = seq;
    }
}
