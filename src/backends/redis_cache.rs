//! Redis Backend - Distributed Cache Backend
//!
//! Redis-based distributed tier, reached through a shared `ConnectionManager`
//! that reconnects automatically.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use parking_lot::RwLock;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::{debug, info};

use crate::config::RedisConfig;
use crate::traits::DistributedBackend;

/// Redis backend with `ConnectionManager` for automatic reconnection
///
/// The client is created eagerly (no I/O); the connection is opened by
/// [`DistributedBackend::connect`] and dropped by `disconnect`.
pub struct RedisBackend {
    client: Client,
    /// Redis connection manager - cloned per command, shared underneath
    conn_manager: RwLock<Option<ConnectionManager>>,
}

impl RedisBackend {
    /// Create a backend from connection settings
    ///
    /// # Errors
    ///
    /// Returns an error if the connection URL is malformed.
    pub fn new(config: &RedisConfig) -> Result<Self> {
        Self::with_url(&config.connection_url())
    }

    /// Create a backend from a connection URL (e.g. `redis://localhost:6379/0`)
    ///
    /// # Errors
    ///
    /// Returns an error if the connection URL is malformed.
    pub fn with_url(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .with_context(|| format!("Failed to create Redis client for {}", redacted(redis_url)))?;
        Ok(Self {
            client,
            conn_manager: RwLock::new(None),
        })
    }

    fn connection(&self) -> Result<ConnectionManager> {
        self.conn_manager
            .read()
            .clone()
            .ok_or_else(|| anyhow!("Redis connection not established"))
    }
}

fn redacted(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    match rest.rsplit_once('@') {
        Some((_, host)) => format!("{scheme}://***@{host}"),
        None => url.to_string(),
    }
}

#[async_trait]
impl DistributedBackend for RedisBackend {
    async fn connect(&self) -> Result<()> {
        let conn_manager = ConnectionManager::new(self.client.clone())
            .await
            .context("Failed to establish Redis connection manager")?;
        *self.conn_manager.write() = Some(conn_manager);
        self.ping().await.context("Redis PING health check failed")?;
        info!("Redis backend connected (ConnectionManager enabled)");
        Ok(())
    }

    async fn disconnect(&self) {
        if self.conn_manager.write().take().is_some() {
            info!("Redis backend disconnected");
        }
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection()?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection()?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut conn = self.connection()?;
        let _: () = conn.set_ex(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<usize> {
        let mut conn = self.connection()?;
        let count: usize = conn.del(key).await?;
        Ok(count)
    }

    async fn del_many(&self, keys: &[String]) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection()?;
        let count: usize = conn.del(keys).await?;
        debug!(count, "[Redis] Removed keys in bulk");
        Ok(count)
    }

    /// Uses SCAN (cursor-based, non-blocking) rather than KEYS
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.connection()?;
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            // SCAN cursor MATCH pattern COUNT 100
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;

            cursor = next;
            keys.extend(batch);

            // Cursor 0 means iteration is complete
            if cursor == 0 {
                break;
            }
        }

        // SCAN may return a key more than once
        keys.sort_unstable();
        keys.dedup();

        debug!(pattern = %pattern, count = keys.len(), "[Redis] Scanned keys matching pattern");
        Ok(keys)
    }

    async fn flush_db(&self) -> Result<()> {
        let mut conn = self.connection()?;
        let _: () = redis::cmd("FLUSHDB").query_async(&mut conn).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_is_redacted() {
        assert_eq!(redacted("redis://:hunter2@host:6379/0"), "redis://***@host:6379/0");
        assert_eq!(redacted("redis://host:6379"), "redis://host:6379");
    }

    #[tokio::test]
    async fn test_operations_fail_before_connect() {
        let backend = RedisBackend::with_url("redis://127.0.0.1:6379/0").unwrap();
        assert!(backend.get("user:1").await.is_err());
        assert!(backend.ping().await.is_err());
    }
}
