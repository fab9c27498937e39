//! Cache Configuration
//!
//! Environment-style configuration with defaults for every knob. Values are
//! read through a lookup function so tests can supply their own variables
//! without touching the process environment.

use std::str::FromStr;
use std::time::Duration;

use crate::error::{CacheError, Result};

/// Connection settings for the Redis-compatible L2 backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    /// Full connection URL; takes precedence over the individual fields
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    /// Logical database selector
    pub db: u32,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            db: 0,
        }
    }
}

impl RedisConfig {
    /// Connection string for the redis client
    #[must_use]
    pub fn connection_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        match &self.password {
            Some(password) => format!("redis://:{password}@{}:{}/{}", self.host, self.port, self.db),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

/// Per-domain time-to-live settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlConfig {
    /// Default L1 TTL, and the ceiling every L1 TTL is clamped to
    pub l1: Duration,
    /// Default L2 TTL
    pub l2: Duration,
    pub session: Duration,
    pub user: Duration,
    pub jobs: Duration,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            l1: Duration::from_secs(300),
            l2: Duration::from_secs(3600),
            session: Duration::from_secs(3600),
            user: Duration::from_secs(1800),
            jobs: Duration::from_secs(300),
        }
    }
}

/// Circuit breaker tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Time the circuit stays open before probing
    pub reset_timeout: Duration,
    /// Probe budget in half-open state; this many successes close the circuit
    pub half_open_requests: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_millis(30_000),
            half_open_requests: 3,
        }
    }
}

/// Bounds and housekeeping for the in-process store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct L1Config {
    pub max_keys: usize,
    pub max_size_bytes: usize,
    /// Interval of the background expiry sweep
    pub cleanup_interval: Duration,
}

impl Default for L1Config {
    fn default() -> Self {
        Self {
            max_keys: 10_000,
            max_size_bytes: 100 * 1024 * 1024,
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

/// Complete cache configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub redis: RedisConfig,
    pub ttl: TtlConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub l1: L1Config,
    /// Upper bound on a single L2 round trip
    pub l2_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis: RedisConfig::default(),
            ttl: TtlConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            l1: L1Config::default(),
            l2_timeout: Duration::from_millis(2000),
        }
    }
}

impl CacheConfig {
    /// Load configuration from process environment variables
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Configuration`] if a variable is present but
    /// cannot be parsed, or if the resulting limits are invalid.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source
    ///
    /// # Errors
    ///
    /// Same as [`CacheConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let env = Lookup(&lookup);

        let config = Self {
            redis: RedisConfig {
                url: env.string("REDIS_URL"),
                host: env.string("REDIS_HOST").unwrap_or(defaults.redis.host),
                port: env.parse("REDIS_PORT")?.unwrap_or(defaults.redis.port),
                password: env.string("REDIS_PASSWORD"),
                db: env.parse("REDIS_DB")?.unwrap_or(defaults.redis.db),
            },
            ttl: TtlConfig {
                l1: env.secs("CACHE_L1_TTL")?.unwrap_or(defaults.ttl.l1),
                l2: env.secs("CACHE_L2_TTL")?.unwrap_or(defaults.ttl.l2),
                session: env.secs("CACHE_SESSION_TTL")?.unwrap_or(defaults.ttl.session),
                user: env.secs("CACHE_USER_TTL")?.unwrap_or(defaults.ttl.user),
                jobs: env.secs("CACHE_JOBS_TTL")?.unwrap_or(defaults.ttl.jobs),
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: env
                    .parse("CIRCUIT_BREAKER_FAILURE_THRESHOLD")?
                    .unwrap_or(defaults.circuit_breaker.failure_threshold),
                reset_timeout: env
                    .millis("CIRCUIT_BREAKER_RESET_TIMEOUT")?
                    .unwrap_or(defaults.circuit_breaker.reset_timeout),
                half_open_requests: env
                    .parse("CIRCUIT_BREAKER_HALF_OPEN_REQUESTS")?
                    .unwrap_or(defaults.circuit_breaker.half_open_requests),
            },
            l1: L1Config {
                max_keys: env.parse("L1_MAX_KEYS")?.unwrap_or(defaults.l1.max_keys),
                max_size_bytes: env
                    .parse("L1_MAX_SIZE_BYTES")?
                    .unwrap_or(defaults.l1.max_size_bytes),
                cleanup_interval: env
                    .secs("CACHE_L1_CLEANUP_INTERVAL")?
                    .unwrap_or(defaults.l1.cleanup_interval),
            },
            l2_timeout: env.millis("CACHE_L2_TIMEOUT_MS")?.unwrap_or(defaults.l2_timeout),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject limits the cache cannot operate with
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Configuration`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.l1.max_keys == 0 {
            return Err(CacheError::config("L1_MAX_KEYS must be greater than zero"));
        }
        if self.l1.max_size_bytes == 0 {
            return Err(CacheError::config("L1_MAX_SIZE_BYTES must be greater than zero"));
        }
        if self.l1.cleanup_interval.is_zero() {
            return Err(CacheError::config("CACHE_L1_CLEANUP_INTERVAL must be greater than zero"));
        }
        if self.ttl.l1.is_zero() {
            return Err(CacheError::config("CACHE_L1_TTL must be greater than zero"));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(CacheError::config(
                "CIRCUIT_BREAKER_FAILURE_THRESHOLD must be greater than zero",
            ));
        }
        if self.circuit_breaker.half_open_requests == 0 {
            return Err(CacheError::config(
                "CIRCUIT_BREAKER_HALF_OPEN_REQUESTS must be greater than zero",
            ));
        }
        if self.l2_timeout.is_zero() {
            return Err(CacheError::config("CACHE_L2_TIMEOUT_MS must be greater than zero"));
        }
        Ok(())
    }
}

struct Lookup<'a, F>(&'a F);

impl<F> Lookup<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn parse<T: FromStr>(&self, name: &str) -> Result<Option<T>> {
        self.string(name)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|_| CacheError::config(format!("{name} has invalid value '{raw}'")))
            })
            .transpose()
    }

    fn secs(&self, name: &str) -> Result<Option<Duration>> {
        Ok(self.parse::<u64>(name)?.map(Duration::from_secs))
    }

    fn millis(&self, name: &str) -> Result<Option<Duration>> {
        Ok(self.parse::<u64>(name)?.map(Duration::from_millis))
    }
}
