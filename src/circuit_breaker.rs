//! Circuit breaker guarding the L2 backend
//!
//! - CLOSED: normal operation, calls flow through
//! - OPEN: backend considered down, calls are rejected immediately
//! - HALF_OPEN: a limited number of probe calls test recovery
//!
//! Pure state machine: callers ask [`CircuitBreaker::can_execute`] before an
//! operation and report the outcome afterwards.

use std::fmt;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::CircuitBreakerConfig;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_time: Option<Instant>,
    half_open_requests: u32,
    total_failures: u64,
    total_successes: u64,
    rejected: u64,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_time: None,
            half_open_requests: 0,
            total_failures: 0,
            total_successes: 0,
            rejected: 0,
        }
    }
}

/// Three-state failure detector
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerState::new()),
        }
    }

    /// Current state, without triggering the OPEN -> HALF_OPEN transition
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Whether a call may go through right now
    ///
    /// In OPEN state, the first call after the reset timeout moves the circuit
    /// to HALF_OPEN and is let through without using a probe slot. HALF_OPEN
    /// then admits up to `half_open_requests` further calls.
    pub fn can_execute(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let cooled_down = inner
                    .last_failure_time
                    .is_none_or(|at| at.elapsed() >= self.config.reset_timeout);
                if cooled_down {
                    inner.state = CircuitState::HalfOpen;
                    inner.success_count = 0;
                    inner.half_open_requests = 0;
                    debug!("Circuit breaker entering HALF_OPEN");
                    true
                } else {
                    inner.rejected += 1;
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_requests < self.config.half_open_requests {
                    inner.half_open_requests += 1;
                    true
                } else {
                    inner.rejected += 1;
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.total_successes += 1;
        match inner.state {
            CircuitState::Closed => inner.failure_count = 0,
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.half_open_requests {
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.half_open_requests = 0;
                    info!("Circuit breaker recovered to CLOSED");
                }
            }
            // late completion of a call admitted before the circuit opened
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.total_failures += 1;
        inner.failure_count += 1;
        inner.last_failure_time = Some(Instant::now());

        let trip = match inner.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => inner.failure_count >= self.config.failure_threshold,
            CircuitState::Open => false,
        };
        if trip {
            let from = inner.state;
            inner.state = CircuitState::Open;
            inner.success_count = 0;
            inner.half_open_requests = 0;
            warn!(
                from = %from,
                failures = inner.failure_count,
                "Circuit breaker opened"
            );
        }
    }

    /// Force the circuit back to CLOSED with cleared counters
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.half_open_requests = 0;
        inner.last_failure_time = None;
        info!("Circuit breaker reset to CLOSED");
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.lock();
        CircuitBreakerStats {
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            half_open_requests: inner.half_open_requests,
            millis_since_last_failure: inner
                .last_failure_time
                .map(|at| u64::try_from(at.elapsed().as_millis()).unwrap_or(u64::MAX)),
            total_failures: inner.total_failures,
            total_successes: inner.total_successes,
            rejected: inner.rejected,
        }
    }
}

/// Snapshot of breaker state and counters
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub half_open_requests: u32,
    pub millis_since_last_failure: Option<u64>,
    pub total_failures: u64,
    pub total_successes: u64,
    /// Calls refused while OPEN or with the probe budget exhausted
    pub rejected: u64,
}
