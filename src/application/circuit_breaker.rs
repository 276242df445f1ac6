//! Circuit breaker guarding store calls.
//!
//! Every call to a counter, block or event backend runs through
//! [`CircuitBreaker::call`], which bounds it with a deadline and tracks
//! consecutive failures. Once the breaker opens, calls are skipped entirely
//! and report [`StoreError::CircuitOpen`], so callers fail open immediately
//! instead of waiting on a dead backend for every request.

use crate::application::metrics::Metrics;
use crate::application::ports::StoreError;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Backend healthy, calls go through
    Closed = 0,
    /// Backend failing, calls are skipped
    Open = 1,
    /// Recovery timeout elapsed, probing the backend
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening circuit
    pub failure_threshold: u32,
    /// Duration to wait before probing the backend again
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

/// Deadline and breaker settings for one store adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    /// Upper bound on a single store call
    pub timeout: Duration,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(250),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

/// Lock-free breaker shared by all calls to one backend.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: AtomicU8,
    consecutive_failures: AtomicU64,
    last_failure_time_nanos: AtomicU64,
    config: CircuitBreakerConfig,
    epoch: Instant,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            state: AtomicU8::new(CircuitState::Closed as u8),
            consecutive_failures: AtomicU64::new(0),
            last_failure_time_nanos: AtomicU64::new(0),
            config,
            epoch: Instant::now(),
        }
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Whether a store call should be attempted right now.
    pub fn allow_request(&self) -> bool {
        match self.state() {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = Instant::now().saturating_duration_since(self.last_failure_time());
                if elapsed < self.config.recovery_timeout {
                    return false;
                }

                // Only one caller moves Open -> HalfOpen
                let result = self.state.compare_exchange(
                    CircuitState::Open as u8,
                    CircuitState::HalfOpen as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
                result.is_ok() || self.state() == CircuitState::HalfOpen
            }
        }
    }

    pub fn record_success(&self) {
        match self.state() {
            CircuitState::HalfOpen => {
                self.consecutive_failures.store(0, Ordering::Release);
                self.state
                    .store(CircuitState::Closed as u8, Ordering::Release);
            }
            CircuitState::Closed => {
                self.consecutive_failures.store(0, Ordering::Release);
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;

        let nanos = Instant::now()
            .duration_since(self.epoch)
            .as_nanos()
            .try_into()
            .unwrap_or(u64::MAX);
        self.last_failure_time_nanos.store(nanos, Ordering::Release);

        match self.state() {
            CircuitState::HalfOpen => {
                self.state
                    .store(CircuitState::Open as u8, Ordering::Release);
            }
            CircuitState::Closed => {
                if failures >= self.config.failure_threshold as u64 {
                    self.state
                        .store(CircuitState::Open as u8, Ordering::Release);
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Run a store call under this breaker with a deadline.
    ///
    /// Errors and timeouts count as failures. Nothing is polled when the
    /// circuit is open.
    pub async fn call<T, F>(&self, timeout: Duration, operation: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        if !self.allow_request() {
            return Err(StoreError::CircuitOpen);
        }

        match tokio::time::timeout(timeout, operation).await {
            Ok(Ok(value)) => {
                self.record_success();
                Ok(value)
            }
            Ok(Err(e)) => {
                self.record_failure();
                Err(e)
            }
            Err(_) => {
                self.record_failure();
                Err(StoreError::Timeout(timeout))
            }
        }
    }

    fn last_failure_time(&self) -> Instant {
        let nanos = self.last_failure_time_nanos.load(Ordering::Acquire);
        self.epoch + Duration::from_nanos(nanos)
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Force the circuit closed.
    pub fn reset(&self) {
        self.state
            .store(CircuitState::Closed as u8, Ordering::Release);
        self.consecutive_failures.store(0, Ordering::Release);
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

/// Count and log a failed store call.
///
/// Calls skipped by an open circuit log at debug; the first failures that
/// tripped the circuit were already reported at error.
pub(crate) fn report_store_failure(
    metrics: &Metrics,
    store: &'static str,
    operation: &'static str,
    key: &str,
    error: &StoreError,
) {
    metrics.record_store_failure();
    match error {
        StoreError::CircuitOpen => tracing::debug!(
            event = "store_unavailable",
            store,
            operation,
            key,
            "Store circuit open, skipping call"
        ),
        _ => tracing::error!(
            event = "store_unavailable",
            store,
            operation,
            key,
            error = %error,
            "Store unavailable, failing open"
        ),
    }
}
