//! Fail-open access to the fixed-window counter backend.

use crate::application::circuit_breaker::{report_store_failure, CircuitBreaker, StoreSettings};
use crate::application::metrics::Metrics;
use crate::application::ports::{CounterSnapshot, CounterStore, StoreError};
use std::sync::Arc;
use std::time::Duration;

/// Wraps a [`CounterStore`] with a deadline and circuit breaker.
///
/// `increment` never fails: when the backend is unreachable it reports a
/// degraded snapshot with `count = 0`, which every caller treats as under
/// any limit.
#[derive(Debug, Clone)]
pub struct CounterAdapter {
    store: Arc<dyn CounterStore>,
    breaker: Arc<CircuitBreaker>,
    timeout: Duration,
    metrics: Metrics,
}

impl CounterAdapter {
    pub fn new(store: Arc<dyn CounterStore>, settings: StoreSettings, metrics: Metrics) -> Self {
        Self {
            store,
            breaker: Arc::new(CircuitBreaker::with_config(settings.circuit_breaker)),
            timeout: settings.timeout,
            metrics,
        }
    }

    /// Increment `key` in a window of `window`, failing open.
    pub async fn increment(&self, key: &str, window: Duration) -> CounterSnapshot {
        match self.try_increment(key, window).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                report_store_failure(&self.metrics, "counter", "increment", key, &e);
                CounterSnapshot::fail_open(window)
            }
        }
    }

    /// Increment without the fail-open fallback.
    pub async fn try_increment(
        &self,
        key: &str,
        window: Duration,
    ) -> Result<CounterSnapshot, StoreError> {
        self.breaker
            .call(self.timeout, self.store.increment(key, window))
            .await
    }

    /// Delete the counter for `key`. Returns whether the store confirmed it.
    pub async fn reset(&self, key: &str) -> bool {
        match self.breaker.call(self.timeout, self.store.reset(key)).await {
            Ok(()) => true,
            Err(e) => {
                report_store_failure(&self.metrics, "counter", "reset", key, &e);
                false
            }
        }
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }
}
