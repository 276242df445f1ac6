//! Counters describing gatekeeper decisions and backend health.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Decision and degradation counters.
///
/// Cloning is cheap; all clones share the same atomics.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    requests_allowed: AtomicU64,
    requests_throttled: AtomicU64,
    requests_blocked: AtomicU64,
    /// Store calls that failed, timed out or were skipped by an open circuit
    store_failures: AtomicU64,
    /// Security events that could not be written
    events_dropped: AtomicU64,
    hook_failures: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::default()),
        }
    }

    pub(crate) fn record_allowed(&self) {
        self.inner.requests_allowed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_throttled(&self) {
        self.inner.requests_throttled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_blocked(&self) {
        self.inner.requests_blocked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_store_failure(&self) {
        self.inner.store_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_event_dropped(&self) {
        self.inner.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_hook_failure(&self) {
        self.inner.hook_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests_allowed(&self) -> u64 {
        self.inner.requests_allowed.load(Ordering::Relaxed)
    }

    pub fn requests_throttled(&self) -> u64 {
        self.inner.requests_throttled.load(Ordering::Relaxed)
    }

    pub fn requests_blocked(&self) -> u64 {
        self.inner.requests_blocked.load(Ordering::Relaxed)
    }

    pub fn store_failures(&self) -> u64 {
        self.inner.store_failures.load(Ordering::Relaxed)
    }

    pub fn events_dropped(&self) -> u64 {
        self.inner.events_dropped.load(Ordering::Relaxed)
    }

    pub fn hook_failures(&self) -> u64 {
        self.inner.hook_failures.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_allowed: self.requests_allowed(),
            requests_throttled: self.requests_throttled(),
            requests_blocked: self.requests_blocked(),
            store_failures: self.store_failures(),
            events_dropped: self.events_dropped(),
            hook_failures: self.hook_failures(),
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.inner.requests_allowed.store(0, Ordering::Relaxed);
        self.inner.requests_throttled.store(0, Ordering::Relaxed);
        self.inner.requests_blocked.store(0, Ordering::Relaxed);
        self.inner.store_failures.store(0, Ordering::Relaxed);
        self.inner.events_dropped.store(0, Ordering::Relaxed);
        self.inner.hook_failures.store(0, Ordering::Relaxed);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub requests_allowed: u64,
    pub requests_throttled: u64,
    pub requests_blocked: u64,
    pub store_failures: u64,
    pub events_dropped: u64,
    pub hook_failures: u64,
}

impl MetricsSnapshot {
    /// Requests decided so far.
    pub fn total_requests(&self) -> u64 {
        self.requests_allowed
            .saturating_add(self.requests_throttled)
            .saturating_add(self.requests_blocked)
    }

    /// Fraction of decided requests that were throttled (0.0 to 1.0).
    pub fn throttle_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            0.0
        } else {
            self.requests_throttled as f64 / total as f64
        }
    }

    /// Fraction of decided requests that were rejected either way.
    pub fn rejection_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            0.0
        } else {
            (self.requests_throttled + self.requests_blocked) as f64 / total as f64
        }
    }
}
