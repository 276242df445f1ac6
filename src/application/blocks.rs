//! Fail-open access to the block list.

use crate::application::circuit_breaker::{report_store_failure, CircuitBreaker, StoreSettings};
use crate::application::metrics::Metrics;
use crate::application::ports::{BlockEntry, BlockStore};
use crate::domain::event::Severity;
use std::sync::Arc;
use std::time::Duration;

/// Wraps a [`BlockStore`] with a deadline and circuit breaker.
///
/// Reads fail open: an unreachable backend reports "not blocked".
#[derive(Debug, Clone)]
pub struct BlockAdapter {
    store: Arc<dyn BlockStore>,
    breaker: Arc<CircuitBreaker>,
    timeout: Duration,
    metrics: Metrics,
}

impl BlockAdapter {
    pub fn new(store: Arc<dyn BlockStore>, settings: StoreSettings, metrics: Metrics) -> Self {
        Self {
            store,
            breaker: Arc::new(CircuitBreaker::with_config(settings.circuit_breaker)),
            timeout: settings.timeout,
            metrics,
        }
    }

    /// Block `actor_key` for `duration`. Returns the stored entry, or `None`
    /// if the backend rejected the write.
    pub async fn block(
        &self,
        actor_key: &str,
        duration: Duration,
        reason: &str,
        severity: Severity,
    ) -> Option<BlockEntry> {
        let call = self.store.set_block(actor_key, duration, reason, severity);
        match self.breaker.call(self.timeout, call).await {
            Ok(entry) => {
                tracing::warn!(
                    actor = actor_key,
                    reason,
                    severity = severity.as_str(),
                    duration_secs = duration.as_secs(),
                    "Actor blocked"
                );
                Some(entry)
            }
            Err(e) => {
                report_store_failure(&self.metrics, "block", "set_block", actor_key, &e);
                None
            }
        }
    }

    pub async fn is_blocked(&self, actor_key: &str) -> bool {
        match self
            .breaker
            .call(self.timeout, self.store.is_blocked(actor_key))
            .await
        {
            Ok(blocked) => blocked,
            Err(e) => {
                report_store_failure(&self.metrics, "block", "is_blocked", actor_key, &e);
                false
            }
        }
    }

    /// Look up the active block, if any. Fails open to `None`.
    pub async fn get(&self, actor_key: &str) -> Option<BlockEntry> {
        match self
            .breaker
            .call(self.timeout, self.store.get_block(actor_key))
            .await
        {
            Ok(entry) => entry,
            Err(e) => {
                report_store_failure(&self.metrics, "block", "get_block", actor_key, &e);
                None
            }
        }
    }

    /// Lift a block early. Returns whether a block was removed.
    pub async fn unblock(&self, actor_key: &str) -> bool {
        match self
            .breaker
            .call(self.timeout, self.store.unblock(actor_key))
            .await
        {
            Ok(removed) => {
                if removed {
                    tracing::info!(actor = actor_key, "Actor unblocked");
                }
                removed
            }
            Err(e) => {
                report_store_failure(&self.metrics, "block", "unblock", actor_key, &e);
                false
            }
        }
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }
}
