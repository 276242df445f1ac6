//! Best-effort writes to the security event log.

use crate::application::circuit_breaker::{report_store_failure, CircuitBreaker, StoreSettings};
use crate::application::metrics::Metrics;
use crate::application::ports::{EventLog, StoreError};
use crate::domain::event::SecurityEvent;
use std::sync::Arc;
use std::time::Duration;

/// Wraps an [`EventLog`] with a deadline and circuit breaker.
///
/// Appends never fail from the caller's point of view; dropped events are
/// counted and logged. Reads surface the error so the caller picks its own
/// fallback.
#[derive(Debug, Clone)]
pub struct EventLogAdapter {
    log: Arc<dyn EventLog>,
    breaker: Arc<CircuitBreaker>,
    timeout: Duration,
    metrics: Metrics,
}

impl EventLogAdapter {
    pub fn new(log: Arc<dyn EventLog>, settings: StoreSettings, metrics: Metrics) -> Self {
        Self {
            log,
            breaker: Arc::new(CircuitBreaker::with_config(settings.circuit_breaker)),
            timeout: settings.timeout,
            metrics,
        }
    }

    /// Record an event. Returns whether it was persisted.
    pub async fn append(&self, event: SecurityEvent) -> bool {
        tracing::info!(
            event_type = event.event_type.as_str(),
            actor = %event.actor_key,
            severity = event.severity.as_str(),
            resource = event.resource.as_deref().unwrap_or("-"),
            "Security event"
        );

        let actor = event.actor_key.clone();
        match self.breaker.call(self.timeout, self.log.append(event)).await {
            Ok(()) => true,
            Err(e) => {
                report_store_failure(&self.metrics, "event_log", "append", &actor, &e);
                self.metrics.record_event_dropped();
                false
            }
        }
    }

    /// Events for `actor_key` at or after `since_ms`.
    pub async fn recent(
        &self,
        actor_key: &str,
        since_ms: u64,
    ) -> Result<Vec<SecurityEvent>, StoreError> {
        let result = self
            .breaker
            .call(self.timeout, self.log.recent(actor_key, since_ms))
            .await;
        if let Err(e) = &result {
            report_store_failure(&self.metrics, "event_log", "recent", actor_key, e);
        }
        result
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::{SecurityEventType, Severity};
    use crate::infrastructure::memory::InMemoryEventLog;
    use crate::infrastructure::mocks::FaultyStore;

    #[tokio::test]
    async fn test_append_and_recent() {
        let log = EventLogAdapter::new(
            Arc::new(InMemoryEventLog::new()),
            StoreSettings::default(),
            Metrics::new(),
        );

        let old = SecurityEvent::new(SecurityEventType::AuthFailure, "ip:1.1.1.1", Severity::Low, 1_000);
        let new = SecurityEvent::new(SecurityEventType::AuthFailure, "ip:1.1.1.1", Severity::Low, 5_000);
        assert!(log.append(old).await);
        assert!(log.append(new.clone()).await);

        let events = log.recent("ip:1.1.1.1", 2_000).await.unwrap();
        assert_eq!(events, vec![new]);
        assert!(log.recent("ip:2.2.2.2", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_events_are_counted() {
        let metrics = Metrics::new();
        let log = EventLogAdapter::new(
            Arc::new(FaultyStore::failing()),
            StoreSettings::default(),
            metrics.clone(),
        );

        let event = SecurityEvent::new(SecurityEventType::AuthFailure, "ip:1.1.1.1", Severity::Low, 0);
        assert!(!log.append(event).await);
        assert!(log.recent("ip:1.1.1.1", 0).await.is_err());
        assert_eq!(metrics.events_dropped(), 1);
        assert_eq!(metrics.store_failures(), 2);
    }
}
