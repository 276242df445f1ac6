//! Severity-weighted scoring of an actor's recent security events.

use crate::application::event_log::EventLogAdapter;
use crate::application::ports::Clock;
use crate::domain::event::SecurityEvent;
use std::sync::Arc;
use std::time::Duration;

/// Settings for suspicion scoring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScorerConfig {
    /// How far back events count toward the score
    pub lookback: Duration,
    /// An actor is suspicious when its score exceeds this value
    pub threshold: u32,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            lookback: Duration::from_secs(60 * 60),
            threshold: 10,
        }
    }
}

/// Result of scoring one actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuspicionVerdict {
    pub score: u32,
    pub event_count: usize,
    pub is_suspicious: bool,
    /// True when the event log could not be read and the verdict defaulted
    pub degraded: bool,
}

impl SuspicionVerdict {
    fn unavailable() -> Self {
        Self {
            score: 0,
            event_count: 0,
            is_suspicious: false,
            degraded: true,
        }
    }
}

/// Sum of severity weights.
pub fn weighted_score(events: &[SecurityEvent]) -> u32 {
    events
        .iter()
        .map(|e| e.severity.weight())
        .fold(0u32, u32::saturating_add)
}

#[derive(Debug, Clone)]
pub struct SuspicionScorer {
    events: EventLogAdapter,
    clock: Arc<dyn Clock>,
    config: ScorerConfig,
}

impl SuspicionScorer {
    pub fn new(events: EventLogAdapter, clock: Arc<dyn Clock>, config: ScorerConfig) -> Self {
        Self {
            events,
            clock,
            config,
        }
    }

    /// Score `actor_key` over the configured lookback.
    pub async fn assess(&self, actor_key: &str) -> SuspicionVerdict {
        self.assess_within(actor_key, self.config.lookback).await
    }

    /// Score `actor_key` over an explicit lookback.
    ///
    /// An unreadable event log yields "not suspicious".
    pub async fn assess_within(&self, actor_key: &str, lookback: Duration) -> SuspicionVerdict {
        let since = self
            .clock
            .unix_millis()
            .saturating_sub(lookback.as_millis() as u64);

        let events = match self.events.recent(actor_key, since).await {
            Ok(events) => events,
            Err(_) => return SuspicionVerdict::unavailable(),
        };

        let score = weighted_score(&events);
        let is_suspicious = score > self.config.threshold;
        if is_suspicious {
            tracing::debug!(actor = actor_key, score, events = events.len(), "Actor is suspicious");
        }

        SuspicionVerdict {
            score,
            event_count: events.len(),
            is_suspicious,
            degraded: false,
        }
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::circuit_breaker::StoreSettings;
    use crate::application::metrics::Metrics;
    use crate::domain::event::{SecurityEventType, Severity};
    use crate::infrastructure::memory::InMemoryEventLog;
    use crate::infrastructure::mocks::{FaultyStore, MockClock};

    struct Fixture {
        clock: Arc<MockClock>,
        log: EventLogAdapter,
        scorer: SuspicionScorer,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(MockClock::new());
        let log = EventLogAdapter::new(
            Arc::new(InMemoryEventLog::new()),
            StoreSettings::default(),
            Metrics::new(),
        );
        let scorer = SuspicionScorer::new(log.clone(), clock.clone(), ScorerConfig::default());
        Fixture { clock, log, scorer }
    }

    async fn record(f: &Fixture, actor: &str, severity: Severity) {
        let event = SecurityEvent::new(
            SecurityEventType::Custom("probe".to_string()),
            actor,
            severity,
            f.clock.unix_millis(),
        );
        f.log.append(event).await;
    }

    #[test]
    fn test_weighted_score() {
        let events: Vec<SecurityEvent> = [Severity::Low, Severity::Medium, Severity::Critical]
            .into_iter()
            .map(|s| SecurityEvent::new(SecurityEventType::AuthFailure, "a", s, 0))
            .collect();
        assert_eq!(weighted_score(&events), 13);
        assert_eq!(weighted_score(&[]), 0);
    }

    #[tokio::test]
    async fn test_threshold_is_exclusive() {
        let f = fixture();

        record(&f, "ip:10.0.0.1", Severity::High).await;
        record(&f, "ip:10.0.0.1", Severity::High).await;
        let verdict = f.scorer.assess("ip:10.0.0.1").await;
        assert_eq!(verdict.score, 10);
        assert!(!verdict.is_suspicious);

        record(&f, "ip:10.0.0.1", Severity::Low).await;
        assert!(f.scorer.assess("ip:10.0.0.1").await.is_suspicious);
    }

    #[tokio::test]
    async fn test_old_events_fall_out_of_lookback() {
        let f = fixture();

        record(&f, "ip:10.0.0.1", Severity::Critical).await;
        record(&f, "ip:10.0.0.1", Severity::Critical).await;
        assert!(f.scorer.assess("ip:10.0.0.1").await.is_suspicious);

        f.clock.advance(Duration::from_secs(61 * 60));
        let verdict = f.scorer.assess("ip:10.0.0.1").await;
        assert_eq!(verdict.event_count, 0);
        assert!(!verdict.is_suspicious);
    }

    #[tokio::test]
    async fn test_explicit_lookback() {
        let f = fixture();

        record(&f, "ip:10.0.0.1", Severity::Critical).await;
        f.clock.advance(Duration::from_secs(120));
        record(&f, "ip:10.0.0.1", Severity::Critical).await;

        let verdict = f
            .scorer
            .assess_within("ip:10.0.0.1", Duration::from_secs(60))
            .await;
        assert_eq!(verdict.event_count, 1);
    }

    #[tokio::test]
    async fn test_unreadable_log_is_not_suspicious() {
        let clock = Arc::new(MockClock::new());
        let log = EventLogAdapter::new(
            Arc::new(FaultyStore::failing()),
            StoreSettings::default(),
            Metrics::new(),
        );
        let scorer = SuspicionScorer::new(log, clock, ScorerConfig::default());

        let verdict = scorer.assess("ip:10.0.0.1").await;
        assert!(!verdict.is_suspicious);
        assert!(verdict.degraded);
    }
}
