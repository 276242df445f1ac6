//! Repeated authentication failure detection.

use crate::application::counters::CounterAdapter;
use crate::domain::policy::KeyStrategy;
use std::time::Duration;

/// Settings for brute-force detection.
#[derive(Debug, Clone)]
pub struct BruteForceConfig {
    /// Failures within `window` at which an actor counts as brute-forcing
    pub threshold: u32,
    pub window: Duration,
    /// How long a detected actor stays blocked
    pub block_duration: Duration,
    /// Which actor attributes the failure counter is keyed on
    pub key_strategy: KeyStrategy,
}

impl Default for BruteForceConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            window: Duration::from_secs(15 * 60),
            block_duration: Duration::from_secs(30 * 60),
            key_strategy: KeyStrategy::Address,
        }
    }
}

/// Outcome of recording one failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BruteForceVerdict {
    /// Failures in the current window, including this one
    pub failures: u64,
    pub is_brute_force: bool,
}

/// Counts authentication failures per actor in a fixed window.
#[derive(Debug, Clone)]
pub struct BruteForceDetector {
    counters: CounterAdapter,
    config: BruteForceConfig,
}

impl BruteForceDetector {
    pub fn new(counters: CounterAdapter, config: BruteForceConfig) -> Self {
        Self { counters, config }
    }

    /// Counter key for an actor key.
    pub fn failure_key(actor_key: &str) -> String {
        format!("{}_auth_fail", actor_key)
    }

    /// Record one failure for `actor_key`.
    ///
    /// An unreachable counter backend yields zero failures, never a detection.
    pub async fn record_failure(&self, actor_key: &str) -> BruteForceVerdict {
        let snapshot = self
            .counters
            .increment(&Self::failure_key(actor_key), self.config.window)
            .await;

        let is_brute_force = snapshot.count >= u64::from(self.config.threshold);
        if is_brute_force {
            tracing::warn!(
                actor = actor_key,
                failures = snapshot.count,
                threshold = self.config.threshold,
                "Brute force detected"
            );
        }

        BruteForceVerdict {
            failures: snapshot.count,
            is_brute_force,
        }
    }

    /// Forget recorded failures after a successful authentication.
    pub async fn record_success(&self, actor_key: &str) -> bool {
        self.counters.reset(&Self::failure_key(actor_key)).await
    }

    pub fn config(&self) -> &BruteForceConfig {
        &self.config
    }
}
