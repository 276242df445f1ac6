//! Gatekeeper pipeline.
//!
//! Each inbound operation passes through a fixed sequence of guard steps:
//!
//! 1. [`GuardStep::BlockCheck`] rejects actors on the block list without
//!    touching any counter.
//! 2. [`GuardStep::PatternCheck`] rejects and blocks requests whose path
//!    matches an attack signature; a suspicious user agent is only recorded.
//! 3. [`GuardStep::RateLimit`] resolves the operation's policy, applies
//!    adaptive modulation and increments the fixed-window counter.
//!
//! The first step returning anything other than `Continue` decides. Store
//! failures inside any step fail open, so infrastructure trouble never turns
//! into a throttle or a block.

use crate::application::brute_force::BruteForceVerdict;
use crate::application::counters::CounterAdapter;
use crate::application::hooks::PostDecisionHook;
use crate::application::metrics::Metrics;
use crate::application::modulator::AdaptiveModulator;
use crate::application::ports::Clock;
use crate::application::registry::PolicyRegistry;
use crate::application::service::{EventDetails, SecurityService};
use crate::domain::actor::{Actor, Request};
use crate::domain::decision::{BlockReason, Decision, GuardOutcome, Quota, Throttle};
use crate::domain::event::{SecurityEventType, Severity};
use crate::domain::pattern::PatternDetector;
use ahash::AHashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// One stage of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardStep {
    BlockCheck,
    PatternCheck,
    RateLimit,
}

impl GuardStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardStep::BlockCheck => "block_check",
            GuardStep::PatternCheck => "pattern_check",
            GuardStep::RateLimit => "rate_limit",
        }
    }
}

impl fmt::Display for GuardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evaluation order of the guard steps.
pub const GUARD_STEPS: [GuardStep; 3] = [
    GuardStep::BlockCheck,
    GuardStep::PatternCheck,
    GuardStep::RateLimit,
];

/// Reason recorded on blocks imposed by the pattern check.
pub const ATTACK_BLOCK_REASON: &str = "suspicious access pattern";

/// Reason recorded on blocks imposed after repeated authentication failures.
pub const BRUTE_FORCE_BLOCK_REASON: &str = "brute force detected";

/// Tunables of the pipeline itself.
#[derive(Debug, Clone)]
pub struct GatekeeperSettings {
    /// How long an actor stays blocked after an attack-path hit
    pub attack_block_duration: Duration,
    /// Addresses that skip rate limiting (block and pattern checks still apply)
    pub exempt_addresses: AHashSet<String>,
}

impl Default for GatekeeperSettings {
    fn default() -> Self {
        Self {
            attack_block_duration: Duration::from_secs(60 * 60),
            exempt_addresses: AHashSet::new(),
        }
    }
}

/// Everything a [`Gatekeeper`] is assembled from.
pub struct GatekeeperParts {
    pub registry: PolicyRegistry,
    pub patterns: PatternDetector,
    pub counters: CounterAdapter,
    pub security: SecurityService,
    pub modulator: AdaptiveModulator,
    pub hooks: Vec<Arc<dyn PostDecisionHook>>,
    pub settings: GatekeeperSettings,
    pub metrics: Metrics,
    pub clock: Arc<dyn Clock>,
}

/// Admission decisions for protected operations.
///
/// Cheap to share behind an `Arc`; all state lives in the stores.
pub struct Gatekeeper {
    registry: PolicyRegistry,
    patterns: PatternDetector,
    counters: CounterAdapter,
    security: SecurityService,
    modulator: AdaptiveModulator,
    hooks: Vec<Arc<dyn PostDecisionHook>>,
    settings: GatekeeperSettings,
    metrics: Metrics,
    clock: Arc<dyn Clock>,
}

impl Gatekeeper {
    pub fn from_parts(parts: GatekeeperParts) -> Self {
        Self {
            registry: parts.registry,
            patterns: parts.patterns,
            counters: parts.counters,
            security: parts.security,
            modulator: parts.modulator,
            hooks: parts.hooks,
            settings: parts.settings,
            metrics: parts.metrics,
            clock: parts.clock,
        }
    }

    /// Decide whether `request` may proceed.
    ///
    /// Hooks run after the decision is final and cannot alter it.
    pub async fn check(&self, request: &Request) -> Decision {
        let mut decision = Decision::Allow(None);

        for step in GUARD_STEPS {
            let outcome = match step {
                GuardStep::BlockCheck => self.check_block(request).await,
                GuardStep::PatternCheck => self.check_patterns(request).await,
                GuardStep::RateLimit => self.check_rate_limit(request).await,
            };

            if let Some(final_decision) = outcome.into_decision() {
                tracing::trace!(
                    step = step.as_str(),
                    operation = %request.operation,
                    status = final_decision.status_code(),
                    "Guard step decided"
                );
                decision = final_decision;
                break;
            }
        }

        match &decision {
            Decision::Allow(_) => self.metrics.record_allowed(),
            Decision::Throttle(_) => self.metrics.record_throttled(),
            Decision::Block(_) => self.metrics.record_blocked(),
        }

        self.run_hooks(request, &decision).await;
        decision
    }

    async fn check_block(&self, request: &Request) -> GuardOutcome {
        let block_key = request.actor.block_key();
        let entry = match self.security.block_details(&block_key).await {
            Some(entry) => entry,
            None => return GuardOutcome::Continue,
        };

        tracing::debug!(
            actor = %block_key,
            operation = %request.operation,
            "Rejected request from blocked actor"
        );

        GuardOutcome::Block(BlockReason::ActorBlocked {
            expires_in: Some(entry.remaining(self.clock.unix_millis())),
            reason: Some(entry.reason),
        })
    }

    async fn check_patterns(&self, request: &Request) -> GuardOutcome {
        let classification = self
            .patterns
            .classify(&request.path, request.user_agent.as_deref());
        if classification.is_clean() {
            return GuardOutcome::Continue;
        }

        let actor = &request.actor;

        if let Some(signature) = classification.path_signature {
            let mut details = EventDetails::new(actor.canonical_key(), Severity::High)
                .with_resource(request.operation.clone())
                .with_metadata("path", request.path.clone())
                .with_metadata("signature", signature.clone())
                .with_metadata("address", actor.address());
            if let Some(ua) = &request.user_agent {
                details = details.with_metadata("user_agent", ua.clone());
            }
            self.security
                .log_security_event(SecurityEventType::AttackPathDetected, details)
                .await;

            self.security
                .block_ip(
                    &actor.block_key(),
                    self.settings.attack_block_duration,
                    ATTACK_BLOCK_REASON,
                    Severity::High,
                )
                .await;

            return GuardOutcome::Block(BlockReason::AttackPattern { signature });
        }

        if let Some(signature) = classification.user_agent_signature {
            let details = EventDetails::new(actor.canonical_key(), Severity::Medium)
                .with_resource(request.operation.clone())
                .with_metadata("user_agent", request.user_agent.clone().unwrap_or_default())
                .with_metadata("signature", signature);
            self.security
                .log_security_event(SecurityEventType::SuspiciousUserAgent, details)
                .await;
        }

        GuardOutcome::Continue
    }

    async fn check_rate_limit(&self, request: &Request) -> GuardOutcome {
        let actor = &request.actor;
        if self.settings.exempt_addresses.contains(actor.address()) {
            return GuardOutcome::Continue;
        }

        let policy = match self.registry.resolve(&request.operation) {
            Some(policy) => policy,
            None => {
                tracing::warn!(
                    operation = %request.operation,
                    "No policy bound to operation, allowing"
                );
                return GuardOutcome::Continue;
            }
        };

        let limit = self.modulator.effective_limit(policy, actor).await;
        let key = policy.counter_key(actor);
        let snapshot = self.counters.increment(&key, policy.window()).await;

        if snapshot.degraded {
            return GuardOutcome::Allow(None);
        }

        let max = u64::from(limit.max_requests);
        if snapshot.count <= max {
            return GuardOutcome::Allow(Some(Quota {
                limit: limit.max_requests,
                remaining: (max - snapshot.count) as u32,
                reset_after: snapshot.ttl_remaining,
            }));
        }

        let details = EventDetails::new(actor.canonical_key(), policy.severity())
            .with_resource(policy.name())
            .with_metadata("operation", request.operation.clone())
            .with_metadata("key", key.clone())
            .with_metadata("count", snapshot.count.to_string())
            .with_metadata("limit", limit.max_requests.to_string())
            .with_metadata("adaptive_reduction", limit.reduced.to_string());
        self.security
            .log_security_event(SecurityEventType::RateLimitExceeded, details)
            .await;

        GuardOutcome::Throttle(Throttle {
            policy: policy.name().to_string(),
            error_code: policy.error_code(),
            message: policy.message(),
            limit: limit.max_requests,
            count: snapshot.count,
            retry_after: snapshot.ttl_remaining,
        })
    }

    async fn run_hooks(&self, request: &Request, decision: &Decision) {
        for hook in &self.hooks {
            if let Err(e) = hook.on_decision(request, decision).await {
                self.metrics.record_hook_failure();
                tracing::warn!(hook = hook.name(), error = %e, "Post-decision hook failed");
            }
        }
    }

    /// Record a failed authentication for `actor`.
    ///
    /// Writes a `low` event and, once the failure count reaches the
    /// threshold, blocks the actor's address and writes a `high` event.
    pub async fn record_auth_failure(&self, actor: &Actor) -> BruteForceVerdict {
        let config = self.security.brute_force().config();
        let key = config.key_strategy.derive(actor);

        let details = EventDetails::new(actor.canonical_key(), Severity::Low)
            .with_resource("auth")
            .with_metadata("address", actor.address());
        self.security
            .log_security_event(SecurityEventType::AuthFailure, details)
            .await;

        let verdict = self.security.detect_brute_force(&key).await;
        if verdict.is_brute_force {
            self.security
                .block_ip(
                    &actor.block_key(),
                    config.block_duration,
                    BRUTE_FORCE_BLOCK_REASON,
                    Severity::High,
                )
                .await;

            let details = EventDetails::new(actor.canonical_key(), Severity::High)
                .with_resource("auth")
                .with_metadata("reason", BRUTE_FORCE_BLOCK_REASON)
                .with_metadata("failures", verdict.failures.to_string())
                .with_metadata("address", actor.address());
            self.security
                .log_security_event(SecurityEventType::BruteForceDetected, details)
                .await;
        }

        verdict
    }

    /// Clear brute-force state for `actor` after a successful authentication.
    pub async fn record_auth_success(&self, actor: &Actor) -> bool {
        let key = self.security.brute_force().config().key_strategy.derive(actor);
        self.security.record_auth_success(&key).await
    }

    /// Report that `operation` succeeded for `actor`.
    ///
    /// Policies marked reset-on-success forget the actor's count; for all
    /// others this is a no-op returning `false`.
    pub async fn record_success(&self, operation: &str, actor: &Actor) -> bool {
        match self.registry.resolve(operation) {
            Some(policy) if policy.resets_on_success() => {
                self.counters.reset(&policy.counter_key(actor)).await
            }
            _ => false,
        }
    }

    pub fn steps(&self) -> &'static [GuardStep] {
        &GUARD_STEPS
    }

    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    pub fn security(&self) -> &SecurityService {
        &self.security
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn settings(&self) -> &GatekeeperSettings {
        &self.settings
    }
}

impl fmt::Debug for Gatekeeper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gatekeeper")
            .field("policies", &self.registry.len())
            .field("hooks", &self.hooks.len())
            .field("settings", &self.settings)
            .finish()
    }
}
