//! Builder wiring stores, detectors and policies into a [`Gatekeeper`].

use crate::application::blocks::BlockAdapter;
use crate::application::brute_force::{BruteForceConfig, BruteForceDetector};
use crate::application::circuit_breaker::{CircuitBreakerConfig, StoreSettings};
use crate::application::counters::CounterAdapter;
use crate::application::event_log::EventLogAdapter;
use crate::application::hooks::PostDecisionHook;
use crate::application::metrics::Metrics;
use crate::application::modulator::AdaptiveModulator;
use crate::application::pipeline::{Gatekeeper, GatekeeperParts, GatekeeperSettings};
use crate::application::ports::{BlockStore, Clock, CounterStore, EventLog};
use crate::application::registry::PolicyRegistry;
use crate::application::scorer::{ScorerConfig, SuspicionScorer};
use crate::application::service::SecurityService;
use crate::domain::pattern::{PatternDetector, PatternError};
use crate::domain::policy::{KeyStrategy, Policy, PolicyError, PolicySpec};
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::memory::{InMemoryBlockStore, InMemoryCounterStore, InMemoryEventLog};
use std::sync::Arc;
use std::time::Duration;

/// Error returned when building a gatekeeper with invalid configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildError {
    /// A policy, binding or default policy is invalid
    Policy(PolicyError),
    /// An extra attack signature failed to compile
    Pattern(PatternError),
    /// Store timeout must be greater than zero
    ZeroStoreTimeout,
    /// Circuit breaker threshold must be greater than zero
    ZeroFailureThreshold,
    /// Brute-force threshold must be greater than zero
    ZeroBruteForceThreshold,
    /// A window, lookback or block duration is zero
    ZeroDuration(&'static str),
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::Policy(e) => write!(f, "policy configuration error: {}", e),
            BuildError::Pattern(e) => write!(f, "pattern configuration error: {}", e),
            BuildError::ZeroStoreTimeout => write!(f, "store timeout must be greater than 0"),
            BuildError::ZeroFailureThreshold => {
                write!(f, "circuit breaker failure threshold must be greater than 0")
            }
            BuildError::ZeroBruteForceThreshold => {
                write!(f, "brute-force threshold must be greater than 0")
            }
            BuildError::ZeroDuration(what) => write!(f, "{} must be greater than 0", what),
        }
    }
}

impl std::error::Error for BuildError {}

impl From<PolicyError> for BuildError {
    fn from(e: PolicyError) -> Self {
        BuildError::Policy(e)
    }
}

impl From<PatternError> for BuildError {
    fn from(e: PatternError) -> Self {
        BuildError::Pattern(e)
    }
}

/// Builder for [`Gatekeeper`].
///
/// Every store defaults to its in-memory implementation sharing the
/// builder's clock.
pub struct GatekeeperBuilder {
    platform_policies: bool,
    policies: Vec<Policy>,
    specs: Vec<PolicySpec>,
    bindings: Vec<(String, String)>,
    default_policy: Option<String>,
    counter_store: Option<Arc<dyn CounterStore>>,
    block_store: Option<Arc<dyn BlockStore>>,
    event_log: Option<Arc<dyn EventLog>>,
    clock: Option<Arc<dyn Clock>>,
    store_settings: StoreSettings,
    brute_force: BruteForceConfig,
    scorer: ScorerConfig,
    settings: GatekeeperSettings,
    extra_path_patterns: Vec<String>,
    extra_user_agent_patterns: Vec<String>,
    hooks: Vec<Arc<dyn PostDecisionHook>>,
}

impl GatekeeperBuilder {
    pub fn new() -> Self {
        Self {
            platform_policies: false,
            policies: Vec::new(),
            specs: Vec::new(),
            bindings: Vec::new(),
            default_policy: None,
            counter_store: None,
            block_store: None,
            event_log: None,
            clock: None,
            store_settings: StoreSettings::default(),
            brute_force: BruteForceConfig::default(),
            scorer: ScorerConfig::default(),
            settings: GatekeeperSettings::default(),
            extra_path_patterns: Vec::new(),
            extra_user_agent_patterns: Vec::new(),
            hooks: Vec::new(),
        }
    }

    /// Start from the stock platform policy table.
    ///
    /// See [`PolicyRegistry::platform_defaults`].
    pub fn with_platform_policies(mut self) -> Self {
        self.platform_policies = true;
        self
    }

    /// Register a policy and bind the operation of the same name to it.
    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policies.push(policy);
        self
    }

    /// Register policies from declarative specs, each bound to the
    /// operation of the same name.
    pub fn with_policy_specs(mut self, specs: impl IntoIterator<Item = PolicySpec>) -> Self {
        self.specs.extend(specs);
        self
    }

    /// Bind an operation to a registered policy.
    pub fn bind_operation(mut self, operation: impl Into<String>, policy: impl Into<String>) -> Self {
        self.bindings.push((operation.into(), policy.into()));
        self
    }

    /// Policy for operations without a binding.
    pub fn with_default_policy(mut self, policy: impl Into<String>) -> Self {
        self.default_policy = Some(policy.into());
        self
    }

    pub fn with_counter_store(mut self, store: Arc<dyn CounterStore>) -> Self {
        self.counter_store = Some(store);
        self
    }

    pub fn with_block_store(mut self, store: Arc<dyn BlockStore>) -> Self {
        self.block_store = Some(store);
        self
    }

    pub fn with_event_log(mut self, log: Arc<dyn EventLog>) -> Self {
        self.event_log = Some(log);
        self
    }

    /// Set a custom clock (mainly for testing).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Deadline for each store call. Default: 250 ms.
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_settings.timeout = timeout;
        self
    }

    /// Circuit breaker settings applied to each store.
    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.store_settings.circuit_breaker = config;
        self
    }

    pub fn with_brute_force(mut self, config: BruteForceConfig) -> Self {
        self.brute_force = config;
        self
    }

    /// Key the brute-force counter differently from the default address key.
    pub fn with_brute_force_key(mut self, strategy: KeyStrategy) -> Self {
        self.brute_force.key_strategy = strategy;
        self
    }

    pub fn with_scorer(mut self, config: ScorerConfig) -> Self {
        self.scorer = config;
        self
    }

    /// How long an attack-path hit blocks the actor. Default: 1 hour.
    pub fn with_attack_block_duration(mut self, duration: Duration) -> Self {
        self.settings.attack_block_duration = duration;
        self
    }

    /// Addresses exempt from rate limiting, such as health checkers.
    ///
    /// Exempt addresses are still subject to the block list and the
    /// attack-signature check.
    pub fn with_exempt_addresses(mut self, addresses: Vec<String>) -> Self {
        self.settings.exempt_addresses.extend(addresses);
        self
    }

    /// Extra path signatures (regular expressions) on top of the built-ins.
    pub fn with_path_patterns(mut self, patterns: Vec<String>) -> Self {
        self.extra_path_patterns.extend(patterns);
        self
    }

    /// Extra user-agent signatures (case-insensitive regular expressions).
    pub fn with_user_agent_patterns(mut self, patterns: Vec<String>) -> Self {
        self.extra_user_agent_patterns.extend(patterns);
        self
    }

    /// Append a hook run after every decision, in registration order.
    pub fn with_hook(mut self, hook: Arc<dyn PostDecisionHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    fn validate(&self) -> Result<(), BuildError> {
        if self.store_settings.timeout.is_zero() {
            return Err(BuildError::ZeroStoreTimeout);
        }
        if self.store_settings.circuit_breaker.failure_threshold == 0 {
            return Err(BuildError::ZeroFailureThreshold);
        }
        if self.brute_force.threshold == 0 {
            return Err(BuildError::ZeroBruteForceThreshold);
        }
        if self.brute_force.window.is_zero() {
            return Err(BuildError::ZeroDuration("brute-force window"));
        }
        if self.brute_force.block_duration.is_zero() {
            return Err(BuildError::ZeroDuration("brute-force block duration"));
        }
        if self.scorer.lookback.is_zero() {
            return Err(BuildError::ZeroDuration("scorer lookback"));
        }
        if self.settings.attack_block_duration.is_zero() {
            return Err(BuildError::ZeroDuration("attack block duration"));
        }
        Ok(())
    }

    fn build_registry(&mut self) -> Result<PolicyRegistry, PolicyError> {
        let mut registry = if self.platform_policies {
            PolicyRegistry::platform_defaults()?
        } else {
            PolicyRegistry::new()
        };

        let from_specs = self
            .specs
            .drain(..)
            .map(Policy::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        for policy in self.policies.drain(..).chain(from_specs) {
            let name = policy.name().to_string();
            registry.register(policy)?;
            registry.bind(name.clone(), &name)?;
        }
        for (operation, policy) in self.bindings.drain(..) {
            registry.bind(operation, &policy)?;
        }
        if let Some(name) = self.default_policy.take() {
            registry.set_default(&name)?;
        }
        Ok(registry)
    }

    /// Build the gatekeeper.
    ///
    /// # Errors
    /// Returns `BuildError` if the configuration is invalid.
    pub fn build(mut self) -> Result<Gatekeeper, BuildError> {
        self.validate()?;

        let registry = self.build_registry()?;
        let patterns =
            PatternDetector::with_extra(&self.extra_path_patterns, &self.extra_user_agent_patterns)?;

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock::new()));
        let counter_store = self
            .counter_store
            .unwrap_or_else(|| Arc::new(InMemoryCounterStore::new(clock.clone())));
        let block_store = self
            .block_store
            .unwrap_or_else(|| Arc::new(InMemoryBlockStore::new(clock.clone())));
        let event_log = self
            .event_log
            .unwrap_or_else(|| Arc::new(InMemoryEventLog::new()));

        let metrics = Metrics::new();
        let counters = CounterAdapter::new(counter_store, self.store_settings.clone(), metrics.clone());
        let blocks = BlockAdapter::new(block_store, self.store_settings.clone(), metrics.clone());
        let events = EventLogAdapter::new(event_log, self.store_settings, metrics.clone());

        let scorer = SuspicionScorer::new(events.clone(), clock.clone(), self.scorer);
        let brute_force = BruteForceDetector::new(counters.clone(), self.brute_force);
        let security = SecurityService::new(
            blocks,
            events,
            brute_force,
            scorer.clone(),
            clock.clone(),
        );

        if registry.is_empty() {
            tracing::warn!("Gatekeeper built without policies; rate limiting is disabled");
        }

        Ok(Gatekeeper::from_parts(GatekeeperParts {
            registry,
            patterns,
            counters,
            security,
            modulator: AdaptiveModulator::new(scorer),
            hooks: self.hooks,
            settings: self.settings,
            metrics,
            clock,
        }))
    }
}

impl Default for GatekeeperBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Gatekeeper {
    /// Create a builder for configuring the gatekeeper.
    pub fn builder() -> GatekeeperBuilder {
        GatekeeperBuilder::new()
    }
}
