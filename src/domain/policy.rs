//! Named rate-limit policies and key derivation strategies.
//!
//! A policy is a fixed-window rule: at most `max_requests` per `window` for
//! every distinct key its strategy derives. Policies are immutable once
//! loaded into a registry.

use crate::domain::actor::Actor;
use crate::domain::event::Severity;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Function type for custom key derivation.
///
/// Must be pure: the same actor always yields the same key.
pub type KeyFn = Arc<dyn Fn(&Actor) -> String + Send + Sync>;

/// Multiplier applied to adaptive policies when no explicit one is given.
pub const DEFAULT_SUSPICIOUS_MULTIPLIER: f64 = 0.5;

/// How a policy turns an actor into a counter key.
#[derive(Clone, Default)]
pub enum KeyStrategy {
    /// Network address alone.
    #[default]
    Address,
    /// Authenticated user, falling back to the address when anonymous.
    UserOrAddress,
    /// A user-supplied field (e.g. `email`) combined with the address, so a
    /// missing field never collapses distinct addresses into one bucket.
    FieldAndAddress(String),
    /// Privilege tier plus user (or address). The policy's tier table picks
    /// the limit for the role.
    Tier,
    /// Caller-provided derivation.
    Custom(KeyFn),
}

impl KeyStrategy {
    /// Derive the key for an actor.
    pub fn derive(&self, actor: &Actor) -> String {
        match self {
            KeyStrategy::Address => format!("ip:{}", actor.address()),
            KeyStrategy::UserOrAddress => match actor.user_id() {
                Some(user) => format!("user:{}", user),
                None => format!("ip:{}", actor.address()),
            },
            KeyStrategy::FieldAndAddress(field) => format!(
                "{}:{}:{}",
                field,
                actor.field(field).unwrap_or("-"),
                actor.address()
            ),
            KeyStrategy::Tier => {
                let role = actor.role().unwrap_or("anonymous");
                match actor.user_id() {
                    Some(user) => format!("{}:user:{}", role, user),
                    None => format!("{}:ip:{}", role, actor.address()),
                }
            }
            KeyStrategy::Custom(f) => f(actor),
        }
    }
}

impl fmt::Debug for KeyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyStrategy::Address => f.write_str("Address"),
            KeyStrategy::UserOrAddress => f.write_str("UserOrAddress"),
            KeyStrategy::FieldAndAddress(field) => {
                f.debug_tuple("FieldAndAddress").field(field).finish()
            }
            KeyStrategy::Tier => f.write_str("Tier"),
            KeyStrategy::Custom(_) => f.debug_tuple("Custom").field(&"<fn>").finish(),
        }
    }
}

/// Error returned when a policy definition is invalid.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyError {
    /// Policy name must not be empty
    EmptyName,
    /// `max_requests` must be at least 1
    ZeroMaxRequests,
    /// Window duration must be greater than zero
    ZeroWindow,
    /// Suspicious multiplier must lie in (0, 1)
    InvalidMultiplier(f64),
    /// A tier limit must be at least 1
    ZeroTierLimit(String),
    /// Two policies share the same name
    DuplicateName(String),
    /// An operation is bound to a policy that does not exist
    UnknownPolicy(String),
    /// A policy table could not be parsed
    Parse(String),
}

impl fmt::Display for PolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyError::EmptyName => write!(f, "policy name must not be empty"),
            PolicyError::ZeroMaxRequests => write!(f, "max_requests must be greater than 0"),
            PolicyError::ZeroWindow => write!(f, "window duration must be greater than 0"),
            PolicyError::InvalidMultiplier(m) => {
                write!(f, "suspicious multiplier must be in (0, 1), got {}", m)
            }
            PolicyError::ZeroTierLimit(role) => {
                write!(f, "tier limit for role '{}' must be greater than 0", role)
            }
            PolicyError::DuplicateName(name) => write!(f, "duplicate policy name '{}'", name),
            PolicyError::UnknownPolicy(name) => write!(f, "unknown policy '{}'", name),
            PolicyError::Parse(reason) => write!(f, "invalid policy table: {}", reason),
        }
    }
}

impl std::error::Error for PolicyError {}

/// A named fixed-window rate-limit rule.
#[derive(Debug, Clone)]
pub struct Policy {
    name: String,
    window: Duration,
    max_requests: u32,
    key_strategy: KeyStrategy,
    severity: Severity,
    suspicious_multiplier: Option<f64>,
    tier_limits: BTreeMap<String, u32>,
    error_code: Option<String>,
    message: Option<String>,
    reset_on_success: bool,
}

impl Policy {
    /// Create a policy keyed by network address with `low` violation severity.
    ///
    /// # Errors
    /// Returns `PolicyError` if the name is empty, `max_requests` is zero or
    /// `window` is zero.
    pub fn new(
        name: impl Into<String>,
        max_requests: u32,
        window: Duration,
    ) -> Result<Self, PolicyError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(PolicyError::EmptyName);
        }
        if max_requests == 0 {
            return Err(PolicyError::ZeroMaxRequests);
        }
        if window.is_zero() {
            return Err(PolicyError::ZeroWindow);
        }
        Ok(Self {
            name,
            window,
            max_requests,
            key_strategy: KeyStrategy::Address,
            severity: Severity::Low,
            suspicious_multiplier: None,
            tier_limits: BTreeMap::new(),
            error_code: None,
            message: None,
            reset_on_success: false,
        })
    }

    pub fn with_key_strategy(mut self, strategy: KeyStrategy) -> Self {
        self.key_strategy = strategy;
        self
    }

    /// Severity of the security event written when this policy is exceeded.
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Mark the policy adaptive: suspicious actors get
    /// `floor(max * multiplier)` requests per window.
    pub fn adaptive(mut self, multiplier: f64) -> Self {
        self.suspicious_multiplier = Some(multiplier);
        self
    }

    /// Distinct limit for a privilege tier. Only meaningful with
    /// [`KeyStrategy::Tier`]; roles without an entry use `max_requests`.
    pub fn with_tier_limit(mut self, role: impl Into<String>, max_requests: u32) -> Self {
        self.tier_limits.insert(role.into(), max_requests);
        self
    }

    /// Override the machine-readable code reported on violation.
    pub fn with_error_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self
    }

    /// Override the human-readable message reported on violation.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Delete the actor's counter when the protected operation succeeds.
    pub fn reset_on_success(mut self) -> Self {
        self.reset_on_success = true;
        self
    }

    /// Check invariants that the chained setters cannot enforce.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if let Some(m) = self.suspicious_multiplier {
            if !(m > 0.0 && m < 1.0) {
                return Err(PolicyError::InvalidMultiplier(m));
            }
        }
        if let Some((role, _)) = self.tier_limits.iter().find(|(_, max)| **max == 0) {
            return Err(PolicyError::ZeroTierLimit(role.clone()));
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn key_strategy(&self) -> &KeyStrategy {
        &self.key_strategy
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn is_adaptive(&self) -> bool {
        self.suspicious_multiplier.is_some()
    }

    pub fn suspicious_multiplier(&self) -> Option<f64> {
        self.suspicious_multiplier
    }

    pub fn resets_on_success(&self) -> bool {
        self.reset_on_success
    }

    /// Base limit for an actor, honouring the tier table.
    pub fn max_for(&self, actor: &Actor) -> u32 {
        actor
            .role()
            .and_then(|role| self.tier_limits.get(role))
            .copied()
            .unwrap_or(self.max_requests)
    }

    /// Counter key for an actor, namespaced by the policy name.
    pub fn counter_key(&self, actor: &Actor) -> String {
        format!("{}:{}", self.name, self.key_strategy.derive(actor))
    }

    /// Machine-readable violation code, `<POLICY>_RATE_LIMIT_EXCEEDED` unless
    /// overridden.
    pub fn error_code(&self) -> String {
        if let Some(code) = &self.error_code {
            return code.clone();
        }
        let upper: String = self
            .name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}_RATE_LIMIT_EXCEEDED", upper)
    }

    pub fn message(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| "Too many requests, please try again later.".to_string())
    }
}

/// Serialisable key strategy declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KeyStrategySpec {
    #[default]
    Address,
    UserOrAddress,
    FieldAndAddress {
        field: String,
    },
    Tier,
}

impl From<KeyStrategySpec> for KeyStrategy {
    fn from(spec: KeyStrategySpec) -> Self {
        match spec {
            KeyStrategySpec::Address => KeyStrategy::Address,
            KeyStrategySpec::UserOrAddress => KeyStrategy::UserOrAddress,
            KeyStrategySpec::FieldAndAddress { field } => KeyStrategy::FieldAndAddress(field),
            KeyStrategySpec::Tier => KeyStrategy::Tier,
        }
    }
}

/// Serialisable policy declaration, one row of the static policy table.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySpec {
    pub policy_name: String,
    pub window_seconds: u64,
    pub max_requests: u32,
    #[serde(default)]
    pub key_strategy: KeyStrategySpec,
    #[serde(default)]
    pub adaptive: bool,
    #[serde(default)]
    pub suspicious_multiplier: Option<f64>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub tier_limits: BTreeMap<String, u32>,
    #[serde(default)]
    pub reset_on_success: bool,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl TryFrom<PolicySpec> for Policy {
    type Error = PolicyError;

    fn try_from(spec: PolicySpec) -> Result<Self, Self::Error> {
        let mut policy = Policy::new(
            spec.policy_name,
            spec.max_requests,
            Duration::from_secs(spec.window_seconds),
        )?
        .with_key_strategy(spec.key_strategy.into());

        if let Some(severity) = spec.severity {
            policy = policy.with_severity(severity);
        }
        if spec.adaptive {
            let multiplier = spec
                .suspicious_multiplier
                .unwrap_or(DEFAULT_SUSPICIOUS_MULTIPLIER);
            policy = policy.adaptive(multiplier);
        }
        for (role, max) in spec.tier_limits {
            policy = policy.with_tier_limit(role, max);
        }
        if spec.reset_on_success {
            policy = policy.reset_on_success();
        }
        if let Some(code) = spec.error_code {
            policy = policy.with_error_code(code);
        }
        if let Some(message) = spec.message {
            policy = policy.with_message(message);
        }

        policy.validate()?;
        Ok(policy)
    }
}
