//! Policy registry mapping protected operations to rate-limit policies.
//!
//! The registry is assembled once at startup and owned by the gatekeeper.
//! Every operation is bound to exactly one policy; an optional default policy
//! covers operations that were never bound.

use crate::domain::event::Severity;
use crate::domain::policy::{KeyStrategy, Policy, PolicyError, PolicySpec};
use ahash::AHashMap;
use std::time::Duration;

/// Named policies plus operation bindings.
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    policies: AHashMap<String, Policy>,
    bindings: AHashMap<String, String>,
    default_policy: Option<String>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a policy.
    ///
    /// # Errors
    /// Fails if the policy is invalid or its name is already taken.
    pub fn register(&mut self, policy: Policy) -> Result<(), PolicyError> {
        policy.validate()?;
        if self.policies.contains_key(policy.name()) {
            return Err(PolicyError::DuplicateName(policy.name().to_string()));
        }
        self.policies.insert(policy.name().to_string(), policy);
        Ok(())
    }

    /// Bind an operation to a registered policy, replacing any earlier binding.
    pub fn bind(
        &mut self,
        operation: impl Into<String>,
        policy_name: &str,
    ) -> Result<(), PolicyError> {
        if !self.policies.contains_key(policy_name) {
            return Err(PolicyError::UnknownPolicy(policy_name.to_string()));
        }
        self.bindings
            .insert(operation.into(), policy_name.to_string());
        Ok(())
    }

    /// Use a registered policy for operations without a binding.
    pub fn set_default(&mut self, policy_name: &str) -> Result<(), PolicyError> {
        if !self.policies.contains_key(policy_name) {
            return Err(PolicyError::UnknownPolicy(policy_name.to_string()));
        }
        self.default_policy = Some(policy_name.to_string());
        Ok(())
    }

    /// Policy governing `operation`: its binding, else the default policy.
    pub fn resolve(&self, operation: &str) -> Option<&Policy> {
        self.bindings
            .get(operation)
            .or(self.default_policy.as_ref())
            .and_then(|name| self.policies.get(name))
    }

    pub fn get(&self, policy_name: &str) -> Option<&Policy> {
        self.policies.get(policy_name)
    }

    pub fn default_policy(&self) -> Option<&Policy> {
        self.default_policy
            .as_ref()
            .and_then(|name| self.policies.get(name))
    }

    /// Registered policies in no particular order.
    pub fn policies(&self) -> impl Iterator<Item = &Policy> {
        self.policies.values()
    }

    /// `(operation, policy name)` bindings in no particular order.
    pub fn bindings(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings
            .iter()
            .map(|(op, name)| (op.as_str(), name.as_str()))
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Build a registry from declarative specs. Each policy is bound to the
    /// operation of the same name.
    pub fn from_specs(specs: impl IntoIterator<Item = PolicySpec>) -> Result<Self, PolicyError> {
        let mut registry = Self::new();
        for spec in specs {
            let policy = Policy::try_from(spec)?;
            let name = policy.name().to_string();
            registry.register(policy)?;
            registry.bind(name.clone(), &name)?;
        }
        Ok(registry)
    }

    /// Build a registry from a JSON array of policy specs.
    ///
    /// ```
    /// use gatekeeper::PolicyRegistry;
    ///
    /// let registry = PolicyRegistry::from_json(
    ///     r#"[{ "policyName": "auth", "windowSeconds": 900, "maxRequests": 5 }]"#,
    /// )
    /// .unwrap();
    /// assert_eq!(registry.resolve("auth").unwrap().max_requests(), 5);
    /// ```
    pub fn from_json(json: &str) -> Result<Self, PolicyError> {
        let specs: Vec<PolicySpec> =
            serde_json::from_str(json).map_err(|e| PolicyError::Parse(e.to_string()))?;
        Self::from_specs(specs)
    }

    /// Stock policy table for the platform's operation families.
    ///
    /// | policy | window | max | key | notes |
    /// |---|---|---|---|---|
    /// | `global` | 15 min | 1000 | address | adaptive, default |
    /// | `auth` | 15 min | 5 | email + address | high, reset on success |
    /// | `password_reset` | 1 h | 3 | email + address | high |
    /// | `payment` | 1 h | 10 | user or address | high |
    /// | `certification` | 1 h | 20 | user or address | |
    /// | `promo_code` | 15 min | 10 | user or address | adaptive, medium |
    /// | `notification` | 1 h | 50 | user or address | |
    /// | `tiered` | 15 min | 100 | tier | admin 1000, organizer 500, member 200 |
    pub fn platform_defaults() -> Result<Self, PolicyError> {
        let quarter_hour = Duration::from_secs(15 * 60);
        let hour = Duration::from_secs(60 * 60);
        let email = || KeyStrategy::FieldAndAddress("email".to_string());

        let policies = vec![
            Policy::new("global", 1000, quarter_hour)?.adaptive(0.5),
            Policy::new("auth", 5, quarter_hour)?
                .with_key_strategy(email())
                .with_severity(Severity::High)
                .with_message("Too many authentication attempts, please try again later.")
                .reset_on_success(),
            Policy::new("password_reset", 3, hour)?
                .with_key_strategy(email())
                .with_severity(Severity::High)
                .with_message("Too many password reset requests, please try again later."),
            Policy::new("payment", 10, hour)?
                .with_key_strategy(KeyStrategy::UserOrAddress)
                .with_severity(Severity::High),
            Policy::new("certification", 20, hour)?
                .with_key_strategy(KeyStrategy::UserOrAddress),
            Policy::new("promo_code", 10, quarter_hour)?
                .with_key_strategy(KeyStrategy::UserOrAddress)
                .with_severity(Severity::Medium)
                .adaptive(0.5),
            Policy::new("notification", 50, hour)?
                .with_key_strategy(KeyStrategy::UserOrAddress),
            Policy::new("tiered", 100, quarter_hour)?
                .with_key_strategy(KeyStrategy::Tier)
                .with_tier_limit("admin", 1000)
                .with_tier_limit("organizer", 500)
                .with_tier_limit("member", 200),
        ];

        let mut registry = Self::new();
        for policy in policies {
            let name = policy.name().to_string();
            registry.register(policy)?;
            registry.bind(name.clone(), &name)?;
        }
        registry.set_default("global")?;
        Ok(registry)
    }
}
