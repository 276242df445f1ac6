//! Security events.
//!
//! Events are append-only records of abuse-relevant activity. Detectors and
//! the pipeline write them; the suspicion scorer reads them back. Retention
//! is owned by whoever operates the event log.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Severity attached to a security event or a block.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Weight used by the suspicion scorer.
    pub fn weight(&self) -> u32 {
        match self {
            Severity::Low => 1,
            Severity::Medium => 2,
            Severity::High => 5,
            Severity::Critical => 10,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of security event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecurityEventType {
    /// Request path matched an attack signature.
    AttackPathDetected,
    /// User agent matched a scanner or tooling signature.
    SuspiciousUserAgent,
    /// A rate-limit policy was exceeded.
    RateLimitExceeded,
    /// A failed authentication attempt.
    AuthFailure,
    /// Failure count crossed the brute-force threshold.
    BruteForceDetected,
    /// Event type supplied by a collaborator.
    Custom(String),
}

impl SecurityEventType {
    pub fn as_str(&self) -> &str {
        match self {
            SecurityEventType::AttackPathDetected => "attack_path_detected",
            SecurityEventType::SuspiciousUserAgent => "suspicious_user_agent",
            SecurityEventType::RateLimitExceeded => "rate_limit_exceeded",
            SecurityEventType::AuthFailure => "auth_failure",
            SecurityEventType::BruteForceDetected => "brute_force_detected",
            SecurityEventType::Custom(name) => name,
        }
    }
}

impl fmt::Display for SecurityEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An append-only record of abuse-relevant activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub event_type: SecurityEventType,
    pub actor_key: String,
    pub severity: Severity,
    /// Resource family the event relates to (policy or operation name).
    pub resource: Option<String>,
    pub resource_id: Option<String>,
    pub metadata: BTreeMap<String, String>,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

impl SecurityEvent {
    pub fn new(
        event_type: SecurityEventType,
        actor_key: impl Into<String>,
        severity: Severity,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            event_type,
            actor_key: actor_key.into(),
            severity,
            resource: None,
            resource_id: None,
            metadata: BTreeMap::new(),
            timestamp_ms,
        }
    }

    pub fn with_resource(mut self, resource: impl Into<String>, resource_id: Option<String>) -> Self {
        self.resource = Some(resource.into());
        self.resource_id = resource_id;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
