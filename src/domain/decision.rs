//! Admission decisions and their HTTP-facing representation.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::time::{Duration, SystemTime};

/// Wire code for requests from an actor on the block list.
pub const ACTOR_BLOCKED_CODE: &str = "IP_BLOCKED";

/// Wire code for requests matching an attack signature.
pub const SUSPICIOUS_ACCESS_CODE: &str = "SUSPICIOUS_ACCESS";

/// Remaining quota of the policy that admitted a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub limit: u32,
    pub remaining: u32,
    pub reset_after: Duration,
}

/// Details of a rate-limit violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Throttle {
    pub policy: String,
    pub error_code: String,
    pub message: String,
    pub limit: u32,
    pub count: u64,
    /// Time until the policy window for this key expires.
    pub retry_after: Duration,
}

/// Why a request was blocked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    /// The actor is on the block list.
    ActorBlocked {
        reason: Option<String>,
        expires_in: Option<Duration>,
    },
    /// The request matched an attack signature; the actor has been blocked.
    AttackPattern { signature: String },
}

impl BlockReason {
    pub fn error_code(&self) -> &'static str {
        match self {
            BlockReason::ActorBlocked { .. } => ACTOR_BLOCKED_CODE,
            BlockReason::AttackPattern { .. } => SUSPICIOUS_ACCESS_CODE,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            BlockReason::ActorBlocked { .. } => {
                "Access denied. Your address has been temporarily blocked."
            }
            BlockReason::AttackPattern { .. } => "Access denied. Suspicious request detected.",
        }
    }
}

/// Final outcome for one inbound operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Hand control to the protected operation.
    Allow(Option<Quota>),
    /// Reject with 429.
    Throttle(Throttle),
    /// Reject with 403.
    Block(BlockReason),
}

impl Decision {
    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow(_))
    }

    pub fn is_throttle(&self) -> bool {
        matches!(self, Decision::Throttle(_))
    }

    pub fn is_block(&self) -> bool {
        matches!(self, Decision::Block(_))
    }

    /// HTTP status equivalent.
    pub fn status_code(&self) -> u16 {
        match self {
            Decision::Allow(_) => 200,
            Decision::Throttle(_) => 429,
            Decision::Block(_) => 403,
        }
    }

    /// Machine-readable error code, `None` for `Allow`.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            Decision::Allow(_) => None,
            Decision::Throttle(t) => Some(&t.error_code),
            Decision::Block(reason) => Some(reason.error_code()),
        }
    }

    /// Retry hint in whole seconds, rounded up.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Decision::Throttle(t) => Some(ceil_secs(t.retry_after)),
            _ => None,
        }
    }

    /// Response envelope for rejected requests.
    pub fn error_body(&self, now: SystemTime) -> Option<ErrorBody> {
        let (message, error) = match self {
            Decision::Allow(_) => return None,
            Decision::Throttle(t) => (t.message.clone(), t.error_code.clone()),
            Decision::Block(reason) => {
                (reason.message().to_string(), reason.error_code().to_string())
            }
        };

        Some(ErrorBody {
            success: false,
            message,
            error,
            retry_after: self.retry_after_secs(),
            timestamp: DateTime::<Utc>::from(now).to_rfc3339_opts(SecondsFormat::Millis, true),
        })
    }

    /// Response headers carrying quota and retry information.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        match self {
            Decision::Allow(Some(quota)) => vec![
                ("X-RateLimit-Limit", quota.limit.to_string()),
                ("X-RateLimit-Remaining", quota.remaining.to_string()),
                ("X-RateLimit-Reset", ceil_secs(quota.reset_after).to_string()),
            ],
            Decision::Throttle(t) => {
                let retry = ceil_secs(t.retry_after).to_string();
                vec![
                    ("Retry-After", retry.clone()),
                    ("X-RateLimit-Limit", t.limit.to_string()),
                    ("X-RateLimit-Remaining", "0".to_string()),
                    ("X-RateLimit-Reset", retry),
                ]
            }
            _ => Vec::new(),
        }
    }
}

/// JSON envelope returned for throttled or blocked requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    pub timestamp: String,
}

/// Result of one guard step in the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    /// No verdict, run the next step.
    Continue,
    Allow(Option<Quota>),
    Throttle(Throttle),
    Block(BlockReason),
}

impl GuardOutcome {
    /// Terminal outcomes become decisions; `Continue` yields `None`.
    pub fn into_decision(self) -> Option<Decision> {
        match self {
            GuardOutcome::Continue => None,
            GuardOutcome::Allow(quota) => Some(Decision::Allow(quota)),
            GuardOutcome::Throttle(t) => Some(Decision::Throttle(t)),
            GuardOutcome::Block(reason) => Some(Decision::Block(reason)),
        }
    }
}

fn ceil_secs(d: Duration) -> u64 {
    let secs = d.as_secs();
    if d.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs.max(1)
    }
}
