//! Post-decision hooks.
//!
//! Hooks run in registration order after a decision is final. They observe
//! the decision and cannot change it; a failing hook is logged and the next
//! one still runs.

use crate::domain::actor::Request;
use crate::domain::decision::Decision;
use async_trait::async_trait;
use std::fmt;

/// Error reported by a hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookError {
    message: String,
}

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hook failed: {}", self.message)
    }
}

impl std::error::Error for HookError {}

/// Side effect triggered by a final decision, such as notifying an operator
/// when an actor gets blocked.
#[async_trait]
pub trait PostDecisionHook: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    async fn on_decision(&self, request: &Request, decision: &Decision) -> Result<(), HookError>;
}
