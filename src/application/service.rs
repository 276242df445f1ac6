//! Security service facade over the block list, event log and detectors.

use crate::application::blocks::BlockAdapter;
use crate::application::brute_force::{BruteForceDetector, BruteForceVerdict};
use crate::application::event_log::EventLogAdapter;
use crate::application::ports::{BlockEntry, Clock};
use crate::application::scorer::{SuspicionScorer, SuspicionVerdict};
use crate::domain::event::{SecurityEvent, SecurityEventType, Severity};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Attributes of a security event besides its type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventDetails {
    pub actor_key: String,
    pub severity: Severity,
    pub resource: Option<String>,
    pub resource_id: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl EventDetails {
    pub fn new(actor_key: impl Into<String>, severity: Severity) -> Self {
        Self {
            actor_key: actor_key.into(),
            severity,
            ..Self::default()
        }
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// The operations authentication flows and the gatekeeper need from the
/// security subsystem. Every method fails open.
#[derive(Debug, Clone)]
pub struct SecurityService {
    blocks: BlockAdapter,
    events: EventLogAdapter,
    brute_force: BruteForceDetector,
    scorer: SuspicionScorer,
    clock: Arc<dyn Clock>,
}

impl SecurityService {
    pub fn new(
        blocks: BlockAdapter,
        events: EventLogAdapter,
        brute_force: BruteForceDetector,
        scorer: SuspicionScorer,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            blocks,
            events,
            brute_force,
            scorer,
            clock,
        }
    }

    /// Append an event stamped with the current wall-clock time. Returns
    /// whether it was persisted.
    pub async fn log_security_event(
        &self,
        event_type: SecurityEventType,
        details: EventDetails,
    ) -> bool {
        let mut event = SecurityEvent::new(
            event_type,
            details.actor_key,
            details.severity,
            self.clock.unix_millis(),
        );
        if let Some(resource) = details.resource {
            event = event.with_resource(resource, details.resource_id);
        }
        event.metadata.extend(details.metadata);
        self.events.append(event).await
    }

    pub async fn is_ip_blocked(&self, actor_key: &str) -> bool {
        self.blocks.is_blocked(actor_key).await
    }

    pub async fn block_ip(
        &self,
        actor_key: &str,
        duration: Duration,
        reason: &str,
        severity: Severity,
    ) -> Option<BlockEntry> {
        self.blocks.block(actor_key, duration, reason, severity).await
    }

    pub async fn block_details(&self, actor_key: &str) -> Option<BlockEntry> {
        self.blocks.get(actor_key).await
    }

    pub async fn unblock_ip(&self, actor_key: &str) -> bool {
        self.blocks.unblock(actor_key).await
    }

    pub async fn detect_brute_force(&self, actor_key: &str) -> BruteForceVerdict {
        self.brute_force.record_failure(actor_key).await
    }

    /// Clear brute-force state after a successful authentication.
    pub async fn record_auth_success(&self, actor_key: &str) -> bool {
        self.brute_force.record_success(actor_key).await
    }

    pub async fn detect_suspicious_activity(
        &self,
        actor_key: &str,
        lookback: Duration,
    ) -> SuspicionVerdict {
        self.scorer.assess_within(actor_key, lookback).await
    }

    pub fn brute_force(&self) -> &BruteForceDetector {
        &self.brute_force
    }

    pub fn scorer(&self) -> &SuspicionScorer {
        &self.scorer
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}
