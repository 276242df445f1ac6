//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the application
//! layer needs. Infrastructure adapters implement these ports: in-memory maps
//! for single-instance deployments and tests, Redis for shared state across
//! server processes.
//!
//! Every store operation is a single-key atomic primitive. Callers never
//! read-modify-write through these traits.

use crate::domain::event::{SecurityEvent, Severity};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Port for obtaining current time.
///
/// `now` drives window and TTL arithmetic; `wall` stamps events and response
/// envelopes. Test clocks advance both together.
pub trait Clock: Send + Sync + Debug {
    /// Get the current monotonic instant.
    fn now(&self) -> Instant;

    /// Get the current wall-clock time.
    fn wall(&self) -> SystemTime;

    /// Wall-clock time as milliseconds since the Unix epoch.
    fn unix_millis(&self) -> u64 {
        self.wall()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_millis() as u64
    }
}

/// Error raised by a store or event log backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Backend unreachable or returned an error
    Unavailable(String),
    /// Call exceeded its deadline
    Timeout(Duration),
    /// Stored value could not be encoded or decoded
    Serialization(String),
    /// Call skipped because the circuit breaker is open
    CircuitOpen,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unavailable(reason) => write!(f, "store unavailable: {}", reason),
            StoreError::Timeout(after) => write!(f, "store call timed out after {:?}", after),
            StoreError::Serialization(reason) => write!(f, "serialization error: {}", reason),
            StoreError::CircuitOpen => write!(f, "circuit breaker open"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Counter state observed by one increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Count after this increment.
    pub count: u64,
    /// Time left until the window established by the first increment ends.
    pub ttl_remaining: Duration,
    /// True when the value is a fail-open placeholder, not a real count.
    pub degraded: bool,
}

impl CounterSnapshot {
    pub fn new(count: u64, ttl_remaining: Duration) -> Self {
        Self {
            count,
            ttl_remaining,
            degraded: false,
        }
    }

    /// Placeholder returned when the counter backend cannot be reached.
    pub fn fail_open(window: Duration) -> Self {
        Self {
            count: 0,
            ttl_remaining: window,
            degraded: true,
        }
    }
}

/// Longest TTL a store records. Longer windows and block durations are
/// clamped to it.
pub const MAX_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// An active block on an actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEntry {
    pub actor_key: String,
    pub reason: String,
    pub severity: Severity,
    /// Milliseconds since the Unix epoch.
    pub created_at_ms: u64,
    /// Milliseconds since the Unix epoch. Always greater than `created_at_ms`.
    pub expires_at_ms: u64,
}

impl BlockEntry {
    /// Time left on the block relative to `now_ms`.
    pub fn remaining(&self, now_ms: u64) -> Duration {
        Duration::from_millis(self.expires_at_ms.saturating_sub(now_ms))
    }
}

/// Port for fixed-window counters.
#[async_trait]
pub trait CounterStore: Send + Sync + Debug {
    /// Atomically increment `key`.
    ///
    /// The first increment creates the entry with `count = 1` and an expiry
    /// of `now + window`. Later increments inside the window never move the
    /// expiry. Once expired the next increment starts a fresh window.
    async fn increment(&self, key: &str, window: Duration) -> Result<CounterSnapshot, StoreError>;

    /// Delete the counter for `key`.
    async fn reset(&self, key: &str) -> Result<(), StoreError>;
}

/// Port for the auto-expiring block list.
#[async_trait]
pub trait BlockStore: Send + Sync + Debug {
    /// Record a block that expires after `duration`. Replaces any existing
    /// block for the same key.
    async fn set_block(
        &self,
        actor_key: &str,
        duration: Duration,
        reason: &str,
        severity: Severity,
    ) -> Result<BlockEntry, StoreError>;

    /// Whether an unexpired block exists for `actor_key`.
    async fn is_blocked(&self, actor_key: &str) -> Result<bool, StoreError>;

    /// The unexpired block for `actor_key`, if any.
    async fn get_block(&self, actor_key: &str) -> Result<Option<BlockEntry>, StoreError>;

    /// Remove a block. Returns whether one existed.
    async fn unblock(&self, actor_key: &str) -> Result<bool, StoreError>;
}

/// Port for the append-only security event log.
#[async_trait]
pub trait EventLog: Send + Sync + Debug {
    async fn append(&self, event: SecurityEvent) -> Result<(), StoreError>;

    /// Events for `actor_key` with `timestamp_ms >= since_ms`, oldest first.
    async fn recent(&self, actor_key: &str, since_ms: u64)
        -> Result<Vec<SecurityEvent>, StoreError>;
}
