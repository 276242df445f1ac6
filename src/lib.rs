//! # gatekeeper
//!
//! Request admission and abuse prevention for backend services.
//!
//! A [`Gatekeeper`] sits in front of protected operations and returns a
//! [`Decision`] for every inbound request: allow, throttle (HTTP 429) or
//! block (HTTP 403). Counters, blocks and security events live in pluggable
//! stores, so any number of service instances can share one view of an
//! actor through Redis.
//!
//! ## Quick Start
//!
//! ```rust
//! use gatekeeper::{Actor, Gatekeeper, Request};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let gatekeeper = Gatekeeper::builder()
//!     .with_platform_policies()
//!     .build()
//!     .unwrap();
//!
//! let actor = Actor::from_address("203.0.113.7").with_field("email", "alice@example.com");
//! let request = Request::new("auth", actor, "/api/auth/login");
//!
//! let decision = gatekeeper.check(&request).await;
//! assert!(decision.is_allow());
//! # }
//! ```
//!
//! ## Pipeline
//!
//! Every request runs the same fixed sequence of guard steps; the first one
//! to reach a verdict decides:
//!
//! 1. **Block check**: actors on the block list are rejected with `IP_BLOCKED`
//!    before any counter is touched.
//! 2. **Pattern check**: paths matching an attack signature (path traversal,
//!    injection probes, scanner targets) are rejected with
//!    `SUSPICIOUS_ACCESS` and the address is blocked for an hour. Scanner
//!    user agents are recorded but not rejected.
//! 3. **Rate limit**: the operation's policy is resolved, its limit is
//!    lowered for suspicious actors on adaptive policies, and the
//!    fixed-window counter is incremented.
//!
//! ## Policies
//!
//! A [`Policy`] is a named fixed-window rule: at most `max_requests` per
//! `window` for every key its [`KeyStrategy`] derives from the actor.
//! Operations are bound to policies in a [`PolicyRegistry`]; unbound
//! operations use the default policy if one is set.
//!
//! ```rust
//! use gatekeeper::{Gatekeeper, KeyStrategy, Policy, Severity};
//! use std::time::Duration;
//!
//! let login = Policy::new("login", 5, Duration::from_secs(15 * 60))
//!     .unwrap()
//!     .with_key_strategy(KeyStrategy::FieldAndAddress("email".to_string()))
//!     .with_severity(Severity::Medium)
//!     .reset_on_success();
//!
//! let gatekeeper = Gatekeeper::builder()
//!     .with_policy(login)
//!     .bind_operation("auth.login", "login")
//!     .build()
//!     .unwrap();
//! ```
//!
//! ## Brute-Force Detection
//!
//! Authentication flows report failures with
//! [`Gatekeeper::record_auth_failure`]. Five failures within fifteen minutes
//! block the address for thirty minutes. A success clears the count.
//!
//! ## Fail-Open
//!
//! Every store call runs under a timeout and a circuit breaker. When a store
//! errors, times out or the circuit is open, the gatekeeper logs the failure
//! (`event = "store_unavailable"`) and admits the request. Infrastructure
//! trouble never turns into a throttle or a block.
//!
//! ## Storage Backends
//!
//! The in-memory stores are the default and suit a single process. Enable
//! the `redis-storage` feature for [`RedisStorage`], which implements all
//! three store ports:
//!
//! ```toml
//! [dependencies]
//! gatekeeper = { version = "0.1", features = ["redis-storage"] }
//! ```
//!
//! ## Observability
//!
//! Every security event is also emitted through `tracing`, and
//! [`Gatekeeper::metrics`] exposes allowed/throttled/blocked counts plus
//! store and hook failures.

// Domain layer - pure business logic
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    actor::{Actor, Request},
    decision::{
        BlockReason, Decision, ErrorBody, Quota, Throttle, ACTOR_BLOCKED_CODE,
        SUSPICIOUS_ACCESS_CODE,
    },
    event::{SecurityEvent, SecurityEventType, Severity},
    pattern::{Classification, PatternDetector, PatternError},
    policy::{KeyStrategy, Policy, PolicyError, PolicySpec},
};

pub use application::{
    brute_force::{BruteForceConfig, BruteForceVerdict},
    circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState},
    hooks::{HookError, PostDecisionHook},
    metrics::{Metrics, MetricsSnapshot},
    pipeline::{Gatekeeper, GatekeeperSettings, GuardStep},
    ports::{
        BlockEntry, BlockStore, Clock, CounterSnapshot, CounterStore, EventLog, StoreError, MAX_TTL,
    },
    registry::PolicyRegistry,
    scorer::{ScorerConfig, SuspicionVerdict},
    service::{EventDetails, SecurityService},
};

pub use infrastructure::{
    builder::{BuildError, GatekeeperBuilder},
    clock::SystemClock,
    memory::{InMemoryBlockStore, InMemoryCounterStore, InMemoryEventLog},
};

#[cfg(feature = "redis-storage")]
pub use infrastructure::redis_storage::{RedisStorage, RedisStorageConfig};
