//! Application layer - orchestration of domain logic.
//!
//! This layer coordinates the domain types and the stores:
//! - Fail-open adapters around the counter, block and event backends
//! - Brute-force detection, suspicion scoring and adaptive limits
//! - The policy registry and the gatekeeper pipeline itself
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

pub mod blocks;
pub mod brute_force;
pub mod circuit_breaker;
pub mod counters;
pub mod event_log;
pub mod hooks;
pub mod metrics;
pub mod modulator;
pub mod pipeline;
pub mod ports;
pub mod registry;
pub mod scorer;
pub mod service;
