//! Domain layer - pure types with no I/O.
//!
//! This layer contains the core concepts and invariants of the gatekeeper:
//! - Actor identity and request description
//! - Rate-limit policies and key derivation
//! - Security events and severities
//! - Attack-signature classification
//! - Decisions and their HTTP envelope
//!
//! All types in this layer are pure and easily testable.

pub mod actor;
pub mod decision;
pub mod event;
pub mod pattern;
pub mod policy;
