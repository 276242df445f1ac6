//! Mock implementations for testing.
//!
//! This module provides test doubles for infrastructure adapters,
//! enabling controlled testing of application logic.

pub mod clock;
pub mod faulty;
pub mod layer;

pub use clock::{MockClock, MOCK_EPOCH_MILLIS};
pub use faulty::FaultyStore;
pub use layer::MockCaptureLayer;
