//! Gamefield-level tests.
//!
//! The per-module unit tests cover the building blocks; these drive a whole
//! [`Gamefield`](crate::Gamefield) through ticks and client messages.
//!
//! # Test Structure
//!
//! - `lifecycle.rs`: staging, destruction, counters, telemetry and the loop thread
//! - `scenarios.rs`: eating, spawning, broadcasts and player sessions
//! - `helpers.rs`: recording connections and option presets

mod helpers;

// Re-export for convenience
pub use helpers::*;
