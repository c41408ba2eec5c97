//! Test utilities and helpers for Roster
//!
//! Fixtures, assertions and deterministic randomness shared by the unit
//! tests across the crate.

pub mod assertions;
pub mod deterministic_rng;
pub mod fixtures;

pub use assertions::*;
pub use deterministic_rng::*;
pub use fixtures::*;
