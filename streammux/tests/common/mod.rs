//! Common test utilities and infrastructure
//!
//! Shared fixtures and a harness that drives the supervisor, multiplexer
//! and frame reader by hand against in-process fake workers.

#![allow(dead_code)]

pub mod fixtures;
pub mod helpers;

// Re-export commonly used items for convenience
pub use fixtures::TestFixtures;
pub use helpers::{FakeChild, MuxHarness, SupervisorBuilder};
