//! Common test utilities for end-to-end producer tests
//!
//! These spawn the real `producer` binary under a real `StreamMux`.

#![allow(dead_code)]

pub mod fixtures;
pub mod helpers;

pub use fixtures::TestFixtures;
pub use helpers::{pid_exists, wait_for, worker_health};
