//! Service implementations
//!
//! Real implementations of the OS-facing seams: process management and the
//! readiness poller over worker notification descriptors.

pub mod poller;
pub mod process_manager;

#[cfg(test)]
mod tests;

// Re-export all service implementations
pub use poller::{Poller, Token};
pub use process_manager::RealProcessManager;
