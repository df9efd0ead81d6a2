//! Core types used on both sides of the process boundary

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Hard cap on concurrently supervised sources
pub const MAX_WORKERS: usize = 128;

/// Descriptor slot the control socket is moved to in the worker process
pub const CONTROL_FD_SLOT: i32 = 3;

/// Descriptor slot the notification descriptor is moved to in the worker process
pub const NOTIFY_FD_SLOT: i32 = 4;

/// Global process ID singleton - set once at startup
static PROCESS_ID: OnceLock<ProcessId> = OnceLock::new();

/// Identifier of one video source and the worker that decodes it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(pub u32);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker_{}", self.0)
    }
}

impl From<u32> for WorkerId {
    fn from(id: u32) -> Self {
        WorkerId(id)
    }
}

/// Process identifier for any component in the system
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessId {
    /// The supervising muxer process (singleton)
    Muxer,
    /// A decode worker serving one source
    Worker(u32),
}

impl ProcessId {
    /// Initialize the global process ID for a worker with explicit ID
    pub fn init_worker(id: u32) -> &'static ProcessId {
        PROCESS_ID.get_or_init(|| ProcessId::Worker(id))
    }

    /// Initialize the global process ID for the muxer
    pub fn init_muxer() -> &'static ProcessId {
        PROCESS_ID.get_or_init(|| ProcessId::Muxer)
    }

    /// Get the global process ID, defaulting to the muxer when never initialized
    pub fn current() -> &'static ProcessId {
        PROCESS_ID.get_or_init(|| ProcessId::Muxer)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessId::Muxer => write!(f, "streammux"),
            ProcessId::Worker(id) => write!(f, "worker_{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_id_display_and_order() {
        let a = WorkerId(1);
        let b = WorkerId::from(7);

        assert_eq!(a.to_string(), "worker_1");
        assert!(a < b);
    }

    #[test]
    fn test_process_id_display() {
        assert_eq!(ProcessId::Muxer.to_string(), "streammux");
        assert_eq!(ProcessId::Worker(3).to_string(), "worker_3");
    }
}
