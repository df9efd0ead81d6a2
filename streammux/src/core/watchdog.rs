//! Staleness watchdog
//!
//! Decides, on each lifecycle tick, whether an `Alive` worker must start
//! the teardown path. It never touches the process itself.

use std::time::{Duration, Instant};

use crate::core::lifecycle::{LifecycleEvent, WorkerState};
use crate::core::worker::Worker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogPolicy {
    /// Longest gap between frames of a negotiated worker
    pub staleness_window: Duration,
    /// Longest time a worker may stay alive without negotiating
    pub negotiation_timeout: Duration,
}

pub fn check(worker: &Worker, policy: &WatchdogPolicy, now: Instant) -> Option<LifecycleEvent> {
    if worker.state != WorkerState::Alive {
        return None;
    }
    if worker.exit_reported {
        return Some(LifecycleEvent::PipelineExited);
    }

    let (since, limit) = if worker.is_negotiated() {
        (worker.last_activity(), policy.staleness_window)
    } else {
        (worker.state_since, policy.negotiation_timeout)
    };

    if now.saturating_duration_since(since) > limit {
        Some(LifecycleEvent::Stale)
    } else {
        None
    }
}
