//! Polling helpers for end-to-end tests

use nix::sys::signal;
use nix::unistd::Pid;
use std::time::Duration;
use tokio::time::Instant;

use shared::WorkerId;
use streammux::{StreamMux, WorkerHealth};

/// Poll `condition` every few milliseconds until it holds or `timeout` passes
pub async fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

pub fn worker_health(mux: &StreamMux, id: u32) -> WorkerHealth {
    mux.health()
        .into_iter()
        .find(|h| h.id == WorkerId(id))
        .expect("worker is supervised")
}

/// True while a process with this pid exists (zombies included)
pub fn pid_exists(pid: i32) -> bool {
    signal::kill(Pid::from_raw(pid), None).is_ok()
}
