//! Trait definitions with mockall annotations for testing
//!
//! The supervisor drives worker processes only through these seams, so the
//! lifecycle logic can be exercised without forking real children.

use nix::unistd::Pid;
use std::os::fd::RawFd;

use crate::error::StreamMuxResult;
use shared::WorkerId;

/// Outcome of a non-blocking reap attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReapStatus {
    /// Process has not exited yet
    Running,
    /// Exited on its own with this code
    Exited(i32),
    /// Terminated by this signal
    Signaled(i32),
    /// No such child; already reaped
    Gone,
}

impl ReapStatus {
    pub fn is_dead(&self) -> bool {
        !matches!(self, ReapStatus::Running)
    }
}

/// Process management abstraction for decode workers
///
/// Implementations must be idempotent on dead processes: killing or reaping
/// a process that no longer exists succeeds.
#[mockall::automock]
pub trait ProcessManager: Send + Sync {
    /// Fork and exec a worker for `source`
    ///
    /// `control_fd` and `notify_fd` are moved to the fixed descriptor slots
    /// in the child; the caller keeps ownership of its own copies.
    fn spawn(&self, id: WorkerId, source: &str, control_fd: RawFd, notify_fd: RawFd) -> StreamMuxResult<Pid>;

    /// Send a forceful kill signal
    fn kill(&self, pid: Pid) -> StreamMuxResult<()>;

    /// Non-blocking wait for `pid`
    fn try_reap(&self, pid: Pid) -> StreamMuxResult<ReapStatus>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_process_manager() {
        let mut mock = MockProcessManager::new();
        mock.expect_kill().returning(|_| Ok(()));
        mock.expect_try_reap().returning(|_| Ok(ReapStatus::Gone));

        assert!(mock.kill(Pid::from_raw(42)).is_ok());
        assert!(mock.try_reap(Pid::from_raw(42)).unwrap().is_dead());
    }

    #[test]
    fn test_reap_status_liveness() {
        assert!(!ReapStatus::Running.is_dead());
        assert!(ReapStatus::Exited(0).is_dead());
        assert!(ReapStatus::Signaled(9).is_dead());
        assert!(ReapStatus::Gone.is_dead());
    }
}
