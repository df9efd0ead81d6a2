//! Real process management service implementation
//!
//! Spawns worker executables through `Command` with their control socket
//! and notification descriptor placed at fixed slots, kills them with
//! SIGKILL and reaps them without blocking.

use nix::errno::Errno;
use nix::sys::prctl;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{dup2, Pid};
use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::Command;
use std::sync::{Mutex, PoisonError};

use crate::error::{StreamMuxError, StreamMuxResult};
use crate::traits::{ProcessManager, ReapStatus};
use shared::{process_debug, ProcessId, WorkerId, CONTROL_FD_SLOT, NOTIFY_FD_SLOT};

/// Lowest descriptor used for the child's copies before they move into their slots
const SCRATCH_FD_FLOOR: RawFd = 10;

/// Placeholders holding slots 3 and 4 in this process
///
/// While a slot is free here, `Command` may put its own exec-status pipe on
/// it, and the child's `dup2` into that slot would clobber the pipe.
static SLOT_GUARDS: Mutex<Option<Vec<OwnedFd>>> = Mutex::new(None);

/// Real process manager implementation
#[derive(Debug, Clone)]
pub struct RealProcessManager {
    /// Worker executable
    worker_path: PathBuf,

    /// Log level to pass to spawned workers
    log_level: String,
}

impl RealProcessManager {
    pub fn new(worker_path: impl Into<PathBuf>) -> Self {
        Self {
            worker_path: worker_path.into(),
            log_level: "info".to_string(),
        }
    }

    /// Configure log level (fluent API)
    pub fn with_log_level(mut self, log_level: impl Into<String>) -> Self {
        self.log_level = log_level.into();
        self
    }

    pub fn worker_path(&self) -> &PathBuf {
        &self.worker_path
    }

    fn args(&self, id: WorkerId, source: &str) -> Vec<String> {
        vec![
            "--id".to_string(),
            id.0.to_string(),
            "--source".to_string(),
            source.to_string(),
            "--log-level".to_string(),
            self.log_level.clone(),
        ]
    }
}

/// Make sure descriptor slots 3 and 4 are taken in this process
fn guard_fixed_slots() -> io::Result<()> {
    let mut guards = SLOT_GUARDS.lock().unwrap_or_else(PoisonError::into_inner);
    if guards.is_some() {
        return Ok(());
    }

    let devnull = File::open("/dev/null")?;
    let mut held = Vec::new();
    for _ in [CONTROL_FD_SLOT, NOTIFY_FD_SLOT] {
        let fd = rustix::io::fcntl_dupfd_cloexec(&devnull, CONTROL_FD_SLOT)?;
        if fd.as_raw_fd() <= NOTIFY_FD_SLOT {
            held.push(fd);
        }
    }
    *guards = Some(held);
    Ok(())
}

/// Close-on-exec copy of `fd` above the slot range
fn scratch_copy(fd: RawFd) -> io::Result<OwnedFd> {
    // The caller owns `fd` for the duration of the spawn.
    let fd = unsafe { BorrowedFd::borrow_raw(fd) };
    Ok(rustix::io::fcntl_dupfd_cloexec(fd, SCRATCH_FD_FLOOR)?)
}

impl ProcessManager for RealProcessManager {
    fn spawn(&self, id: WorkerId, source: &str, control_fd: RawFd, notify_fd: RawFd) -> StreamMuxResult<Pid> {
        let failed = |e: io::Error| StreamMuxError::spawn_failed(id, format!("{}: {e}", self.worker_path.display()));

        guard_fixed_slots().map_err(failed)?;
        let control = scratch_copy(control_fd).map_err(failed)?;
        let notify = scratch_copy(notify_fd).map_err(failed)?;
        let (control_raw, notify_raw) = (control.as_raw_fd(), notify.as_raw_fd());

        let mut command = Command::new(&self.worker_path);
        command.args(self.args(id, source));
        // Runs in the forked child: dup2 and prctl only, no allocation.
        unsafe {
            command.pre_exec(move || {
                dup2(control_raw, CONTROL_FD_SLOT)?;
                dup2(notify_raw, NOTIFY_FD_SLOT)?;
                // Workers never outlive the muxer.
                prctl::set_pdeathsig(Signal::SIGKILL)?;
                Ok(())
            });
        }

        // Exec failures come back from `spawn` itself.
        let child = command.spawn().map_err(failed)?;
        let pid = Pid::from_raw(child.id() as i32);
        process_debug!(
            ProcessId::current(),
            "Spawned {} as pid {} for {}",
            id,
            pid,
            source
        );
        Ok(pid)
    }

    fn kill(&self, pid: Pid) -> StreamMuxResult<()> {
        match signal::kill(pid, Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn try_reap(&self, pid: Pid) -> StreamMuxResult<ReapStatus> {
        match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(_, code)) => Ok(ReapStatus::Exited(code)),
            Ok(WaitStatus::Signaled(_, sig, _)) => Ok(ReapStatus::Signaled(sig as i32)),
            Ok(_) => Ok(ReapStatus::Running),
            Err(Errno::ECHILD) => Ok(ReapStatus::Gone),
            Err(e) => Err(e.into()),
        }
    }
}
