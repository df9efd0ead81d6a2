//! Service-specific tests
//!
//! These run the real OS-facing services: forked processes, eventfds and
//! epoll. Each service has its own test file.


// Common test utilities for services
#[cfg(test)]
pub mod common {
    use nix::unistd::Pid;
    use std::os::unix::fs::PermissionsExt;
    use std::os::unix::net::UnixStream;
    use std::path::{Path, PathBuf};
    use std::time::{Duration, Instant};

    use crate::error::{StreamMuxError, StreamMuxResult};
    use crate::services::RealProcessManager;
    use crate::traits::{ProcessManager, ReapStatus};
    use shared::{Notifier, WorkerId};

    /// Upper bound for a child to exit on its own
    pub const EXIT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Write an executable shell script into `dir`
    pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Descriptors a worker is spawned with
    pub struct ChildEnds {
        pub control: UnixStream,
        pub peer: UnixStream,
        pub notifier: Notifier,
    }

    impl ChildEnds {
        pub fn new() -> Self {
            let (control, peer) = UnixStream::pair().unwrap();
            Self { control, peer, notifier: Notifier::new().unwrap() }
        }
    }

    /// Spawn, retrying while another test thread still holds the fresh
    /// script open for writing (ETXTBSY)
    pub fn spawn_retrying(
        manager: &RealProcessManager,
        id: WorkerId,
        source: &str,
        ends: &ChildEnds,
    ) -> StreamMuxResult<Pid> {
        use std::os::fd::AsRawFd;

        let mut attempts = 0;
        loop {
            match manager.spawn(id, source, ends.peer.as_raw_fd(), ends.notifier.as_raw_fd()) {
                Err(StreamMuxError::SpawnFailed { reason, .. }) if reason.contains("busy") && attempts < 20 => {
                    attempts += 1;
                    std::thread::sleep(Duration::from_millis(25));
                }
                other => return other,
            }
        }
    }

    /// Poll `try_reap` until the child is gone or `timeout` passes
    pub fn wait_for_exit(manager: &RealProcessManager, pid: Pid, timeout: Duration) -> ReapStatus {
        let deadline = Instant::now() + timeout;
        loop {
            let status = manager.try_reap(pid).unwrap();
            if status.is_dead() || Instant::now() >= deadline {
                return status;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}
