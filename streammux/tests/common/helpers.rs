//! Test helpers and builder patterns for stream multiplexer tests
//!
//! `SupervisorBuilder` wires a `MockProcessManager` whose `spawn` hands the
//! worker's descriptors to the test as a `FakeChild` instead of forking.

use nix::sys::signal::Signal;
use nix::unistd::Pid;
use std::os::fd::{BorrowedFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use shared::{negotiate_producer, EventMask, FrameWriter, Notifier, WorkerId};
use streammux::core::{read_frames, EventMultiplexer, SupervisorPolicy, Worker};
use streammux::services::Poller;
use streammux::{
    FrameStore, MockProcessManager, ReapStatus, StreamMuxError, StreamMuxResult, Supervisor, WorkerState,
};

use super::fixtures::TestFixtures;

/// The worker end of one spawn, held by the test
pub struct FakeChild {
    pub id: WorkerId,
    pub pid: Pid,
    pub control: UnixStream,
    pub notifier: Notifier,
}

impl FakeChild {
    pub fn start(&self) {
        self.notifier.signal(EventMask::CHILD_STARTED).unwrap();
    }

    /// Create, send and announce a frame slot of `capacity` bytes
    pub fn negotiate(&self, capacity: usize) -> FrameWriter {
        negotiate_producer(&self.control, &self.notifier, capacity).unwrap()
    }

    pub fn exit(&self) {
        self.notifier.signal(EventMask::PIPELINE_EXITED).unwrap();
    }
}

/// Channel plus spawn closure that stands in for fork/exec
pub fn fake_spawner(
    failing_attempts: Vec<usize>,
) -> (
    impl FnMut(WorkerId, &str, RawFd, RawFd) -> StreamMuxResult<Pid> + Send + 'static,
    mpsc::Receiver<FakeChild>,
) {
    let (tx, rx) = mpsc::channel();
    let next_pid = AtomicI32::new(TestFixtures::FIRST_PID);
    let attempts = AtomicUsize::new(0);

    let spawn = move |id: WorkerId, _source: &str, control_fd: RawFd, notify_fd: RawFd| -> StreamMuxResult<Pid> {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst);
        if failing_attempts.contains(&attempt) {
            return Err(StreamMuxError::spawn_failed(id, "scripted failure"));
        }
        let control = unsafe { BorrowedFd::borrow_raw(control_fd) }.try_clone_to_owned()?;
        let notify = unsafe { BorrowedFd::borrow_raw(notify_fd) }.try_clone_to_owned()?;
        let pid = Pid::from_raw(next_pid.fetch_add(1, Ordering::SeqCst));
        let _ = tx.send(FakeChild {
            id,
            pid,
            control: UnixStream::from(control),
            notifier: Notifier::from_fd(notify),
        });
        Ok(pid)
    };
    (spawn, rx)
}

/// Mock process manager backed by [`fake_spawner`]; kills and reaps always succeed
pub fn fake_process_manager(failing_attempts: Vec<usize>) -> (MockProcessManager, mpsc::Receiver<FakeChild>) {
    let (spawn, rx) = fake_spawner(failing_attempts);
    let mut process_manager = MockProcessManager::new();
    process_manager.expect_spawn().returning(spawn).times(0..);
    process_manager.expect_kill().returning(|_| Ok(())).times(0..);
    process_manager
        .expect_try_reap()
        .returning(|_| Ok(ReapStatus::Signaled(Signal::SIGKILL as i32)))
        .times(0..);
    (process_manager, rx)
}

/// Builder pattern for creating test supervisors with sensible defaults
pub struct SupervisorBuilder {
    workers: Vec<u32>,
    policy: SupervisorPolicy,
    failing_attempts: Vec<usize>,
}

impl SupervisorBuilder {
    pub fn new() -> Self {
        Self {
            workers: vec![0],
            policy: TestFixtures::policy(),
            failing_attempts: Vec::new(),
        }
    }

    pub fn with_workers(mut self, ids: &[u32]) -> Self {
        self.workers = ids.to_vec();
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.policy.cooldown = cooldown;
        self
    }

    /// Make these spawn attempts fail (0-based, counted across all workers)
    pub fn with_failing_spawns(mut self, attempts: &[usize]) -> Self {
        self.failing_attempts = attempts.to_vec();
        self
    }

    pub fn build(self) -> MuxHarness {
        let (process_manager, spawned) = fake_process_manager(self.failing_attempts);
        let poller = Arc::new(Poller::new().unwrap());
        let mut supervisor = Supervisor::new(process_manager, poller.clone(), self.policy);
        let mut frames = FrameStore::new();

        let t0 = Instant::now();
        for id in self.workers {
            supervisor.add_worker(WorkerId(id), format!("test://8x8?id={id}"), t0).unwrap();
            frames.add_worker(WorkerId(id));
        }

        MuxHarness {
            supervisor,
            frames,
            multiplexer: EventMultiplexer::new(poller),
            spawned,
            t0,
        }
    }
}

/// Supervisor, frame store and multiplexer driven step by step on a virtual clock
pub struct MuxHarness {
    pub supervisor: Supervisor<MockProcessManager>,
    pub frames: FrameStore,
    pub multiplexer: EventMultiplexer,
    pub spawned: mpsc::Receiver<FakeChild>,
    pub t0: Instant,
}

impl MuxHarness {
    pub fn at(&self, offset: Duration) -> Instant {
        self.t0 + offset
    }

    pub fn tick(&mut self, offset: Duration) {
        let now = self.at(offset);
        self.supervisor.tick(now, &mut self.frames);
    }

    /// Wait once for readiness and dispatch everything that arrived
    pub fn pump(&mut self, offset: Duration) -> Vec<EventMask> {
        let now = self.at(offset);
        let tokens = self.multiplexer.wait(TestFixtures::POLL).unwrap();
        tokens
            .into_iter()
            .filter_map(|token| self.multiplexer.dispatch(&mut self.supervisor, token, now))
            .collect()
    }

    pub fn read(&mut self, offset: Duration) -> usize {
        let now = self.at(offset);
        read_frames(&mut self.supervisor, &mut self.frames, now)
    }

    /// Publish one frame and carry it into the store
    pub fn deliver(&mut self, writer: &mut FrameWriter, fill: u8, offset: Duration) -> usize {
        let payload = TestFixtures::payload(writer.payload_capacity(), fill);
        writer.publish(&payload, 8, 8).unwrap();
        self.pump(offset);
        self.read(offset)
    }

    /// Next spawned fake child; panics when none was spawned
    pub fn next_child(&self) -> FakeChild {
        self.spawned.try_recv().expect("a worker should have been spawned")
    }

    pub fn no_spawn_pending(&self) -> bool {
        self.spawned.try_recv().is_err()
    }

    pub fn worker(&self, id: u32) -> &Worker {
        self.supervisor.worker(WorkerId(id)).expect("worker is supervised")
    }

    pub fn state(&self, id: u32) -> WorkerState {
        self.worker(id).state
    }

    /// Spawn everything, then start and negotiate each child
    pub fn bring_up(&mut self, capacity: usize) -> Vec<(FakeChild, FrameWriter)> {
        self.tick(Duration::ZERO);
        let mut children = Vec::new();
        while let Ok(child) = self.spawned.try_recv() {
            child.start();
            let writer = child.negotiate(capacity);
            children.push((child, writer));
        }
        self.pump(Duration::ZERO);
        children
    }
}
