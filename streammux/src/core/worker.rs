//! One supervised source: process handle, descriptors, lifecycle bookkeeping

use nix::unistd::Pid;
use serde::Serialize;
use std::os::unix::net::UnixStream;
use std::time::{Duration, Instant};

use crate::core::lifecycle::WorkerState;
use shared::{FrameReader, Notifier, WorkerId};

/// Descriptors owned for one spawn generation
///
/// Dropping this closes the control socket and notification descriptor and
/// unmaps the frame region, if negotiated.
#[derive(Debug)]
pub struct WorkerChannels {
    /// Parent end of the control socket pair
    pub control: UnixStream,
    pub notifier: Notifier,
    /// Present once the producer's region has been received and mapped
    pub reader: Option<FrameReader>,
}

#[derive(Debug)]
pub struct Worker {
    pub id: WorkerId,
    pub source: String,
    pub state: WorkerState,
    pub state_since: Instant,
    pub pid: Option<Pid>,
    /// Incremented on every successful spawn
    pub generation: u32,
    pub channels: Option<WorkerChannels>,

    /// Set by the multiplexer, cleared once the frame reader took a frame
    pub frame_waiting: bool,
    /// The pipeline signalled its own exit this generation
    pub exit_reported: bool,

    /// Last sign of producer progress: a frame taken or a publish observed
    pub last_frame_at: Option<Instant>,
    /// Last time the consumer released this worker's frame
    pub last_release_at: Option<Instant>,
    pub last_spawn_attempt: Option<Instant>,
    /// Producer publish counter as last observed
    pub last_published: u64,
    /// Publish counter of the last frame taken
    pub last_taken: u64,

    pub frames_received: u64,
    pub frames_dropped: u64,
    pub restarts: u32,
}

impl Worker {
    pub fn new(id: WorkerId, source: impl Into<String>, now: Instant) -> Self {
        Self {
            id,
            source: source.into(),
            state: WorkerState::Creating,
            state_since: now,
            pid: None,
            generation: 0,
            channels: None,
            frame_waiting: false,
            exit_reported: false,
            last_frame_at: None,
            last_release_at: None,
            last_spawn_attempt: None,
            last_published: 0,
            last_taken: 0,
            frames_received: 0,
            frames_dropped: 0,
            restarts: 0,
        }
    }

    pub fn is_negotiated(&self) -> bool {
        self.channels.as_ref().is_some_and(|c| c.reader.is_some())
    }

    pub fn enter(&mut self, state: WorkerState, now: Instant) {
        self.state = state;
        self.state_since = now;
    }

    /// Start a fresh generation after a successful spawn
    pub fn begin_generation(&mut self, pid: Pid, channels: WorkerChannels) {
        if self.generation > 0 {
            self.restarts += 1;
        }
        self.generation += 1;
        self.pid = Some(pid);
        self.channels = Some(channels);
        self.frame_waiting = false;
        self.exit_reported = false;
        self.last_frame_at = None;
        self.last_release_at = None;
        self.last_published = 0;
        self.last_taken = 0;
    }

    /// Most recent evidence that this generation is making progress
    pub fn last_activity(&self) -> Instant {
        [self.last_frame_at, self.last_release_at]
            .into_iter()
            .flatten()
            .fold(self.state_since, Instant::max)
    }

    pub fn health(&self, now: Instant) -> WorkerHealth {
        WorkerHealth {
            id: self.id,
            source: self.source.clone(),
            state: self.state,
            pid: self.pid.map(|p| p.as_raw()),
            generation: self.generation,
            negotiated: self.is_negotiated(),
            since_last_frame: self.last_frame_at.map(|t| now.saturating_duration_since(t)),
            frames_received: self.frames_received,
            frames_dropped: self.frames_dropped,
            restarts: self.restarts,
        }
    }
}

/// Point-in-time view of one worker for operators and tests
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerHealth {
    pub id: WorkerId,
    pub source: String,
    pub state: WorkerState,
    pub pid: Option<i32>,
    pub generation: u32,
    pub negotiated: bool,
    pub since_last_frame: Option<Duration>,
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub restarts: u32,
}
