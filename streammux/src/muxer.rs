//! `StreamMux`: the consumer-facing facade
//!
//! Owns the shared state and runs the background activities (event
//! multiplexer, frame reader, lifecycle tick) that all serialise on one
//! mutex. Each activity owns a blocking thread, so that lock is never
//! taken on the async workers. Consumer calls take the same lock briefly and never
//! block on a worker.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::MuxConfig;
use crate::core::{
    read_frames, EventMultiplexer, Frame, FrameStore, Supervisor, SupervisorPolicy, ThroughputMeter, WorkerHealth,
};
use crate::error::StreamMuxResult;
use crate::services::{Poller, RealProcessManager};
use crate::traits::ProcessManager;
use shared::{logging, process_debug, process_info, ProcessId, WorkerId};

/// How long shutdown waits for killed workers to be reaped
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Everything the background activities and the consumer share
pub struct MuxState<P: ProcessManager> {
    pub supervisor: Supervisor<P>,
    pub frames: FrameStore,
    pub stats: ThroughputMeter,
}

pub struct StreamMux<P: ProcessManager + 'static = RealProcessManager> {
    state: Arc<Mutex<MuxState<P>>>,
    poller: Arc<Poller>,
    config: MuxConfig,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    stopped: bool,
}

impl StreamMux<RealProcessManager> {
    /// Build a muxer that execs real worker processes
    pub fn from_config(config: MuxConfig, log_level: &str) -> StreamMuxResult<Self> {
        let process_manager = RealProcessManager::new(config.resolve_worker_path()?).with_log_level(log_level);
        Self::new(config, process_manager)
    }
}

impl<P: ProcessManager + 'static> StreamMux<P> {
    pub fn new(config: MuxConfig, process_manager: P) -> StreamMuxResult<Self> {
        config.validate()?;
        let now = Instant::now();

        let poller = Arc::new(Poller::new()?);
        let mut supervisor = Supervisor::new(process_manager, poller.clone(), SupervisorPolicy::from(&config));
        let mut frames = FrameStore::new();
        for source in &config.sources {
            supervisor.add_worker(source.worker_id(), source.url.as_str(), now)?;
            frames.add_worker(source.worker_id());
        }

        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            state: Arc::new(Mutex::new(MuxState {
                supervisor,
                frames,
                stats: ThroughputMeter::new(now),
            })),
            poller,
            config,
            shutdown_tx,
            tasks: Vec::new(),
            stopped: false,
        })
    }

    /// Start the background activities; must run inside a tokio runtime
    pub fn start(&mut self) {
        if !self.tasks.is_empty() {
            return;
        }
        process_info!(
            ProcessId::current(),
            "Supervising {} source(s), staleness window {:?}, cool-down {:?}",
            self.config.sources.len(),
            self.config.staleness_window,
            self.config.cooldown
        );
        self.tasks.push(self.spawn_multiplexer());
        self.tasks.push(self.spawn_reader());
        self.tasks.push(self.spawn_lifecycle());
    }

    /// Longest-neglected ready frame; the caller must `release` it later
    pub fn pull_one(&self) -> Option<Frame> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let frame = state.frames.pull_one()?;
        state.stats.record(1, Instant::now());
        Some(frame)
    }

    /// Exactly `batch_size` frames, oldest first, or `None`
    pub fn pull_batch(&self, batch_size: usize) -> Option<Vec<Frame>> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let batch = state.frames.pull_batch(batch_size)?;
        state.stats.record(batch.len(), Instant::now());
        Some(batch)
    }

    /// Hand `worker`'s slot back so the reader can refill it
    pub fn release(&self, worker: WorkerId) -> StreamMuxResult<()> {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.frames.release(worker)?;
        state.supervisor.note_release(worker, Instant::now());
        Ok(())
    }

    /// Cached frame of one source without affecting selection
    pub fn snapshot(&self, worker: WorkerId) -> Option<Frame> {
        self.lock().frames.snapshot(worker)
    }

    pub fn last_frame_age(&self, worker: WorkerId) -> Option<Duration> {
        self.lock().frames.last_frame_age(worker, Instant::now())
    }

    pub fn health(&self) -> Vec<WorkerHealth> {
        self.lock().supervisor.health(Instant::now())
    }

    pub fn average_fps(&self) -> f64 {
        self.lock().stats.average_fps()
    }

    pub fn config(&self) -> &MuxConfig {
        &self.config
    }

    /// Direct access to the shared state, for embedding and tests
    pub fn state(&self) -> &Arc<Mutex<MuxState<P>>> {
        &self.state
    }

    /// Stop background activities, kill and reap every worker, release descriptors
    pub async fn shutdown(mut self) {
        logging::log_shutdown(ProcessId::current(), "stream multiplexer");
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                logging::log_error(ProcessId::current(), "Background task", &e);
            }
        }

        lock_state(&self.state).supervisor.kill_all();
        let deadline = Instant::now() + SHUTDOWN_GRACE;
        loop {
            let remaining = lock_state(&self.state).supervisor.reap_all();
            if remaining == 0 || Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        release_all(&self.state);

        self.stopped = true;
        logging::log_success(ProcessId::current(), "All workers stopped");
    }

    fn lock(&self) -> MutexGuard<'_, MuxState<P>> {
        lock_state(&self.state)
    }

    fn spawn_multiplexer(&self) -> JoinHandle<()> {
        let state = self.state.clone();
        let poller = self.poller.clone();
        let shutdown = self.shutdown_tx.subscribe();
        let timeout = self.config.poll_timeout;

        tokio::task::spawn_blocking(move || {
            let mut multiplexer = EventMultiplexer::new(poller);
            while !*shutdown.borrow() {
                let tokens = match multiplexer.wait(timeout) {
                    Ok(tokens) => tokens,
                    Err(e) => {
                        logging::log_error(ProcessId::current(), "Readiness wait", &e);
                        std::thread::sleep(timeout);
                        continue;
                    }
                };
                if tokens.is_empty() {
                    continue;
                }

                let now = Instant::now();
                let mut guard = lock_state(&state);
                for token in tokens {
                    multiplexer.dispatch(&mut guard.supervisor, token, now);
                }
            }
            process_debug!(
                ProcessId::current(),
                "Multiplexer stopped ({} stale events discarded)",
                multiplexer.discarded()
            );
        })
    }

    fn spawn_reader(&self) -> JoinHandle<()> {
        let state = self.state.clone();
        let shutdown = self.shutdown_tx.subscribe();
        let period = self.config.reader_interval;

        tokio::task::spawn_blocking(move || {
            while !*shutdown.borrow() {
                reader_pass(&state);
                std::thread::sleep(period);
            }
        })
    }

    /// Lifecycle ticks and stats on one long-lived thread
    ///
    /// Worker spawns happen here, and a worker's parent-death signal follows
    /// the thread that spawned it.
    fn spawn_lifecycle(&self) -> JoinHandle<()> {
        let state = self.state.clone();
        let shutdown = self.shutdown_tx.subscribe();
        let tick_period = self.config.tick_interval;
        let stats_period = self.config.stats_interval;

        tokio::task::spawn_blocking(move || {
            let mut next_stats = Instant::now() + stats_period;
            while !*shutdown.borrow() {
                lifecycle_pass(&state);
                let now = Instant::now();
                if now >= next_stats {
                    stats_pass(&state);
                    next_stats = now + stats_period;
                }
                std::thread::sleep(tick_period);
            }
        })
    }
}

impl<P: ProcessManager + 'static> Drop for StreamMux<P> {
    fn drop(&mut self) {
        if self.stopped {
            return;
        }
        let _ = self.shutdown_tx.send(true);
        let mut guard = lock_state(&self.state);
        let state = &mut *guard;
        state.supervisor.kill_all();
        state.supervisor.reap_all();
        state.supervisor.release_all(&mut state.frames);
    }
}

fn lock_state<P: ProcessManager>(state: &Mutex<MuxState<P>>) -> MutexGuard<'_, MuxState<P>> {
    // A panic in one activity must not wedge the others.
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn reader_pass<P: ProcessManager>(state: &Mutex<MuxState<P>>) {
    let mut guard = lock_state(state);
    let state = &mut *guard;
    read_frames(&mut state.supervisor, &mut state.frames, Instant::now());
}

fn lifecycle_pass<P: ProcessManager>(state: &Mutex<MuxState<P>>) {
    let mut guard = lock_state(state);
    let state = &mut *guard;
    state.supervisor.tick(Instant::now(), &mut state.frames);
}

fn stats_pass<P: ProcessManager>(state: &Mutex<MuxState<P>>) {
    let mut guard = lock_state(state);
    let now = Instant::now();
    guard.stats.roll(now);
    process_info!(
        ProcessId::current(),
        "📊 {:.1} frames/s handed out, {} ready",
        guard.stats.average_fps(),
        guard.frames.ready_count()
    );
    for health in guard.supervisor.health(now) {
        process_debug!(
            ProcessId::current(),
            "{} {} gen={} pid={:?} received={} dropped={} restarts={}",
            health.id,
            health.state,
            health.generation,
            health.pid,
            health.frames_received,
            health.frames_dropped,
            health.restarts
        );
    }
}

fn release_all<P: ProcessManager>(state: &Mutex<MuxState<P>>) {
    let mut guard = lock_state(state);
    let state = &mut *guard;
    state.supervisor.release_all(&mut state.frames);
}
