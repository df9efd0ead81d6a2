//! Worker supervisor
//!
//! Owns every worker, runs the lifecycle state machine and performs its
//! effects through the [`ProcessManager`] seam. All failures are logged and
//! absorbed here; a worker that cannot make progress simply stays where it
//! is and is retried on the next tick.

use nix::unistd::Pid;
use std::collections::BTreeMap;
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::MuxConfig;
use crate::core::frame_store::FrameStore;
use crate::core::lifecycle::{pending_effect, transition, Effect, LifecycleEvent, WorkerState};
use crate::core::watchdog::{self, WatchdogPolicy};
use crate::core::worker::{Worker, WorkerChannels, WorkerHealth};
use crate::error::{StreamMuxError, StreamMuxResult};
use crate::services::{Poller, Token};
use crate::traits::{ProcessManager, ReapStatus};
use shared::{logging, process_debug, process_info, process_warn, Notifier, ProcessId, WorkerId, MAX_WORKERS};

/// Upper bound on chained transitions handled for one worker in one call
const MAX_CHAIN: usize = 8;

/// Read timeout on the parent end of a control socket
const CONTROL_READ_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorPolicy {
    pub watchdog: WatchdogPolicy,
    pub cooldown: Duration,
    pub spawn_retry_interval: Duration,
}

impl From<&MuxConfig> for SupervisorPolicy {
    fn from(config: &MuxConfig) -> Self {
        Self {
            watchdog: WatchdogPolicy {
                staleness_window: config.staleness_window,
                negotiation_timeout: config.negotiation_timeout,
            },
            cooldown: config.cooldown,
            spawn_retry_interval: config.spawn_retry_interval,
        }
    }
}

pub struct Supervisor<P: ProcessManager> {
    process_manager: P,
    poller: Arc<Poller>,
    policy: SupervisorPolicy,
    workers: BTreeMap<WorkerId, Worker>,
}

impl<P: ProcessManager> Supervisor<P> {
    pub fn new(process_manager: P, poller: Arc<Poller>, policy: SupervisorPolicy) -> Self {
        Self {
            process_manager,
            poller,
            policy,
            workers: BTreeMap::new(),
        }
    }

    /// Register a source; its worker is spawned on the next tick
    pub fn add_worker(&mut self, id: WorkerId, source: impl Into<String>, now: Instant) -> StreamMuxResult<()> {
        if self.workers.contains_key(&id) {
            return Err(StreamMuxError::config(format!("{id} is already supervised")));
        }
        if self.workers.len() >= MAX_WORKERS {
            return Err(StreamMuxError::TooManyWorkers { limit: MAX_WORKERS });
        }
        self.workers.insert(id, Worker::new(id, source, now));
        Ok(())
    }

    pub fn worker(&self, id: WorkerId) -> Option<&Worker> {
        self.workers.get(&id)
    }

    pub fn worker_mut(&mut self, id: WorkerId) -> Option<&mut Worker> {
        self.workers.get_mut(&id)
    }

    pub fn workers(&self) -> impl Iterator<Item = &Worker> {
        self.workers.values()
    }

    pub fn workers_mut(&mut self) -> impl Iterator<Item = &mut Worker> {
        self.workers.values_mut()
    }

    pub fn policy(&self) -> &SupervisorPolicy {
        &self.policy
    }

    pub fn poller(&self) -> &Arc<Poller> {
        &self.poller
    }

    pub fn health(&self, now: Instant) -> Vec<WorkerHealth> {
        self.workers.values().map(|w| w.health(now)).collect()
    }

    /// Consumer released `id`'s frame; counts as liveness
    pub fn note_release(&mut self, id: WorkerId, now: Instant) {
        if let Some(worker) = self.workers.get_mut(&id) {
            worker.last_release_at = Some(now);
        }
    }

    /// One lifecycle pass over every worker
    pub fn tick(&mut self, now: Instant, frames: &mut FrameStore) {
        let ids: Vec<WorkerId> = self.workers.keys().copied().collect();
        for id in ids {
            let verdict = self
                .workers
                .get(&id)
                .and_then(|w| watchdog::check(w, &self.policy.watchdog, now));
            if let Some(event) = verdict {
                if let Some(worker) = self.workers.get(&id) {
                    process_warn!(
                        ProcessId::current(),
                        "{} flagged {:?}: negotiated={} idle={:?}",
                        id,
                        event,
                        worker.is_negotiated(),
                        now.saturating_duration_since(worker.last_activity())
                    );
                }
                self.handle_event(id, event, now, frames);
            }

            let Some(worker) = self.workers.get(&id) else { continue };
            let state = worker.state;
            let idle = now.saturating_duration_since(worker.state_since);
            let last_spawn_attempt = worker.last_spawn_attempt;
            match state {
                WorkerState::Buried if idle >= self.policy.cooldown => {
                    self.handle_event(id, LifecycleEvent::CooldownElapsed, now, frames);
                }
                WorkerState::Creating => {
                    let due = last_spawn_attempt
                        .map_or(true, |t| now.saturating_duration_since(t) >= self.policy.spawn_retry_interval);
                    if due {
                        self.retry(id, Effect::Spawn, now, frames);
                    }
                }
                state => {
                    if let Some(effect) = pending_effect(state) {
                        self.retry(id, effect, now, frames);
                    }
                }
            }
        }
    }

    /// Feed `event` into `id`'s state machine and carry out the effects
    pub fn handle_event(&mut self, id: WorkerId, event: LifecycleEvent, now: Instant, frames: &mut FrameStore) {
        let mut pending = Some(event);
        for _ in 0..MAX_CHAIN {
            let Some(event) = pending.take() else { break };
            let Some(worker) = self.workers.get_mut(&id) else { return };

            let from = worker.state;
            let step = transition(from, event);
            if step.next != from {
                worker.enter(step.next, now);
                logging::log_transition(
                    ProcessId::current(),
                    &id,
                    &from,
                    &step.next,
                    &event,
                    worker.generation,
                    worker.pid.map(Pid::as_raw),
                );
            } else {
                process_debug!(ProcessId::current(), "{} stays {} on {:?}", id, from, event);
            }

            for effect in step.effects {
                if let Some(next) = self.run_effect(id, effect, now, frames) {
                    pending = Some(next);
                }
            }
        }
    }

    /// Kill `id`'s process if its state is waiting on that step; safe to repeat
    pub fn kill_worker(&mut self, id: WorkerId, now: Instant, frames: &mut FrameStore) -> StreamMuxResult<()> {
        self.require(id)?;
        self.retry(id, Effect::Kill, now, frames);
        Ok(())
    }

    /// Reap `id`'s process if its state is waiting on that step; safe to repeat
    pub fn reap_worker(&mut self, id: WorkerId, now: Instant, frames: &mut FrameStore) -> StreamMuxResult<()> {
        self.require(id)?;
        self.retry(id, Effect::Reap, now, frames);
        Ok(())
    }

    /// Close `id`'s descriptors and unmap its region if its state is waiting
    /// on that step; safe to repeat
    pub fn release_worker(&mut self, id: WorkerId, now: Instant, frames: &mut FrameStore) -> StreamMuxResult<()> {
        self.require(id)?;
        self.retry(id, Effect::Release, now, frames);
        Ok(())
    }

    /// SIGKILL every worker that still has a process
    pub fn kill_all(&mut self) {
        for worker in self.workers.values() {
            if let Some(pid) = worker.pid {
                if let Err(e) = self.process_manager.kill(pid) {
                    logging::log_error(ProcessId::current(), &format!("Killing {}", worker.id), &e);
                }
            }
        }
    }

    /// One non-blocking reap pass; returns how many processes remain
    pub fn reap_all(&mut self) -> usize {
        let mut remaining = 0;
        for worker in self.workers.values_mut() {
            let Some(pid) = worker.pid else { continue };
            match self.process_manager.try_reap(pid) {
                Ok(status) if status.is_dead() => worker.pid = None,
                Ok(_) => remaining += 1,
                Err(e) => {
                    logging::log_error(ProcessId::current(), &format!("Reaping {}", worker.id), &e);
                    remaining += 1;
                }
            }
        }
        remaining
    }

    /// Release every worker's descriptors and cached frame
    pub fn release_all(&mut self, frames: &mut FrameStore) {
        let ids: Vec<WorkerId> = self.workers.keys().copied().collect();
        for id in ids {
            self.release_channels(id);
            frames.reset(id);
        }
    }

    /// Blocking teardown for callers outside an async runtime
    pub fn shutdown(&mut self, frames: &mut FrameStore, grace: Duration) {
        self.kill_all();
        let deadline = Instant::now() + grace;
        while self.reap_all() > 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        self.release_all(frames);
    }

    fn require(&self, id: WorkerId) -> StreamMuxResult<()> {
        if self.workers.contains_key(&id) {
            Ok(())
        } else {
            Err(StreamMuxError::UnknownWorker { worker: id })
        }
    }

    /// Run `effect` only when it is the one `id`'s current state still owes
    fn retry(&mut self, id: WorkerId, effect: Effect, now: Instant, frames: &mut FrameStore) {
        let owed = self.workers.get(&id).and_then(|w| pending_effect(w.state));
        if owed != Some(effect) {
            process_debug!(ProcessId::current(), "{} skips {:?}: nothing pending", id, effect);
            return;
        }
        if let Some(event) = self.run_effect(id, effect, now, frames) {
            self.handle_event(id, event, now, frames);
        }
    }

    /// Perform one effect and report its outcome as the next event
    fn run_effect(
        &mut self,
        id: WorkerId,
        effect: Effect,
        now: Instant,
        frames: &mut FrameStore,
    ) -> Option<LifecycleEvent> {
        match effect {
            Effect::Spawn => Some(self.spawn(id, now)),
            Effect::Kill => {
                let pid = self.workers.get(&id)?.pid;
                match pid {
                    None => Some(LifecycleEvent::Killed),
                    Some(pid) => match self.process_manager.kill(pid) {
                        Ok(()) => Some(LifecycleEvent::Killed),
                        Err(e) => {
                            logging::log_error(ProcessId::current(), &format!("Killing {id} (pid {pid})"), &e);
                            None
                        }
                    },
                }
            }
            Effect::Reap => {
                let worker = self.workers.get_mut(&id)?;
                let Some(pid) = worker.pid else {
                    return Some(LifecycleEvent::Reaped);
                };
                match self.process_manager.try_reap(pid) {
                    Ok(ReapStatus::Running) => Some(LifecycleEvent::StillRunning),
                    Ok(status) => {
                        process_info!(ProcessId::current(), "{} pid {} reaped: {:?}", id, pid, status);
                        worker.pid = None;
                        Some(LifecycleEvent::Reaped)
                    }
                    Err(e) => {
                        logging::log_error(ProcessId::current(), &format!("Reaping {id} (pid {pid})"), &e);
                        Some(LifecycleEvent::StillRunning)
                    }
                }
            }
            Effect::Release => {
                self.release_channels(id);
                Some(LifecycleEvent::Released)
            }
            Effect::ResetFrameSlot => {
                frames.reset(id);
                None
            }
        }
    }

    fn spawn(&mut self, id: WorkerId, now: Instant) -> LifecycleEvent {
        let Some(worker) = self.workers.get_mut(&id) else {
            return LifecycleEvent::SpawnFailed;
        };
        worker.last_spawn_attempt = Some(now);

        let channels = UnixStream::pair().and_then(|(control, child_end)| {
            control.set_read_timeout(Some(CONTROL_READ_TIMEOUT))?;
            Ok((control, child_end))
        });
        let (control, child_end) = match channels {
            Ok(pair) => pair,
            Err(e) => {
                logging::log_error(ProcessId::current(), &format!("Control socket for {id}"), &e);
                return LifecycleEvent::SpawnFailed;
            }
        };
        let notifier = match Notifier::new() {
            Ok(notifier) => notifier,
            Err(e) => {
                logging::log_error(ProcessId::current(), &format!("Notifier for {id}"), &e);
                return LifecycleEvent::SpawnFailed;
            }
        };

        let pid = match self.process_manager.spawn(
            id,
            &worker.source,
            child_end.as_raw_fd(),
            notifier.as_raw_fd(),
        ) {
            Ok(pid) => pid,
            Err(e) => {
                logging::log_error(ProcessId::current(), &format!("Spawning {id}"), &e);
                return LifecycleEvent::SpawnFailed;
            }
        };
        // The child has its own copy now.
        drop(child_end);

        let token = Token::new(id, worker.generation + 1);
        if let Err(e) = self.poller.register(&notifier, token) {
            // Unregistered workers never negotiate and are recycled by the watchdog.
            logging::log_error(ProcessId::current(), &format!("Registering {id}"), &e);
        }

        worker.begin_generation(pid, WorkerChannels { control, notifier, reader: None });
        LifecycleEvent::Spawned
    }

    fn release_channels(&mut self, id: WorkerId) {
        let Some(worker) = self.workers.get_mut(&id) else { return };
        worker.frame_waiting = false;
        let Some(channels) = worker.channels.take() else { return };

        if let Err(e) = self.poller.deregister(&channels.notifier) {
            logging::log_error(ProcessId::current(), &format!("Deregistering {id}"), &e);
        }
        process_debug!(
            ProcessId::current(),
            "{} released generation {} (negotiated={})",
            id,
            worker.generation,
            channels.reader.is_some()
        );
        drop(channels);
    }
}
