//! Worker lifecycle state machine
//!
//! Pure transition logic: `(state, event) -> (next state, effects)`. The
//! supervisor performs the effects and feeds their outcomes back in as
//! events. Unlisted pairs leave the state unchanged with no effects, which
//! makes repeated teardown requests harmless.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum WorkerState {
    /// No process; a spawn is pending or being retried
    Creating,
    /// Process running, frames expected within the staleness window
    Alive,
    /// Marked for termination
    Infected,
    /// Kill sent, exit not yet confirmed
    Zombie,
    /// Exit confirmed, descriptors not yet released
    Purged,
    /// Fully torn down, waiting out the cool-down
    Buried,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Creating => "creating",
            WorkerState::Alive => "alive",
            WorkerState::Infected => "infected",
            WorkerState::Zombie => "zombie",
            WorkerState::Purged => "purged",
            WorkerState::Buried => "buried",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Spawned,
    SpawnFailed,
    /// No frame within the staleness window, or negotiation never completed
    Stale,
    /// The pipeline announced its own exit
    PipelineExited,
    Killed,
    Reaped,
    StillRunning,
    Released,
    CooldownElapsed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Spawn,
    Kill,
    Reap,
    Release,
    /// Drop the cached frame of this worker
    ResetFrameSlot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: WorkerState,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn to(next: WorkerState, effects: &[Effect]) -> Self {
        Self { next, effects: effects.to_vec() }
    }

    fn stay(state: WorkerState) -> Self {
        Self { next: state, effects: Vec::new() }
    }
}

pub fn transition(state: WorkerState, event: LifecycleEvent) -> Transition {
    use Effect::*;
    use LifecycleEvent as E;
    use WorkerState as S;

    match (state, event) {
        (S::Creating, E::Spawned) => Transition::to(S::Alive, &[]),
        (S::Alive, E::Stale | E::PipelineExited) => Transition::to(S::Infected, &[Kill]),
        (S::Infected, E::Killed) => Transition::to(S::Zombie, &[Reap]),
        (S::Zombie, E::Reaped) => Transition::to(S::Purged, &[Release, ResetFrameSlot]),
        (S::Purged, E::Released) => Transition::to(S::Buried, &[]),
        (S::Buried, E::CooldownElapsed) => Transition::to(S::Creating, &[Spawn]),
        _ => Transition::stay(state),
    }
}

/// Effect a worker resting in `state` should retry on a lifecycle tick
///
/// Covers steps whose previous attempt did not complete: a failed spawn,
/// a kill that errored, a process not yet exited. `Creating` retries are
/// rate-limited by the caller.
pub fn pending_effect(state: WorkerState) -> Option<Effect> {
    match state {
        WorkerState::Creating => Some(Effect::Spawn),
        WorkerState::Infected => Some(Effect::Kill),
        WorkerState::Zombie => Some(Effect::Reap),
        WorkerState::Purged => Some(Effect::Release),
        WorkerState::Alive | WorkerState::Buried => None,
    }
}
