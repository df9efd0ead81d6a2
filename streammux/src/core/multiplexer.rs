//! Event multiplexer
//!
//! Waits on every worker's notification descriptor at once and dispatches
//! the drained event bits to the owning worker. Registrations change under
//! it while it waits; events whose token no longer matches the worker's
//! current generation are discarded.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::supervisor::Supervisor;
use crate::error::StreamMuxResult;
use crate::services::{Poller, Token};
use crate::traits::ProcessManager;
use shared::{process_debug, process_info, process_warn, recv_region, EventMask, FrameReader, ProcessId};

#[derive(Debug)]
pub struct EventMultiplexer {
    poller: Arc<Poller>,
    ready: Vec<Token>,
    discarded: u64,
}

impl EventMultiplexer {
    pub fn new(poller: Arc<Poller>) -> Self {
        Self { poller, ready: Vec::new(), discarded: 0 }
    }

    /// Block up to `timeout` for readiness; does not touch shared state
    pub fn wait(&mut self, timeout: Duration) -> StreamMuxResult<Vec<Token>> {
        self.ready.clear();
        self.poller.wait(&mut self.ready, timeout)?;
        Ok(std::mem::take(&mut self.ready))
    }

    /// Events dropped because their registration was gone
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Drain and act on one worker's pending events
    ///
    /// Returns the mask that was handled, or `None` when the event was
    /// stale or nothing was pending.
    pub fn dispatch<P: ProcessManager>(
        &mut self,
        supervisor: &mut Supervisor<P>,
        token: Token,
        now: Instant,
    ) -> Option<EventMask> {
        let Some(worker) = supervisor.worker_mut(token.worker) else {
            return self.discard(token, "unknown worker");
        };
        if worker.generation != token.generation {
            return self.discard(token, "old generation");
        }
        let Some(channels) = worker.channels.as_mut() else {
            return self.discard(token, "released");
        };

        let mask = match channels.notifier.drain() {
            Ok(Some(mask)) => mask,
            Ok(None) => return None,
            Err(e) => {
                process_warn!(ProcessId::current(), "{} notification read failed: {}", worker.id, e);
                return None;
            }
        };

        if mask.contains(EventMask::CHILD_STARTED) {
            process_debug!(ProcessId::current(), "{} pipeline started (generation {})", worker.id, worker.generation);
        }

        if mask.contains(EventMask::SHM_NEGOTIATED) {
            if channels.reader.is_some() {
                process_warn!(ProcessId::current(), "{} protocol violation: repeated negotiation ignored", worker.id);
            } else {
                match recv_region(&channels.control) {
                    Ok(region) => {
                        process_info!(
                            ProcessId::current(),
                            "{} negotiated {}-byte frame slot",
                            worker.id,
                            region.payload_capacity()
                        );
                        channels.reader = Some(FrameReader::new(region));
                    }
                    // Left to the watchdog's negotiation bound.
                    Err(e) => process_warn!(ProcessId::current(), "{} negotiation failed: {}", worker.id, e),
                }
            }
        }

        if mask.contains(EventMask::PIPELINE_EXITED) {
            process_info!(ProcessId::current(), "{} pipeline reported exit", worker.id);
            worker.exit_reported = true;
        }

        if mask.contains(EventMask::FRAME_WAITING) {
            worker.frame_waiting = true;
        }

        Some(mask)
    }

    fn discard(&mut self, token: Token, reason: &str) -> Option<EventMask> {
        self.discarded += 1;
        process_debug!(
            ProcessId::current(),
            "Discarding event for {} generation {}: {} ({} discarded)",
            token.worker,
            token.generation,
            reason,
            self.discarded
        );
        None
    }
}
