//! Frame reader pass: copy waiting frames out of shared memory into the store

use std::time::Instant;

use crate::core::frame_store::FrameStore;
use crate::core::lifecycle::WorkerState;
use crate::core::supervisor::Supervisor;
use crate::traits::ProcessManager;
use shared::{process_debug, process_warn, ProcessId};

/// One pass over every live, negotiated worker; returns frames taken
///
/// A worker is only refilled once its previous copy has been released, so
/// the producer keeps replacing the slot while the consumer holds a frame.
/// Publish-counter progress is recorded as liveness either way.
pub fn read_frames<P: ProcessManager>(
    supervisor: &mut Supervisor<P>,
    frames: &mut FrameStore,
    now: Instant,
) -> usize {
    let mut taken = 0;
    for worker in supervisor.workers_mut() {
        if worker.state != WorkerState::Alive {
            continue;
        }
        let vacant = frames.is_vacant(worker.id);
        let Some(reader) = worker.channels.as_mut().and_then(|c| c.reader.as_mut()) else {
            continue;
        };

        let published = reader.published();
        if published != worker.last_published {
            worker.last_published = published;
            worker.last_frame_at = Some(now);
        }

        if !worker.frame_waiting || !vacant {
            continue;
        }

        match reader.take() {
            Ok(Some(frame)) => {
                let skipped = frame.sequence.saturating_sub(worker.last_taken).saturating_sub(1);
                worker.frames_dropped += skipped;
                worker.last_taken = frame.sequence;
                worker.frames_received += 1;
                worker.frame_waiting = false;
                worker.last_frame_at = Some(now);

                let fid = frames.fill(worker.id, frame, now);
                process_debug!(ProcessId::current(), "{} frame {} stored (skipped {})", worker.id, fid, skipped);
                taken += 1;
            }
            Ok(None) => {}
            Err(e) => {
                process_warn!(ProcessId::current(), "{} frame dropped: {}", worker.id, e);
            }
        }
    }
    taken
}
