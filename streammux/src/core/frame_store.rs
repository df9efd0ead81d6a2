//! Consumer-side frame cache with fair selection and batching
//!
//! One `FrameInfo` per worker. The frame reader fills entries; the consumer
//! pulls one frame at a time (longest-neglected first) or a whole batch
//! (oldest sequence first) and releases entries when done with them.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{StreamMuxError, StreamMuxResult};
use shared::{FrameBytes, WorkerId};

/// A frame handed to the consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub worker: WorkerId,
    pub width: u32,
    pub height: u32,
    /// Global copy sequence number
    pub sequence: u64,
    pub data: Arc<[u8]>,
}

#[derive(Debug, Clone)]
pub struct FrameInfo {
    pub data: Option<Arc<[u8]>>,
    pub width: u32,
    pub height: u32,
    pub fid: u64,
    /// A fresh copy exists
    pub ready: bool,
    /// The copy has been handed out and awaits release
    pub read: bool,
    /// Selections this entry has lost since it was last chosen
    pub age: u64,
    pub filled_at: Option<Instant>,
}

impl Default for FrameInfo {
    fn default() -> Self {
        Self {
            data: None,
            width: 0,
            height: 0,
            fid: 0,
            ready: false,
            read: true,
            age: 0,
            filled_at: None,
        }
    }
}

impl FrameInfo {
    fn is_candidate(&self) -> bool {
        self.ready && !self.read
    }

    fn clear(&mut self) {
        self.data = None;
        self.ready = false;
        self.read = true;
        self.age = 0;
    }
}

#[derive(Debug, Default)]
pub struct FrameStore {
    entries: BTreeMap<WorkerId, FrameInfo>,
    next_fid: u64,
}

impl FrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make room for `worker`; existing entries are left alone
    pub fn add_worker(&mut self, worker: WorkerId) {
        self.entries.entry(worker).or_default();
    }

    pub fn entry(&self, worker: WorkerId) -> Option<&FrameInfo> {
        self.entries.get(&worker)
    }

    /// True when the frame reader may store a new copy for `worker`
    pub fn is_vacant(&self, worker: WorkerId) -> bool {
        self.entries.get(&worker).is_some_and(|e| e.data.is_none())
    }

    /// Store a freshly taken frame and return its sequence number
    pub fn fill(&mut self, worker: WorkerId, frame: FrameBytes, now: Instant) -> u64 {
        self.next_fid += 1;
        let fid = self.next_fid;

        let entry = self.entries.entry(worker).or_default();
        entry.data = Some(Arc::from(frame.data));
        entry.width = frame.width;
        entry.height = frame.height;
        entry.fid = fid;
        entry.ready = true;
        entry.read = false;
        entry.age = 0;
        entry.filled_at = Some(now);
        fid
    }

    /// Longest-neglected ready frame
    ///
    /// Every other candidate ages by one; the selected entry's age resets.
    /// The entry is not marked read, so it stays eligible until released.
    pub fn pull_one(&mut self) -> Option<Frame> {
        let mut chosen: Option<(WorkerId, u64)> = None;
        for (id, entry) in &self.entries {
            if !entry.is_candidate() {
                continue;
            }
            // Strictly greater keeps the lowest id on ties.
            if chosen.map_or(true, |(_, age)| entry.age > age) {
                chosen = Some((*id, entry.age));
            }
        }
        let (worker, _) = chosen?;

        for (id, entry) in self.entries.iter_mut() {
            if entry.is_candidate() {
                if *id == worker {
                    entry.age = 0;
                } else {
                    entry.age += 1;
                }
            }
        }
        self.frame_of(worker)
    }

    /// Exactly `batch_size` ready frames, oldest sequence first, or nothing
    ///
    /// Selected entries are marked read until released.
    pub fn pull_batch(&mut self, batch_size: usize) -> Option<Vec<Frame>> {
        if batch_size == 0 {
            return None;
        }

        let mut candidates: Vec<(u64, WorkerId)> = self
            .entries
            .iter()
            .filter(|(_, e)| e.is_candidate())
            .map(|(id, e)| (e.fid, *id))
            .collect();
        if candidates.len() < batch_size {
            return None;
        }
        candidates.sort_unstable();
        candidates.truncate(batch_size);

        let mut batch = Vec::with_capacity(batch_size);
        for (_, worker) in candidates {
            if let Some(entry) = self.entries.get_mut(&worker) {
                entry.read = true;
            }
            batch.extend(self.frame_of(worker));
        }
        Some(batch)
    }

    /// Consumer is done with `worker`'s frame
    pub fn release(&mut self, worker: WorkerId) -> StreamMuxResult<()> {
        let entry = self
            .entries
            .get_mut(&worker)
            .ok_or(StreamMuxError::UnknownWorker { worker })?;
        entry.clear();
        Ok(())
    }

    /// Drop whatever is cached for `worker` (worker reset)
    pub fn reset(&mut self, worker: WorkerId) {
        if let Some(entry) = self.entries.get_mut(&worker) {
            entry.clear();
        }
    }

    /// Cached frame of one worker, leaving selection state untouched
    pub fn snapshot(&self, worker: WorkerId) -> Option<Frame> {
        self.frame_of(worker)
    }

    /// Time since `worker`'s cached frame was copied
    pub fn last_frame_age(&self, worker: WorkerId, now: Instant) -> Option<Duration> {
        let entry = self.entries.get(&worker)?;
        entry.data.as_ref()?;
        entry.filled_at.map(|t| now.saturating_duration_since(t))
    }

    pub fn ready_count(&self) -> usize {
        self.entries.values().filter(|e| e.is_candidate()).count()
    }

    fn frame_of(&self, worker: WorkerId) -> Option<Frame> {
        let entry = self.entries.get(&worker)?;
        let data = entry.data.clone()?;
        Some(Frame {
            worker,
            width: entry.width,
            height: entry.height,
            sequence: entry.fid,
            data,
        })
    }
}
