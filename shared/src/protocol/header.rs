//! Frame header placed at the start of every shared region
//!
//! The header is shared by two processes through a `MAP_SHARED` mapping.
//! Every field is an atomic so neither side ever performs a plain access
//! on memory the other side may touch; the `state` word is the only
//! synchronisation point and is flipped exclusively by compare-and-swap.
//! Lock-free atomics on a shared mapping are address-based on Linux, so
//! acquire/release pairs order the payload accesses across the boundary.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Magic word identifying an initialised header ("FRAM")
pub const SHM_MAGIC: u32 = 0x4652_414D;

/// Bytes reserved for the header; the payload starts right after
pub const HEADER_SIZE: usize = 64;

/// State of the single frame slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SlotState {
    /// No frame; the producer may claim the slot
    Empty = 0,
    /// A complete frame is waiting for the consumer
    Ready = 1,
    /// Producer holds the slot and is copying a payload in
    Writing = 2,
    /// Consumer holds the slot and is copying the payload out
    Reading = 3,
}

impl SlotState {
    pub fn from_raw(raw: u32) -> Option<SlotState> {
        match raw {
            0 => Some(SlotState::Empty),
            1 => Some(SlotState::Ready),
            2 => Some(SlotState::Writing),
            3 => Some(SlotState::Reading),
            _ => None,
        }
    }
}

/// In-memory layout of the header
#[repr(C, align(64))]
#[derive(Debug)]
pub struct FrameHeader {
    magic: AtomicU32,
    state: AtomicU32,
    nbytes: AtomicU64,
    width: AtomicU32,
    height: AtomicU32,
    /// Count of frames the producer has published this generation
    sequence: AtomicU64,
}

const _: () = assert!(std::mem::size_of::<FrameHeader>() == HEADER_SIZE);

impl FrameHeader {
    /// Reset a freshly created header; producer side, before the descriptor is sent
    pub fn init(&self) {
        self.state.store(SlotState::Empty as u32, Ordering::Relaxed);
        self.nbytes.store(0, Ordering::Relaxed);
        self.width.store(0, Ordering::Relaxed);
        self.height.store(0, Ordering::Relaxed);
        self.sequence.store(0, Ordering::Relaxed);
        self.magic.store(SHM_MAGIC, Ordering::Release);
    }

    pub fn magic(&self) -> u32 {
        self.magic.load(Ordering::Acquire)
    }

    /// Current slot state; `Err` carries an unrecognised raw value
    pub fn state(&self) -> Result<SlotState, u32> {
        let raw = self.state.load(Ordering::Acquire);
        SlotState::from_raw(raw).ok_or(raw)
    }

    /// Atomically move the slot from `from` to `to`
    ///
    /// Returns the observed raw state on failure.
    pub fn transition(&self, from: SlotState, to: SlotState) -> Result<(), u32> {
        self.state
            .compare_exchange(from as u32, to as u32, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
    }

    /// Force the slot back to `Empty` after a violation
    pub fn reset(&self) {
        self.state.store(SlotState::Empty as u32, Ordering::Release);
    }

    pub fn set_frame(&self, nbytes: usize, width: u32, height: u32) {
        self.nbytes.store(nbytes as u64, Ordering::Relaxed);
        self.width.store(width, Ordering::Relaxed);
        self.height.store(height, Ordering::Relaxed);
    }

    /// `(nbytes, width, height)` as last written by the producer
    pub fn frame(&self) -> (u64, u32, u32) {
        (
            self.nbytes.load(Ordering::Relaxed),
            self.width.load(Ordering::Relaxed),
            self.height.load(Ordering::Relaxed),
        )
    }

    pub fn bump_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }
}
