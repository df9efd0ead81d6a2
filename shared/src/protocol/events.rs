//! Event bits carried over the notification channel

use bitflags::bitflags;

bitflags! {
    /// Bitmask written to a worker's notification descriptor
    ///
    /// Bits may be combined in one write; the eventfd counter adds them, so
    /// each bit must be outstanding at most once between two drains.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventMask: u64 {
        const CHILD_STARTED = 1 << 0;
        const PIPELINE_EXITED = 1 << 1;
        const SHM_NEGOTIATED = 1 << 2;
        const FRAME_WAITING = 1 << 3;
    }
}

impl EventMask {
    /// Split a raw counter value into known bits and leftover unknown bits
    pub fn split(raw: u64) -> (EventMask, u64) {
        let known = EventMask::from_bits_truncate(raw);
        (known, raw & !EventMask::all().bits())
    }
}
