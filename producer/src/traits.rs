//! Producer trait definitions for dependency injection

use shared::{EventMask, PublishOutcome};

use crate::error::ProducerResult;

/// Where produced frames go
///
/// The real sink is the shared-memory slot negotiated with the muxer; tests
/// substitute a mock.
#[mockall::automock]
pub trait FrameSink: Send {
    /// Tell the muxer about a pipeline event (start, exit)
    fn announce(&mut self, events: EventMask) -> ProducerResult<()>;

    /// Set up the frame slot for `capacity`-byte frames; repeated calls are no-ops
    fn negotiate(&mut self, capacity: usize) -> ProducerResult<()>;

    /// Hand over one frame, negotiating first if needed
    fn publish(&mut self, data: &[u8], width: u32, height: u32) -> ProducerResult<PublishOutcome>;
}
