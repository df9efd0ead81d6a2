//! Shared pieces of the stream multiplexer
//!
//! Everything both sides of the process boundary need: the shared-memory
//! frame slot, descriptor passing, the notification channel and its event
//! bits, identifiers, errors and process-aware logging.

pub mod errors;
pub mod logging;
pub mod protocol;
pub mod types;

pub use errors::*;
pub use types::*;

pub use protocol::{
    // Slot header and handoff
    FrameHeader, SlotState, FrameWriter, FrameReader, FrameBytes, PublishOutcome,
    HEADER_SIZE, SHM_MAGIC,

    // Region ownership
    SharedRegion,

    // Signalling
    EventMask, Notifier,

    // Negotiation
    negotiate_producer, recv_region, send_region,
};
