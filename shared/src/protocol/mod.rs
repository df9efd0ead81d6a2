//! Frame handoff protocol between a producer process and the muxer
//!
//! A single shared-memory slot per worker, negotiated once per spawn by
//! passing the region's descriptor over the control socket, and an eventfd
//! carrying a small event bitmask.

pub mod channel;
pub mod events;
pub mod fdpass;
pub mod header;
pub mod notify;
pub mod region;

pub use channel::{negotiate_producer, FrameBytes, FrameReader, FrameWriter, PublishOutcome};
pub use events::EventMask;
pub use fdpass::{recv_region, send_region};
pub use header::{FrameHeader, SlotState, HEADER_SIZE, SHM_MAGIC};
pub use notify::Notifier;
pub use region::SharedRegion;
