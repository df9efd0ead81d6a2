//! Shared-memory frame sink
//!
//! Owns the worker's end of the control socket and the notification
//! descriptor. The frame slot is negotiated on first use, sized to the
//! first frame; every later frame must have the same size.

use rustix::io::FdFlags;
use std::os::fd::{BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;

use crate::error::{ProducerError, ProducerResult};
use crate::traits::FrameSink;
use shared::{
    negotiate_producer, process_info, EventMask, FrameWriter, Notifier, ProcessId, PublishOutcome, CONTROL_FD_SLOT,
    NOTIFY_FD_SLOT,
};

#[derive(Debug)]
pub struct ShmSink {
    control: UnixStream,
    notifier: Notifier,
    writer: Option<FrameWriter>,
}

impl ShmSink {
    pub fn new(control: UnixStream, notifier: Notifier) -> Self {
        Self { control, notifier, writer: None }
    }

    /// Adopt the descriptors placed at the fixed slots by the muxer
    ///
    /// # Safety
    ///
    /// Must be called at most once per process, before anything else could
    /// have claimed descriptors 3 and 4.
    pub unsafe fn from_inherited() -> ProducerResult<Self> {
        let control = adopt(CONTROL_FD_SLOT)?;
        let notify = adopt(NOTIFY_FD_SLOT)?;
        Ok(Self::new(UnixStream::from(control), Notifier::from_fd(notify)))
    }

    pub fn is_negotiated(&self) -> bool {
        self.writer.is_some()
    }
}

unsafe fn adopt(fd: RawFd) -> ProducerResult<OwnedFd> {
    let slot = BorrowedFd::borrow_raw(fd);
    let flags = rustix::io::fcntl_getfd(slot).map_err(|_| ProducerError::MissingDescriptor { fd })?;
    // Nothing we exec should inherit these.
    rustix::io::fcntl_setfd(slot, flags | FdFlags::CLOEXEC).map_err(std::io::Error::from)?;
    Ok(OwnedFd::from_raw_fd(fd))
}

impl ShmSink {
    fn writer(&mut self, capacity: usize) -> ProducerResult<&mut FrameWriter> {
        if let Some(writer) = self.writer.take() {
            return Ok(self.writer.insert(writer));
        }
        let writer = negotiate_producer(&self.control, &self.notifier, capacity)?;
        process_info!(ProcessId::current(), "Negotiated {}-byte frame slot", capacity);
        Ok(self.writer.insert(writer))
    }
}

impl FrameSink for ShmSink {
    fn announce(&mut self, events: EventMask) -> ProducerResult<()> {
        self.notifier.signal(events)?;
        Ok(())
    }

    fn negotiate(&mut self, capacity: usize) -> ProducerResult<()> {
        self.writer(capacity)?;
        Ok(())
    }

    fn publish(&mut self, data: &[u8], width: u32, height: u32) -> ProducerResult<PublishOutcome> {
        Ok(self.writer(data.len())?.publish(data, width, height)?)
    }
}
