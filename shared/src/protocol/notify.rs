//! Notification channel: an eventfd carrying [`EventMask`] bits

use rustix::event::{eventfd, EventfdFlags};
use rustix::io::Errno;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};

use crate::errors::{SharedError, SharedResult};
use crate::protocol::events::EventMask;

/// Owned eventfd shared between the muxer and one worker
///
/// Created non-blocking so a drain with nothing pending returns immediately.
#[derive(Debug)]
pub struct Notifier {
    fd: OwnedFd,
}

impl Notifier {
    pub fn new() -> SharedResult<Self> {
        let fd = eventfd(0, EventfdFlags::CLOEXEC | EventfdFlags::NONBLOCK)?;
        Ok(Self { fd })
    }

    /// Adopt an inherited eventfd (worker side, slot 4)
    pub fn from_fd(fd: OwnedFd) -> Self {
        Self { fd }
    }

    pub fn try_clone(&self) -> SharedResult<Self> {
        Ok(Self { fd: self.fd.try_clone()? })
    }

    /// Add `mask` to the pending counter
    pub fn signal(&self, mask: EventMask) -> SharedResult<()> {
        let value = mask.bits().to_ne_bytes();
        loop {
            match rustix::io::write(&self.fd, &value) {
                Ok(8) => return Ok(()),
                Ok(n) => return Err(SharedError::protocol(format!("short eventfd write of {n} bytes"))),
                Err(Errno::INTR) => continue,
                Err(Errno::AGAIN) => return Err(SharedError::protocol("notification counter saturated")),
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Read and reset the pending counter; `None` when nothing is pending
    pub fn drain_raw(&self) -> SharedResult<Option<u64>> {
        let mut value = [0u8; 8];
        loop {
            match rustix::io::read(&self.fd, &mut value[..]) {
                Ok(8) => return Ok(Some(u64::from_ne_bytes(value))),
                Ok(n) => return Err(SharedError::protocol(format!("short eventfd read of {n} bytes"))),
                Err(Errno::INTR) => continue,
                Err(Errno::AGAIN) => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Drain the counter and keep only recognised bits
    pub fn drain(&self) -> SharedResult<Option<EventMask>> {
        let Some(raw) = self.drain_raw()? else {
            return Ok(None);
        };
        let (mask, unknown) = EventMask::split(raw);
        if unknown != 0 {
            tracing::warn!(raw, unknown, "protocol violation: unknown event bits ignored");
        }
        Ok(Some(mask))
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl AsFd for Notifier {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_empty_returns_none() {
        let notifier = Notifier::new().unwrap();
        assert_eq!(notifier.drain().unwrap(), None);
    }

    #[test]
    fn test_distinct_bits_accumulate_as_or() {
        let notifier = Notifier::new().unwrap();
        notifier.signal(EventMask::CHILD_STARTED).unwrap();
        notifier
            .signal(EventMask::SHM_NEGOTIATED | EventMask::FRAME_WAITING)
            .unwrap();

        let mask = notifier.drain().unwrap().unwrap();
        assert_eq!(
            mask,
            EventMask::CHILD_STARTED | EventMask::SHM_NEGOTIATED | EventMask::FRAME_WAITING
        );
        assert_eq!(notifier.drain().unwrap(), None);
    }

    #[test]
    fn test_clone_shares_counter() {
        let notifier = Notifier::new().unwrap();
        let other_side = notifier.try_clone().unwrap();

        other_side.signal(EventMask::PIPELINE_EXITED).unwrap();
        assert_eq!(notifier.drain().unwrap(), Some(EventMask::PIPELINE_EXITED));
    }
}
