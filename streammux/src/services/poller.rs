//! Edge-triggered epoll wrapper for worker notification descriptors
//!
//! Registration and removal may happen from any thread while another thread
//! is blocked in [`Poller::wait`]; the kernel serialises access to the
//! interest list.

use rustix::buffer::spare_capacity;
use rustix::event::epoll::{self, CreateFlags, EventData, EventFlags};
use rustix::event::Timespec;
use rustix::io::Errno;
use shared::WorkerId;
use std::io;
use std::os::fd::{AsFd, OwnedFd};
use std::time::Duration;

/// Maximum events returned by one wait
const MAX_EVENTS: usize = 64;

/// Identity of one registration: a worker and its spawn generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token {
    pub worker: WorkerId,
    pub generation: u32,
}

impl Token {
    pub fn new(worker: WorkerId, generation: u32) -> Self {
        Self { worker, generation }
    }

    pub fn pack(self) -> u64 {
        ((self.worker.0 as u64) << 32) | self.generation as u64
    }

    pub fn unpack(raw: u64) -> Self {
        Self {
            worker: WorkerId((raw >> 32) as u32),
            generation: raw as u32,
        }
    }
}

#[derive(Debug)]
pub struct Poller {
    epfd: OwnedFd,
}

impl Poller {
    pub fn new() -> io::Result<Self> {
        Ok(Self { epfd: epoll::create(CreateFlags::CLOEXEC)? })
    }

    /// Watch `fd` for readability, replacing any previous registration
    pub fn register(&self, fd: impl AsFd, token: Token) -> io::Result<()> {
        let data = EventData::new_u64(token.pack());
        let flags = EventFlags::IN | EventFlags::ET;
        match epoll::add(&self.epfd, fd.as_fd(), data, flags) {
            Err(Errno::EXIST) => Ok(epoll::modify(&self.epfd, fd.as_fd(), data, flags)?),
            other => Ok(other?),
        }
    }

    /// Stop watching `fd`; descriptors that are not registered are fine
    pub fn deregister(&self, fd: impl AsFd) -> io::Result<()> {
        match epoll::delete(&self.epfd, fd) {
            Ok(()) | Err(Errno::NOENT) | Err(Errno::BADF) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Block up to `timeout` and append ready tokens to `ready`
    ///
    /// An interrupted wait returns zero events.
    pub fn wait(&self, ready: &mut Vec<Token>, timeout: Duration) -> io::Result<usize> {
        let mut events = Vec::with_capacity(MAX_EVENTS);
        let timeout = Timespec {
            tv_sec: timeout.as_secs() as _,
            tv_nsec: timeout.subsec_nanos() as _,
        };

        match epoll::wait(&self.epfd, spare_capacity(&mut events), Some(&timeout)) {
            Ok(_) => {}
            Err(Errno::INTR) => return Ok(0),
            Err(e) => return Err(e.into()),
        }

        ready.extend(events.iter().map(|event| Token::unpack(event.data.u64())));
        Ok(events.len())
    }
}
