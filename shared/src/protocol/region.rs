//! Shared-memory region backing one frame slot
//!
//! An anonymous memfd mapped `MAP_SHARED`. The producer creates it once per
//! spawn and sends the descriptor to the muxer, which maps the same pages.
//! Dropping a `SharedRegion` unmaps it and closes its descriptor.

use rustix::fs::{MemfdFlags, SealFlags};
use rustix::mm::{MapFlags, ProtFlags};
use std::ffi::CString;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::ptr::NonNull;

use crate::errors::{SharedError, SharedResult};
use crate::protocol::header::{FrameHeader, HEADER_SIZE};

/// Debug name of the memfd, visible under `/proc/<pid>/fd`
pub const REGION_NAME: &str = "camframe";

/// Seals applied before the descriptor leaves the producer
///
/// The muxer keeps the region mapped for a whole generation, so its size
/// must never change after negotiation.
pub const REGION_SEALS: SealFlags = SealFlags::SHRINK.union(SealFlags::GROW).union(SealFlags::SEAL);

pub struct SharedRegion {
    fd: OwnedFd,
    ptr: NonNull<u8>,
    len: usize,
}

// The mapping is plain shared memory; all cross-thread access to it goes
// through the atomic header protocol.
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

impl SharedRegion {
    /// Create a sealed region able to hold `payload_capacity` bytes after the header
    pub fn create(name: &str, payload_capacity: usize) -> SharedResult<Self> {
        let fd = sized_memfd(name, payload_capacity)?;
        rustix::fs::fcntl_add_seals(&fd, REGION_SEALS)?;
        Self::map_owned(fd, HEADER_SIZE + payload_capacity)
    }

    #[cfg(test)]
    pub(crate) fn create_unsealed(name: &str, payload_capacity: usize) -> SharedResult<Self> {
        let fd = sized_memfd(name, payload_capacity)?;
        Self::map_owned(fd, HEADER_SIZE + payload_capacity)
    }

    /// Map a region received from the other side
    ///
    /// The descriptor must be a memfd sealed against resizing; its length is
    /// read only after the seals are confirmed.
    ///
    /// # Safety
    ///
    /// `fd` must refer to a region laid out by [`SharedRegion::create`].
    pub unsafe fn from_fd(fd: OwnedFd) -> SharedResult<Self> {
        let seals = rustix::fs::fcntl_get_seals(&fd)
            .map_err(|e| SharedError::region(format!("descriptor is not a sealable memfd: {e}")))?;
        if !seals.contains(SealFlags::SHRINK | SealFlags::GROW) {
            return Err(SharedError::region(format!("region is not sealed against resizing ({seals:?})")));
        }

        let len = rustix::fs::fstat(&fd)?.st_size as usize;
        if len <= HEADER_SIZE {
            return Err(SharedError::region(format!(
                "region of {len} bytes cannot hold a {HEADER_SIZE}-byte header and payload"
            )));
        }
        Self::map_owned(fd, len)
    }

    fn map_owned(fd: OwnedFd, len: usize) -> SharedResult<Self> {
        let ptr = unsafe {
            rustix::mm::mmap(
                std::ptr::null_mut(),
                len,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                &fd,
                0,
            )?
        };
        let ptr = NonNull::new(ptr.cast::<u8>()).ok_or_else(|| SharedError::region("mmap returned null"))?;
        Ok(Self { fd, ptr, len })
    }

    pub fn header(&self) -> &FrameHeader {
        // Page-aligned mapping, at least HEADER_SIZE long, header is all atomics.
        unsafe { &*(self.ptr.as_ptr() as *const FrameHeader) }
    }

    pub fn payload_capacity(&self) -> usize {
        self.len - HEADER_SIZE
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Start of the payload area
    ///
    /// Only the side holding the slot in `Writing` or `Reading` may touch it.
    pub(crate) fn payload_ptr(&self) -> *mut u8 {
        unsafe { self.ptr.as_ptr().add(HEADER_SIZE) }
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl AsFd for SharedRegion {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl std::fmt::Debug for SharedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRegion")
            .field("fd", &self.fd.as_raw_fd())
            .field("len", &self.len)
            .finish()
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        if let Err(e) = unsafe { rustix::mm::munmap(self.ptr.as_ptr().cast(), self.len) } {
            tracing::warn!(error = %e, len = self.len, "munmap of frame region failed");
        }
    }
}

/// Anonymous memfd that still accepts seals, sized for header plus payload
fn sized_memfd(name: &str, payload_capacity: usize) -> SharedResult<OwnedFd> {
    if payload_capacity == 0 {
        return Err(SharedError::region("payload capacity must be greater than 0"));
    }
    let cname = CString::new(name).map_err(|e| SharedError::region(e.to_string()))?;
    let fd = rustix::fs::memfd_create(&cname, MemfdFlags::CLOEXEC | MemfdFlags::ALLOW_SEALING)?;
    rustix::fs::ftruncate(&fd, (HEADER_SIZE + payload_capacity) as u64)?;
    Ok(fd)
}
