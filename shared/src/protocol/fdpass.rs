//! Passing the region descriptor over the control socket
//!
//! One `SCM_RIGHTS` message per spawn: the memfd plus an 8-byte little-endian
//! word holding the payload capacity.

use rustix::net::{
    RecvAncillaryBuffer, RecvAncillaryMessage, RecvFlags, ReturnFlags, SendAncillaryBuffer, SendAncillaryMessage,
    SendFlags,
};
use std::io::{IoSlice, IoSliceMut};
use std::mem::MaybeUninit;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::os::unix::net::UnixStream;

use crate::errors::{SharedError, SharedResult};
use crate::protocol::header::SHM_MAGIC;
use crate::protocol::region::SharedRegion;

/// Send `region`'s descriptor and capacity to the muxer
pub fn send_region(socket: &UnixStream, region: &SharedRegion) -> SharedResult<()> {
    let capacity = region.payload_capacity() as u64;
    send_fd(socket, region.as_fd(), &capacity.to_le_bytes())
}

/// Receive and map a region sent with [`send_region`]
///
/// Fails with `Negotiation` when the message is short, carries no
/// descriptor, or describes a region that does not match its header.
pub fn recv_region(socket: &UnixStream) -> SharedResult<SharedRegion> {
    let mut word = [0u8; 8];
    let (n, fd) = recv_fd(socket, &mut word)?;

    if n != word.len() {
        return Err(SharedError::negotiation(format!(
            "short negotiation message: {n} of {} bytes",
            word.len()
        )));
    }
    let fd = fd.ok_or_else(|| SharedError::negotiation("no descriptor in negotiation message"))?;
    let capacity = u64::from_le_bytes(word) as usize;

    let region = unsafe { SharedRegion::from_fd(fd) }
        .map_err(|e| SharedError::negotiation(format!("cannot map received region: {e}")))?;

    if region.payload_capacity() != capacity {
        return Err(SharedError::negotiation(format!(
            "announced capacity {capacity} does not match region capacity {}",
            region.payload_capacity()
        )));
    }
    if region.header().magic() != SHM_MAGIC {
        return Err(SharedError::negotiation(format!(
            "bad header magic {:#x}",
            region.header().magic()
        )));
    }
    Ok(region)
}

fn send_fd(socket: &UnixStream, fd: BorrowedFd<'_>, data: &[u8]) -> SharedResult<()> {
    let mut space = [MaybeUninit::uninit(); rustix::cmsg_space!(ScmRights(1))];
    let mut ancillary = SendAncillaryBuffer::new(&mut space);
    let fds = [fd];
    if !ancillary.push(SendAncillaryMessage::ScmRights(&fds)) {
        return Err(SharedError::negotiation("control buffer too small"));
    }

    let sent = rustix::net::sendmsg(socket, &[IoSlice::new(data)], &mut ancillary, SendFlags::NOSIGNAL)
        .map_err(|e| SharedError::negotiation(format!("sendmsg failed: {e}")))?;
    if sent != data.len() {
        return Err(SharedError::negotiation(format!(
            "short negotiation write: {sent} of {} bytes",
            data.len()
        )));
    }
    Ok(())
}

fn recv_fd(socket: &UnixStream, data: &mut [u8]) -> SharedResult<(usize, Option<OwnedFd>)> {
    // Room for a second descriptor so an extra one is reported, not truncated.
    let mut space = [MaybeUninit::uninit(); rustix::cmsg_space!(ScmRights(2))];
    let mut ancillary = RecvAncillaryBuffer::new(&mut space);

    let received = loop {
        let mut iov = [IoSliceMut::new(data)];
        match rustix::net::recvmsg(socket, &mut iov, &mut ancillary, RecvFlags::CMSG_CLOEXEC) {
            Ok(received) => break received,
            Err(rustix::io::Errno::INTR) => continue,
            Err(e) => return Err(SharedError::negotiation(format!("recvmsg failed: {e}"))),
        }
    };

    // Take ownership of every descriptor first so none leak on error paths.
    let mut fds: Vec<OwnedFd> = Vec::new();
    for message in ancillary.drain() {
        if let RecvAncillaryMessage::ScmRights(rights) = message {
            fds.extend(rights);
        }
    }

    if received.bytes == 0 && fds.is_empty() {
        return Err(SharedError::negotiation("control socket closed by peer"));
    }
    if received.flags.contains(ReturnFlags::CTRUNC) {
        return Err(SharedError::negotiation("descriptor message truncated"));
    }
    if fds.len() > 1 {
        return Err(SharedError::negotiation(format!(
            "expected one descriptor, got {}",
            fds.len()
        )));
    }
    Ok((received.bytes, fds.pop()))
}
