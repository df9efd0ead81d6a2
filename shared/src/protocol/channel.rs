//! Single-slot frame channel: producer writer and muxer reader
//!
//! The slot holds at most one unconsumed frame. A producer faster than its
//! reader replaces the waiting frame; a reader faster than its producer sees
//! nothing until the next publish.

use std::os::unix::net::UnixStream;
use std::ptr;

use crate::errors::{SharedError, SharedResult};
use crate::protocol::events::EventMask;
use crate::protocol::fdpass::send_region;
use crate::protocol::header::SlotState;
use crate::protocol::notify::Notifier;
use crate::protocol::region::{SharedRegion, REGION_NAME};

/// Result of one publish attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Slot was empty; the reader has been signalled
    Published,
    /// An untaken frame was overwritten with this one
    Replaced,
    /// Reader is copying the previous frame out; try again with a newer one
    Busy,
}

/// Frame copied out of the slot by the reader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBytes {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Producer's publish counter for this frame
    pub sequence: u64,
}

/// Producer half of the channel
#[derive(Debug)]
pub struct FrameWriter {
    region: SharedRegion,
    notifier: Notifier,
}

impl FrameWriter {
    pub fn new(region: SharedRegion, notifier: Notifier) -> Self {
        Self { region, notifier }
    }

    pub fn payload_capacity(&self) -> usize {
        self.region.payload_capacity()
    }

    /// Copy `data` into the slot and mark it ready
    ///
    /// The region is never resized: `data` must be exactly the capacity
    /// negotiated for this spawn.
    pub fn publish(&mut self, data: &[u8], width: u32, height: u32) -> SharedResult<PublishOutcome> {
        let capacity = self.region.payload_capacity();
        if data.len() != capacity {
            return Err(SharedError::SizeMismatch { expected: capacity, actual: data.len() });
        }

        let header = self.region.header();
        let replaced = loop {
            match header.transition(SlotState::Empty, SlotState::Writing) {
                Ok(()) => break false,
                Err(raw) if raw == SlotState::Reading as u32 => return Ok(PublishOutcome::Busy),
                Err(raw) if raw == SlotState::Ready as u32 => {
                    match header.transition(SlotState::Ready, SlotState::Writing) {
                        Ok(()) => break true,
                        Err(raw) if raw == SlotState::Reading as u32 => {
                            return Ok(PublishOutcome::Busy)
                        }
                        // Reader emptied the slot in between; claim it as empty.
                        Err(raw) if raw == SlotState::Empty as u32 => continue,
                        Err(raw) => return Err(unexpected_state("publish", raw)),
                    }
                }
                Err(raw) => return Err(unexpected_state("publish", raw)),
            }
        };

        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), self.region.payload_ptr(), data.len());
        }
        header.set_frame(data.len(), width, height);
        header.bump_sequence();

        header
            .transition(SlotState::Writing, SlotState::Ready)
            .map_err(|raw| unexpected_state("publish commit", raw))?;

        if replaced {
            Ok(PublishOutcome::Replaced)
        } else {
            self.notifier.signal(EventMask::FRAME_WAITING)?;
            Ok(PublishOutcome::Published)
        }
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }
}

/// Muxer half of the channel
#[derive(Debug)]
pub struct FrameReader {
    region: SharedRegion,
}

impl FrameReader {
    pub fn new(region: SharedRegion) -> Self {
        Self { region }
    }

    pub fn payload_capacity(&self) -> usize {
        self.region.payload_capacity()
    }

    /// Producer's publish counter, including frames replaced before a take
    pub fn published(&self) -> u64 {
        self.region.header().sequence()
    }

    /// Copy the waiting frame out and hand the slot back to the producer
    ///
    /// `Ok(None)` when no frame is ready. A header describing more bytes
    /// than the region holds is a protocol violation; the frame is dropped
    /// and the slot reset so the producer can continue.
    pub fn take(&mut self) -> SharedResult<Option<FrameBytes>> {
        let header = self.region.header();
        match header.transition(SlotState::Ready, SlotState::Reading) {
            Ok(()) => {}
            Err(raw) if SlotState::from_raw(raw).is_some() => return Ok(None),
            Err(raw) => {
                header.reset();
                return Err(unexpected_state("take", raw));
            }
        }

        let (nbytes, width, height) = header.frame();
        let capacity = self.region.payload_capacity();
        if nbytes as usize > capacity {
            header.reset();
            return Err(SharedError::protocol(format!(
                "header claims {nbytes} bytes in a {capacity}-byte slot"
            )));
        }
        let len = nbytes as usize;
        let sequence = header.sequence();

        let mut data = Vec::with_capacity(len);
        unsafe {
            ptr::copy_nonoverlapping(self.region.payload_ptr(), data.as_mut_ptr(), len);
            data.set_len(len);
        }

        header
            .transition(SlotState::Reading, SlotState::Empty)
            .map_err(|raw| unexpected_state("take release", raw))?;

        Ok(Some(FrameBytes { data, width, height, sequence }))
    }
}

/// Producer side of negotiation
///
/// Creates the region for `payload_capacity` bytes, sends its descriptor
/// over `control` and signals `SHM_NEGOTIATED`.
pub fn negotiate_producer(
    control: &UnixStream,
    notifier: &Notifier,
    payload_capacity: usize,
) -> SharedResult<FrameWriter> {
    let region = SharedRegion::create(REGION_NAME, payload_capacity)?;
    region.header().init();
    send_region(control, &region)?;
    notifier.signal(EventMask::SHM_NEGOTIATED)?;
    Ok(FrameWriter::new(region, notifier.try_clone()?))
}

fn unexpected_state(during: &str, raw: u32) -> SharedError {
    SharedError::protocol(format!("slot in unexpected state {raw} during {during}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::fdpass::recv_region;
    use std::os::fd::AsFd;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    fn pair(capacity: usize) -> (FrameWriter, FrameReader, Notifier) {
        let (producer_end, muxer_end) = UnixStream::pair().unwrap();
        let notifier = Notifier::new().unwrap();
        let writer = negotiate_producer(&producer_end, &notifier, capacity).unwrap();
        let reader = FrameReader::new(recv_region(&muxer_end).unwrap());
        (writer, reader, notifier)
    }

    #[test]
    fn test_negotiation_signals_and_maps() {
        let (_writer, reader, notifier) = pair(128);
        assert_eq!(reader.payload_capacity(), 128);
        assert_eq!(notifier.drain().unwrap(), Some(EventMask::SHM_NEGOTIATED));
    }

    #[test]
    fn test_take_on_empty_slot_is_none() {
        let (_writer, mut reader, _notifier) = pair(16);
        assert_eq!(reader.take().unwrap(), None);
    }

    #[test]
    fn test_publish_then_take() {
        let (mut writer, mut reader, notifier) = pair(4);
        notifier.drain().unwrap();

        let outcome = writer.publish(&[1, 2, 3, 4], 2, 1).unwrap();
        assert_eq!(outcome, PublishOutcome::Published);
        assert_eq!(notifier.drain().unwrap(), Some(EventMask::FRAME_WAITING));

        let frame = reader.take().unwrap().unwrap();
        assert_eq!(frame.data, vec![1, 2, 3, 4]);
        assert_eq!((frame.width, frame.height, frame.sequence), (2, 1, 1));
        assert_eq!(reader.take().unwrap(), None);
    }

    #[test]
    fn test_latest_frame_wins() {
        let (mut writer, mut reader, notifier) = pair(8);
        notifier.drain().unwrap();

        assert_eq!(writer.publish(&[1; 8], 4, 2).unwrap(), PublishOutcome::Published);
        for value in 2..=5u8 {
            assert_eq!(writer.publish(&[value; 8], 4, 2).unwrap(), PublishOutcome::Replaced);
        }
        // Only the first publish signalled.
        assert_eq!(notifier.drain().unwrap(), Some(EventMask::FRAME_WAITING));

        let frame = reader.take().unwrap().unwrap();
        assert_eq!(frame.data, vec![5; 8]);
        assert_eq!(frame.sequence, 5);
        assert_eq!(reader.published(), 5);
        assert_eq!(reader.take().unwrap(), None);
    }

    #[test]
    fn test_size_mismatch_rejected() {
        let (mut writer, mut reader, _notifier) = pair(8);

        let err = writer.publish(&[0; 7], 1, 7).unwrap_err();
        assert!(matches!(err, SharedError::SizeMismatch { expected: 8, actual: 7 }));
        assert_eq!(reader.take().unwrap(), None);
    }

    #[test]
    fn test_publish_while_reading_is_busy() {
        let (mut writer, reader, _notifier) = pair(8);
        writer.publish(&[1; 8], 1, 8).unwrap();

        // Simulate the reader mid-copy.
        reader
            .region
            .header()
            .transition(SlotState::Ready, SlotState::Reading)
            .unwrap();
        assert_eq!(writer.publish(&[2; 8], 1, 8).unwrap(), PublishOutcome::Busy);
    }

    #[test]
    fn test_oversized_header_is_protocol_violation() {
        let (mut writer, mut reader, _notifier) = pair(8);
        writer.publish(&[1; 8], 1, 8).unwrap();
        reader.region.header().set_frame(4096, 64, 64);

        let err = reader.take().unwrap_err();
        assert!(matches!(err, SharedError::ProtocolViolation { .. }));
        assert_eq!(reader.region.header().state(), Ok(SlotState::Empty));
        assert_eq!(writer.publish(&[2; 8], 1, 8).unwrap(), PublishOutcome::Published);
    }

    #[test]
    fn test_producer_cannot_shrink_negotiated_slot() {
        const CAPACITY: usize = 1 << 20;
        let (mut writer, mut reader, _notifier) = pair(CAPACITY);
        writer.publish(&vec![9; CAPACITY], 1024, 1024).unwrap();

        let file = std::fs::File::from(writer.region.as_fd().try_clone_to_owned().unwrap());
        assert!(file.set_len(4096).is_err());

        let frame = reader.take().unwrap().unwrap();
        assert_eq!(frame.data.len(), CAPACITY);
        assert!(frame.data.iter().all(|b| *b == 9));
    }

    #[test]
    fn test_reader_never_observes_torn_frame() {
        const CAPACITY: usize = 64 * 1024;
        let (mut writer, mut reader, _notifier) = pair(CAPACITY);
        let stop = Arc::new(AtomicBool::new(false));

        let producer_stop = stop.clone();
        let producer = thread::spawn(move || {
            let mut value = 0u8;
            while !producer_stop.load(Ordering::Relaxed) {
                value = value.wrapping_add(1);
                let frame = vec![value; CAPACITY];
                writer.publish(&frame, 256, 256).unwrap();
            }
        });

        let mut taken = 0;
        while taken < 500 {
            if let Some(frame) = reader.take().unwrap() {
                let first = frame.data[0];
                assert!(frame.data.iter().all(|b| *b == first), "torn frame observed");
                taken += 1;
            }
        }

        stop.store(true, Ordering::Relaxed);
        producer.join().unwrap();
    }
}
