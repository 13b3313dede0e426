//! Per-connection receive storage.
//!
//! Bytes land in a fixed buffer sized at connection creation. When a frame
//! larger than the fixed buffer arrives, reads escalate to an overflow
//! buffer sized exactly to that frame; the overflow is acquired at most
//! once per oversized frame and released the moment the frame drains.
//! Exactly one of the two regions is active for reading at any time.

use std::sync::Arc;

use crate::{
    error::ProtocolViolation,
    pool::{BufferSource, LeasedBuffer},
    protocol::WireCodec,
};

/// Overflow storage for one oversized frame.
struct Overflow {
    storage: LeasedBuffer,
    packet_size: usize,
}

/// Fixed receive buffer with an overflow escalation path.
pub struct RecvBuffer {
    fixed: Box<[u8]>,
    overflow: Option<Overflow>,
    valid: usize,
    source: Arc<dyn BufferSource>,
}

impl RecvBuffer {
    /// Create a buffer with `capacity` bytes of fixed storage.
    #[must_use]
    pub fn new(capacity: usize, source: Arc<dyn BufferSource>) -> Self {
        Self {
            fixed: vec![0; capacity].into_boxed_slice(),
            overflow: None,
            valid: 0,
            source,
        }
    }

    /// Count of valid unread bytes in the active region.
    #[must_use]
    pub fn valid(&self) -> usize { self.valid }

    /// Capacity of the fixed region.
    #[must_use]
    pub fn capacity(&self) -> usize { self.fixed.len() }

    /// Size of the active overflow allocation, if one exists.
    #[must_use]
    pub fn overflow_capacity(&self) -> Option<usize> {
        self.overflow.as_ref().map(|overflow| overflow.packet_size)
    }

    /// The valid prefix of the active region.
    #[must_use]
    pub fn valid_bytes(&self) -> &[u8] {
        match &self.overflow {
            Some(overflow) => &overflow.storage[..self.valid],
            None => &self.fixed[..self.valid],
        }
    }

    /// Mutable view of the valid prefix of the active region.
    pub fn valid_bytes_mut(&mut self) -> &mut [u8] {
        match &mut self.overflow {
            Some(overflow) => &mut overflow.storage[..self.valid],
            None => &mut self.fixed[..self.valid],
        }
    }

    /// Record `count` freshly received bytes.
    pub fn commit(&mut self, count: usize) { self.valid += count; }

    /// Discard all buffered bytes and return to the fixed region.
    pub fn reset(&mut self) {
        self.valid = 0;
        self.overflow = None;
    }

    /// The region the next read must land in.
    ///
    /// While the fixed buffer has room, reads fill it. Once it is full with
    /// an incomplete frame, the frame's true size is parsed from the bytes
    /// already present (the header always fits the fixed buffer), an
    /// overflow buffer of exactly that size is acquired, the fixed content
    /// is copied across, and reads target the overflow until the frame
    /// completes.
    ///
    /// # Errors
    ///
    /// Propagates header violations discovered during escalation, and
    /// reports [`ProtocolViolation::BufferStall`] when a full buffer holds
    /// no parseable frame boundary.
    pub fn read_target(&mut self, codec: &WireCodec) -> Result<&mut [u8], ProtocolViolation> {
        if self.overflow.is_none() && self.valid == self.fixed.len() {
            self.escalate(codec)?;
        }
        match &mut self.overflow {
            Some(overflow) => Ok(&mut overflow.storage[self.valid..overflow.packet_size]),
            None => Ok(&mut self.fixed[self.valid..]),
        }
    }

    /// Allocate the overflow buffer for the frame stuck in the fixed region.
    fn escalate(&mut self, codec: &WireCodec) -> Result<(), ProtocolViolation> {
        let header = codec
            .read_header(&self.fixed[..self.valid])?
            .ok_or(ProtocolViolation::BufferStall)?;
        if header.packet_size <= self.fixed.len() {
            // A frame that fits the fixed buffer would have been drained
            // before the buffer could fill.
            return Err(ProtocolViolation::BufferStall);
        }
        let mut storage = self.source.acquire(header.packet_size);
        storage[..self.valid].copy_from_slice(&self.fixed[..self.valid]);
        self.overflow = Some(Overflow {
            storage,
            packet_size: header.packet_size,
        });
        Ok(())
    }

    /// Drop `packet_size` drained bytes from the front of the active region.
    ///
    /// Any remainder is compacted to the front. When the region empties and
    /// an overflow is active, the overflow is released and reads return to
    /// the fixed buffer.
    pub fn consume(&mut self, packet_size: usize) {
        debug_assert!(packet_size <= self.valid);
        let valid = self.valid;
        if packet_size < valid {
            let active = match &mut self.overflow {
                Some(overflow) => &mut overflow.storage[..],
                None => &mut self.fixed[..],
            };
            active.copy_within(packet_size..valid, 0);
        }
        self.valid = valid - packet_size;
        if self.valid == 0 {
            self.overflow = None;
        }
    }
}
