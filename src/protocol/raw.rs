//! Length-prefixed framing for plain TCP sockets.
//!
//! A raw frame is `[header][body]` where the header is a little-endian
//! `u32` holding the total frame length, header included.

use bytes::{BufMut, BytesMut};

use crate::{
    error::ProtocolViolation,
    protocol::FrameHeader,
};

/// Fixed length of the raw frame header.
pub const RAW_HEADER_LEN: usize = 4;

/// Codec for length-prefixed raw-socket frames.
#[derive(Clone, Copy, Debug)]
pub struct RawCodec {
    max_packet_len: usize,
}

impl RawCodec {
    /// Construct a codec rejecting packets larger than `max_packet_len`.
    #[must_use]
    pub fn new(max_packet_len: usize) -> Self { Self { max_packet_len } }

    /// Parse the next frame boundary from the valid prefix of a buffer.
    ///
    /// Returns `Ok(None)` until all [`RAW_HEADER_LEN`] header bytes are
    /// present.
    ///
    /// # Errors
    ///
    /// [`ProtocolViolation::PacketSmallerThanHeader`] when the declared
    /// total is smaller than the header itself, and
    /// [`ProtocolViolation::PacketTooLarge`] when it exceeds the configured
    /// maximum.
    pub fn read_header(&self, buf: &[u8]) -> Result<Option<FrameHeader>, ProtocolViolation> {
        let Some(prefix) = buf.first_chunk::<RAW_HEADER_LEN>() else {
            return Ok(None);
        };
        let packet_size = u32::from_le_bytes(*prefix) as usize;
        if packet_size < RAW_HEADER_LEN {
            return Err(ProtocolViolation::PacketSmallerThanHeader {
                packet_size,
                header_size: RAW_HEADER_LEN,
            });
        }
        if packet_size > self.max_packet_len {
            return Err(ProtocolViolation::PacketTooLarge {
                size: packet_size as u64,
                limit: self.max_packet_len,
            });
        }
        Ok(Some(FrameHeader {
            packet_size,
            header_size: RAW_HEADER_LEN,
        }))
    }

    /// Append `payload` to `dst` wrapped in a raw frame.
    pub fn encode_frame(&self, payload: &[u8], dst: &mut BytesMut) {
        let total = RAW_HEADER_LEN + payload.len();
        dst.reserve(total);
        #[expect(clippy::cast_possible_truncation, reason = "sizes are bounded by max_packet_len")]
        dst.put_u32_le(total as u32);
        dst.extend_from_slice(payload);
    }
}
