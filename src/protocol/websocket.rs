//! RFC6455 WebSocket framing.
//!
//! Only the server side of the protocol is implemented: inbound client
//! frames carry a 4-byte mask key which sits between the length field and
//! the payload, and outbound server frames are written unmasked. The close
//! opcode is detected from the first header byte before generic parsing so
//! the connection can shut down without decoding the rest of the frame.

use bytes::{BufMut, BytesMut};

use crate::{
    error::ProtocolViolation,
    protocol::FrameHeader,
};

/// First header byte of a close frame: FIN set, opcode `0x8`.
pub const CLOSE_FRAME_BYTE: u8 = 0x88;

/// First header byte of an outbound data frame: FIN set, binary opcode.
const BINARY_FRAME_BYTE: u8 = 0x82;

/// Length of the client-to-server mask key.
const MASK_KEY_LEN: usize = 4;

/// Codec for RFC6455 data frames.
#[derive(Clone, Copy, Debug)]
pub struct WebSocketCodec {
    max_packet_len: usize,
}

impl WebSocketCodec {
    /// Construct a codec rejecting packets larger than `max_packet_len`.
    #[must_use]
    pub fn new(max_packet_len: usize) -> Self { Self { max_packet_len } }

    /// Parse the next frame boundary from the valid prefix of a buffer.
    ///
    /// The reported `header_size` includes the mask key, so the body starts
    /// at `header_size` and the key occupies `header_size - 4..header_size`.
    /// Returns `Ok(None)` until the length field is complete.
    ///
    /// # Errors
    ///
    /// [`ProtocolViolation::UnmaskedClientFrame`] when the mask bit is
    /// clear, and [`ProtocolViolation::PacketTooLarge`] when the declared
    /// payload pushes the frame past the configured maximum.
    pub fn read_header(&self, buf: &[u8]) -> Result<Option<FrameHeader>, ProtocolViolation> {
        if buf.len() < 2 {
            return Ok(None);
        }
        if buf[1] & 0x80 == 0 {
            return Err(ProtocolViolation::UnmaskedClientFrame);
        }
        let (payload_len, length_field_end) = match buf[1] & 0x7F {
            126 => {
                let Some(ext) = buf.get(2..4) else {
                    return Ok(None);
                };
                (
                    u64::from(u16::from_be_bytes([ext[0], ext[1]])),
                    4,
                )
            }
            127 => {
                let Some(ext) = buf.get(2..10) else {
                    return Ok(None);
                };
                let mut raw = [0_u8; 8];
                raw.copy_from_slice(ext);
                (u64::from_be_bytes(raw), 10)
            }
            short => (u64::from(short), 2),
        };
        let header_size = length_field_end + MASK_KEY_LEN;
        let limit = self.max_packet_len as u64;
        if payload_len > limit.saturating_sub(header_size as u64) {
            return Err(ProtocolViolation::PacketTooLarge {
                size: payload_len.saturating_add(header_size as u64),
                limit: self.max_packet_len,
            });
        }
        #[expect(clippy::cast_possible_truncation, reason = "bounded by max_packet_len above")]
        let packet_size = header_size + payload_len as usize;
        Ok(Some(FrameHeader {
            packet_size,
            header_size,
        }))
    }

    /// Append `payload` to `dst` as an unmasked binary server frame.
    pub fn encode_frame(&self, payload: &[u8], dst: &mut BytesMut) {
        dst.reserve(payload.len() + 10);
        dst.put_u8(BINARY_FRAME_BYTE);
        match payload.len() {
            len if len < 126 => {
                #[expect(clippy::cast_possible_truncation, reason = "len < 126")]
                dst.put_u8(len as u8);
            }
            len if len <= usize::from(u16::MAX) => {
                dst.put_u8(126);
                #[expect(clippy::cast_possible_truncation, reason = "len fits in u16")]
                dst.put_u16(len as u16);
            }
            len => {
                dst.put_u8(127);
                dst.put_u64(len as u64);
            }
        }
        dst.extend_from_slice(payload);
    }
}

/// Whether the first header byte marks a close frame.
#[must_use]
pub fn is_close_frame(first_byte: u8) -> bool { first_byte == CLOSE_FRAME_BYTE }

/// XOR a frame's payload in place against its mask key.
///
/// `frame` must span the whole packet; the key sits immediately before the
/// payload, at `header_size - 4`. Applying the same key twice restores the
/// original bytes.
pub fn unmask_payload(frame: &mut [u8], header_size: usize) {
    let (header, payload) = frame.split_at_mut(header_size);
    let mut key = [0_u8; MASK_KEY_LEN];
    key.copy_from_slice(&header[header_size - MASK_KEY_LEN..]);
    for (offset, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[offset % MASK_KEY_LEN];
    }
}
