//! Wire protocol codecs.
//!
//! A codec inspects the valid prefix of a connection's receive buffer and
//! reports the boundary of the next frame as a [`FrameHeader`], or `None`
//! when more bytes are needed. Codecs are pure: they never consume bytes and
//! never hold state. The one codec a connection uses is selected from its
//! [`SocketRole`] at creation time and dispatched by `match` from then on.

pub mod handshake;
pub mod raw;
pub mod websocket;

use bytes::BytesMut;

use crate::error::ProtocolViolation;

/// Transport framing spoken on a stream connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocketRole {
    /// Length-prefixed framing on a plain TCP socket.
    Raw,
    /// RFC6455 WebSocket framing over TCP.
    WebSocket,
}

/// Boundary of one frame within the receive buffer.
///
/// `packet_size` counts the header and the body together; the body occupies
/// `header_size..packet_size`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    /// Total frame length including the header.
    pub packet_size: usize,
    /// Length of the header alone.
    pub header_size: usize,
}

/// Polymorphic codec capability with one variant per [`SocketRole`].
#[derive(Clone, Copy, Debug)]
pub enum WireCodec {
    /// Length-prefixed raw-socket framing.
    Raw(raw::RawCodec),
    /// RFC6455 WebSocket framing.
    WebSocket(websocket::WebSocketCodec),
}

impl WireCodec {
    /// Select the codec for `role`.
    #[must_use]
    pub fn for_role(role: SocketRole, max_packet_len: usize) -> Self {
        match role {
            SocketRole::Raw => Self::Raw(raw::RawCodec::new(max_packet_len)),
            SocketRole::WebSocket => Self::WebSocket(websocket::WebSocketCodec::new(max_packet_len)),
        }
    }

    /// Parse the next frame boundary from the valid prefix of a buffer.
    ///
    /// Returns `Ok(None)` when the header is not yet complete.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolViolation`] for malformed or oversized headers.
    pub fn read_header(&self, buf: &[u8]) -> Result<Option<FrameHeader>, ProtocolViolation> {
        match self {
            Self::Raw(codec) => codec.read_header(buf),
            Self::WebSocket(codec) => codec.read_header(buf),
        }
    }

    /// Append a complete outbound frame carrying `payload` to `dst`.
    pub fn encode_frame(&self, payload: &[u8], dst: &mut BytesMut) {
        match self {
            Self::Raw(codec) => codec.encode_frame(payload, dst),
            Self::WebSocket(codec) => codec.encode_frame(payload, dst),
        }
    }

    /// Role this codec was selected for.
    #[must_use]
    pub fn role(&self) -> SocketRole {
        match self {
            Self::Raw(_) => SocketRole::Raw,
            Self::WebSocket(_) => SocketRole::WebSocket,
        }
    }
}
