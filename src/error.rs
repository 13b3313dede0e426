//! Error types for the socket core.
//!
//! The taxonomy distinguishes recoverable "need more data" states (which are
//! not errors and are expressed as `Ok(None)` by the codecs) from protocol
//! violations and other terminal connection outcomes.

use thiserror::Error;

/// Wire-level faults that force the connection closed.
///
/// Violations are logged with the peer address and never retried.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProtocolViolation {
    /// The declared total packet size is smaller than the header that
    /// declared it.
    #[error("packet size {packet_size} is smaller than its header size {header_size}")]
    PacketSmallerThanHeader {
        /// Total size declared by the frame header.
        packet_size: usize,
        /// Size of the frame header itself.
        header_size: usize,
    },
    /// The declared packet size exceeds the configured maximum.
    #[error("declared packet size {size} exceeds the {limit} byte limit")]
    PacketTooLarge {
        /// Size declared on the wire.
        size: u64,
        /// Configured upper bound.
        limit: usize,
    },
    /// A client data frame arrived without the mandatory mask bit.
    #[error("websocket client frame is not masked")]
    UnmaskedClientFrame,
    /// The HTTP upgrade request was complete but not a valid WebSocket
    /// handshake.
    #[error("malformed websocket upgrade request")]
    MalformedHandshake,
    /// The upgrade request filled the receive buffer without terminating.
    #[error("websocket upgrade request exceeds the receive buffer")]
    HandshakeTooLarge,
    /// The receive buffer filled without yielding a decodable frame
    /// boundary.
    #[error("receive buffer filled without a decodable frame boundary")]
    BufferStall,
}

/// Terminal outcomes of the reassembly loop.
///
/// Every variant tears the connection down; they differ only in how the
/// event is logged and counted.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionClose {
    /// The peer broke the wire protocol.
    #[error(transparent)]
    Violation(#[from] ProtocolViolation),
    /// A drained frame body did not decode into an application package.
    #[error("package decode failed")]
    DecodeFailed,
    /// The dispatcher refused the package.
    #[error("rejected by dispatcher")]
    Rejected,
    /// The peer sent a WebSocket close frame.
    #[error("websocket close frame received")]
    CloseFrame,
    /// `Session::close` was called while the loop was draining.
    #[error("close requested")]
    Requested,
}
