//! Per-connection state and the stream-to-packet reassembly entry points.
//!
//! A [`Connection`] owns the receive storage for one stream peer and knows
//! how to turn newly arrived bytes into dispatched packages. The I/O driver
//! asks for a [`read target`](Connection::read_target), lands bytes there,
//! [commits](Connection::commit) the count, and calls
//! [`on_readable`](Connection::on_readable). Handshake progress and frame
//! draining happen behind that surface.

pub mod buffer;
mod drain;

use std::{net::SocketAddr, sync::Arc};

use buffer::RecvBuffer;

use crate::{
    config::CoreConfig,
    dispatch::PackageDispatcher,
    error::{ConnectionClose, ProtocolViolation},
    pool::BufferSource,
    protocol::{SocketRole, WireCodec, handshake},
    session::Session,
};

/// State of one live stream connection.
pub struct Connection {
    codec: WireCodec,
    buffer: RecvBuffer,
    handshake_done: bool,
    peer: SocketAddr,
    outbound: bool,
}

impl Connection {
    /// Create connection state for a freshly accepted or connected socket.
    #[must_use]
    pub fn new(
        role: SocketRole,
        peer: SocketAddr,
        outbound: bool,
        config: &CoreConfig,
        buffers: Arc<dyn BufferSource>,
    ) -> Self {
        Self {
            codec: WireCodec::for_role(role, config.max_packet_len),
            buffer: RecvBuffer::new(config.recv_len(), buffers),
            // Raw sockets have no handshake phase.
            handshake_done: role == SocketRole::Raw,
            peer,
            outbound,
        }
    }

    /// Framing role selected at creation.
    #[must_use]
    pub fn role(&self) -> SocketRole { self.codec.role() }

    /// Codec selected at creation.
    #[must_use]
    pub fn codec(&self) -> &WireCodec { &self.codec }

    /// Address of the peer.
    #[must_use]
    pub fn peer_addr(&self) -> SocketAddr { self.peer }

    /// Whether this connection was created by an outbound connect.
    #[must_use]
    pub fn is_outbound(&self) -> bool { self.outbound }

    /// Whether the WebSocket upgrade has completed.
    #[must_use]
    pub fn handshake_done(&self) -> bool { self.handshake_done }

    /// Count of buffered unread bytes.
    #[must_use]
    pub fn buffered(&self) -> usize { self.buffer.valid() }

    /// Size of the active overflow allocation, if any.
    #[must_use]
    pub fn overflow_capacity(&self) -> Option<usize> { self.buffer.overflow_capacity() }

    /// The buffer region the next read must land in.
    ///
    /// # Errors
    ///
    /// Propagates violations discovered while escalating to an overflow
    /// buffer.
    pub fn read_target(&mut self) -> Result<&mut [u8], ProtocolViolation> {
        self.buffer.read_target(&self.codec)
    }

    /// Record `count` bytes just written into the read target.
    pub fn commit(&mut self, count: usize) { self.buffer.commit(count); }

    /// Process everything the buffer now holds.
    ///
    /// Drains zero or more complete frames into the dispatcher. During the
    /// WebSocket handshake phase this instead advances the handshake and,
    /// once the upgrade request is complete, returns the 101 response bytes
    /// to write back; buffered handshake bytes are discarded so they are
    /// never reinterpreted as frame data.
    ///
    /// # Errors
    ///
    /// Returns the [`ConnectionClose`] outcome that must tear the
    /// connection down.
    pub fn on_readable<D: PackageDispatcher>(
        &mut self,
        session: &Session,
        dispatcher: &D,
    ) -> Result<Option<Vec<u8>>, ConnectionClose> {
        if !self.handshake_done {
            return self.advance_handshake().map_err(ConnectionClose::from);
        }
        self.drain_frames(session, dispatcher)?;
        Ok(None)
    }

    fn advance_handshake(&mut self) -> Result<Option<Vec<u8>>, ProtocolViolation> {
        match handshake::try_upgrade(self.buffer.valid_bytes())? {
            Some(response) => {
                self.handshake_done = true;
                self.buffer.reset();
                Ok(Some(response))
            }
            None if self.buffer.valid() == self.buffer.capacity() => {
                Err(ProtocolViolation::HandshakeTooLarge)
            }
            None => Ok(None),
        }
    }
}
