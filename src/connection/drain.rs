//! The packet-draining loop.
//!
//! One invocation drains every frame the buffer currently completes, so a
//! read that delivers several packets dispatches all of them before control
//! returns to the reactor. The loop stops early for three reasons only: it
//! needs more bytes, the connection must close, or a dispatch callback
//! requested closure.

use log::debug;

use super::Connection;
use crate::{
    dispatch::{self, PackageDispatcher},
    error::ConnectionClose,
    metrics,
    protocol::{SocketRole, websocket},
    session::Session,
};

impl Connection {
    /// Drain complete frames from the buffer into the dispatcher.
    pub(super) fn drain_frames<D: PackageDispatcher>(
        &mut self,
        session: &Session,
        dispatcher: &D,
    ) -> Result<(), ConnectionClose> {
        while self.buffer.valid() > 0 {
            if self.codec.role() == SocketRole::WebSocket
                && websocket::is_close_frame(self.buffer.valid_bytes()[0])
            {
                debug!("close frame received: peer={}", self.peer);
                return Err(ConnectionClose::CloseFrame);
            }

            let Some(header) = self.codec.read_header(self.buffer.valid_bytes())? else {
                // Header incomplete; wait for the next readiness event.
                break;
            };
            if self.buffer.valid() < header.packet_size {
                // Partial frame. If it cannot fit the fixed buffer, the next
                // read target escalates to an overflow allocation.
                break;
            }

            let frame = &mut self.buffer.valid_bytes_mut()[..header.packet_size];
            if self.codec.role() == SocketRole::WebSocket {
                websocket::unmask_payload(frame, header.header_size);
            }
            let body = &frame[header.header_size..];
            metrics::inc_frames(metrics::Direction::Inbound);
            dispatch::deliver(dispatcher, session, body)?;

            self.buffer.consume(header.packet_size);
            if session.is_closed() {
                return Err(ConnectionClose::Requested);
            }
        }
        Ok(())
    }
}
