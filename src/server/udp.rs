//! UDP datagram handling.
//!
//! UDP is connectionless: no per-peer state survives a datagram. Each
//! datagram is decoded and dispatched through a one-shot [`Session`]
//! carrying only the sender address. The listener reuses a single
//! grow-only buffer for its whole lifetime.

use std::sync::Arc;

use log::debug;
use tokio::net::UdpSocket;

use super::CoreHandle;
use crate::{
    dispatch::{self, PackageDispatcher},
    metrics,
    session::{ConnectionId, Session},
};

/// Receive size suggested to the listener buffer, matching the largest
/// possible datagram payload region.
const SUGGESTED_RECV_LEN: usize = 64 * 1024;

/// Reusable receive buffer for one UDP listener.
///
/// Resized up, never down, so the largest datagram seen bounds the
/// allocation for the listener's lifetime.
pub(crate) struct DatagramBuffer {
    storage: Vec<u8>,
}

impl DatagramBuffer {
    pub(crate) fn new(initial_len: usize) -> Self {
        Self {
            storage: vec![0; initial_len],
        }
    }

    /// Storage of at least `suggested` bytes, growing if necessary.
    pub(crate) fn ensure(&mut self, suggested: usize) -> &mut [u8] {
        if self.storage.len() < suggested {
            self.storage.resize(suggested, 0);
        }
        &mut self.storage
    }

    /// Received bytes live in the front of the storage.
    pub(crate) fn filled(&self) -> &[u8] { &self.storage }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize { self.storage.len() }
}

/// Receive datagrams until shutdown.
pub(crate) async fn recv_loop<D: PackageDispatcher>(handle: CoreHandle<D>, socket: Arc<UdpSocket>) {
    let mut buffer = DatagramBuffer::new(handle.config.datagram_buffer_len);
    loop {
        let target = buffer.ensure(SUGGESTED_RECV_LEN);
        let (count, peer) = tokio::select! {
            () = handle.shutdown.cancelled() => break,
            result = socket.recv_from(target) => match result {
                Ok(received) => received,
                Err(error) => {
                    debug!("udp recv failed: error={error}");
                    continue;
                }
            },
        };
        if count == 0 {
            continue;
        }

        let session = Session::datagram(ConnectionId::next(), peer, Arc::clone(&socket));
        metrics::inc_frames(metrics::Direction::Inbound);
        // Rejection closes nothing here: datagram sessions are one-shot and
        // decode failures were already logged with the sender address.
        if let Err(close) =
            dispatch::deliver(handle.dispatcher.as_ref(), &session, &buffer.filled()[..count])
        {
            debug!("datagram not dispatched: reason={close}, peer={peer}");
        }
    }
}
