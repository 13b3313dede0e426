//! Session handles and the live-session registry.
//!
//! A [`Session`] is the view of a connection handed to the application
//! dispatcher. Stream sessions wrap a writer queue and a close token;
//! datagram sessions are one-shot values carrying only the sender address
//! and the socket to answer on.

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use log::warn;
use tokio::{net::UdpSocket, sync::mpsc};
use tokio_util::sync::CancellationToken;

use crate::{
    metrics,
    package::{PACKAGE_HEADER_LEN, RawPackage},
    protocol::{SocketRole, WireCodec},
};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier assigned to a connection or datagram session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Create a [`ConnectionId`] with the provided value.
    #[must_use]
    pub fn new(id: u64) -> Self { Self(id) }

    /// Allocate the next process-wide identifier.
    pub(crate) fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ConnectionId({})", self.0)
    }
}

#[derive(Clone)]
enum Transport {
    Stream {
        codec: WireCodec,
        writer: mpsc::Sender<Bytes>,
        closer: CancellationToken,
    },
    Datagram {
        socket: Arc<UdpSocket>,
    },
}

/// Handle to one live peer.
#[derive(Clone)]
pub struct Session {
    id: ConnectionId,
    peer: SocketAddr,
    outbound: bool,
    transport: Transport,
}

impl Session {
    pub(crate) fn stream(
        id: ConnectionId,
        peer: SocketAddr,
        codec: WireCodec,
        writer: mpsc::Sender<Bytes>,
        closer: CancellationToken,
        outbound: bool,
    ) -> Self {
        Self {
            id,
            peer,
            outbound,
            transport: Transport::Stream {
                codec,
                writer,
                closer,
            },
        }
    }

    pub(crate) fn datagram(id: ConnectionId, peer: SocketAddr, socket: Arc<UdpSocket>) -> Self {
        Self {
            id,
            peer,
            outbound: false,
            transport: Transport::Datagram { socket },
        }
    }

    /// Identifier of this session.
    #[must_use]
    pub fn id(&self) -> ConnectionId { self.id }

    /// Address of the peer, fixed at creation.
    #[must_use]
    pub fn peer_addr(&self) -> SocketAddr { self.peer }

    /// Whether this connection was created by an outbound connect.
    #[must_use]
    pub fn is_outbound(&self) -> bool { self.outbound }

    /// Framing role of this session, if it is a stream.
    #[must_use]
    pub fn role(&self) -> Option<SocketRole> {
        match &self.transport {
            Transport::Stream { codec, .. } => Some(codec.role()),
            Transport::Datagram { .. } => None,
        }
    }

    /// Encode a package and send it to the peer.
    ///
    /// Fire and forget: stream sends enqueue on the writer task, datagram
    /// sends go straight to the socket. Failures are logged, never retried,
    /// and never block the caller.
    pub fn send_package(&self, service: u16, command: u16, body: &[u8]) {
        let mut package = BytesMut::with_capacity(PACKAGE_HEADER_LEN + body.len());
        RawPackage::encode(service, command, body, &mut package);
        match &self.transport {
            Transport::Stream { codec, .. } => {
                let mut frame = BytesMut::with_capacity(package.len() + 16);
                codec.encode_frame(&package, &mut frame);
                self.send_bytes(frame.freeze());
            }
            Transport::Datagram { .. } => self.send_bytes(package.freeze()),
        }
    }

    /// Send pre-encoded bytes to the peer.
    pub(crate) fn send_bytes(&self, bytes: Bytes) {
        match &self.transport {
            Transport::Stream { writer, .. } => {
                if writer.try_send(bytes).is_err() {
                    warn!("outbound frame dropped: peer={}", self.peer);
                    metrics::inc_errors();
                    return;
                }
                metrics::inc_frames(metrics::Direction::Outbound);
            }
            Transport::Datagram { socket } => match socket.try_send_to(&bytes, self.peer) {
                Ok(_) => metrics::inc_frames(metrics::Direction::Outbound),
                Err(error) => {
                    warn!("udp send failed: peer={}, error={error}", self.peer);
                    metrics::inc_errors();
                }
            },
        }
    }

    /// Request connection closure.
    ///
    /// Idempotent, and safe to call from within a dispatch callback: the
    /// reassembly loop observes the request before draining another frame.
    /// Datagram sessions are connectionless, so this is a no-op for them.
    pub fn close(&self) {
        if let Transport::Stream { closer, .. } = &self.transport {
            closer.cancel();
        }
    }

    /// Whether closure has been requested.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        match &self.transport {
            Transport::Stream { closer, .. } => closer.is_cancelled(),
            Transport::Datagram { .. } => false,
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("outbound", &self.outbound)
            .finish_non_exhaustive()
    }
}

/// Concurrent registry of live stream sessions keyed by [`ConnectionId`].
#[derive(Default)]
pub struct SessionRegistry(DashMap<ConnectionId, Session>);

impl SessionRegistry {
    /// Retrieve the session for `id`, if it is still registered.
    #[must_use]
    pub fn get(&self, id: &ConnectionId) -> Option<Session> {
        self.0.get(id).map(|entry| entry.value().clone())
    }

    /// Register a newly established session.
    pub fn insert(&self, session: &Session) {
        self.0.insert(session.id(), session.clone());
    }

    /// Remove a session, typically on connection teardown.
    pub fn remove(&self, id: &ConnectionId) { self.0.remove(id); }

    /// Drop entries whose connections have requested closure.
    pub fn prune(&self) { self.0.retain(|_, session| !session.is_closed()); }

    /// IDs of the currently registered sessions.
    #[must_use]
    pub fn active_ids(&self) -> Vec<ConnectionId> {
        self.0.iter().map(|entry| *entry.key()).collect()
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize { self.0.len() }

    /// Whether the registry holds no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SocketRole;

    fn stream_session() -> Session {
        let (writer, _rx) = mpsc::channel(4);
        Session::stream(
            ConnectionId::next(),
            "127.0.0.1:9000".parse().expect("socket addr"),
            WireCodec::for_role(SocketRole::Raw, 1 << 20),
            writer,
            CancellationToken::new(),
            false,
        )
    }

    #[test]
    fn close_is_idempotent() {
        let session = stream_session();
        assert!(!session.is_closed());
        session.close();
        session.close();
        assert!(session.is_closed());
    }

    #[test]
    fn send_package_frames_the_payload() {
        let (writer, mut rx) = mpsc::channel(4);
        let session = Session::stream(
            ConnectionId::next(),
            "127.0.0.1:9000".parse().expect("socket addr"),
            WireCodec::for_role(SocketRole::Raw, 1 << 20),
            writer,
            CancellationToken::new(),
            false,
        );
        session.send_package(1, 2, b"ping");
        let frame = rx.try_recv().expect("queued frame");
        // Raw header declares the full length; the package header follows.
        assert_eq!(&frame[..4], &12_u32.to_le_bytes());
        assert_eq!(&frame[4..8], &[1, 0, 2, 0]);
        assert_eq!(&frame[8..], b"ping");
    }

    #[test]
    fn full_writer_queue_drops_the_frame() {
        let (writer, mut rx) = mpsc::channel(1);
        let session = Session::stream(
            ConnectionId::next(),
            "127.0.0.1:9000".parse().expect("socket addr"),
            WireCodec::for_role(SocketRole::Raw, 1 << 20),
            writer,
            CancellationToken::new(),
            false,
        );
        session.send_package(1, 1, b"kept");
        session.send_package(1, 1, b"dropped");
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn registry_tracks_sessions_until_removed() {
        let registry = SessionRegistry::default();
        let session = stream_session();
        registry.insert(&session);
        assert!(registry.get(&session.id()).is_some());
        assert_eq!(registry.active_ids(), vec![session.id()]);
        registry.remove(&session.id());
        assert!(registry.get(&session.id()).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn prune_drops_closed_sessions() {
        let registry = SessionRegistry::default();
        let open = stream_session();
        let closed = stream_session();
        registry.insert(&open);
        registry.insert(&closed);
        closed.close();
        registry.prune();
        assert_eq!(registry.active_ids(), vec![open.id()]);
    }
}
