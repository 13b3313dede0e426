//! Per-connection task wiring.
//!
//! Each stream connection gets two tasks: a read task owning the
//! [`Connection`] state and driving the reassembly loop, and a writer task
//! draining the session's outbound queue. Closure flows through the
//! session's cancellation token, so either side (or the dispatcher) can
//! tear the pair down, and panics in dispatch callbacks are contained to
//! the one connection.

use std::{any::Any, net::SocketAddr};

use bytes::Bytes;
use futures::FutureExt;
use log::{debug, error, warn};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;

use super::CoreHandle;
use crate::{
    connection::Connection,
    dispatch::PackageDispatcher,
    error::ConnectionClose,
    metrics,
    protocol::{SocketRole, WireCodec},
    session::{ConnectionId, Session},
};

/// How the connection came to exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Origin {
    /// Accepted by one of our listeners.
    Inbound,
    /// Created by an outbound connect.
    Outbound,
}

/// Wire a fresh TCP stream into the core and start its tasks.
///
/// Inbound connections are announced to the dispatcher before any reads
/// begin.
pub(crate) fn spawn_connection_task<D: PackageDispatcher>(
    handle: &CoreHandle<D>,
    stream: TcpStream,
    peer: SocketAddr,
    role: SocketRole,
    origin: Origin,
) -> Session {
    let (read_half, write_half) = stream.into_split();
    let (writer_tx, writer_rx) = mpsc::channel(handle.config.writer_queue_depth);
    let closer = handle.shutdown.child_token();
    let session = Session::stream(
        ConnectionId::next(),
        peer,
        WireCodec::for_role(role, handle.config.max_packet_len),
        writer_tx,
        closer.clone(),
        origin == Origin::Outbound,
    );

    handle.registry.insert(&session);
    metrics::inc_connections();
    if origin == Origin::Inbound {
        handle.dispatcher.on_session_connect(&session);
    }

    handle.tracker.spawn(writer_loop(write_half, writer_rx, closer.clone()));

    let handle = handle.clone();
    let task_session = session.clone();
    handle.tracker.clone().spawn(async move {
        let connection = Connection::new(
            role,
            peer,
            origin == Origin::Outbound,
            &handle.config,
            handle.buffers.clone(),
        );
        let read = std::panic::AssertUnwindSafe(read_loop(
            connection,
            read_half,
            task_session.clone(),
            handle.dispatcher.clone(),
            closer.clone(),
        ))
        .catch_unwind();
        if let Err(panic) = read.await {
            let panic_msg = describe_panic(panic.as_ref());
            // Emit via both `log` and `tracing` for consumers that capture either.
            error!("connection task panicked: panic={panic_msg}, peer={peer}");
            tracing::error!(panic = %panic_msg, %peer, "connection task panicked");
            metrics::inc_errors();
        }
        closer.cancel();
        handle.registry.remove(&task_session.id());
        metrics::dec_connections();
    });

    session
}

/// Drive reads into the connection's buffer until the peer or the core
/// closes it. Buffers, including any overflow, release when `connection`
/// drops at the end of this function.
async fn read_loop<D: PackageDispatcher>(
    mut connection: Connection,
    mut read_half: OwnedReadHalf,
    session: Session,
    dispatcher: std::sync::Arc<D>,
    closer: CancellationToken,
) {
    let peer = session.peer_addr();
    loop {
        let target = match connection.read_target() {
            Ok(target) => target,
            Err(violation) => {
                warn!("closing connection: reason={violation}, peer={peer}");
                metrics::inc_errors();
                break;
            }
        };
        let count = tokio::select! {
            () = closer.cancelled() => break,
            result = read_half.read(target) => match result {
                // A non-positive read means the peer is gone; close silently.
                Ok(0) => {
                    debug!("peer disconnected: peer={peer}");
                    break;
                }
                Ok(count) => count,
                Err(error) => {
                    debug!("read failed: peer={peer}, error={error}");
                    break;
                }
            },
        };
        connection.commit(count);

        match connection.on_readable(&session, dispatcher.as_ref()) {
            Ok(None) => {}
            Ok(Some(reply)) => session.send_bytes(Bytes::from(reply)),
            Err(close) => {
                log_close(&close, peer);
                break;
            }
        }
    }
}

fn log_close(close: &ConnectionClose, peer: SocketAddr) {
    match close {
        ConnectionClose::CloseFrame | ConnectionClose::Requested => {
            debug!("connection closing: reason={close}, peer={peer}");
        }
        _ => {
            warn!("closing connection: reason={close}, peer={peer}");
            metrics::inc_errors();
        }
    }
}

/// Drain the outbound queue into the socket until closure.
async fn writer_loop(
    mut write_half: OwnedWriteHalf,
    mut writer_rx: mpsc::Receiver<Bytes>,
    closer: CancellationToken,
) {
    loop {
        tokio::select! {
            () = closer.cancelled() => break,
            queued = writer_rx.recv() => match queued {
                Some(bytes) => {
                    if let Err(error) = write_half.write_all(&bytes).await {
                        debug!("write failed: error={error}");
                        closer.cancel();
                        break;
                    }
                }
                None => break,
            },
        }
    }
}

/// Render a panic payload for logging.
fn describe_panic(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = panic.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else {
        format!("{panic:?}")
    }
}
