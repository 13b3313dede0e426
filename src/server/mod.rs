//! Connection lifecycle manager.
//!
//! [`Framebus`] is the explicitly constructed core object: it owns the
//! listeners, the outbound connect path, the single optional UDP listener,
//! and the shutdown machinery. All I/O readiness is consumed from Tokio;
//! each connection's state lives in its own task, so no locks guard
//! per-connection data.

mod connection;
mod udp;

use std::{io, net::SocketAddr, sync::Arc};

use log::{error, warn};
use tokio::{
    net::{TcpListener, TcpStream, UdpSocket},
    sync::OnceCell,
    time::{Duration, sleep},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    config::CoreConfig,
    dispatch::PackageDispatcher,
    metrics,
    pool::{BufferSource, HeapBuffers},
    protocol::SocketRole,
    session::{Session, SessionRegistry},
};

/// Shared pieces every spawned task needs.
pub(crate) struct CoreHandle<D> {
    pub(crate) config: CoreConfig,
    pub(crate) dispatcher: Arc<D>,
    pub(crate) registry: Arc<SessionRegistry>,
    pub(crate) buffers: Arc<dyn BufferSource>,
    pub(crate) tracker: TaskTracker,
    pub(crate) shutdown: CancellationToken,
}

impl<D> Clone for CoreHandle<D> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            dispatcher: Arc::clone(&self.dispatcher),
            registry: Arc::clone(&self.registry),
            buffers: Arc::clone(&self.buffers),
            tracker: self.tracker.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

/// The socket server core.
///
/// Construct one per process, register listeners, and hand the dispatcher
/// decoded packages until [`graceful_shutdown`](Self::graceful_shutdown).
pub struct Framebus<D> {
    handle: CoreHandle<D>,
    udp: OnceCell<Arc<UdpSocket>>,
}

impl<D: PackageDispatcher> Framebus<D> {
    /// Create a core delivering packages to `dispatcher`.
    #[must_use]
    pub fn new(config: CoreConfig, dispatcher: D) -> Self {
        Self {
            handle: CoreHandle {
                config,
                dispatcher: Arc::new(dispatcher),
                registry: Arc::new(SessionRegistry::default()),
                buffers: Arc::new(HeapBuffers),
                tracker: TaskTracker::new(),
                shutdown: CancellationToken::new(),
            },
            udp: OnceCell::new(),
        }
    }

    /// Replace the overflow-buffer allocation strategy.
    #[must_use]
    pub fn with_buffer_source(mut self, buffers: Arc<dyn BufferSource>) -> Self {
        self.handle.buffers = buffers;
        self
    }

    /// Registry of live stream sessions.
    #[must_use]
    pub fn registry(&self) -> Arc<SessionRegistry> { Arc::clone(&self.handle.registry) }

    /// Listen for raw length-prefixed TCP connections.
    ///
    /// # Errors
    ///
    /// Returns the bind error; the failure is logged and no listener state
    /// is retained.
    pub async fn listen_raw(&self, addr: SocketAddr) -> io::Result<SocketAddr> {
        self.listen_stream(SocketRole::Raw, addr).await
    }

    /// Listen for WebSocket connections.
    ///
    /// # Errors
    ///
    /// Returns the bind error; the failure is logged and no listener state
    /// is retained.
    pub async fn listen_websocket(&self, addr: SocketAddr) -> io::Result<SocketAddr> {
        self.listen_stream(SocketRole::WebSocket, addr).await
    }

    async fn listen_stream(&self, role: SocketRole, addr: SocketAddr) -> io::Result<SocketAddr> {
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(error) => {
                error!("bind failed: role={role:?}, addr={addr}, error={error}");
                return Err(error);
            }
        };
        let local_addr = listener.local_addr()?;
        let handle = self.handle.clone();
        self.handle.tracker.spawn(async move {
            accept_loop(handle, listener, role).await;
        });
        Ok(local_addr)
    }

    /// Open an outbound raw-socket connection.
    ///
    /// The returned future resolves exactly once: with the live [`Session`]
    /// once reads have begun, or with the connect error.
    ///
    /// # Errors
    ///
    /// Returns the connect error; the failure is logged and nothing is
    /// registered.
    pub async fn connect(&self, addr: SocketAddr) -> io::Result<Session> {
        let stream = match TcpStream::connect(addr).await {
            Ok(stream) => stream,
            Err(error) => {
                error!("connect failed: addr={addr}, error={error}");
                return Err(error);
            }
        };
        let peer = stream.peer_addr().unwrap_or(addr);
        Ok(connection::spawn_connection_task(
            &self.handle,
            stream,
            peer,
            SocketRole::Raw,
            connection::Origin::Outbound,
        ))
    }

    /// Bind the UDP listener.
    ///
    /// At most one UDP listener exists per core: a second call is rejected
    /// with a logged warning and leaves the first listener untouched.
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::AlreadyExists`] for a repeated call and the
    /// bind error when binding fails.
    pub async fn listen_udp(&self, addr: SocketAddr) -> io::Result<SocketAddr> {
        if self.udp.get().is_some() {
            warn!("udp listener already bound; ignoring listen on {addr}");
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "udp listener already bound",
            ));
        }
        let socket = match UdpSocket::bind(addr).await {
            Ok(socket) => Arc::new(socket),
            Err(error) => {
                error!("udp bind failed: addr={addr}, error={error}");
                return Err(error);
            }
        };
        let local_addr = socket.local_addr()?;
        if self.udp.set(Arc::clone(&socket)).is_err() {
            warn!("udp listener already bound; ignoring listen on {addr}");
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "udp listener already bound",
            ));
        }
        let handle = self.handle.clone();
        self.handle.tracker.spawn(async move {
            udp::recv_loop(handle, socket).await;
        });
        Ok(local_addr)
    }

    /// Send one datagram through the bound UDP listener.
    ///
    /// Fire and forget: failures are logged and never retried. A core with
    /// no UDP listener logs a warning and drops the payload.
    pub fn send_udp(&self, peer: SocketAddr, body: &[u8]) {
        let Some(socket) = self.udp.get() else {
            warn!("udp send with no listener bound: peer={peer}");
            return;
        };
        let socket = Arc::clone(socket);
        let payload = bytes::Bytes::copy_from_slice(body);
        self.handle.tracker.spawn(async move {
            if let Err(error) = socket.send_to(&payload, peer).await {
                error!("udp send failed: peer={peer}, error={error}");
                metrics::inc_errors();
            }
        });
    }

    /// Token cancelled when shutdown begins.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken { self.handle.shutdown.clone() }

    /// Stop accepting, close every connection, and wait for all tasks.
    pub async fn graceful_shutdown(&self) {
        self.handle.shutdown.cancel();
        self.handle.tracker.close();
        self.handle.tracker.wait().await;
    }

    /// Run until `signal` completes, then shut down gracefully.
    pub async fn run_until_shutdown<S>(&self, signal: S)
    where
        S: Future<Output = ()>,
    {
        signal.await;
        self.graceful_shutdown().await;
    }

    /// Run until Ctrl+C, then shut down gracefully.
    ///
    /// # Errors
    ///
    /// Returns an [`io::Error`] if the signal handler cannot be installed.
    pub async fn run(&self) -> io::Result<()> {
        tokio::signal::ctrl_c().await?;
        self.graceful_shutdown().await;
        Ok(())
    }
}

/// Accept connections until shutdown, backing off on accept errors.
async fn accept_loop<D: PackageDispatcher>(
    handle: CoreHandle<D>,
    listener: TcpListener,
    role: SocketRole,
) {
    let mut delay = Duration::from_millis(10);
    loop {
        tokio::select! {
            () = handle.shutdown.cancelled() => break,
            result = listener.accept() => match result {
                Ok((stream, peer)) => {
                    delay = Duration::from_millis(10);
                    connection::spawn_connection_task(
                        &handle,
                        stream,
                        peer,
                        role,
                        connection::Origin::Inbound,
                    );
                }
                Err(error) => {
                    warn!("accept error: role={role:?}, error={error}");
                    sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(1));
                }
            },
        }
    }
}
