//! Shared helpers for the integration suites.
#![allow(dead_code)]

use std::net::SocketAddr;

use framebus::{PackageDispatcher, RawPackage, Session};
use tokio::{sync::mpsc, time::Duration};

/// What the dispatcher observed.
#[derive(Debug, PartialEq, Eq)]
pub enum Event {
    /// `on_session_connect` fired for an accepted connection.
    Connected { peer: SocketAddr },
    /// A package reached `on_package`.
    Package {
        service: u16,
        command: u16,
        body: Vec<u8>,
        peer: SocketAddr,
        outbound: bool,
    },
}

/// Dispatcher forwarding every callback onto a channel.
pub struct Recorder {
    events: mpsc::UnboundedSender<Event>,
    /// Commands answered with `false` from `on_package`.
    pub reject_command: Option<u16>,
    /// Echo every package back to its sender.
    pub echo: bool,
}

impl Recorder {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                events,
                reject_command: None,
                echo: false,
            },
            rx,
        )
    }
}

impl PackageDispatcher for Recorder {
    fn on_session_connect(&self, session: &Session) {
        let _ = self.events.send(Event::Connected {
            peer: session.peer_addr(),
        });
    }

    fn on_package(&self, session: &Session, package: RawPackage<'_>) -> bool {
        let _ = self.events.send(Event::Package {
            service: package.service,
            command: package.command,
            body: package.body.to_vec(),
            peer: session.peer_addr(),
            outbound: session.is_outbound(),
        });
        if self.echo {
            session.send_package(package.service, package.command, package.body);
        }
        self.reject_command != Some(package.command)
    }
}

/// Receive the next dispatcher event or fail after five seconds.
pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for dispatcher event")
        .expect("event channel closed")
}

/// Assert no dispatcher event arrives within a grace period.
pub async fn expect_no_event(rx: &mut mpsc::UnboundedReceiver<Event>) {
    let quiet = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(quiet.is_err(), "unexpected event: {:?}", quiet.unwrap());
}

/// Package wire bytes: `[service][command][body]`, header little-endian.
pub fn package_bytes(service: u16, command: u16, body: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(4 + body.len());
    bytes.extend_from_slice(&service.to_le_bytes());
    bytes.extend_from_slice(&command.to_le_bytes());
    bytes.extend_from_slice(body);
    bytes
}

/// Raw-socket frame wrapping one package.
pub fn raw_frame(service: u16, command: u16, body: &[u8]) -> Vec<u8> {
    let package = package_bytes(service, command, body);
    let total = u32::try_from(4 + package.len()).expect("frame fits u32");
    let mut frame = total.to_le_bytes().to_vec();
    frame.extend_from_slice(&package);
    frame
}

/// Loopback address with an OS-assigned port.
pub fn any_port() -> SocketAddr {
    "127.0.0.1:0".parse().expect("loopback address")
}
