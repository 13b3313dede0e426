//! Socket server core: stream-to-packet reassembly over TCP, WebSocket,
//! and UDP.
//!
//! The crate terminates raw byte streams and hands discrete application
//! packages to an external dispatcher. Bytes arrive in arbitrary chunks;
//! the reassembly layer reconstructs framed packets across reads, drains
//! every packet a read completes, escalates to an exactly-sized overflow
//! buffer for packets larger than the fixed receive buffer, and releases
//! all storage structurally on every exit path.
//!
//! [`Framebus`] is the explicitly constructed core object: register
//! listeners per transport, connect outbound, and implement
//! [`PackageDispatcher`] to receive decoded packages.

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod metrics;
pub mod package;
pub mod pool;
pub mod protocol;
pub mod server;
pub mod session;

pub use config::CoreConfig;
pub use connection::Connection;
pub use dispatch::PackageDispatcher;
pub use error::{ConnectionClose, ProtocolViolation};
pub use package::RawPackage;
pub use pool::{BufferSource, HeapBuffers, LeasedBuffer, RecycledBuffers};
pub use protocol::{FrameHeader, SocketRole, WireCodec};
pub use server::Framebus;
pub use session::{ConnectionId, Session, SessionRegistry};
