//! Configuration surface for the socket core.

use serde::Deserialize;

/// Default capacity of a connection's fixed receive buffer.
pub const DEFAULT_RECV_LEN: usize = 4096;

/// Smallest permitted receive buffer.
///
/// The buffer must always be able to hold a complete frame header, so
/// configured capacities below this value are clamped up.
pub const MIN_RECV_LEN: usize = 64;

/// Default upper bound on a single packet (16 MiB).
pub const DEFAULT_MAX_PACKET_LEN: usize = 16 * 1024 * 1024;

/// Tunables for the core and its connections.
///
/// Every field has a default, so a partial configuration file
/// deserializes over [`CoreConfig::default`].
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Capacity of the fixed per-connection receive buffer.
    pub recv_buffer_len: usize,
    /// Largest packet a peer may declare; larger declarations are treated
    /// as protocol violations.
    pub max_packet_len: usize,
    /// Depth of the outbound writer queue per connection.
    pub writer_queue_depth: usize,
    /// Initial size of the per-listener UDP datagram buffer.
    pub datagram_buffer_len: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            recv_buffer_len: DEFAULT_RECV_LEN,
            max_packet_len: DEFAULT_MAX_PACKET_LEN,
            writer_queue_depth: 32,
            datagram_buffer_len: 4096,
        }
    }
}

impl CoreConfig {
    /// Receive buffer capacity with the [`MIN_RECV_LEN`] floor applied.
    #[must_use]
    pub fn recv_len(&self) -> usize { self.recv_buffer_len.max(MIN_RECV_LEN) }
}
