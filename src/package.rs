//! Application package layout.
//!
//! Every frame body carries one command package: a 4-byte little-endian
//! header naming the destination service and command, followed by an opaque
//! body the dispatcher interprets. The decoded view borrows from the
//! connection's receive buffer and lives only for the duration of one
//! dispatch call.

use bytes::{BufMut, BytesMut};

/// Length of the package header preceding the body.
pub const PACKAGE_HEADER_LEN: usize = 4;

/// One decoded command package.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawPackage<'a> {
    /// Destination service identifier.
    pub service: u16,
    /// Command identifier within the service.
    pub command: u16,
    /// Command body, owned by the connection's receive buffer.
    pub body: &'a [u8],
}

impl<'a> RawPackage<'a> {
    /// Decode a frame body into a package view.
    ///
    /// Returns `None` when the body is too short to carry a header.
    #[must_use]
    pub fn decode(bytes: &'a [u8]) -> Option<Self> {
        let header = bytes.first_chunk::<PACKAGE_HEADER_LEN>()?;
        Some(Self {
            service: u16::from_le_bytes([header[0], header[1]]),
            command: u16::from_le_bytes([header[2], header[3]]),
            body: &bytes[PACKAGE_HEADER_LEN..],
        })
    }

    /// Append the wire form of a package to `dst`.
    pub fn encode(service: u16, command: u16, body: &[u8], dst: &mut BytesMut) {
        dst.reserve(PACKAGE_HEADER_LEN + body.len());
        dst.put_u16_le(service);
        dst.put_u16_le(command);
        dst.extend_from_slice(body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_splits_header_and_body() {
        let package = RawPackage::decode(&[1, 0, 7, 0, 0xAA, 0xBB]).expect("decodable");
        assert_eq!(package.service, 1);
        assert_eq!(package.command, 7);
        assert_eq!(package.body, &[0xAA, 0xBB]);
    }

    #[test]
    fn empty_body_is_valid() {
        let package = RawPackage::decode(&[2, 0, 3, 0]).expect("decodable");
        assert!(package.body.is_empty());
    }

    #[test]
    fn short_bytes_do_not_decode() {
        assert_eq!(RawPackage::decode(&[1, 0, 7]), None);
    }

    #[test]
    fn encode_is_readable_by_decode() {
        let mut dst = BytesMut::new();
        RawPackage::encode(300, 12, b"state", &mut dst);
        let package = RawPackage::decode(&dst).expect("decodable");
        assert_eq!(package.service, 300);
        assert_eq!(package.command, 12);
        assert_eq!(package.body, b"state");
    }
}
