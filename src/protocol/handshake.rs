//! HTTP upgrade handshake for WebSocket connections.
//!
//! The first bytes a WebSocket peer sends are an HTTP/1.1 upgrade request.
//! [`try_upgrade`] waits for the terminating blank line, validates the
//! request, and produces the `101 Switching Protocols` response to write
//! back. The caller resets its read cursor afterwards so handshake bytes
//! are never reinterpreted as frame data.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use sha1::{Digest, Sha1};

use crate::error::ProtocolViolation;

/// Key-derivation GUID fixed by RFC6455 §1.3.
const WS_ACCEPT_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Terminator of an HTTP request head.
const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Try to complete the upgrade handshake against the buffered bytes.
///
/// Returns `Ok(None)` while the request head is still incomplete and
/// `Ok(Some(response))` once a valid upgrade request is present, where
/// `response` is the full 101 response to write back.
///
/// # Errors
///
/// Returns [`ProtocolViolation::MalformedHandshake`] when the complete
/// request is not a `GET` upgrade carrying a `Sec-WebSocket-Key`.
pub fn try_upgrade(buf: &[u8]) -> Result<Option<Vec<u8>>, ProtocolViolation> {
    let Some(head_len) = find_head(buf) else {
        return Ok(None);
    };
    let head =
        std::str::from_utf8(&buf[..head_len]).map_err(|_| ProtocolViolation::MalformedHandshake)?;
    let mut lines = head.split("\r\n");
    let request_line = lines.next().ok_or(ProtocolViolation::MalformedHandshake)?;
    if !request_line.starts_with("GET ") || !request_line.ends_with("HTTP/1.1") {
        return Err(ProtocolViolation::MalformedHandshake);
    }

    let mut key = None;
    let mut upgrade_requested = false;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if name.eq_ignore_ascii_case("sec-websocket-key") {
            key = Some(value);
        } else if name.eq_ignore_ascii_case("upgrade") && value.eq_ignore_ascii_case("websocket") {
            upgrade_requested = true;
        }
    }
    let key = key.ok_or(ProtocolViolation::MalformedHandshake)?;
    if !upgrade_requested {
        return Err(ProtocolViolation::MalformedHandshake);
    }

    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\r\n",
        accept_key(key)
    );
    Ok(Some(response.into_bytes()))
}

/// Derive the `Sec-WebSocket-Accept` value for a client key.
#[must_use]
pub fn accept_key(key: &str) -> String {
    let mut digest = Sha1::new();
    digest.update(key.as_bytes());
    digest.update(WS_ACCEPT_GUID.as_bytes());
    STANDARD.encode(digest.finalize())
}

/// Length of the request head excluding the terminator, if complete.
fn find_head(buf: &[u8]) -> Option<usize> {
    buf.windows(HEAD_TERMINATOR.len())
        .position(|window| window == HEAD_TERMINATOR)
}
