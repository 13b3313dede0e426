//! Bridge between drained frames and the application dispatcher.
//!
//! The dispatcher is an external collaborator: the core decodes each frame
//! body into a [`RawPackage`] and hands it over synchronously, then turns
//! the verdict into a connection-lifecycle outcome. Dispatch happens inside
//! the connection's own task, so a session's packages arrive in wire order
//! and never interleave.

use log::error;

use crate::{
    error::ConnectionClose,
    metrics,
    package::RawPackage,
    session::Session,
};

/// Application-side receiver of decoded packages.
pub trait PackageDispatcher: Send + Sync + 'static {
    /// Called once per accepted connection, before any reads begin, so the
    /// application can register per-session state.
    fn on_session_connect(&self, session: &Session) { let _ = session; }

    /// Handle one decoded package.
    ///
    /// Returning `false` closes the connection.
    fn on_package(&self, session: &Session, package: RawPackage<'_>) -> bool;
}

/// Decode a drained frame body and dispatch it.
///
/// # Errors
///
/// [`ConnectionClose::DecodeFailed`] when the body does not decode (the
/// failure is logged with the peer address), and
/// [`ConnectionClose::Rejected`] when the dispatcher refuses the package.
pub(crate) fn deliver<D: PackageDispatcher>(
    dispatcher: &D,
    session: &Session,
    body: &[u8],
) -> Result<(), ConnectionClose> {
    let Some(package) = RawPackage::decode(body) else {
        error!("package decode failed: peer={}", session.peer_addr());
        metrics::inc_errors();
        return Err(ConnectionClose::DecodeFailed);
    };
    if dispatcher.on_package(session, package) {
        Ok(())
    } else {
        Err(ConnectionClose::Rejected)
    }
}
