use std::time::Duration;

use eyetribe_protocol::{status_name, ProtocolError};
use eyetribe_transport::TransportError;

/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The transport to the tracker could not be established.
    #[error("connection error: {0}")]
    Connection(#[source] TransportError),

    /// The tracker rejected the handshake or never answered it.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The connection was lost or closed while the operation was in flight.
    #[error("connection closed")]
    ConnectionClosed,

    /// A bounded wait expired.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The session was never connected (or the last connect failed).
    #[error("session is not connected")]
    NotConnected,

    /// `connect()` was called on a live session.
    #[error("session is already connected")]
    AlreadyConnected,

    /// The session was closed and cannot be reused.
    #[error("session is closed")]
    Closed,

    /// The tracker answered a request with a non-OK status.
    #[error("device rejected request with status {code} ({}): {message}", label(.code))]
    Device { code: u16, message: String },

    /// A reply was structurally valid but lacked what the request asked for.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Local transport failure that is not a disconnect.
    #[error("transport error: {0}")]
    Transport(#[source] TransportError),
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        if err.is_disconnect() {
            SessionError::ConnectionClosed
        } else {
            SessionError::Transport(err)
        }
    }
}

fn label(code: &u16) -> &'static str {
    status_name(*code)
}

pub type Result<T> = std::result::Result<T, SessionError>;
