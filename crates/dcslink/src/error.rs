//! Unified error type for the dcslink client.

use dcslink_protocol::{ParseError, ProtocolError};
use dcslink_queue::QueueError;
use dcslink_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each wrapped variant generates a `From`
/// impl, so `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A transport-level error (connect, send, receive).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Binding, serializing, or framing a call failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A reply did not follow the nested-text grammar.
    #[error("malformed reply: {0}")]
    Parse(#[from] ParseError),

    /// The command queue refused or lost a call.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// No catalog entry has this id.
    #[error("unknown API id {0}")]
    UnknownApi(u32),

    /// A call was issued while the client was not connected.
    #[error("not connected")]
    NotConnected,

    /// The export script answered the call with an error.
    #[error("server error: {0}")]
    Server(String),

    /// An event handler returned an error.
    #[error("event handler failed: {0}")]
    Handler(String),

    /// A request did not complete within the caller's deadline.
    #[error("request timed out")]
    Timeout,

    /// The connection went away before the reply arrived.
    #[error("connection closed before the reply arrived")]
    ConnectionClosed,
}

impl ClientError {
    /// Returns `true` for every error that means the connection is gone or
    /// was never there.
    pub fn is_connection_failure(&self) -> bool {
        match self {
            Self::Transport(_) | Self::NotConnected | Self::ConnectionClosed => true,
            Self::Queue(QueueError::SendFailed { .. }) => true,
            _ => false,
        }
    }
}
