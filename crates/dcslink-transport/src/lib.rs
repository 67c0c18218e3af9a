//! TCP transport for dcslink.
//!
//! Owns exactly one TCP connection to the simulation's export server and
//! runs a background receive loop that forwards every inbound chunk, in
//! arrival order, to a single registered event channel.
//!
//! ```text
//! caller ──send(bytes)──→ TcpTransport ──socket──→ server
//!                               │
//!   receive loop task ←─socket──┘
//!        │
//!        └──→ TransportEvent::{StateChanged, Data, Error} ──→ consumer
//! ```
//!
//! The transport never retries and never reconnects on its own. Failures
//! are reported once through [`TransportEvent::Error`], followed by a
//! transition to [`ConnectionState::Disconnected`].

mod error;
mod tcp;

pub use error::TransportError;
pub use tcp::TcpTransport;

use std::fmt;

use tokio::sync::mpsc;

/// Default size of the buffer used for each socket read.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4096;

/// Lifecycle of the single connection owned by a [`TcpTransport`].
///
/// ```text
///   Disconnected ──connect()──→ Connecting ──ok──→ Connected
///        ↑                          │                  │
///        └────────── error ─────────┘                  │
///        └──────── disconnect() | I/O error ───────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No socket is open.
    #[default]
    Disconnected,
    /// A TCP handshake is in progress.
    Connecting,
    /// The socket is open and the receive loop is running.
    Connected,
}

impl ConnectionState {
    /// Returns `true` only for [`ConnectionState::Connected`].
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Everything the transport reports to its consumer.
#[derive(Debug)]
pub enum TransportEvent {
    /// The connection state changed. Emitted once per real transition.
    StateChanged(ConnectionState),
    /// A non-empty chunk of raw bytes read from the socket.
    Data(Vec<u8>),
    /// The connection failed. Always followed by
    /// `StateChanged(Disconnected)`.
    Error(TransportError),
}

/// Sending half of the transport's event channel (the "sink").
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// Receiving half of the transport's event channel.
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Creates the channel a [`TcpTransport`] reports into.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_only_connected_is_connected() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());
        assert!(!ConnectionState::Disconnected.is_connected());
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
    }

    #[test]
    fn test_connection_closed_is_distinguishable() {
        let closed = TransportError::ConnectionClosed("eof".into());
        let io = TransportError::ReceiveFailed(std::io::Error::other("boom"));
        assert!(closed.is_connection_closed());
        assert!(!io.is_connection_closed());
        assert!(closed.to_string().contains("eof"));
    }
}
