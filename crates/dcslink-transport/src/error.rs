/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The peer closed the connection, either cleanly (zero-length read)
    /// or abruptly (reset/abort).
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Establishing the TCP connection failed.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// An operation needed a live connection and there was none.
    #[error("not connected")]
    NotConnected,

    /// `connect` was called while a connection is already up.
    #[error("already connected")]
    AlreadyConnected,
}

impl TransportError {
    /// Returns `true` if this error reports the remote side going away,
    /// as opposed to a local I/O failure.
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed(_))
    }
}
