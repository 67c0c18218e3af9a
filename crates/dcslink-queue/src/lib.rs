//! Command queue for dcslink.
//!
//! The DCS export script handles one call at a time, so the client keeps
//! at most one call on the wire that is still waiting for its reply.
//! Everything else waits here in submission order.
//!
//! The queue never touches a socket directly. It writes through a
//! [`CommandSink`], which [`TcpTransport`] implements; tests use an
//! in-memory sink.

use std::future::Future;

use dcslink_transport::{TcpTransport, TransportError};

mod error;
mod queue;

pub use error::QueueError;
pub use queue::{CommandQueue, PendingCommand, QueueEntry};

/// Something that can write an encoded call in full.
pub trait CommandSink {
    /// Error returned by a failed write.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Writes `frame` completely or fails.
    fn send(&self, frame: &[u8]) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

impl CommandSink for TcpTransport {
    type Error = TransportError;

    async fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        TcpTransport::send(self, frame).await
    }
}
