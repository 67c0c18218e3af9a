//! TCP transport implementation on top of `tokio::net::TcpStream`.

use std::io::ErrorKind;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;

use crate::{
    ConnectionState, DEFAULT_READ_BUFFER_SIZE, EventSender, TransportError,
    TransportEvent,
};

/// State shared between the caller-facing [`TcpTransport`] and its
/// receive loop task.
struct Shared {
    /// Only mutated through [`Shared::transition`].
    state: StdMutex<ConnectionState>,
    /// Write half of the socket. Held across each write so two sends
    /// never interleave on the wire.
    writer: Mutex<Option<OwnedWriteHalf>>,
    /// Stop signal for the current receive loop.
    stop: StdMutex<Option<oneshot::Sender<()>>>,
    events: EventSender,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves to `next`. Returns `true` if the state actually changed, in
    /// which case the change has been reported on the event channel.
    fn transition(&self, next: ConnectionState) -> bool {
        let mut state =
            self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == next {
            return false;
        }
        tracing::debug!(from = %*state, to = %next, "connection state change");
        *state = next;
        // Sent while holding the lock so state events keep the same order
        // as the transitions themselves.
        let _ = self.events.send(TransportEvent::StateChanged(next));
        true
    }

    fn signal_stop(&self) {
        let stop = self
            .stop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(stop) = stop {
            let _ = stop.send(());
        }
    }

    /// Reports a connection failure exactly once per connection.
    ///
    /// The caller must already have dropped the write half.
    fn fail(&self, error: TransportError) {
        self.signal_stop();
        let mut state =
            self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == ConnectionState::Disconnected {
            tracing::debug!(error = %error, "ignoring failure on dead connection");
            return;
        }
        tracing::warn!(error = %error, "connection lost");
        *state = ConnectionState::Disconnected;
        let _ = self.events.send(TransportEvent::Error(error));
        let _ = self
            .events
            .send(TransportEvent::StateChanged(ConnectionState::Disconnected));
    }
}

/// A single client connection to a remote TCP endpoint.
///
/// All methods take `&self`; the transport is meant to be shared behind an
/// `Arc` between the caller and whatever drives the command queue.
pub struct TcpTransport {
    shared: Arc<Shared>,
    /// The running receive loop, if any. Also serializes connect and
    /// disconnect against each other.
    reader: Mutex<Option<JoinHandle<()>>>,
    read_buffer_size: usize,
}

impl TcpTransport {
    /// Creates a disconnected transport that reports into `events`.
    pub fn new(events: EventSender) -> Self {
        Self::with_read_buffer_size(events, DEFAULT_READ_BUFFER_SIZE)
    }

    /// Like [`TcpTransport::new`], with a custom size for each socket read.
    pub fn with_read_buffer_size(
        events: EventSender,
        read_buffer_size: usize,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: StdMutex::new(ConnectionState::Disconnected),
                writer: Mutex::new(None),
                stop: StdMutex::new(None),
                events,
            }),
            reader: Mutex::new(None),
            read_buffer_size: read_buffer_size.max(1),
        }
    }

    /// Returns the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Returns `true` while the connection is up.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Opens the connection and starts the receive loop.
    ///
    /// Blocks until the TCP handshake completes or fails. There is no
    /// internal timeout; wrap the call in `tokio::time::timeout` if a
    /// deadline is needed.
    ///
    /// # Errors
    /// - [`TransportError::AlreadyConnected`] if a connection is up.
    /// - [`TransportError::ConnectFailed`] if the handshake fails. The
    ///   state goes back to `Disconnected`.
    pub async fn connect(
        &self,
        host: &str,
        port: u16,
    ) -> Result<(), TransportError> {
        let mut reader = self.reader.lock().await;

        if self.shared.state() != ConnectionState::Disconnected {
            return Err(TransportError::AlreadyConnected);
        }

        // A loop that ended on its own (remote close) is reaped here so
        // it can never race with the new connection.
        if let Some(previous) = reader.take() {
            let _ = previous.await;
        }

        self.shared.transition(ConnectionState::Connecting);
        tracing::info!(host, port, "connecting");

        let stream = match TcpStream::connect((host, port)).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(host, port, error = %e, "connect failed");
                self.shared.transition(ConnectionState::Disconnected);
                return Err(TransportError::ConnectFailed(e));
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "could not disable Nagle");
        }

        let (read_half, write_half) = stream.into_split();
        *self.shared.writer.lock().await = Some(write_half);

        let (stop_tx, stop_rx) = oneshot::channel();
        *self
            .shared
            .stop
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(stop_tx);

        self.shared.transition(ConnectionState::Connected);
        tracing::info!(host, port, "connected");

        *reader = Some(tokio::spawn(read_loop(
            Arc::clone(&self.shared),
            read_half,
            stop_rx,
            self.read_buffer_size,
        )));
        Ok(())
    }

    /// Writes `data` to the socket in full.
    ///
    /// Never retries. On a write error the connection is torn down and
    /// the failure is also reported on the event channel.
    ///
    /// # Errors
    /// - [`TransportError::NotConnected`] if there is no connection.
    /// - [`TransportError::SendFailed`] if the write fails.
    pub async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        let mut writer = self.shared.writer.lock().await;
        let Some(stream) = writer.as_mut() else {
            return Err(TransportError::NotConnected);
        };

        match stream.write_all(data).await {
            Ok(()) => {
                tracing::trace!(bytes = data.len(), "sent");
                Ok(())
            }
            Err(e) => {
                writer.take();
                drop(writer);
                let kind = e.kind();
                self.shared.fail(TransportError::SendFailed(
                    std::io::Error::new(kind, e.to_string()),
                ));
                Err(TransportError::SendFailed(e))
            }
        }
    }

    /// Closes the connection and waits for the receive loop to exit.
    ///
    /// Idempotent: safe to call repeatedly and on a transport that was
    /// never connected. Waits for an in-progress [`send`](Self::send) to
    /// finish its write before closing.
    pub async fn disconnect(&self) {
        let mut reader = self.reader.lock().await;

        self.shared.signal_stop();
        if let Some(task) = reader.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "receive loop ended abnormally");
            }
        }

        let write_half = self.shared.writer.lock().await.take();
        if let Some(mut write_half) = write_half {
            let _ = write_half.shutdown().await;
        }

        if self.shared.transition(ConnectionState::Disconnected) {
            tracing::info!("disconnected");
        }
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        // The loop owns the read half and a handle to the writer; stopping
        // it is what actually closes the socket.
        self.shared.signal_stop();
    }
}

/// Body of the receive loop task.
///
/// Runs until the stop signal fires or the socket fails. Every non-empty
/// read becomes one [`TransportEvent::Data`].
async fn read_loop(
    shared: Arc<Shared>,
    mut read_half: OwnedReadHalf,
    mut stop: oneshot::Receiver<()>,
    buffer_size: usize,
) {
    tracing::debug!("receive loop started");
    let mut buf = vec![0u8; buffer_size];

    let failure = loop {
        tokio::select! {
            biased;
            // Fires on an explicit stop and when the sender is dropped.
            _ = &mut stop => {
                tracing::debug!("receive loop stopped");
                return;
            }
            read = read_half.read(&mut buf) => match read {
                Ok(0) => {
                    break TransportError::ConnectionClosed(
                        "remote closed the connection".into(),
                    );
                }
                Ok(n) => {
                    tracing::trace!(bytes = n, "received");
                    let chunk = buf[..n].to_vec();
                    if shared.events.send(TransportEvent::Data(chunk)).is_err() {
                        tracing::debug!("event consumer gone, stopping");
                        return;
                    }
                }
                Err(e) if is_reset(e.kind()) => {
                    break TransportError::ConnectionClosed(e.to_string());
                }
                Err(e) => break TransportError::ReceiveFailed(e),
            }
        }
    };

    shared.writer.lock().await.take();
    shared.fail(failure);
    tracing::debug!("receive loop ended");
}

fn is_reset(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_kinds_count_as_closed() {
        assert!(is_reset(ErrorKind::ConnectionReset));
        assert!(is_reset(ErrorKind::UnexpectedEof));
        assert!(!is_reset(ErrorKind::PermissionDenied));
    }

    #[tokio::test]
    async fn test_new_transport_is_disconnected() {
        let (tx, _rx) = crate::event_channel();
        let transport = TcpTransport::new(tx);
        assert_eq!(transport.state(), ConnectionState::Disconnected);
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_send_without_connection_fails() {
        let (tx, _rx) = crate::event_channel();
        let transport = TcpTransport::new(tx);
        let err = transport.send(b"x").await.unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));
    }

    #[tokio::test]
    async fn test_disconnect_when_never_connected_is_silent() {
        let (tx, mut rx) = crate::event_channel();
        let transport = TcpTransport::new(tx);
        transport.disconnect().await;
        transport.disconnect().await;
        assert!(rx.try_recv().is_err(), "no state change to report");
    }
}
