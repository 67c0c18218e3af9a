//! The dispatch task: turns transport events into client events.
//!
//! One task per client drains the transport's event channel in order:
//!
//! ```text
//! Data ──→ frame buffer ──decode──→ Reply ──parse──→ records
//!                                                  │
//!          acknowledge in-flight call ←────────────┘
//!                  │
//!                  ├──→ DataReceived / Error event
//!                  └──→ pump next call
//! ```

use std::sync::Arc;
use std::sync::atomic::Ordering;

use dcslink_protocol::{Codec, FrameBuffer, Record, Reply, parse};
use dcslink_transport::{ConnectionState, EventReceiver, TransportEvent};

use crate::client::Inner;
use crate::events::{Event, Response};
use crate::ClientError;

/// Body of the dispatch task. Ends when the transport is dropped.
pub(crate) async fn run<C: Codec>(inner: Arc<Inner<C>>, mut events: EventReceiver) {
    tracing::debug!("dispatch loop started");
    let mut buf = FrameBuffer::new();
    let mut connected = 0u64;

    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::StateChanged(state) => {
                if state == ConnectionState::Connected {
                    connected += 1;
                }
                // Bytes from a previous connection never complete a reply
                // on the next one.
                buf.clear();
                // A late event from an old connection must not wipe calls
                // queued on a new one.
                if state == ConnectionState::Disconnected
                    && inner.transport.state() == ConnectionState::Disconnected
                {
                    inner.fail_outstanding().await;
                }
                inner.emit(Event::ConnectionChanged(state));
            }
            TransportEvent::Data(bytes) => {
                // Read from a socket that was replaced before we got here.
                if connected < inner.connections.load(Ordering::SeqCst) {
                    tracing::debug!(bytes = bytes.len(), "dropping data from a previous connection");
                    continue;
                }
                buf.extend(&bytes);
                drain(&inner, &mut buf).await;
            }
            TransportEvent::Error(e) => inner.emit(Event::Error(e.into())),
        }
    }
    tracing::debug!("dispatch loop ended");
}

/// Handles every complete reply in `buf`.
async fn drain<C: Codec>(inner: &Inner<C>, buf: &mut FrameBuffer) {
    loop {
        let outcome = match inner.codec.decode(buf) {
            Ok(Some(reply)) => decode_reply(reply),
            Ok(None) => return,
            Err(e) => (None, Err(ClientError::Protocol(e))),
        };
        complete(inner, outcome).await;
    }
}

type Outcome = (Option<u32>, Result<Vec<Record>, ClientError>);

fn decode_reply(reply: Reply) -> Outcome {
    let result = match reply.server_error {
        Some(message) => Err(ClientError::Server(message)),
        None => parse(&reply.body).map_err(ClientError::from),
    };
    (reply.api_id, result)
}

/// Matches one reply to the in-flight call, reports it, and sends the
/// next call.
///
/// A reply that fails to parse still answers the in-flight call, so one
/// bad payload cannot stall the queue.
async fn complete<C: Codec>(inner: &Inner<C>, (reply_api, result): Outcome) {
    let entry = inner.queue.lock().await.acknowledge().ok();

    let (api_id, seq) = match &entry {
        Some(entry) => {
            if reply_api.is_some_and(|id| id != entry.api_id()) {
                tracing::warn!(
                    seq = entry.seq,
                    expected = entry.api_id(),
                    got = ?reply_api,
                    "reply names a different API"
                );
            }
            (Some(entry.api_id()), Some(entry.seq))
        }
        None => {
            tracing::warn!(api_id = ?reply_api, "unsolicited reply");
            (reply_api, None)
        }
    };

    match result {
        Ok(records) => {
            tracing::debug!(?api_id, ?seq, records = records.len(), "reply received");
            let response = Response { api_id, seq, records };
            if let Some(seq) = seq.filter(|&seq| inner.is_awaited(seq)) {
                inner.settle(seq, Ok(response.clone()));
            }
            inner.emit(Event::DataReceived(response));
        }
        Err(e) => {
            tracing::warn!(?api_id, ?seq, error = %e, "reply failed");
            if let Some(seq) = seq {
                inner.settle(seq, Err(for_requester(&e)));
            }
            inner.emit(Event::Error(e));
        }
    }

    let pumped = {
        let mut queue = inner.queue.lock().await;
        inner.pump(&mut queue).await
    };
    if let Err(e) = pumped {
        inner.emit(Event::Error(e));
    }
}

/// The copy of a reply failure handed to a waiting request.
fn for_requester(e: &ClientError) -> ClientError {
    match e {
        ClientError::Parse(e) => ClientError::Parse(e.clone()),
        ClientError::Protocol(e) => ClientError::Protocol(e.clone()),
        ClientError::Server(message) => ClientError::Server(message.clone()),
        _ => ClientError::ConnectionClosed,
    }
}
