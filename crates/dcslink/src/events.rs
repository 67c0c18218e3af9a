//! Event dispatcher: one handler per event kind, called synchronously.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use dcslink_protocol::Record;
use dcslink_transport::ConnectionState;
use serde::Serialize;

use crate::ClientError;

/// The kinds of event a handler can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ConnectionChanged,
    DataReceived,
    Error,
}

/// The parsed reply to one call.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Response {
    /// Id of the API that was answered. `None` for a reply that arrived
    /// while no call was waiting and the codec did not say which API it
    /// belongs to.
    pub api_id: Option<u32>,
    /// Sequence number returned by `send_command`, if the reply could be
    /// matched to a call.
    pub seq: Option<u64>,
    /// Parsed entities, in payload order.
    pub records: Vec<Record>,
}

/// An event delivered to handlers.
#[derive(Debug)]
pub enum Event {
    /// The connection state changed.
    ConnectionChanged(ConnectionState),
    /// A reply was received and parsed.
    DataReceived(Response),
    /// Something failed off the caller's path: a malformed reply, a
    /// server-side error, a lost connection, or a failing handler.
    Error(ClientError),
}

impl Event {
    /// The kind used to select this event's handler.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ConnectionChanged(_) => EventKind::ConnectionChanged,
            Self::DataReceived(_) => EventKind::DataReceived,
            Self::Error(_) => EventKind::Error,
        }
    }
}

/// Error type handlers may return.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

type Handler = Arc<dyn Fn(&Event) -> Result<(), HandlerError> + Send + Sync>;

/// Registry of at most one handler per [`EventKind`].
#[derive(Default)]
pub struct Dispatcher {
    handlers: Mutex<HashMap<EventKind, Handler>>,
}

impl Dispatcher {
    /// Creates a dispatcher with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `kind`, replacing any previous one.
    pub fn on<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&Event) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.lock().insert(kind, Arc::new(handler));
    }

    /// Removes the handler for `kind`, if any.
    pub fn off(&self, kind: EventKind) {
        self.lock().remove(&kind);
    }

    /// Removes every handler.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Calls the handler registered for the event's kind on the current
    /// task. No handler is a silent no-op.
    ///
    /// # Errors
    /// Whatever the handler returned.
    pub fn emit(&self, event: &Event) -> Result<(), HandlerError> {
        // Cloned out so a handler may register handlers itself.
        let handler = self.lock().get(&event.kind()).cloned();
        match handler {
            Some(handler) => handler(event),
            None => Ok(()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<EventKind, Handler>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<EventKind> = self.lock().keys().copied().collect();
        f.debug_struct("Dispatcher").field("handlers", &kinds).finish()
    }
}
