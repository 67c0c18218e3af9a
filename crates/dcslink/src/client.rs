//! The client: wires catalog, codec, transport, queue, and dispatcher
//! together behind one handle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use dcslink_protocol::{
    API_OBJECT_BY_ID, API_SELF_DATA, API_WORLD_OBJECTS, ApiDescriptor,
    BoundCall, Catalog, Codec, EntityRecord, LineCodec, Scalar,
};
use dcslink_queue::{CommandQueue, PendingCommand, QueueEntry, QueueError};
use dcslink_transport::{
    ConnectionState, EventReceiver, TcpTransport, event_channel,
};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;

use crate::events::{Dispatcher, Event, EventKind, HandlerError, Response};
use crate::{ClientBuilder, ClientConfig, ClientError, dispatch};

type Responder = oneshot::Sender<Result<Response, ClientError>>;

/// State shared between the [`Client`] handle and its dispatch task.
pub(crate) struct Inner<C: Codec> {
    pub(crate) config: ClientConfig,
    pub(crate) catalog: Arc<Catalog>,
    pub(crate) codec: C,
    pub(crate) transport: TcpTransport,
    /// Held across each pump so a reply is never matched against a call
    /// whose write has not finished.
    pub(crate) queue: Mutex<CommandQueue>,
    pub(crate) dispatcher: Dispatcher,
    /// Connections opened so far. The dispatch task compares it with the
    /// `Connected` events it has seen to spot bytes from an older socket.
    pub(crate) connections: AtomicU64,
    /// Callers of [`Client::request`] waiting for their reply, by seq.
    responders: StdMutex<HashMap<u64, Responder>>,
}

impl<C: Codec> Inner<C> {
    /// Looks up, binds, encodes, queues, and pumps one call.
    async fn submit<I, K, V>(
        &self,
        api_id: u32,
        params: I,
        responder: Option<Responder>,
    ) -> Result<u64, ClientError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Scalar>,
    {
        if !self.transport.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let api = self
            .catalog
            .get(api_id)
            .ok_or(ClientError::UnknownApi(api_id))?;
        let call = BoundCall::bind(api, params, self.config.ack_policy)?;
        let frame = self.codec.encode(&call)?;

        let mut queue = self.queue.lock().await;
        let seq = queue.enqueue(PendingCommand::new(call, frame))?;
        if let Some(responder) = responder {
            self.responders().insert(seq, responder);
        }
        self.pump(&mut queue).await?;
        Ok(seq)
    }

    /// Sends whatever the queue allows and settles calls that completed
    /// without a reply.
    pub(crate) async fn pump(&self, queue: &mut CommandQueue) -> Result<(), ClientError> {
        match queue.pump(&self.transport).await {
            Ok(completed) => {
                self.settle_written(completed);
                Ok(())
            }
            Err(mut e) => {
                if let QueueError::SendFailed { seq, completed, .. } = &mut e {
                    self.settle_written(std::mem::take(completed));
                    self.settle(*seq, Err(ClientError::ConnectionClosed));
                }
                Err(e.into())
            }
        }
    }

    /// Resolves calls that were written and need no reply.
    fn settle_written(&self, entries: Vec<QueueEntry>) {
        for entry in entries {
            self.settle(
                entry.seq,
                Ok(Response {
                    api_id: Some(entry.api_id()),
                    seq: Some(entry.seq),
                    records: Vec::new(),
                }),
            );
        }
    }

    /// Hands the outcome of call `seq` to its waiting requester, if any.
    pub(crate) fn settle(&self, seq: u64, outcome: Result<Response, ClientError>) {
        let responder = self.responders().remove(&seq);
        if let Some(responder) = responder {
            // The requester may have timed out and gone away.
            let _ = responder.send(outcome);
        }
    }

    pub(crate) fn is_awaited(&self, seq: u64) -> bool {
        self.responders().contains_key(&seq)
    }

    /// Drops every queued call and fails every waiting request.
    pub(crate) async fn fail_outstanding(&self) {
        let dropped = self.queue.lock().await.clear();
        if !dropped.is_empty() {
            tracing::info!(count = dropped.len(), "dropping queued commands");
        }
        let waiting: Vec<Responder> =
            self.responders().drain().map(|(_, tx)| tx).collect();
        for responder in waiting {
            let _ = responder.send(Err(ClientError::ConnectionClosed));
        }
    }

    /// Delivers an event. A failing handler is logged and, unless it was
    /// the error handler, reported once through the error event.
    pub(crate) fn emit(&self, event: Event) {
        let kind = event.kind();
        let Err(e) = self.dispatcher.emit(&event) else {
            return;
        };
        tracing::error!(?kind, error = %e, "event handler failed");
        if kind != EventKind::Error {
            let report = Event::Error(ClientError::Handler(e.to_string()));
            if let Err(e) = self.dispatcher.emit(&report) {
                tracing::error!(error = %e, "error handler failed");
            }
        }
    }

    fn responders(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Responder>> {
        self.responders.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A connection to the DCS export script.
///
/// Calls are queued and sent one at a time; each waits for its reply
/// before the next goes out. Replies are parsed and delivered through the
/// [`EventKind::DataReceived`] event, and to [`request`](Self::request)
/// callers directly.
///
/// Connecting spawns a dispatch task on the current Tokio runtime. It
/// lives until the client is dropped.
pub struct Client<C: Codec = LineCodec> {
    inner: Arc<Inner<C>>,
    /// Taken by the first `connect` when it spawns the dispatch task.
    events: StdMutex<Option<EventReceiver>>,
    dispatch: StdMutex<Option<JoinHandle<()>>>,
}

impl Client<LineCodec> {
    /// Creates a builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Creates a line-protocol client from `config`.
    pub fn new(config: ClientConfig) -> Self {
        ClientBuilder::new().config(config).build()
    }
}

impl<C: Codec> Client<C> {
    pub(crate) fn from_parts(config: ClientConfig, catalog: Arc<Catalog>, codec: C) -> Self {
        let (tx, rx) = event_channel();
        let transport = TcpTransport::with_read_buffer_size(tx, config.read_buffer_size);
        let queue = match config.queue_capacity {
            Some(capacity) => CommandQueue::with_capacity(capacity),
            None => CommandQueue::new(),
        };
        Self {
            inner: Arc::new(Inner {
                config,
                catalog,
                codec,
                transport,
                queue: Mutex::new(queue),
                dispatcher: Dispatcher::new(),
                connections: AtomicU64::new(0),
                responders: StdMutex::new(HashMap::new()),
            }),
            events: StdMutex::new(Some(rx)),
            dispatch: StdMutex::new(None),
        }
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Registers the handler for `kind`, replacing any previous one.
    ///
    /// Handlers run on the dispatch task, one event at a time, in the
    /// order events happened.
    pub fn on<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&Event) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.inner.dispatcher.on(kind, handler);
    }

    /// The underlying dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    // -- Connection -------------------------------------------------------

    /// Connects to the configured host and port.
    ///
    /// # Errors
    /// [`ClientError::Transport`] if the connection cannot be opened.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let ClientConfig { host, port, .. } = &self.inner.config;
        self.connect_to(host, *port).await
    }

    /// Connects to `host:port`, ignoring the configured address.
    ///
    /// Waits for the TCP handshake with no timeout of its own. Calls left
    /// over from a previous connection are dropped first and their
    /// requests fail with [`ClientError::ConnectionClosed`]; the new socket
    /// could never answer them.
    ///
    /// # Errors
    /// [`ClientError::Transport`] if the connection cannot be opened or
    /// is already open.
    pub async fn connect_to(&self, host: &str, port: u16) -> Result<(), ClientError> {
        self.start_dispatch();
        if self.inner.transport.state() == ConnectionState::Disconnected {
            self.inner.fail_outstanding().await;
        }
        self.inner.transport.connect(host, port).await?;
        self.inner.connections.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Closes the connection, drops every queued call, and fails pending
    /// requests with [`ClientError::ConnectionClosed`]. Idempotent.
    pub async fn disconnect(&self) {
        self.inner.transport.disconnect().await;
        self.inner.fail_outstanding().await;
    }

    /// Returns `true` while the connection is up.
    pub fn is_connected(&self) -> bool {
        self.inner.transport.is_connected()
    }

    /// Current state of the underlying transport.
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.transport.state()
    }

    fn start_dispatch(&self) {
        let events = self
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(events) = events {
            let task = tokio::spawn(dispatch::run(Arc::clone(&self.inner), events));
            *self.dispatch.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
        }
    }

    // -- Calls ------------------------------------------------------------

    /// Queues a call to API `api_id` and sends it if nothing is in flight.
    ///
    /// Returns the call's sequence number. The reply arrives later through
    /// the [`EventKind::DataReceived`] event.
    ///
    /// # Errors
    /// - [`ClientError::NotConnected`] without a connection.
    /// - [`ClientError::UnknownApi`] if the catalog has no such id.
    /// - [`ClientError::Protocol`] if the arguments do not fit the API.
    /// - [`ClientError::Queue`] if the queue is full or a write failed.
    pub async fn send_command<I, K, V>(&self, api_id: u32, params: I) -> Result<u64, ClientError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Scalar>,
    {
        self.inner.submit(api_id, params, None).await
    }

    /// Like [`send_command`](Self::send_command), then waits for this
    /// call's reply.
    ///
    /// Calls that need no reply under the configured
    /// [`AckPolicy`](dcslink_protocol::AckPolicy) resolve with an empty
    /// response once written.
    ///
    /// # Errors
    /// Everything `send_command` returns, plus the failure reported for
    /// this call's reply ([`ClientError::Parse`], [`ClientError::Server`],
    /// [`ClientError::Protocol`]) and [`ClientError::ConnectionClosed`] if
    /// the connection went away first.
    pub async fn request<I, K, V>(&self, api_id: u32, params: I) -> Result<Response, ClientError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Scalar>,
    {
        let (tx, rx) = oneshot::channel();
        self.inner.submit(api_id, params, Some(tx)).await?;
        rx.await.map_err(|_| ClientError::ConnectionClosed)?
    }

    /// [`request`](Self::request) with a deadline.
    ///
    /// On timeout the call stays queued; its reply, when it comes, is
    /// still delivered through the event.
    ///
    /// # Errors
    /// [`ClientError::Timeout`] after `timeout`, otherwise as `request`.
    pub async fn request_timeout<I, K, V>(
        &self,
        api_id: u32,
        params: I,
        timeout: Duration,
    ) -> Result<Response, ClientError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Scalar>,
    {
        tokio::time::timeout(timeout, self.request(api_id, params))
            .await
            .map_err(|_| ClientError::Timeout)?
    }

    /// Fetches every object in the mission (`LoGetWorldObjects()`).
    pub async fn world_objects(&self) -> Result<Vec<EntityRecord>, ClientError> {
        let response = self.request(API_WORLD_OBJECTS, no_params()).await?;
        Ok(response.records)
    }

    /// Fetches one object (`LoGetObjectById(object_id)`). `None` if the
    /// reply holds no entity.
    pub async fn object_by_id(&self, object_id: i64) -> Result<Option<EntityRecord>, ClientError> {
        let response = self
            .request(API_OBJECT_BY_ID, [("object_id", object_id)])
            .await?;
        Ok(response.records.into_iter().next())
    }

    /// Fetches the player's own aircraft (`LoGetSelfData()`).
    pub async fn self_data(&self) -> Result<Option<EntityRecord>, ClientError> {
        let response = self.request(API_SELF_DATA, no_params()).await?;
        Ok(response.records.into_iter().next())
    }

    /// Returns `true` if no call is queued or in flight.
    pub async fn is_idle(&self) -> bool {
        self.inner.queue.lock().await.is_idle()
    }

    /// Number of calls queued, in flight included.
    pub async fn queued(&self) -> usize {
        self.inner.queue.lock().await.len()
    }

    // -- Catalog ----------------------------------------------------------

    /// The catalog calls are bound against.
    pub fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    /// Looks up an API by id.
    pub fn get_api(&self, api_id: u32) -> Option<&ApiDescriptor> {
        self.inner.catalog.get(api_id)
    }

    /// APIs whose syntax contains `pattern` (case-sensitive), in catalog
    /// order.
    pub fn get_apis_matching(&self, pattern: &str) -> Vec<&ApiDescriptor> {
        self.inner.catalog.matching(pattern)
    }

    /// Looks up an API by its exact syntax template.
    pub fn find_api(&self, syntax: &str) -> Option<&ApiDescriptor> {
        self.inner.catalog.find_by_syntax(syntax)
    }
}

impl<C: Codec> Drop for Client<C> {
    fn drop(&mut self) {
        let task = self
            .dispatch
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

fn no_params() -> [(&'static str, Scalar); 0] {
    []
}
