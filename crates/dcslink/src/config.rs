//! Client configuration and builder.

use std::sync::Arc;

use dcslink_protocol::{AckPolicy, Catalog, Codec, LineCodec};
use dcslink_transport::DEFAULT_READ_BUFFER_SIZE;

use crate::Client;

/// Default export-server host.
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Default export-server port.
pub const DEFAULT_PORT: u16 = 7777;

/// Configuration for a [`Client`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Host of the export server.
    /// Default: `127.0.0.1`.
    pub host: String,

    /// Port of the export server.
    /// Default: 7777.
    pub port: u16,

    /// Which calls wait for a reply before the next call is sent.
    /// Default: [`AckPolicy::EveryCall`].
    pub ack_policy: AckPolicy,

    /// Maximum number of queued calls, in flight included.
    /// Default: `None` (unbounded).
    pub queue_capacity: Option<usize>,

    /// Size of each socket read.
    /// Default: 4096 bytes.
    pub read_buffer_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            ack_policy: AckPolicy::default(),
            queue_capacity: None,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

/// Builder for configuring a [`Client`].
///
/// # Example
///
/// ```rust,no_run
/// use dcslink::prelude::*;
///
/// # async fn run() -> Result<(), ClientError> {
/// let client = Client::builder()
///     .host("10.0.0.5")
///     .port(7777)
///     .ack_policy(AckPolicy::DataCallsOnly)
///     .build();
/// client.connect().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
    catalog: Option<Arc<Catalog>>,
}

impl ClientBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn ack_policy(mut self, policy: AckPolicy) -> Self {
        self.config.ack_policy = policy;
        self
    }

    /// Bounds the command queue. Calls beyond the bound are rejected.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = Some(capacity);
        self
    }

    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Uses `catalog` instead of the built-in table.
    pub fn catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = Some(Arc::new(catalog));
        self
    }

    /// Builds a client speaking the plain line protocol.
    pub fn build(self) -> Client<LineCodec> {
        self.build_with_codec(LineCodec)
    }

    /// Builds a client that frames calls and replies with `codec`.
    pub fn build_with_codec<C: Codec>(self, codec: C) -> Client<C> {
        let catalog = self
            .catalog
            .unwrap_or_else(|| Arc::new(Catalog::builtin().clone()));
        Client::from_parts(self.config, catalog, codec)
    }
}
