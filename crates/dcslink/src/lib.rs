//! # dcslink
//!
//! Async TCP client for the DCS World export API.
//!
//! dcslink connects to the Lua export script running inside the
//! simulator, sends calls from a fixed catalog (`LoGetSelfData()`,
//! `LoGetWorldObjects()`, ...) one at a time, and parses the nested-text
//! replies into [`Record`](dcslink_protocol::Record) trees.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dcslink::prelude::*;
//!
//! # async fn run() -> Result<(), ClientError> {
//! let client = Client::builder().host("127.0.0.1").port(7777).build();
//! client.on(EventKind::DataReceived, |event| {
//!     if let Event::DataReceived(response) = event {
//!         println!("{} entities", response.records.len());
//!     }
//!     Ok(())
//! });
//! client.connect().await?;
//!
//! // Fire and observe through the event...
//! client.send_command(API_SELF_DATA, std::iter::empty::<(&str, i64)>()).await?;
//! // ...or wait for this call's reply directly.
//! let me = client.self_data().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Layers
//!
//! ```text
//! dcslink            Client, events, config
//!   ├── dcslink-queue      one call in flight at a time
//!   ├── dcslink-protocol   catalog, calls, codecs, parser
//!   └── dcslink-transport  TCP connection and receive loop
//! ```

mod client;
mod config;
mod dispatch;
mod error;
mod events;
pub mod logging;

pub use client::Client;
pub use config::{ClientBuilder, ClientConfig, DEFAULT_HOST, DEFAULT_PORT};
pub use error::ClientError;
pub use events::{Dispatcher, Event, EventKind, HandlerError, Response};

pub use dcslink_protocol as protocol;
pub use dcslink_queue as queue;
pub use dcslink_transport as transport;

/// Everything a typical application needs.
pub mod prelude {
    pub use crate::{
        Client, ClientBuilder, ClientConfig, ClientError, Event, EventKind,
        HandlerError, Response,
    };
    pub use dcslink_protocol::{
        API_OBJECT_BY_ID, API_SELF_DATA, API_WORLD_OBJECTS, AckPolicy,
        ApiDescriptor, Catalog, EntityRecord, JsonCodec, LineCodec, Record,
        Scalar, Value,
    };
    pub use dcslink_transport::ConnectionState;
}
