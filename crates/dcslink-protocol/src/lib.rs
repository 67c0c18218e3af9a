//! Protocol layer for dcslink.
//!
//! This crate defines what the client says to the DCS export script and
//! how it understands the answers:
//!
//! - **Catalog** ([`Catalog`], [`ApiDescriptor`]): the fixed table of
//!   remote calls and their parameters.
//! - **Calls** ([`BoundCall`], [`bind`]): a descriptor plus validated
//!   arguments, rendered into a call expression.
//! - **Codecs** ([`Codec`], [`LineCodec`], [`JsonCodec`]): framing of
//!   calls and replies on the byte stream.
//! - **Parser** ([`parse`]): nested-text replies into [`Record`] trees.
//!
//! It knows nothing about sockets or queues.
//!
//! ```text
//! Catalog → bind → BoundCall → Codec::encode → bytes
//! bytes → Codec::decode → Reply → parse → Vec<Record>
//! ```

mod call;
mod catalog;
mod codec;
mod error;
mod parser;
mod value;

pub use call::{AckPolicy, BoundCall, TransportParameter, TransportRecord, bind};
pub use catalog::{
    API_OBJECT_BY_ID, API_SELF_DATA, API_WORLD_OBJECTS, ApiDescriptor,
    CATALOG_VERSION, Catalog, ParamKind, ParameterSpec,
};
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use codec::{Codec, FrameBuffer, LineCodec, Reply};
pub use error::{ParseError, ProtocolError};
pub use parser::{MAX_DEPTH, parse};
pub use value::{EntityRecord, Record, Scalar, Value};
