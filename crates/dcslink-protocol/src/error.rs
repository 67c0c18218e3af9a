//! Error types for the protocol layer.
//!
//! Two kinds of failure live here. [`ProtocolError`] covers everything
//! that goes wrong while building or framing a call, and is returned
//! synchronously to whoever issued the call. [`ParseError`] covers an
//! inbound dump that does not follow the nested-text grammar; it is
//! discovered on the receive side and reported asynchronously.

#[cfg(feature = "json")]
use std::sync::Arc;

use crate::ParamKind;

/// Errors raised while binding, serializing, or framing calls.
///
/// Cloneable, so one failure can be reported both to the caller waiting on
/// a request and to the error event.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProtocolError {
    /// The caller supplied an argument name the API does not declare.
    #[error("API {api_id} has no parameter named `{name}`")]
    InvalidParameter { api_id: u32, name: String },

    /// A required parameter was not supplied.
    #[error("API {api_id} requires parameter `{name}`")]
    MissingParameter { api_id: u32, name: String },

    /// The argument's kind does not match the declared parameter kind.
    #[error(
        "API {api_id} parameter `{name}` expects {expected}, got {found}"
    )]
    TypeMismatch {
        api_id: u32,
        name: String,
        expected: ParamKind,
        found: &'static str,
    },

    /// A bound call cannot be rendered into a safe call string.
    #[error("cannot serialize call: {0}")]
    Serialization(String),

    /// A catalog table violates its own invariants.
    #[error("invalid catalog: {0}")]
    InvalidCatalog(String),

    /// JSON serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(Arc<serde_json::Error>),

    /// An inbound JSON envelope was malformed.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(Arc<serde_json::Error>),
}

#[cfg(feature = "json")]
impl ProtocolError {
    pub(crate) fn encode(e: serde_json::Error) -> Self {
        Self::Encode(Arc::new(e))
    }

    pub(crate) fn decode(e: serde_json::Error) -> Self {
        Self::Decode(Arc::new(e))
    }
}

/// An inbound payload that does not follow the nested-text grammar.
///
/// Line numbers are 1-based and count every line of the payload,
/// including blank ones.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// A block opener (`key:`) is the last line, so its body was cut off.
    #[error("line {line}: block `{key}` is never terminated")]
    UnterminatedBlock { line: usize, key: String },

    /// A dedent lands on an indentation no open block uses.
    #[error("line {line}: indentation does not match any open block")]
    InconsistentIndent { line: usize },

    /// A line is indented deeper than its siblings without an opener.
    #[error("line {line}: unexpected indentation")]
    UnexpectedIndent { line: usize },

    /// A line inside a block has no `key: value` or `key:` shape.
    #[error("line {line}: expected `key: value` or `key:`")]
    MissingSeparator { line: usize },

    /// A top-level line of a multi-entity payload is not an entity header.
    #[error("line {line}: expected an entity header `key:`")]
    ExpectedEntity { line: usize },

    /// A quoted string has no closing quote.
    #[error("line {line}: unterminated quoted string")]
    UnterminatedQuote { line: usize },

    /// Text follows the closing quote of a quoted string.
    #[error("line {line}: unexpected text after quoted string")]
    TrailingText { line: usize },

    /// Nesting exceeds [`MAX_DEPTH`](crate::MAX_DEPTH).
    #[error("line {line}: nesting deeper than {max} levels")]
    TooDeep { line: usize, max: usize },
}

impl ParseError {
    /// Returns the 1-based line the error was detected on.
    pub fn line(&self) -> usize {
        match self {
            Self::UnterminatedBlock { line, .. }
            | Self::InconsistentIndent { line }
            | Self::UnexpectedIndent { line }
            | Self::MissingSeparator { line }
            | Self::ExpectedEntity { line }
            | Self::UnterminatedQuote { line }
            | Self::TrailingText { line }
            | Self::TooDeep { line, .. } => *line,
        }
    }
}
