//! Wire codecs: how a [`BoundCall`] becomes bytes and how a byte stream is
//! cut into replies.
//!
//! TCP delivers arbitrary chunks, so decoding works on a growing
//! [`FrameBuffer`]. The caller appends every received chunk to the buffer
//! and calls [`Codec::decode`] until it returns `Ok(None)`. Each
//! successful call removes exactly one reply from the front of the buffer.
//!
//! Two codecs are provided:
//!
//! - [`LineCodec`]: one call expression per line out, replies terminated
//!   by an empty line in.
//! - [`JsonCodec`]: [`TransportRecord`] envelopes both ways, the format
//!   the DCS export script speaks.

use crate::{BoundCall, ProtocolError};
#[cfg(feature = "json")]
use crate::TransportRecord;

/// Inbound bytes not yet cut into replies.
///
/// Remembers how far a codec has already searched for the end of the
/// current reply, so a large reply arriving in many chunks is scanned
/// once rather than once per chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameBuffer {
    bytes: Vec<u8>,
    /// Prefix of `bytes` known to hold no frame end.
    scanned: usize,
}

impl FrameBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a received chunk.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    /// The buffered bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Drops everything buffered.
    pub fn clear(&mut self) {
        self.bytes.clear();
        self.scanned = 0;
    }

    /// Removes the first `n` bytes.
    fn consume(&mut self, n: usize) {
        self.bytes.drain(..n);
        self.scanned = 0;
    }
}

impl From<Vec<u8>> for FrameBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self { bytes, scanned: 0 }
    }
}

/// One complete reply cut from the inbound stream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reply {
    /// API id echoed by the server, if the format carries one.
    pub api_id: Option<u32>,
    /// Nested-text dump to feed to [`parse`](crate::parse).
    pub body: String,
    /// Error message reported by the server for this call.
    pub server_error: Option<String>,
}

/// Converts calls to bytes and frames inbound bytes into replies.
///
/// `Send + Sync + 'static` so a codec can live inside the client's shared
/// state and be used from its dispatch task.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a call, including its record terminator.
    ///
    /// # Errors
    /// [`ProtocolError::Serialization`] if the call cannot be rendered
    /// safely, or [`ProtocolError::Encode`] if the envelope fails.
    fn encode(&self, call: &BoundCall) -> Result<Vec<u8>, ProtocolError>;

    /// Removes one complete reply from the front of `buf`.
    ///
    /// Returns `Ok(None)` and leaves `buf` untouched (apart from leading
    /// filler) when no complete reply is buffered yet.
    ///
    /// # Errors
    /// [`ProtocolError::Decode`] if the buffered bytes can never form a
    /// valid reply. The buffer is discarded in that case.
    fn decode(&self, buf: &mut FrameBuffer) -> Result<Option<Reply>, ProtocolError>;
}

// ---------------------------------------------------------------------------
// LineCodec
// ---------------------------------------------------------------------------

/// Plain-text framing.
///
/// Outbound: the rendered call expression followed by `\n`.
/// Inbound: a reply is every line up to the first empty line. `\r\n` line
/// endings are accepted. Bytes that are not UTF-8 are read as Latin-1.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineCodec;

impl Codec for LineCodec {
    fn encode(&self, call: &BoundCall) -> Result<Vec<u8>, ProtocolError> {
        let mut line = call.render()?.into_bytes();
        line.push(b'\n');
        Ok(line)
    }

    fn decode(&self, buf: &mut FrameBuffer) -> Result<Option<Reply>, ProtocolError> {
        // Resume at the start of the first line not yet seen in full.
        let mut start = buf.scanned;
        while let Some(offset) = buf.bytes[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            let line = &buf.bytes[start..end];
            if line.is_empty() || line == b"\r" {
                let body = text_of(&buf.bytes[..start]);
                buf.consume(end + 1);
                return Ok(Some(Reply {
                    api_id: None,
                    body,
                    server_error: None,
                }));
            }
            start = end + 1;
        }
        buf.scanned = start;
        Ok(None)
    }
}

fn text_of(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// JSON envelope framing.
///
/// Outbound: the call's [`TransportRecord`] as one line of JSON.
/// Inbound: consecutive JSON objects, each a [`TransportRecord`] whose
/// `result` field carries the nested-text dump. Whitespace between
/// objects is ignored.
///
/// This is behind the `json` feature flag (enabled by default).
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode(&self, call: &BoundCall) -> Result<Vec<u8>, ProtocolError> {
        // The server evaluates `api_syntax` with the parameter values, so
        // the call must be renderable even though the rendering itself is
        // not sent.
        call.render()?;
        let mut bytes =
            serde_json::to_vec(&call.to_transport_record()).map_err(ProtocolError::encode)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    fn decode(&self, buf: &mut FrameBuffer) -> Result<Option<Reply>, ProtocolError> {
        let mut stream =
            serde_json::Deserializer::from_slice(buf.as_bytes()).into_iter::<TransportRecord>();
        match stream.next() {
            None => {
                buf.clear();
                Ok(None)
            }
            Some(Ok(record)) => {
                let consumed = stream.byte_offset();
                buf.consume(consumed);
                Ok(Some(Reply {
                    api_id: Some(record.id),
                    body: record.result,
                    server_error: record.error_thrown.then_some(record.error_message),
                }))
            }
            Some(Err(e)) if e.is_eof() => Ok(None),
            Some(Err(e)) => {
                tracing::warn!(error = %e, bytes = buf.len(), "discarding malformed envelope");
                buf.clear();
                Err(ProtocolError::decode(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Catalog, bind};

    fn self_data() -> BoundCall {
        let api = Catalog::builtin().get(17).unwrap();
        bind(api, Vec::<(String, i64)>::new()).unwrap()
    }

    #[test]
    fn test_line_encode_appends_newline() {
        let bytes = LineCodec.encode(&self_data()).unwrap();
        assert_eq!(bytes, b"LoGetSelfData()\n");
    }

    #[test]
    fn test_line_decode_waits_for_blank_line() {
        let mut buf = FrameBuffer::from(b"1:\n    Name: Player\n".to_vec());
        assert_eq!(LineCodec.decode(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), 20, "incomplete data stays buffered");

        buf.extend(b"\n2:\n");
        let reply = LineCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(reply.body, "1:\n    Name: Player\n");
        assert_eq!(buf.as_bytes(), b"2:\n");
    }

    #[test]
    fn test_line_decode_resumes_after_scanned_lines() {
        let mut buf = FrameBuffer::from(b"1:\n  A: 1\n  B:".to_vec());
        assert_eq!(LineCodec.decode(&mut buf).unwrap(), None);
        assert_eq!(buf.scanned, 10, "stops at the partial line");

        // The partial line is completed; scanning restarts at its start.
        buf.extend(b" 2\n");
        assert_eq!(LineCodec.decode(&mut buf).unwrap(), None);
        assert_eq!(buf.scanned, 17);

        buf.extend(b"\n");
        let reply = LineCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(reply.body, "1:\n  A: 1\n  B: 2\n");
        assert!(buf.is_empty());
        assert_eq!(buf.scanned, 0);
    }

    #[test]
    fn test_line_decode_byte_by_byte() {
        let wire = b"1:\r\n  A: 1\r\n\r\n7\n\n";
        let mut buf = FrameBuffer::new();
        let mut replies = Vec::new();
        for b in wire.chunks(1) {
            buf.extend(b);
            while let Some(reply) = LineCodec.decode(&mut buf).unwrap() {
                replies.push(reply.body);
            }
        }
        assert_eq!(replies, vec!["1:\r\n  A: 1\r\n".to_string(), "7\n".to_string()]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_line_decode_immediate_blank_is_empty_reply() {
        let mut buf = FrameBuffer::from(b"\n".to_vec());
        let reply = LineCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(reply.body, "");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_line_decode_latin1_fallback() {
        let mut buf = FrameBuffer::from(vec![b'N', b':', b' ', 0xE9, b'\n', b'\n']);
        let reply = LineCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(reply.body, "N: \u{e9}\n");
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_json_encode_is_one_line() {
        let bytes = JsonCodec.encode(&self_data()).unwrap();
        assert_eq!(bytes.last(), Some(&b'\n'));
        assert_eq!(bytes.iter().filter(|&&b| b == b'\n').count(), 1);

        let record: TransportRecord = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(record.api_syntax, "LoGetSelfData()");
        assert_eq!(record.id, 17);
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_json_decode_split_objects() {
        let first = r#"{"id":17,"result":"1:\n  Name: Player\n"}"#;
        let second = r#"{"id":10,"error_thrown":true,"error_message":"no such object"}"#;
        let wire = format!("{first}\n{second}\n");
        let (a, b) = wire.as_bytes().split_at(10);

        let mut buf = FrameBuffer::from(a.to_vec());
        assert_eq!(JsonCodec.decode(&mut buf).unwrap(), None);
        buf.extend(b);

        let reply = JsonCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(reply.api_id, Some(17));
        assert_eq!(reply.body, "1:\n  Name: Player\n");
        assert_eq!(reply.server_error, None);

        let reply = JsonCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(reply.api_id, Some(10));
        assert_eq!(reply.server_error.as_deref(), Some("no such object"));

        assert_eq!(JsonCodec.decode(&mut buf).unwrap(), None);
        assert!(buf.is_empty());
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_json_decode_garbage_discards_buffer() {
        let mut buf = FrameBuffer::from(b"{\"id\": nope}\n".to_vec());
        let err = JsonCodec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
        assert!(buf.is_empty());
    }
}
