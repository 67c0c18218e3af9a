//! Parser for the indentation-based nested-text dumps the export script
//! sends back.
//!
//! ```text
//! 16788480:                 <- entity header, key becomes `id`
//!     Name: F-16C_50        <- field
//!     LatLongAlt:           <- nested block
//!         Lat: 41.6
//!         Long: 41.6
//!     Flags:
//!         1: Born           <- keys 1..=n turn the block into a list
//!         2: AI_ON
//! ```
//!
//! Single-object calls (`LoGetSelfData()`, `LoGetObjectById()`) reply
//! without the header line; their top level is the object's own fields.
//!
//! The parser keeps an explicit stack of open blocks, so hostile input can
//! not overflow the call stack. Nesting past [`MAX_DEPTH`] is rejected.

use crate::{ParseError, Record, Scalar, Value};

/// Deepest nesting accepted, counting the entity header as level one.
pub const MAX_DEPTH: usize = 512;

/// Parses one response payload into entity records.
///
/// - An empty (or all-blank) payload yields no records.
/// - A single line without any `:` is a bare value and yields one record
///   `{ value: <scalar> }`.
/// - If any top-level line is a `key: value` field, the payload is a single
///   header-less object and yields exactly one record, with no `id` added.
/// - Otherwise every top-level line is an entity header `key:`, and each
///   entity's record starts with an `id` field holding its key.
///
/// # Errors
/// Returns the first [`ParseError`] found; no partial result is produced.
pub fn parse(payload: &str) -> Result<Vec<Record>, ParseError> {
    let lines: Vec<Line<'_>> = payload
        .split('\n')
        .enumerate()
        .filter_map(|(i, raw)| Line::new(i + 1, raw))
        .collect();

    let Some(first) = lines.first() else {
        return Ok(Vec::new());
    };
    if lines.len() == 1 && !first.text.contains(':') {
        let mut record = Record::new();
        record.insert("value", value_of(first.text, first.number)?);
        return Ok(vec![record]);
    }

    let base = first.indent;
    let mut stack: Vec<Frame> = Vec::new();
    let mut entities = Vec::new();

    let headerless = lines.iter().any(|line| {
        line.indent == base && matches!(Shape::of(line.text), Shape::Field(..))
    });
    if headerless {
        stack.push(Frame::root(base));
    }

    for (idx, line) in lines.iter().enumerate() {
        let is_last = idx + 1 == lines.len();

        while stack.last().is_some_and(|top| top.closes_at(line.indent)) {
            close_top(&mut stack, &mut entities);
        }

        let shape = Shape::of(line.text);

        let Some(top) = stack.last_mut() else {
            if line.indent < base {
                return Err(ParseError::InconsistentIndent { line: line.number });
            }
            if line.indent > base {
                return Err(ParseError::UnexpectedIndent { line: line.number });
            }
            let Shape::Opener(key) = shape else {
                return Err(ParseError::ExpectedEntity { line: line.number });
            };
            if is_last {
                return Err(ParseError::UnterminatedBlock {
                    line: line.number,
                    key: key.to_string(),
                });
            }
            let mut record = Record::new();
            record.insert("id", Scalar::coerce(key));
            stack.push(Frame::new(key, line.indent, record));
            continue;
        };

        match top.child_indent {
            None => top.child_indent = Some(line.indent),
            Some(expected) if line.indent > expected => {
                return Err(ParseError::UnexpectedIndent { line: line.number });
            }
            Some(expected) if line.indent < expected => {
                return Err(ParseError::InconsistentIndent { line: line.number });
            }
            Some(_) => {}
        }

        match shape {
            Shape::Field(key, raw) => {
                let value = value_of(raw, line.number)?;
                top.record.insert(key, value);
            }
            Shape::Opener(key) => {
                if is_last {
                    return Err(ParseError::UnterminatedBlock {
                        line: line.number,
                        key: key.to_string(),
                    });
                }
                if stack.len() >= MAX_DEPTH {
                    return Err(ParseError::TooDeep {
                        line: line.number,
                        max: MAX_DEPTH,
                    });
                }
                stack.push(Frame::new(key, line.indent, Record::new()));
            }
            Shape::Bare => {
                return Err(ParseError::MissingSeparator { line: line.number });
            }
        }
    }

    while !stack.is_empty() {
        close_top(&mut stack, &mut entities);
    }

    tracing::trace!(entities = entities.len(), "parsed payload");
    Ok(entities)
}

/// A non-blank line with its indentation split off.
struct Line<'a> {
    number: usize,
    indent: usize,
    text: &'a str,
}

impl<'a> Line<'a> {
    fn new(number: usize, raw: &'a str) -> Option<Self> {
        let trimmed = raw.trim_end();
        let text = trimmed.trim_start_matches([' ', '\t']);
        if text.is_empty() {
            return None;
        }
        Some(Self {
            number,
            indent: trimmed.len() - text.len(),
            text,
        })
    }
}

enum Shape<'a> {
    /// `key:`, or `key: ` with nothing after it.
    Opener(&'a str),
    /// `key: value`
    Field(&'a str, &'a str),
    /// Anything else.
    Bare,
}

impl<'a> Shape<'a> {
    fn of(text: &'a str) -> Self {
        if let Some((key, value)) = text.split_once(": ") {
            if key.is_empty() {
                return Self::Bare;
            }
            let value = value.trim_start();
            return if value.is_empty() {
                Self::Opener(key)
            } else {
                Self::Field(key, value)
            };
        }
        match text.strip_suffix(':') {
            Some(key) if !key.is_empty() => Self::Opener(key),
            _ => Self::Bare,
        }
    }
}

/// An open block.
struct Frame {
    key: String,
    /// `None` for the implicit root of a header-less payload.
    indent: Option<usize>,
    /// Set by the first child; every later child must match it.
    child_indent: Option<usize>,
    record: Record,
}

impl Frame {
    fn new(key: &str, indent: usize, record: Record) -> Self {
        Self {
            key: key.to_string(),
            indent: Some(indent),
            child_indent: None,
            record,
        }
    }

    fn root(base: usize) -> Self {
        Self {
            key: String::new(),
            indent: None,
            child_indent: Some(base),
            record: Record::new(),
        }
    }

    /// A line at `indent` ends this block unless it is nested inside it.
    fn closes_at(&self, indent: usize) -> bool {
        self.indent.is_some_and(|own| indent <= own)
    }
}

/// Pops the innermost block and attaches it to its parent, or to the
/// entity list if it was an entity header.
fn close_top(stack: &mut Vec<Frame>, entities: &mut Vec<Record>) {
    let Some(frame) = stack.pop() else {
        return;
    };
    match stack.last_mut() {
        Some(parent) => parent.record.insert(frame.key, finish_block(frame.record)),
        None => entities.push(frame.record),
    }
}

/// A block whose keys are exactly `1, 2, ..., n` becomes a list.
fn finish_block(record: Record) -> Value {
    let is_sequence = !record.is_empty()
        && record
            .keys()
            .zip(1usize..)
            .all(|(key, n)| key == n.to_string());
    if !is_sequence {
        return Value::Nested(record);
    }
    Value::List(record.into_fields().into_iter().map(|(_, v)| v).collect())
}

/// Turns the text after `": "` into a scalar. Quoted text is unescaped and
/// never coerced to a number.
fn value_of(raw: &str, line: usize) -> Result<Scalar, ParseError> {
    let Some(body) = raw.strip_prefix('"') else {
        return Ok(Scalar::coerce(raw));
    };
    let mut out = String::with_capacity(body.len());
    let mut chars = body.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, esc @ ('"' | '\\'))) => out.push(esc),
                Some((_, other)) => {
                    out.push('\\');
                    out.push(other);
                }
                None => return Err(ParseError::UnterminatedQuote { line }),
            },
            '"' => {
                if !body[i + 1..].is_empty() {
                    return Err(ParseError::TrailingText { line });
                }
                return Ok(Scalar::Text(out));
            }
            c => out.push(c),
        }
    }
    Err(ParseError::UnterminatedQuote { line })
}
