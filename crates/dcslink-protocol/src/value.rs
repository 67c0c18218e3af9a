//! Typed values: call arguments and parsed entity records.
//!
//! The same [`Scalar`] type is used in both directions. Outbound, it is an
//! argument bound to a call parameter. Inbound, it is a leaf of a parsed
//! [`Record`] tree.
//!
//! ```text
//! Value ─┬─ Scalar ─┬─ Int(i64)
//!        │          ├─ Float(f64)
//!        │          └─ Text(String)
//!        ├─ Nested(Record)      ordered field → Value mapping
//!        └─ List(Vec<Value>)    block whose keys were 1, 2, 3, ...
//! ```

use std::collections::HashMap;
use std::fmt;

use serde::ser::{Serialize, SerializeMap, Serializer};

// ---------------------------------------------------------------------------
// Scalar
// ---------------------------------------------------------------------------

/// A single number or piece of text.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum Scalar {
    /// A whole number.
    Int(i64),
    /// A number with a fractional part (or too large for `i64`).
    Float(f64),
    /// Anything that is not an unambiguous number.
    Text(String),
}

impl Scalar {
    /// Classifies raw text the way the parser does for unquoted values.
    ///
    /// Pure digits with an optional sign and at most one decimal point
    /// become numbers. Everything else stays text.
    pub fn coerce(raw: &str) -> Self {
        if !looks_numeric(raw) {
            return Self::Text(raw.to_string());
        }
        if !raw.contains('.') {
            if let Ok(n) = raw.parse::<i64>() {
                return Self::Int(n);
            }
        }
        match raw.parse::<f64>() {
            Ok(f) => Self::Float(f),
            Err(_) => Self::Text(raw.to_string()),
        }
    }

    /// Returns the value as `f64` if it is numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Float(f) => Some(*f),
            Self::Text(_) => None,
        }
    }

    /// Returns the value as `i64` if it is a whole number.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the text if this is a text scalar.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Short name of the variant, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
        }
    }
}

/// Renders numbers in Rust's locale-independent decimal form and text
/// verbatim (unquoted).
impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Scalar {
    fn from(n: i32) -> Self {
        Self::Int(n.into())
    }
}

impl From<u32> for Scalar {
    fn from(n: u32) -> Self {
        Self::Int(n.into())
    }
}

impl From<f64> for Scalar {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// `[+-]?` followed by digits with at most one `.`, and at least one digit.
fn looks_numeric(raw: &str) -> bool {
    let body = raw.strip_prefix(['+', '-']).unwrap_or(raw);
    let mut digits = 0;
    let mut dots = 0;
    for c in body.chars() {
        match c {
            '0'..='9' => digits += 1,
            '.' => dots += 1,
            _ => return false,
        }
    }
    digits > 0 && dots <= 1
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// One node of a parsed entity tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A leaf.
    Scalar(Scalar),
    /// A block of named fields.
    Nested(Record),
    /// A block whose keys were the sequence `1..=n`.
    List(Vec<Value>),
}

impl Value {
    /// Returns the scalar, if this is a leaf.
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the nested record, if this is a block of named fields.
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Nested(r) => Some(r),
            _ => None,
        }
    }

    /// Returns the items, if this is a list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Shorthand for a numeric leaf.
    pub fn as_f64(&self) -> Option<f64> {
        self.as_scalar().and_then(Scalar::as_f64)
    }

    /// Shorthand for a whole-number leaf.
    pub fn as_i64(&self) -> Option<i64> {
        self.as_scalar().and_then(Scalar::as_i64)
    }

    /// Shorthand for a text leaf.
    pub fn as_str(&self) -> Option<&str> {
        self.as_scalar().and_then(Scalar::as_str)
    }
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Self {
        Self::Scalar(s)
    }
}

impl From<Record> for Value {
    fn from(r: Record) -> Self {
        Self::Nested(r)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Scalar(s) => s.serialize(serializer),
            Self::Nested(r) => r.serialize(serializer),
            Self::List(items) => items.serialize(serializer),
        }
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// An ordered mapping from field name to [`Value`].
///
/// Field order is the order fields first appeared in the payload. Writing
/// a field that already exists replaces its value in place.
#[derive(Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
    /// Position of each key in `fields`.
    index: HashMap<String, usize>,
}

/// An entity record is the top-level record of one simulated object.
pub type EntityRecord = Record;

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`, keeping the original position of an
    /// existing key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.index.get(&key) {
            Some(&at) => self.fields[at].1 = value,
            None => {
                self.index.insert(key.clone(), self.fields.len());
                self.fields.push((key, value));
            }
        }
    }

    /// Looks up a direct field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.index.get(key).map(|&at| &self.fields[at].1)
    }

    /// Follows a chain of nested field names, e.g.
    /// `record.get_path(&["LatLongAlt", "Lat"])`.
    pub fn get_path(&self, path: &[&str]) -> Option<&Value> {
        let (last, parents) = path.split_last()?;
        let mut record = self;
        for key in parents {
            record = record.get(key)?.as_record()?;
        }
        record.get(last)
    }

    /// The entity's `id` field, if present.
    pub fn id(&self) -> Option<&Scalar> {
        self.get("id").and_then(Value::as_scalar)
    }

    /// Iterates over `(field, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterates over field names in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub(crate) fn into_fields(self) -> Vec<(String, Value)> {
        self.fields
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}
