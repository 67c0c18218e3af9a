//! Bound calls: a catalog descriptor plus concrete argument values.
//!
//! Binding validates arguments against the descriptor. Rendering turns the
//! bound call into the exact call expression the export script evaluates,
//! e.g. `LoGetObjectById(16788480)`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{ApiDescriptor, ParamKind, ProtocolError, Scalar};

// ---------------------------------------------------------------------------
// Acknowledgment policy
// ---------------------------------------------------------------------------

/// Which calls the server answers, and therefore which calls must hold the
/// command queue until a reply arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckPolicy {
    /// Every call gets a reply, including calls that return no data.
    /// This is how the DCS export script behaves.
    #[default]
    EveryCall,
    /// Only calls with `returns_data = true` get a reply. Other calls are
    /// written and forgotten.
    DataCallsOnly,
}

impl AckPolicy {
    /// Whether a call to `api` waits for a reply under this policy.
    pub fn expects_ack(self, api: &ApiDescriptor) -> bool {
        match self {
            Self::EveryCall => true,
            Self::DataCallsOnly => api.returns_data,
        }
    }
}

// ---------------------------------------------------------------------------
// BoundCall
// ---------------------------------------------------------------------------

/// A validated call, ready to be serialized.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundCall {
    api: ApiDescriptor,
    args: BTreeMap<String, Scalar>,
    expects_ack: bool,
}

/// Binds `args` to `api` under the default [`AckPolicy`].
///
/// # Errors
/// - [`ProtocolError::InvalidParameter`] for a name `api` does not declare.
/// - [`ProtocolError::TypeMismatch`] for a value of the wrong kind.
/// - [`ProtocolError::MissingParameter`] for an absent required parameter.
pub fn bind<I, K, V>(api: &ApiDescriptor, args: I) -> Result<BoundCall, ProtocolError>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Scalar>,
{
    BoundCall::bind(api, args, AckPolicy::default())
}

impl BoundCall {
    /// Binds `args` to `api`, deciding acknowledgment with `policy`.
    ///
    /// See [`bind`] for the error cases.
    pub fn bind<I, K, V>(
        api: &ApiDescriptor,
        args: I,
        policy: AckPolicy,
    ) -> Result<Self, ProtocolError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Scalar>,
    {
        let mut bound = BTreeMap::new();
        for (name, value) in args {
            let name = name.into();
            let value = value.into();
            let Some(spec) = api.parameter(&name) else {
                return Err(ProtocolError::InvalidParameter {
                    api_id: api.id,
                    name,
                });
            };
            let kind_ok = match spec.kind {
                ParamKind::Number => {
                    matches!(value, Scalar::Int(_) | Scalar::Float(_))
                }
                ParamKind::String => matches!(value, Scalar::Text(_)),
            };
            if !kind_ok {
                return Err(ProtocolError::TypeMismatch {
                    api_id: api.id,
                    name,
                    expected: spec.kind,
                    found: value.kind_name(),
                });
            }
            bound.insert(name, value);
        }

        if let Some(missing) = api
            .parameters
            .iter()
            .find(|p| !p.optional && !bound.contains_key(&p.name))
        {
            return Err(ProtocolError::MissingParameter {
                api_id: api.id,
                name: missing.name.clone(),
            });
        }

        Ok(Self {
            api: api.clone(),
            args: bound,
            expects_ack: policy.expects_ack(api),
        })
    }

    /// The descriptor this call was bound to.
    pub fn api(&self) -> &ApiDescriptor {
        &self.api
    }

    /// The API id.
    pub fn api_id(&self) -> u32 {
        self.api.id
    }

    /// The bound value of a parameter, if supplied.
    pub fn arg(&self, name: &str) -> Option<&Scalar> {
        self.args.get(name)
    }

    /// Whether this call holds the command queue until a reply arrives.
    /// Fixed at bind time.
    pub fn expects_acknowledgment(&self) -> bool {
        self.expects_ack
    }

    /// Renders the call expression (without the line terminator).
    ///
    /// Arguments are substituted positionally: inside each parenthesised
    /// argument list, an argument equal to the next declared parameter
    /// name is replaced by its value, or dropped if it is an absent
    /// optional parameter.
    ///
    /// # Errors
    /// [`ProtocolError::Serialization`] if a number is not finite, a string
    /// contains a line break or NUL, the template's parentheses are
    /// unbalanced, or the template never mentions a declared parameter.
    pub fn render(&self) -> Result<String, ProtocolError> {
        let template = self.api.syntax.as_str();
        let params = &self.api.parameters;
        let mut next = 0;
        let mut out = String::with_capacity(template.len() + 16);
        let mut rest = template;

        while let Some(open) = rest.find('(') {
            out.push_str(&rest[..open]);
            let close = matching_paren(&rest[open..]).ok_or_else(|| {
                ProtocolError::Serialization(format!(
                    "unbalanced parentheses in `{template}`"
                ))
            })? + open;
            let inner = &rest[open + 1..close];

            let mut rendered = Vec::new();
            if !inner.trim().is_empty() {
                for piece in split_top_level(inner) {
                    let piece = piece.trim();
                    match params.get(next) {
                        Some(spec) if spec.name == piece => {
                            next += 1;
                            if let Some(value) = self.args.get(&spec.name) {
                                rendered.push(render_scalar(value)?);
                            }
                        }
                        _ => rendered.push(piece.to_string()),
                    }
                }
            }
            out.push('(');
            out.push_str(&rendered.join(", "));
            out.push(')');
            rest = &rest[close + 1..];
        }
        if rest.contains(')') {
            return Err(ProtocolError::Serialization(format!(
                "unbalanced parentheses in `{template}`"
            )));
        }
        out.push_str(rest);

        if let Some(unused) = params.get(next) {
            return Err(ProtocolError::Serialization(format!(
                "template `{template}` never mentions parameter `{}`",
                unused.name
            )));
        }
        Ok(out)
    }

    /// The canonical structured form of this call, used for debugging and
    /// as the JSON envelope sent by [`JsonCodec`](crate::JsonCodec).
    pub fn to_transport_record(&self) -> TransportRecord {
        TransportRecord {
            id: self.api.id,
            returns_data: self.api.returns_data,
            api_syntax: self.api.syntax.clone(),
            parameter_count: self.api.parameter_count,
            parameter_defs: self
                .api
                .parameters
                .iter()
                .map(|p| TransportParameter {
                    id: p.id,
                    name: p.name.clone(),
                    value: self
                        .args
                        .get(&p.name)
                        .map(ToString::to_string)
                        .unwrap_or_default(),
                    kind: p.kind.code(),
                })
                .collect(),
            error_thrown: false,
            error_message: String::new(),
            result: String::new(),
            result_type: self.api.result_kind.clone(),
        }
    }
}

/// Byte offset of the `)` matching the `(` at the start of `s`.
fn matching_paren(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Splits an argument list on commas that are not inside nested parens.
fn split_top_level(s: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                pieces.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    pieces.push(&s[start..]);
    pieces
}

fn render_scalar(value: &Scalar) -> Result<String, ProtocolError> {
    match value {
        Scalar::Int(n) => Ok(n.to_string()),
        Scalar::Float(x) if x.is_finite() => Ok(x.to_string()),
        Scalar::Float(x) => Err(ProtocolError::Serialization(format!(
            "number {x} has no decimal form"
        ))),
        Scalar::Text(s) => quote(s),
    }
}

fn quote(s: &str) -> Result<String, ProtocolError> {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' | '\r' | '\0' => {
                return Err(ProtocolError::Serialization(format!(
                    "string argument contains {c:?}"
                )));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    Ok(out)
}

// ---------------------------------------------------------------------------
// TransportRecord
// ---------------------------------------------------------------------------

/// The structured form of a call, and of the export script's reply.
///
/// Every field defaults when missing so partially filled replies still
/// decode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportRecord {
    pub id: u32,
    pub returns_data: bool,
    pub api_syntax: String,
    pub parameter_count: usize,
    pub parameter_defs: Vec<TransportParameter>,
    pub error_thrown: bool,
    pub error_message: String,
    /// Nested-text dump produced by the call (replies only).
    pub result: String,
    pub result_type: String,
}

/// One parameter inside a [`TransportRecord`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportParameter {
    pub id: u32,
    pub name: String,
    /// The argument rendered as plain text; empty when absent.
    pub value: String,
    /// `0` for numbers, `1` for strings.
    #[serde(rename = "type")]
    pub kind: u8,
}
