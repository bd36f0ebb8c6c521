#![forbid(unsafe_code)]

//! Type-tagging encoder for the store's typed JSON dialect.
//!
//! Scalars travel as `(code,text)` literals where `code` is one of
//! `i`, `l`, `f`, `d`, `s`, `b`; composites nest as `(list,(...))` and
//! `(map,(key=...,...))`. Plain strings are left untagged.
//!
//! Encoding never fails on data: a value that cannot be represented at its
//! declared type is widened (`integer` to `long` to `double`, `float` to
//! `double`) or written as a plain string, and a [`Degradation`] is
//! reported instead.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue};
use thiserror::Error;
use tracing::warn;

use crate::model::RESERVED_KEYS;
use crate::value::Value;

/// Classification of untyped strings.
pub mod classify;

/// Declared types and type maps.
pub mod declaration;

/// Parser for tagged literals.
pub mod decode;

pub use classify::{classify, Classified};
pub use declaration::{ListDeclaration, ScalarType, TypeDeclaration, TypeMap};
pub use decode::{decode_field_map, decode_literal};

/// Errors raised while parsing declarations or decoding literals.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// A declaration named a type the store does not know.
    #[error("unknown type '{name}' declared for '{path}'")]
    UnknownType {
        /// Field path of the declaration.
        path: String,
        /// Offending type name.
        name: String,
    },
    /// A declaration had an unusable shape.
    #[error("invalid type declaration for '{path}': {reason}")]
    InvalidDeclaration {
        /// Field path of the declaration.
        path: String,
        /// What was wrong with it.
        reason: String,
    },
    /// Two anchors of one list declaration start at the same index.
    #[error("list declaration for '{path}' has two anchors at index {index}")]
    DuplicateAnchor {
        /// Field path of the declaration.
        path: String,
        /// Repeated start index.
        index: usize,
    },
    /// Field map mode was asked to encode something other than a map.
    #[error("field map encoding requires a map, found {found}")]
    FieldMapRequiresMap {
        /// Kind of the supplied value.
        found: &'static str,
    },
    /// A tagged literal could not be parsed back.
    #[error("malformed literal at byte {offset}: {reason}")]
    MalformedLiteral {
        /// Byte offset of the failure.
        offset: usize,
        /// What the parser expected.
        reason: String,
    },
}

impl EncodeError {
    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            EncodeError::UnknownType { .. } => "UnknownType",
            EncodeError::InvalidDeclaration { .. } => "InvalidDeclaration",
            EncodeError::DuplicateAnchor { .. } => "DuplicateAnchor",
            EncodeError::FieldMapRequiresMap { .. } => "FieldMapRequiresMap",
            EncodeError::MalformedLiteral { .. } => "MalformedLiteral",
        }
    }
}

/// Result alias for encoder operations.
pub type Result<T> = std::result::Result<T, EncodeError>;

/// Output shape selected by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeMode {
    /// Field name to tagged literal object, used for request bodies.
    FieldMap,
    /// One literal string, used when nesting inside another literal.
    EmbeddedLiteral,
}

/// Encoded form produced by [`encode`].
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    /// Output of [`EncodeMode::FieldMap`].
    Fields(JsonMap<String, JsonValue>),
    /// Output of [`EncodeMode::EmbeddedLiteral`].
    Literal(String),
}

/// A value written at a less precise type than declared or inferred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Degradation {
    /// Dotted field path, with `[n]` for list elements.
    pub path: String,
    /// Declared type name.
    pub declared: &'static str,
    /// Encoding actually used: a short code, `list`, `map`, or `string`
    /// for an untagged string.
    pub encoded_as: &'static str,
}

/// Encoder output together with the degradations it had to apply.
#[derive(Debug, Clone, PartialEq)]
pub struct Encoded<T> {
    /// Encoded value.
    pub value: T,
    /// Degradations in encounter order.
    pub degradations: Vec<Degradation>,
}

/// First-occurrence degradation report shared by every encode that uses the
/// same type map. Later mismatches on an already reported field are ignored.
#[derive(Debug, Clone, Default)]
pub struct DegradationLog {
    entries: Vec<Degradation>,
    seen: HashSet<String>,
}

impl DegradationLog {
    /// Records `degradation` unless its field path was already reported.
    /// Returns whether it was recorded.
    pub fn record(&mut self, degradation: Degradation) -> bool {
        if !self.seen.insert(degradation.path.clone()) {
            return false;
        }
        self.entries.push(degradation);
        true
    }

    /// Records every entry of `degradations`.
    pub fn extend(&mut self, degradations: impl IntoIterator<Item = Degradation>) {
        for degradation in degradations {
            self.record(degradation);
        }
    }

    /// Reported degradations in first-seen order.
    pub fn entries(&self) -> &[Degradation] {
        &self.entries
    }

    /// Whether nothing has been reported.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Encodes `value` under an optional declaration in the requested mode.
///
/// # Errors
///
/// [`EncodeMode::FieldMap`] requires a map value and, when a declaration is
/// given, a map declaration.
pub fn encode(
    value: &Value,
    declaration: Option<&TypeDeclaration>,
    mode: EncodeMode,
) -> Result<Encoded<WireValue>> {
    match mode {
        EncodeMode::FieldMap => {
            let fields = value.as_map().ok_or(EncodeError::FieldMapRequiresMap {
                found: value.kind_name(),
            })?;
            let types = match declaration {
                None => None,
                Some(TypeDeclaration::Map(types)) => Some(types),
                Some(other) => {
                    return Err(EncodeError::InvalidDeclaration {
                        path: String::new(),
                        reason: format!("field map needs a map declaration, found {}", other.name()),
                    })
                }
            };
            let encoded = encode_fields(fields, types);
            Ok(Encoded {
                value: WireValue::Fields(encoded.value),
                degradations: encoded.degradations,
            })
        }
        EncodeMode::EmbeddedLiteral => {
            let encoded = encode_literal(value, declaration);
            Ok(Encoded {
                value: WireValue::Literal(encoded.value),
                degradations: encoded.degradations,
            })
        }
    }
}

/// Encodes a document's direct properties as a field map.
///
/// Reserved structural keys are copied verbatim.
pub fn encode_fields(
    fields: &BTreeMap<String, Value>,
    types: Option<&TypeMap>,
) -> Encoded<JsonMap<String, JsonValue>> {
    let mut encoder = Encoder::default();
    let mut out = JsonMap::new();
    for (name, value) in fields {
        if RESERVED_KEYS.contains(&name.as_str()) {
            out.insert(name.clone(), value.to_json());
            continue;
        }
        let decl = types.and_then(|types| types.get(name));
        let literal = encoder.encode(value, decl, name.clone());
        out.insert(name.clone(), literal.into_field());
    }
    encoder.finish(out)
}

/// Encodes a single value as an embedded literal.
pub fn encode_literal(value: &Value, declaration: Option<&TypeDeclaration>) -> Encoded<String> {
    let mut encoder = Encoder::default();
    let literal = encoder.encode(value, declaration, String::new());
    let mut text = String::new();
    literal.render(&mut text);
    encoder.finish(text)
}

/// Intermediate tree between a value and its text form.
enum Literal {
    Null,
    Tagged(&'static str, String),
    Plain(String),
    List(Vec<Literal>),
    Map(Vec<(String, Literal)>),
}

impl Literal {
    fn code(&self) -> &'static str {
        match self {
            Literal::Null => "null",
            Literal::Tagged(code, _) => code,
            Literal::Plain(_) => "string",
            Literal::List(_) => "list",
            Literal::Map(_) => "map",
        }
    }

    fn render(&self, out: &mut String) {
        match self {
            Literal::Null => out.push_str("(null,null)"),
            Literal::Tagged(code, text) => {
                out.push('(');
                out.push_str(code);
                out.push(',');
                out.push_str(text);
                out.push(')');
            }
            Literal::Plain(text) => out.push_str(text),
            Literal::List(items) => {
                out.push_str("(list,(");
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        out.push(',');
                    }
                    item.render(out);
                }
                out.push_str("))");
            }
            Literal::Map(entries) => {
                out.push_str("(map,(");
                for (idx, (key, item)) in entries.iter().enumerate() {
                    if idx > 0 {
                        out.push(',');
                    }
                    out.push_str(key);
                    out.push('=');
                    item.render(out);
                }
                out.push_str("))");
            }
        }
    }

    fn into_field(self) -> JsonValue {
        match self {
            Literal::Null => JsonValue::Null,
            Literal::Plain(text) => JsonValue::String(text),
            other => {
                let mut text = String::new();
                other.render(&mut text);
                JsonValue::String(text)
            }
        }
    }
}

/// Numeric view of a value, used for declared numeric coercion.
#[derive(Clone, Copy)]
enum Number {
    Int(i64),
    Real(f64),
}

impl Number {
    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(i) => Some(Number::Int(i64::from(*i))),
            Value::Long(l) => Some(Number::Int(*l)),
            Value::Float(f) => Some(Number::Real(f64::from(*f))),
            Value::Double(d) => Some(Number::Real(*d)),
            Value::String(s) => match classify(s) {
                Classified::Long(l) => Some(Number::Int(l)),
                Classified::Double(d) => Some(Number::Real(d)),
                _ => None,
            },
            _ => None,
        }
    }

    /// Integral value, if the number has no fractional part and fits i64.
    fn integral(self) -> Option<i64> {
        match self {
            Number::Int(i) => Some(i),
            // -2^63 is exact in f64; 2^63 is the first value out of range
            Number::Real(f) if f.fract() == 0.0 && f >= -9.223_372_036_854_775_808e18 && f < 9.223_372_036_854_775_808e18 => {
                Some(f as i64)
            }
            Number::Real(_) => None,
        }
    }
}

#[derive(Default)]
struct Encoder {
    degradations: Vec<Degradation>,
}

impl Encoder {
    fn finish<T>(self, value: T) -> Encoded<T> {
        Encoded {
            value,
            degradations: self.degradations,
        }
    }

    fn degrade(&mut self, path: &str, declared: &'static str, literal: &Literal) {
        warn!(
            field = path,
            declared,
            encoded_as = literal.code(),
            "value does not fit declared type"
        );
        self.degradations.push(Degradation {
            path: path.to_owned(),
            declared,
            encoded_as: literal.code(),
        });
    }

    fn encode(&mut self, value: &Value, decl: Option<&TypeDeclaration>, path: String) -> Literal {
        if matches!(value, Value::Null) {
            return Literal::Null;
        }
        match decl {
            None => self.infer(value, &path),
            Some(TypeDeclaration::Scalar(ty)) => self.scalar(value, *ty, &path),
            Some(TypeDeclaration::List(list)) => match value {
                Value::List(items) => self.list(items, Some(list), &path),
                other => {
                    let literal = self.infer(other, &path);
                    self.degrade(&path, "list", &literal);
                    literal
                }
            },
            Some(TypeDeclaration::Map(types)) => match value {
                Value::Map(entries) => self.map(entries, Some(types), &path),
                other => {
                    let literal = self.infer(other, &path);
                    self.degrade(&path, "map", &literal);
                    literal
                }
            },
        }
    }

    fn infer(&mut self, value: &Value, path: &str) -> Literal {
        match value {
            Value::Null => Literal::Null,
            Value::Boolean(b) => Literal::Tagged("b", b.to_string()),
            Value::Integer(i) => Literal::Tagged("i", i.to_string()),
            Value::Long(l) => Literal::Tagged("l", l.to_string()),
            Value::Float(f) if f.is_finite() => Literal::Tagged("f", f.to_string()),
            Value::Double(d) if d.is_finite() => Literal::Tagged("d", d.to_string()),
            Value::Float(f) => Literal::Plain(f.to_string()),
            Value::Double(d) => Literal::Plain(d.to_string()),
            Value::String(s) => match classify(s) {
                Classified::Boolean(b) => Literal::Tagged("b", b.to_string()),
                Classified::Long(l) => Literal::Tagged("l", l.to_string()),
                Classified::Double(d) => Literal::Tagged("d", d.to_string()),
                Classified::Text => Literal::Plain(s.clone()),
            },
            Value::List(items) => self.list(items, None, path),
            Value::Map(entries) => self.map(entries, None, path),
        }
    }

    fn list(&mut self, items: &[Value], decl: Option<&ListDeclaration>, path: &str) -> Literal {
        let encoded = items
            .iter()
            .enumerate()
            .map(|(idx, item)| {
                let elem_decl = decl.and_then(|list| list.for_index(idx));
                self.encode(item, elem_decl, format!("{path}[{idx}]"))
            })
            .collect();
        Literal::List(encoded)
    }

    fn map(&mut self, entries: &BTreeMap<String, Value>, types: Option<&TypeMap>, path: &str) -> Literal {
        let encoded = entries
            .iter()
            .map(|(key, item)| {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                let child_decl = types.and_then(|types| types.get(key));
                (key.clone(), self.encode(item, child_decl, child_path))
            })
            .collect();
        Literal::Map(encoded)
    }

    fn scalar(&mut self, value: &Value, ty: ScalarType, path: &str) -> Literal {
        let (literal, exact) = match ty {
            ScalarType::String => match value {
                Value::List(_) | Value::Map(_) => (self.infer(value, path), false),
                other => (Literal::Tagged("s", scalar_text(other)), true),
            },
            ScalarType::Boolean => match value {
                Value::Boolean(b) => (Literal::Tagged("b", b.to_string()), true),
                Value::String(s) => match classify(s) {
                    Classified::Boolean(b) => (Literal::Tagged("b", b.to_string()), true),
                    _ => (Literal::Plain(s.clone()), false),
                },
                Value::List(_) | Value::Map(_) => (self.infer(value, path), false),
                other => (Literal::Plain(scalar_text(other)), false),
            },
            ScalarType::Float if matches!(value, Value::Float(f) if f.is_finite()) => {
                (Literal::Tagged("f", scalar_text(value)), true)
            }
            numeric => match Number::of(value) {
                Some(number) => coerce_number(number, numeric),
                None => match value {
                    Value::List(_) | Value::Map(_) => (self.infer(value, path), false),
                    other => (Literal::Plain(scalar_text(other)), false),
                },
            },
        };
        if !exact {
            self.degrade(path, ty.name(), &literal);
        }
        literal
    }
}

/// Coerces a number to a numeric scalar type, widening when it does not
/// fit. The flag tells whether the declared type was honored.
fn coerce_number(number: Number, ty: ScalarType) -> (Literal, bool) {
    match ty {
        ScalarType::Integer => match number.integral() {
            Some(i) if i32::try_from(i).is_ok() => (Literal::Tagged("i", i.to_string()), true),
            Some(i) => (Literal::Tagged("l", i.to_string()), false),
            None => (double_or_text(number), false),
        },
        ScalarType::Long => match number.integral() {
            Some(i) => (Literal::Tagged("l", i.to_string()), true),
            None => (double_or_text(number), false),
        },
        ScalarType::Float => match number {
            Number::Int(i) => {
                let narrowed = i as f32;
                if narrowed as i128 == i128::from(i) {
                    (Literal::Tagged("f", i.to_string()), true)
                } else {
                    (double_or_text(number), false)
                }
            }
            Number::Real(f) => {
                let text = (f as f32).to_string();
                if f.is_finite() && text.parse::<f64>() == Ok(f) {
                    (Literal::Tagged("f", text), true)
                } else {
                    (double_or_text(number), false)
                }
            }
        },
        ScalarType::Double => match number {
            Number::Int(i) if exact_in_double(i) => (Literal::Tagged("d", i.to_string()), true),
            Number::Real(f) if f.is_finite() => (Literal::Tagged("d", f.to_string()), true),
            other => (double_or_text(other), false),
        },
        // handled by the caller
        ScalarType::String | ScalarType::Boolean => (Literal::Plain(number_text(number)), false),
    }
}

/// Integers up to 2^53 in magnitude survive a round trip through f64.
fn exact_in_double(i: i64) -> bool {
    i.unsigned_abs() <= 1 << 53
}

fn double_or_text(number: Number) -> Literal {
    match number {
        Number::Int(i) if exact_in_double(i) => Literal::Tagged("d", i.to_string()),
        Number::Real(f) if f.is_finite() => Literal::Tagged("d", f.to_string()),
        other => Literal::Plain(number_text(other)),
    }
}

fn number_text(number: Number) -> String {
    match number {
        Number::Int(i) => i.to_string(),
        Number::Real(f) => f.to_string(),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => "null".to_owned(),
        Value::Boolean(b) => b.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Long(l) => l.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Double(d) => d.to_string(),
        Value::String(s) => s.clone(),
        Value::List(_) | Value::Map(_) => String::new(),
    }
}
