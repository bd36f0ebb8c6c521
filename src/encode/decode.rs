//! Parses tagged literals back into [`Value`]s.
//!
//! Plain text inside a composite runs up to the next `,` or `)`, which is
//! the same limitation the server's own parser has. Untagged strings holding
//! `,`, `)` or `=` therefore do not survive embedded literal encoding: they
//! split into several elements or make the literal unreadable.

use std::collections::BTreeMap;

use serde_json::{Map as JsonMap, Value as JsonValue};

use super::{EncodeError, Result};
use crate::model::RESERVED_KEYS;
use crate::value::Value;

/// Deepest composite nesting accepted, matching serde_json's recursion limit.
pub const MAX_DEPTH: usize = 128;

/// Decodes one literal, such as `(l,5)` or `(map,(a=(b,true)))`.
///
/// Text that does not start with `(` is an untagged string.
///
/// # Errors
///
/// Returns [`EncodeError::MalformedLiteral`] for unknown tags, bad scalar
/// payloads, unbalanced parentheses and nesting deeper than [`MAX_DEPTH`].
pub fn decode_literal(input: &str) -> Result<Value> {
    if !input.starts_with('(') {
        return Ok(Value::String(input.to_owned()));
    }
    let mut parser = Parser {
        input,
        pos: 0,
        depth: 0,
    };
    let value = parser.tagged()?;
    if parser.pos != input.len() {
        return Err(parser.error("trailing characters after literal"));
    }
    Ok(value)
}

/// Decodes a field map produced by field map encoding.
///
/// Reserved keys and non-string JSON are taken verbatim; strings that fail
/// to parse as literals are kept as plain strings.
pub fn decode_field_map(fields: &JsonMap<String, JsonValue>) -> BTreeMap<String, Value> {
    fields
        .iter()
        .map(|(name, raw)| {
            let value = match raw {
                JsonValue::String(text) if !RESERVED_KEYS.contains(&name.as_str()) => {
                    decode_literal(text).unwrap_or_else(|_| Value::String(text.clone()))
                }
                other => Value::from(other.clone()),
            };
            (name.clone(), value)
        })
        .collect()
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, reason: impl Into<String>) -> EncodeError {
        EncodeError::MalformedLiteral {
            offset: self.pos,
            reason: reason.into(),
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn expect(&mut self, token: &str) -> Result<()> {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            Ok(())
        } else {
            Err(self.error(format!("expected '{token}'")))
        }
    }

    /// Reads up to, not including, the first byte in `stops`.
    fn take_until(&mut self, stops: &[char]) -> &'a str {
        let rest = self.rest();
        let end = rest.find(stops).unwrap_or(rest.len());
        self.pos += end;
        &rest[..end]
    }

    fn value(&mut self) -> Result<Value> {
        if self.rest().starts_with('(') {
            self.tagged()
        } else {
            Ok(Value::String(self.take_until(&[',', ')']).to_owned()))
        }
    }

    fn tagged(&mut self) -> Result<Value> {
        if self.depth == MAX_DEPTH {
            return Err(self.error(format!("nesting deeper than {MAX_DEPTH}")));
        }
        self.depth += 1;
        let value = self.tagged_body();
        self.depth -= 1;
        value
    }

    fn tagged_body(&mut self) -> Result<Value> {
        self.expect("(")?;
        let tag = self.take_until(&[',']);
        self.expect(",")?;
        match tag {
            "list" => {
                self.expect("(")?;
                let mut items = Vec::new();
                if !self.rest().starts_with(')') {
                    loop {
                        items.push(self.value()?);
                        if self.rest().starts_with(',') {
                            self.pos += 1;
                        } else {
                            break;
                        }
                    }
                }
                self.expect("))")?;
                Ok(Value::List(items))
            }
            "map" => {
                self.expect("(")?;
                let mut entries = BTreeMap::new();
                if !self.rest().starts_with(')') {
                    loop {
                        let key = self.take_until(&['=', ',', ')']).to_owned();
                        self.expect("=")?;
                        entries.insert(key, self.value()?);
                        if self.rest().starts_with(',') {
                            self.pos += 1;
                        } else {
                            break;
                        }
                    }
                }
                self.expect("))")?;
                Ok(Value::Map(entries))
            }
            "null" => {
                self.expect("null)")?;
                Ok(Value::Null)
            }
            scalar => {
                let payload_start = self.pos;
                let payload = self.take_until(&[')']);
                self.expect(")")?;
                scalar_value(scalar, payload).ok_or_else(|| EncodeError::MalformedLiteral {
                    offset: payload_start,
                    reason: format!("cannot read '{payload}' as tag '{scalar}'"),
                })
            }
        }
    }
}

fn scalar_value(tag: &str, payload: &str) -> Option<Value> {
    let value = match tag {
        "i" => Value::Integer(payload.parse().ok()?),
        "l" => Value::Long(payload.parse().ok()?),
        "f" => Value::Float(payload.parse().ok()?),
        "d" => Value::Double(payload.parse().ok()?),
        "s" => Value::String(payload.to_owned()),
        "b" if payload.eq_ignore_ascii_case("true") => Value::Boolean(true),
        "b" if payload.eq_ignore_ascii_case("false") => Value::Boolean(false),
        _ => return None,
    };
    Some(value)
}
