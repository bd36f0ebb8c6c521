//! Declared field types ("type maps") and their JSON form.
//!
//! A type map mirrors the shape of the documents it describes:
//!
//! ```json
//! {
//!   "name": "string",
//!   "age": "i",
//!   "scores": ["double"],
//!   "mixed": [{"0": "string"}, {"5": "long"}],
//!   "address": {"zip": "s", "geo": {"lat": "d"}}
//! }
//! ```
//!
//! Fields without an entry fall back to inference.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value as JsonValue;

use super::{EncodeError, Result};

/// Primitive type the store understands, with its wire short code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    /// 32-bit integer, `i`.
    Integer,
    /// 64-bit integer, `l`.
    Long,
    /// 32-bit float, `f`.
    Float,
    /// 64-bit float, `d`.
    Double,
    /// String, `s`.
    String,
    /// Boolean, `b`.
    Boolean,
}

impl ScalarType {
    /// Short code written into tagged literals.
    pub fn code(self) -> &'static str {
        match self {
            ScalarType::Integer => "i",
            ScalarType::Long => "l",
            ScalarType::Float => "f",
            ScalarType::Double => "d",
            ScalarType::String => "s",
            ScalarType::Boolean => "b",
        }
    }

    /// Long name, used in reports.
    pub fn name(self) -> &'static str {
        match self {
            ScalarType::Integer => "integer",
            ScalarType::Long => "long",
            ScalarType::Float => "float",
            ScalarType::Double => "double",
            ScalarType::String => "string",
            ScalarType::Boolean => "boolean",
        }
    }

    /// Resolves a scalar type name or short code. `date` maps to `long`
    /// since dates travel as epoch milliseconds.
    pub fn from_name(name: &str) -> Option<Self> {
        let ty = match name {
            "integer" | "i" => ScalarType::Integer,
            "long" | "l" | "date" => ScalarType::Long,
            "float" | "f" => ScalarType::Float,
            "double" | "d" => ScalarType::Double,
            "string" | "s" => ScalarType::String,
            "boolean" | "b" => ScalarType::Boolean,
            _ => return None,
        };
        Some(ty)
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Declared type of one field or list element.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDeclaration {
    /// Primitive with a fixed tag.
    Scalar(ScalarType),
    /// List, with per-element declarations.
    List(ListDeclaration),
    /// Map, with per-key declarations.
    Map(TypeMap),
}

impl TypeDeclaration {
    /// Human readable name of the declared type.
    pub fn name(&self) -> &'static str {
        match self {
            TypeDeclaration::Scalar(ty) => ty.name(),
            TypeDeclaration::List(_) => "list",
            TypeDeclaration::Map(_) => "map",
        }
    }

    /// Parses one declaration from its JSON form. `path` only feeds error
    /// messages.
    pub fn from_json(path: &str, raw: &JsonValue) -> Result<Self> {
        match raw {
            JsonValue::String(name) => match name.as_str() {
                "list" | "array" | "a" => Ok(TypeDeclaration::List(ListDeclaration::Untyped)),
                "map" | "object" | "obj" | "o" => Ok(TypeDeclaration::Map(TypeMap::default())),
                other => ScalarType::from_name(other)
                    .map(TypeDeclaration::Scalar)
                    .ok_or_else(|| EncodeError::UnknownType {
                        path: path.to_owned(),
                        name: other.to_owned(),
                    }),
            },
            JsonValue::Array(items) => ListDeclaration::from_json(path, items).map(TypeDeclaration::List),
            JsonValue::Object(_) => TypeMap::from_json_at(path, raw).map(TypeDeclaration::Map),
            other => Err(EncodeError::InvalidDeclaration {
                path: path.to_owned(),
                reason: format!("expected a type name, list or object, found {other}"),
            }),
        }
    }
}

/// Element typing of a declared list.
#[derive(Debug, Clone, PartialEq)]
pub enum ListDeclaration {
    /// Elements are inferred.
    Untyped,
    /// Every element shares one declaration.
    Uniform(Box<TypeDeclaration>),
    /// Declarations anchored at start indexes, sorted ascending. An anchor
    /// covers indexes from its start up to the next anchor's start.
    Anchored(Vec<(usize, TypeDeclaration)>),
}

impl ListDeclaration {
    fn from_json(path: &str, items: &[JsonValue]) -> Result<Self> {
        if items.is_empty() {
            return Ok(ListDeclaration::Untyped);
        }
        if items.iter().all(is_anchor) {
            let mut anchors = Vec::with_capacity(items.len());
            for item in items {
                // is_anchor guarantees exactly one entry with a numeric key
                if let Some((key, decl)) = item.as_object().and_then(|obj| obj.iter().next()) {
                    let start: usize = key.parse().map_err(|_| EncodeError::InvalidDeclaration {
                        path: path.to_owned(),
                        reason: format!("anchor '{key}' is not an index"),
                    })?;
                    let elem_path = format!("{path}[{start}..]");
                    anchors.push((start, TypeDeclaration::from_json(&elem_path, decl)?));
                }
            }
            anchors.sort_by_key(|(start, _)| *start);
            if let Some(pair) = anchors.windows(2).find(|pair| pair[0].0 == pair[1].0) {
                return Err(EncodeError::DuplicateAnchor {
                    path: path.to_owned(),
                    index: pair[0].0,
                });
            }
            return Ok(ListDeclaration::Anchored(anchors));
        }
        if items.len() == 1 {
            let elem_path = format!("{path}[]");
            let inner = TypeDeclaration::from_json(&elem_path, &items[0])?;
            return Ok(ListDeclaration::Uniform(Box::new(inner)));
        }
        Err(EncodeError::InvalidDeclaration {
            path: path.to_owned(),
            reason: "list declarations take one element type or index anchors".into(),
        })
    }

    /// Declaration governing the element at `index`, if any.
    pub fn for_index(&self, index: usize) -> Option<&TypeDeclaration> {
        match self {
            ListDeclaration::Untyped => None,
            ListDeclaration::Uniform(decl) => Some(decl),
            ListDeclaration::Anchored(anchors) => anchors
                .iter()
                .take_while(|(start, _)| *start <= index)
                .last()
                .map(|(_, decl)| decl),
        }
    }
}

fn is_anchor(item: &JsonValue) -> bool {
    match item.as_object() {
        Some(obj) if obj.len() == 1 => obj
            .keys()
            .all(|key| !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit())),
        _ => false,
    }
}

/// Field name to declaration mapping for one level of a document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeMap {
    entries: BTreeMap<String, TypeDeclaration>,
}

impl TypeMap {
    /// Creates an empty type map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a type map from its JSON object form.
    ///
    /// # Errors
    ///
    /// Unknown type names, malformed list declarations and duplicate anchors
    /// are rejected here so encoding itself never fails on declarations.
    pub fn from_json(raw: &JsonValue) -> Result<Self> {
        Self::from_json_at("", raw)
    }

    /// Parses a type map from JSON text.
    pub fn parse(text: &str) -> Result<Self> {
        let raw: JsonValue = serde_json::from_str(text).map_err(|err| EncodeError::InvalidDeclaration {
            path: String::new(),
            reason: err.to_string(),
        })?;
        Self::from_json(&raw)
    }

    fn from_json_at(path: &str, raw: &JsonValue) -> Result<Self> {
        let obj = raw.as_object().ok_or_else(|| EncodeError::InvalidDeclaration {
            path: path.to_owned(),
            reason: "type map must be a JSON object".into(),
        })?;
        let mut entries = BTreeMap::new();
        for (field, decl) in obj {
            let field_path = if path.is_empty() {
                field.clone()
            } else {
                format!("{path}.{field}")
            };
            entries.insert(field.clone(), TypeDeclaration::from_json(&field_path, decl)?);
        }
        Ok(Self { entries })
    }

    /// Adds or replaces the declaration for `field`.
    pub fn insert(&mut self, field: impl Into<String>, decl: TypeDeclaration) -> &mut Self {
        self.entries.insert(field.into(), decl);
        self
    }

    /// Builder form of [`TypeMap::insert`].
    pub fn with(mut self, field: impl Into<String>, decl: TypeDeclaration) -> Self {
        self.insert(field, decl);
        self
    }

    /// Declaration for `field`, if one was given.
    pub fn get(&self, field: &str) -> Option<&TypeDeclaration> {
        self.entries.get(field)
    }

    /// Number of declared fields.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no field is declared.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Adds every declaration of `other`, replacing existing ones.
    pub fn merge(&mut self, other: TypeMap) {
        self.entries.extend(other.entries);
    }

    /// Captures the declarations implied by typed store results, where each
    /// property reads `{"type": ..., "value": ...}` and composites nest the
    /// same shape. Untyped properties and unknown type names are skipped.
    ///
    /// Later results replace earlier declarations. A property whose type
    /// changes between results is reported once, with its first conflict
    /// written as `"<earlier> <=> <later>"`.
    pub fn from_typed_results(results: &[JsonValue]) -> (TypeMap, BTreeMap<String, String>) {
        let mut types = TypeMap::new();
        let mut mismatches = BTreeMap::new();
        for result in results {
            let Some(properties) = result.as_object() else {
                continue;
            };
            for (key, raw) in properties {
                let Some(decl) = typed_declaration(raw) else {
                    continue;
                };
                if let Some(previous) = types.get(key) {
                    if previous.name() != decl.name() {
                        mismatches
                            .entry(key.clone())
                            .or_insert_with(|| format!("{} <=> {}", previous.name(), decl.name()));
                    }
                }
                types.insert(key.clone(), decl);
            }
        }
        (types, mismatches)
    }
}

fn typed_declaration(raw: &JsonValue) -> Option<TypeDeclaration> {
    let typed = raw.as_object()?;
    let name = typed.get("type")?.as_str()?;
    let value = typed.get("value");
    match name {
        "map" => {
            let mut types = TypeMap::new();
            for (key, item) in value.and_then(JsonValue::as_object).into_iter().flatten() {
                if let Some(decl) = typed_declaration(item) {
                    types.insert(key.clone(), decl);
                }
            }
            Some(TypeDeclaration::Map(types))
        }
        "list" | "array" => {
            let items = value.and_then(JsonValue::as_array).map(Vec::as_slice).unwrap_or_default();
            // one anchor wherever the element type changes
            let mut anchors: Vec<(usize, TypeDeclaration)> = Vec::new();
            for (index, item) in items.iter().enumerate() {
                let Some(decl) = typed_declaration(item) else {
                    continue;
                };
                if anchors.last().map_or(true, |(_, last)| *last != decl) {
                    anchors.push((index, decl));
                }
            }
            let list = match anchors.len() {
                0 => ListDeclaration::Untyped,
                1 if anchors[0].0 == 0 => ListDeclaration::Uniform(Box::new(anchors.swap_remove(0).1)),
                _ => ListDeclaration::Anchored(anchors),
            };
            Some(TypeDeclaration::List(list))
        }
        scalar => ScalarType::from_name(scalar).map(TypeDeclaration::Scalar),
    }
}
