use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::{Map as JsonMap, Value as JsonValue};

use super::{read_json, CliError};
use crate::encode::TypeMap;
use crate::model::{ElementId, Endpoint};
use crate::transaction::Transaction;
use crate::value::Value;

/// A transaction written down as JSON.
///
/// ```json
/// {
///   "types": {"age": "integer"},
///   "operations": [
///     {"op": "addVertex", "ref": "josh", "fields": {"name": "josh", "age": 32}},
///     {"op": "addEdge", "out": "@josh", "in": 1, "label": "knows"},
///     {"op": "removeVertex", "id": 7, "keys": ["age"]}
///   ]
/// }
/// ```
///
/// Edge endpoints are ids, or `@name` for a vertex added earlier in the
/// same file with `"ref": "name"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchFile {
    /// Type map for every element, in its JSON form.
    #[serde(default)]
    pub types: Option<JsonValue>,
    /// Operations in submission order.
    pub operations: Vec<Operation>,
}

/// One write of a [`BatchFile`].
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
#[allow(missing_docs)]
pub enum Operation {
    /// Vertex, created up front when it has no id.
    AddVertex {
        #[serde(default)]
        id: Option<JsonValue>,
        #[serde(default, rename = "ref")]
        reference: Option<String>,
        #[serde(default)]
        fields: JsonMap<String, JsonValue>,
    },
    /// Edge between ids or `@ref`s.
    AddEdge {
        #[serde(default)]
        id: Option<JsonValue>,
        out: JsonValue,
        #[serde(rename = "in")]
        into: JsonValue,
        label: String,
        #[serde(default)]
        fields: JsonMap<String, JsonValue>,
    },
    /// Property update of a vertex.
    UpdateVertex {
        id: JsonValue,
        #[serde(default)]
        fields: JsonMap<String, JsonValue>,
    },
    /// Property update of an edge.
    UpdateEdge {
        id: JsonValue,
        #[serde(default)]
        fields: JsonMap<String, JsonValue>,
    },
    /// Vertex removal, or removal of `keys` only.
    RemoveVertex {
        id: JsonValue,
        #[serde(default)]
        keys: Option<Vec<String>>,
    },
    /// Edge removal, or removal of `keys` only.
    RemoveEdge {
        id: JsonValue,
        #[serde(default)]
        keys: Option<Vec<String>>,
    },
}

impl BatchFile {
    /// Reads a batch file.
    pub fn load(path: &Path) -> Result<Self, CliError> {
        serde_json::from_value(read_json(path)?).map_err(|source| CliError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parses the embedded type map, if any.
    pub fn type_map(&self) -> Result<Option<TypeMap>, CliError> {
        match &self.types {
            Some(raw) => Ok(Some(TypeMap::from_json(raw)?)),
            None => Ok(None),
        }
    }

    /// Queues every operation on `tx`, returning the endpoint each `ref`
    /// names.
    pub fn apply(&self, tx: &mut Transaction) -> Result<BTreeMap<String, Endpoint>, CliError> {
        let mut refs = BTreeMap::new();
        for op in &self.operations {
            match op {
                Operation::AddVertex {
                    id,
                    reference,
                    fields,
                } => {
                    let endpoint = match id {
                        Some(raw) => {
                            let id = element_id(raw)?;
                            tx.add_vertex_with_id(id.clone(), to_fields(fields))?;
                            Endpoint::Id(id)
                        }
                        None => Endpoint::Draft(tx.add_vertex(to_fields(fields))?),
                    };
                    if let Some(name) = reference {
                        if refs.insert(name.clone(), endpoint).is_some() {
                            return Err(CliError::DuplicateRef(name.clone()));
                        }
                    }
                }
                Operation::AddEdge {
                    id,
                    out,
                    into,
                    label,
                    fields,
                } => {
                    let out_v = resolve(out, &refs)?;
                    let in_v = resolve(into, &refs)?;
                    match id {
                        Some(raw) => tx.add_edge_with_id(
                            element_id(raw)?,
                            out_v,
                            in_v,
                            label.as_str(),
                            to_fields(fields),
                        )?,
                        None => tx.add_edge(out_v, in_v, label.as_str(), to_fields(fields))?,
                    }
                }
                Operation::UpdateVertex { id, fields } => {
                    tx.update_vertex(element_id(id)?, to_fields(fields))?
                }
                Operation::UpdateEdge { id, fields } => {
                    tx.update_edge(element_id(id)?, to_fields(fields))?
                }
                Operation::RemoveVertex { id, keys } => {
                    tx.remove_vertex(element_id(id)?, keys.clone())?
                }
                Operation::RemoveEdge { id, keys } => {
                    tx.remove_edge(element_id(id)?, keys.clone())?
                }
            }
        }
        Ok(refs)
    }

    /// `ref` of the vertex draft at `sequence`, counting only vertices added
    /// without an id.
    pub fn ref_name(&self, sequence: u32) -> Option<&str> {
        self.operations
            .iter()
            .filter_map(|op| match op {
                Operation::AddVertex {
                    id: None,
                    reference,
                    ..
                } => Some(reference.as_deref()),
                _ => None,
            })
            .nth(sequence as usize)
            .flatten()
    }
}

fn element_id(raw: &JsonValue) -> Result<ElementId, CliError> {
    ElementId::from_json(raw).ok_or_else(|| CliError::InvalidId(raw.clone()))
}

fn resolve(raw: &JsonValue, refs: &BTreeMap<String, Endpoint>) -> Result<Endpoint, CliError> {
    if let Some(name) = raw.as_str().and_then(|text| text.strip_prefix('@')) {
        return refs
            .get(name)
            .cloned()
            .ok_or_else(|| CliError::UnknownRef(name.to_owned()));
    }
    element_id(raw).map(Endpoint::Id)
}

fn to_fields(raw: &JsonMap<String, JsonValue>) -> BTreeMap<String, Value> {
    raw.iter()
        .map(|(name, value)| (name.clone(), Value::from(value.clone())))
        .collect()
}
