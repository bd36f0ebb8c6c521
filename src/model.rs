use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::value::Value;

/// Wire key carrying an element's store identifier.
pub const KEY_ID: &str = "_id";
/// Wire key carrying the element kind (`vertex` or `edge`).
pub const KEY_TYPE: &str = "_type";
/// Wire key carrying the batch action.
pub const KEY_ACTION: &str = "_action";
/// Wire key carrying an edge's tail vertex.
pub const KEY_OUT_V: &str = "_outV";
/// Wire key carrying an edge's head vertex.
pub const KEY_IN_V: &str = "_inV";
/// Wire key carrying an edge label.
pub const KEY_LABEL: &str = "_label";
/// Wire key restricting a delete to the named properties.
pub const KEY_KEYS: &str = "_keys";

/// Structural keys that are passed through verbatim and never type-tagged.
pub const RESERVED_KEYS: [&str; 7] = [
    KEY_ID, KEY_TYPE, KEY_ACTION, KEY_OUT_V, KEY_IN_V, KEY_LABEL, KEY_KEYS,
];

/// Kind of graph element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    /// Graph node.
    Vertex,
    /// Directed relationship between two vertices.
    Edge,
}

impl ElementKind {
    /// Wire spelling of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            ElementKind::Vertex => "vertex",
            ElementKind::Edge => "edge",
        }
    }
}

/// Batch action applied to an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Create a new element.
    Create,
    /// Overwrite properties of an existing element.
    Update,
    /// Delete an element, or only some of its properties when keys are given.
    Delete,
}

impl Action {
    /// Wire spelling of the action.
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

/// Identifier assigned by the store.
///
/// Rexster-style servers hand out either numeric or string ids depending on
/// the backing graph, so both are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ElementId {
    /// Numeric identifier.
    Int(i64),
    /// String identifier.
    Str(String),
}

impl ElementId {
    /// Reads an identifier out of a JSON response field.
    pub fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Number(n) => n.as_i64().map(ElementId::Int),
            JsonValue::String(s) => Some(ElementId::Str(s.clone())),
            _ => None,
        }
    }

    /// JSON form used in request bodies.
    pub fn to_json(&self) -> JsonValue {
        match self {
            ElementId::Int(i) => JsonValue::from(*i),
            ElementId::Str(s) => JsonValue::String(s.clone()),
        }
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementId::Int(i) => write!(f, "{i}"),
            ElementId::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ElementId {
    fn from(value: i64) -> Self {
        ElementId::Int(value)
    }
}

impl From<&str> for ElementId {
    fn from(value: &str) -> Self {
        ElementId::Str(value.to_owned())
    }
}

impl From<String> for ElementId {
    fn from(value: String) -> Self {
        ElementId::Str(value)
    }
}

/// Client-local reference to a vertex draft that has no store id yet.
///
/// Handles are scoped to the transaction that allocated them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexHandle {
    pub(crate) transaction: u64,
    pub(crate) sequence: u32,
}

impl VertexHandle {
    /// Position of the draft inside its transaction.
    pub fn sequence(&self) -> u32 {
        self.sequence
    }
}

impl fmt::Display for VertexHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "draft#{}.{}", self.transaction, self.sequence)
    }
}

/// One side of an edge: a concrete id, or a draft awaiting its id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Vertex that already exists in the store.
    Id(ElementId),
    /// Vertex draft created in the same transaction.
    Draft(VertexHandle),
}

impl Endpoint {
    /// Handle this endpoint still waits on, if any.
    pub fn handle(&self) -> Option<VertexHandle> {
        match self {
            Endpoint::Draft(handle) => Some(*handle),
            Endpoint::Id(_) => None,
        }
    }
}

impl From<ElementId> for Endpoint {
    fn from(value: ElementId) -> Self {
        Endpoint::Id(value)
    }
}

impl From<VertexHandle> for Endpoint {
    fn from(value: VertexHandle) -> Self {
        Endpoint::Draft(value)
    }
}

impl From<i64> for Endpoint {
    fn from(value: i64) -> Self {
        Endpoint::Id(ElementId::Int(value))
    }
}

impl From<&str> for Endpoint {
    fn from(value: &str) -> Self {
        Endpoint::Id(ElementId::from(value))
    }
}

/// Endpoints and label of an edge being created.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeEnds {
    /// Tail vertex.
    pub out_v: Endpoint,
    /// Head vertex.
    pub in_v: Endpoint,
    /// Edge label.
    pub label: String,
}

/// Pending write of a single element, ready for the batch request once its
/// endpoints are resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphElementDraft {
    /// Vertex or edge.
    pub kind: ElementKind,
    /// Operation to apply.
    pub action: Action,
    /// Store id, absent only for edges created without an explicit id.
    pub id: Option<ElementId>,
    /// Property values.
    pub fields: BTreeMap<String, Value>,
    /// Property names a delete is restricted to.
    pub keys: Option<Vec<String>>,
    /// Endpoints, present for edge creation.
    pub edge: Option<EdgeEnds>,
}

impl GraphElementDraft {
    pub(crate) fn new(kind: ElementKind, action: Action) -> Self {
        Self {
            kind,
            action,
            id: None,
            fields: BTreeMap::new(),
            keys: None,
            edge: None,
        }
    }

    /// Compensating operation removing a vertex created earlier.
    pub fn delete_vertex(id: ElementId) -> Self {
        let mut draft = Self::new(ElementKind::Vertex, Action::Delete);
        draft.id = Some(id);
        draft
    }

    /// Whether this element creates an edge and may carry draft endpoints.
    pub fn is_edge_creation(&self) -> bool {
        self.kind == ElementKind::Edge && self.action == Action::Create
    }

    /// Draft handles still referenced by this element's endpoints.
    pub fn unresolved_handles(&self) -> impl Iterator<Item = VertexHandle> + '_ {
        self.edge
            .iter()
            .flat_map(|ends| [ends.out_v.handle(), ends.in_v.handle()])
            .flatten()
    }
}

/// Vertex awaiting creation and a store-assigned id.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexDraft {
    /// Local handle edges use to refer to this vertex.
    pub handle: VertexHandle,
    /// Property values.
    pub fields: BTreeMap<String, Value>,
}
