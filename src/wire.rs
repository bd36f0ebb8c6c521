//! Request bodies for the vertex and batch endpoints.

use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::encode::{encode_fields, Encoded, TypeMap};
use crate::model::{
    ElementId, Endpoint, GraphElementDraft, VertexDraft, VertexHandle, KEY_ACTION, KEY_ID, KEY_IN_V,
    KEY_KEYS, KEY_LABEL, KEY_OUT_V, KEY_TYPE,
};

/// Body of a vertex creation request: the draft's field map, unwrapped.
pub fn vertex_body(draft: &VertexDraft, types: Option<&TypeMap>) -> Encoded<JsonValue> {
    let encoded = encode_fields(&draft.fields, types);
    Encoded {
        value: JsonValue::Object(encoded.value),
        degradations: encoded.degradations,
    }
}

/// One entry of a batch request.
///
/// Structural keys are written after the typed fields, so they win over
/// same-named properties.
///
/// # Errors
///
/// Returns the first endpoint handle that is still unresolved; such an
/// element must never reach the store.
pub fn batch_operation(
    element: &GraphElementDraft,
    types: Option<&TypeMap>,
) -> Result<Encoded<JsonValue>, VertexHandle> {
    if let Some(handle) = element.unresolved_handles().next() {
        return Err(handle);
    }
    Ok(write_operation(element, types))
}

/// Batch body deleting every vertex in `ids`, in order.
pub fn delete_vertices_body(ids: &[ElementId]) -> JsonValue {
    batch_body(
        ids.iter()
            .map(|id| write_operation(&GraphElementDraft::delete_vertex(id.clone()), None).value)
            .collect(),
    )
}

fn write_operation(element: &GraphElementDraft, types: Option<&TypeMap>) -> Encoded<JsonValue> {
    let Encoded {
        value: mut op,
        degradations,
    } = encode_fields(&element.fields, types);
    if let Some(id) = &element.id {
        op.insert(KEY_ID.into(), id.to_json());
    }
    op.insert(KEY_TYPE.into(), JsonValue::from(element.kind.as_str()));
    op.insert(KEY_ACTION.into(), JsonValue::from(element.action.as_str()));
    if let Some(keys) = &element.keys {
        op.insert(KEY_KEYS.into(), JsonValue::from(keys.clone()));
    }
    if let Some(ends) = &element.edge {
        op.insert(KEY_OUT_V.into(), endpoint_json(&ends.out_v));
        op.insert(KEY_IN_V.into(), endpoint_json(&ends.in_v));
        op.insert(KEY_LABEL.into(), JsonValue::from(ends.label.as_str()));
    }
    Encoded {
        value: JsonValue::Object(op),
        degradations,
    }
}

fn endpoint_json(endpoint: &Endpoint) -> JsonValue {
    match endpoint {
        Endpoint::Id(id) => id.to_json(),
        Endpoint::Draft(handle) => JsonValue::from(handle.to_string()),
    }
}

/// Wraps operations as `{"tx": [...]}`.
pub fn batch_body(operations: Vec<JsonValue>) -> JsonValue {
    let mut body = JsonMap::new();
    body.insert("tx".into(), JsonValue::Array(operations));
    JsonValue::Object(body)
}
