#![forbid(unsafe_code)]

//! HTTP collaborator used by the commit and rollback coordinators.
//!
//! The coordinators only need one operation, a JSON `POST`, so the seam is
//! a single async trait. [`HttpTransport`] is the `reqwest` implementation;
//! tests plug in scripted transports.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::model::ElementId;

mod http;

pub use http::HttpTransport;

/// Content type of plain JSON bodies, used for batch requests.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Content type telling the server that property values are tagged literals.
pub const CONTENT_TYPE_TYPED: &str = "application/vnd.rexster-typed-v1+json";

/// Request failed before a usable response came back.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection, TLS or protocol failure from the HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// Non-success status with a body that is not JSON.
    #[error("store responded with status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },
    /// Success status with a body that is not JSON.
    #[error("response body is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
    /// A caller-supplied header could not be sent.
    #[error("invalid header '{name}'")]
    InvalidHeader {
        /// Header name as given.
        name: String,
    },
    /// The store could not be reached at all.
    #[error("store unreachable: {0}")]
    Unreachable(String),
}

impl TransportError {
    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            TransportError::Http(_) => "Http",
            TransportError::Status { .. } => "Status",
            TransportError::Decode(_) => "Decode",
            TransportError::InvalidHeader { .. } => "InvalidHeader",
            TransportError::Unreachable(_) => "Unreachable",
        }
    }
}

/// Asynchronous JSON `POST` against the graph's base URL.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Posts `body` to `path` (relative to the graph, e.g. `/vertices`) with
    /// extra `headers`, returning the parsed JSON response.
    ///
    /// Store-level rejections come back as `Ok` bodies carrying
    /// `"success": false`; only failures to obtain a usable response are
    /// errors.
    async fn post(
        &self,
        path: &str,
        body: &JsonValue,
        headers: &[(&str, &str)],
    ) -> Result<JsonValue, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn post(
        &self,
        path: &str,
        body: &JsonValue,
        headers: &[(&str, &str)],
    ) -> Result<JsonValue, TransportError> {
        (**self).post(path, body, headers).await
    }
}

/// Whether the response is a store-level rejection (`"success": false`).
pub fn is_rejection(body: &JsonValue) -> bool {
    body.get("success") == Some(&JsonValue::Bool(false))
}

/// Identifier assigned to a created element, read from `results._id` or,
/// failing that, `results.id`.
pub fn created_id(body: &JsonValue) -> Option<ElementId> {
    let results = body.get("results")?;
    results
        .get("_id")
        .or_else(|| results.get("id"))
        .and_then(ElementId::from_json)
}

/// Drops server bookkeeping fields from a successful response.
pub fn strip_bookkeeping(mut body: JsonValue) -> JsonValue {
    if let Some(obj) = body.as_object_mut() {
        for key in ["version", "queryTime", "txProcessed"] {
            obj.remove(key);
        }
    }
    body
}

/// Human-readable reason attached to a rejection, if the store sent one.
pub fn rejection_message(body: &JsonValue) -> Option<&str> {
    body.get("message").and_then(JsonValue::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejection_requires_explicit_false() {
        assert!(is_rejection(&json!({"success": false, "message": "nope"})));
        assert!(!is_rejection(&json!({"success": true})));
        assert!(!is_rejection(&json!({"results": {}})));
        assert!(!is_rejection(&json!({"success": "false"})));
    }

    #[test]
    fn created_id_prefers_underscore_key() {
        assert_eq!(
            created_id(&json!({"results": {"_id": "9", "id": "10"}})),
            Some(ElementId::from("9"))
        );
        assert_eq!(created_id(&json!({"results": {"id": 4}})), Some(ElementId::Int(4)));
        assert_eq!(created_id(&json!({"results": {"name": "x"}})), None);
        assert_eq!(created_id(&json!({"_id": 4})), None);
    }

    #[test]
    fn bookkeeping_fields_are_stripped() {
        let body = strip_bookkeeping(json!({
            "version": "2.0", "queryTime": 1.5, "txProcessed": 3, "success": true
        }));
        assert_eq!(body, json!({"success": true}));
    }
}
