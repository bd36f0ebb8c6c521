#![forbid(unsafe_code)]

//! Support code for the `rexbatch` binary.
//!
//! Batch files describe a transaction as JSON so it can be replayed from the
//! command line; reports turn commit outcomes into JSON for stdout.

/// JSON batch files and the transactions they describe.
pub mod batch_file;

use std::path::{Path, PathBuf};

use serde_json::{json, Value as JsonValue};
use thiserror::Error;

use crate::commit::{CommitError, CommitOutcome};
use crate::config::ConfigError;
use crate::encode::{encode, EncodeError, EncodeMode, TypeDeclaration, TypeMap, WireValue};
use crate::error::TxError;
use crate::value::Value;

pub use batch_file::{BatchFile, Operation};

/// Errors raised by the command-line front end.
#[derive(Debug, Error)]
pub enum CliError {
    /// An input file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// An input file is not valid JSON of the expected shape.
    #[error("failed to parse {path}: {source}")]
    Json {
        /// File path.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// Type map problem.
    #[error(transparent)]
    Encode(#[from] EncodeError),
    /// Operation rejected by the transaction.
    #[error(transparent)]
    Transaction(#[from] TxError),
    /// Configuration problem.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// `@name` used before an `addVertex` with that `ref`.
    #[error("unknown vertex reference '@{0}'")]
    UnknownRef(String),
    /// Two `addVertex` operations share a `ref`.
    #[error("vertex reference '{0}' is defined twice")]
    DuplicateRef(String),
    /// An id is neither an integer nor a string.
    #[error("invalid element id {0}")]
    InvalidId(JsonValue),
}

impl CliError {
    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            CliError::Io { .. } => "Io",
            CliError::Json { .. } => "Json",
            CliError::Encode(err) => err.code(),
            CliError::Transaction(err) => err.code(),
            CliError::Config(err) => err.code(),
            CliError::UnknownRef(_) => "UnknownRef",
            CliError::DuplicateRef(_) => "DuplicateRef",
            CliError::InvalidId(_) => "InvalidId",
        }
    }
}

/// Reads and parses a JSON file.
pub fn read_json(path: &Path) -> Result<JsonValue, CliError> {
    let text = std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads a type map file.
pub fn read_type_map(path: &Path) -> Result<TypeMap, CliError> {
    Ok(TypeMap::from_json(&read_json(path)?)?)
}

/// Encodes `document` and reports the result with its degradations.
///
/// Field map mode needs a JSON object; literal mode takes any value.
pub fn encode_report(
    document: JsonValue,
    types: Option<TypeMap>,
    mode: EncodeMode,
) -> Result<JsonValue, CliError> {
    let declaration = types.map(TypeDeclaration::Map);
    let encoded = encode(&Value::from(document), declaration.as_ref(), mode)?;
    let value = match encoded.value {
        WireValue::Fields(fields) => JsonValue::Object(fields),
        WireValue::Literal(text) => JsonValue::String(text),
    };
    Ok(json!({
        "encoded": value,
        "degradations": encoded.degradations,
    }))
}

/// Report printed after a successful commit.
pub fn commit_report(outcome: &CommitOutcome, batch: &BatchFile) -> JsonValue {
    let created: Vec<JsonValue> = outcome
        .created_vertices
        .iter()
        .map(|vertex| {
            json!({
                "ref": batch.ref_name(vertex.handle.sequence()),
                "id": vertex.id,
            })
        })
        .collect();
    json!({
        "committed": true,
        "results": outcome.results,
        "created": created,
        "degradations": outcome.degradations,
    })
}

/// Report printed after a failed commit.
pub fn failure_report(err: &CommitError) -> JsonValue {
    json!({
        "committed": false,
        "error": err.code(),
        "message": err.to_string(),
        "orphaned": err.orphaned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ElementId;
    use crate::transport::TransportError;

    #[test]
    fn encode_report_lists_degradations() {
        let types = TypeMap::parse(r#"{"age": "integer"}"#).unwrap();
        let report = encode_report(
            json!({"age": 5000000000_i64, "name": "josh"}),
            Some(types),
            EncodeMode::FieldMap,
        )
        .unwrap();
        assert_eq!(report["encoded"], json!({"age": "(l,5000000000)", "name": "josh"}));
        assert_eq!(
            report["degradations"],
            json!([{"path": "age", "declared": "integer", "encoded_as": "l"}])
        );
    }

    #[test]
    fn field_map_mode_needs_an_object() {
        let err = encode_report(json!([1, 2]), None, EncodeMode::FieldMap).unwrap_err();
        assert_eq!(err.code(), "FieldMapRequiresMap");
        let report = encode_report(json!([1, 2]), None, EncodeMode::EmbeddedLiteral).unwrap();
        assert_eq!(report["encoded"], json!("(list,((l,1),(l,2)))"));
    }

    #[test]
    fn failure_report_carries_orphans() {
        let err = CommitError::Transport {
            source: TransportError::Unreachable("down".into()),
            created_vertices: vec![ElementId::Int(9)],
        };
        let report = failure_report(&err);
        assert_eq!(report["error"], "TransportFailure");
        assert_eq!(report["orphaned"], json!([9]));
    }
}
