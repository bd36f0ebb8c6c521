//! Client-side write coordinator for Rexster-style HTTP graph stores.
//!
//! Writes are queued on a [`Transaction`] and committed by a
//! [`GraphClient`]. Vertices without an id are created first, one request
//! each; edges that refer to them are then patched with the assigned ids and
//! all remaining writes go out as a single batch. If anything fails after
//! vertices were created, they are deleted again. Property values are
//! encoded as type-tagged literals such as `(i,32)`, driven by an optional
//! [`TypeMap`].

#![warn(missing_docs)]

pub mod cli;
/// Client facade tying configuration, transport and transactions together.
pub mod client;
pub mod commit;
pub mod config;
pub mod encode;
/// Crate-wide error and result types.
pub mod error;
/// Element ids, draft handles and queued element writes.
pub mod model;
pub mod rollback;
/// Transaction log of pending writes.
pub mod transaction;
pub mod transport;
pub mod value;
pub mod wire;

pub use client::GraphClient;
pub use commit::{CommitError, CommitOutcome, CommitState, CreatedVertex, FailureCause};
pub use config::{ClientConfig, ConfigError};
pub use encode::{Degradation, EncodeError, EncodeMode, TypeDeclaration, TypeMap, WireValue};
pub use error::{Error, Result, TxError};
pub use model::{ElementId, Endpoint, VertexHandle};
pub use rollback::{RollbackFailure, RollbackOutcome};
pub use transaction::{Transaction, TxState};
pub use transport::{HttpTransport, Transport, TransportError};
pub use value::{fields, Value};
