use thiserror::Error;

use crate::commit::CommitError;
use crate::config::ConfigError;
use crate::encode::EncodeError;
use crate::model::VertexHandle;
use crate::transaction::TxState;
use crate::transport::TransportError;

/// Result alias for operations that can fail with any crate error.
pub type Result<T> = std::result::Result<T, Error>;

/// Misuse of a [`Transaction`](crate::Transaction) while building it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TxError {
    /// The transaction already reached a terminal state.
    #[error("transaction is no longer active (state: {state:?})")]
    Inactive {
        /// State the transaction ended in.
        state: TxState,
    },
    /// An edge endpoint refers to a draft of another transaction.
    #[error("vertex handle {handle} belongs to another transaction")]
    ForeignHandle {
        /// Offending handle.
        handle: VertexHandle,
    },
    /// An edge endpoint refers to a draft this transaction never allocated.
    #[error("vertex handle {handle} is unknown to this transaction")]
    UnknownHandle {
        /// Offending handle.
        handle: VertexHandle,
    },
    /// Edges need a label.
    #[error("edge label cannot be empty")]
    EmptyLabel,
}

impl TxError {
    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            TxError::Inactive { .. } => "Inactive",
            TxError::ForeignHandle { .. } => "ForeignHandle",
            TxError::UnknownHandle { .. } => "UnknownHandle",
            TxError::EmptyLabel => "EmptyLabel",
        }
    }
}

/// Any error the crate can return.
#[derive(Debug, Error)]
pub enum Error {
    /// Type map or literal problem.
    #[error(transparent)]
    Encode(#[from] EncodeError),
    /// Transaction misuse.
    #[error(transparent)]
    Transaction(#[from] TxError),
    /// Request failure outside a commit.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Commit failure.
    #[error(transparent)]
    Commit(#[from] CommitError),
    /// Configuration problem.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// Returns the machine-readable code of the wrapped error.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Encode(err) => err.code(),
            Error::Transaction(err) => err.code(),
            Error::Transport(err) => err.code(),
            Error::Commit(err) => err.code(),
            Error::Config(err) => err.code(),
        }
    }
}
