//! Compensation for commits that fail after vertices were created.

use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::model::ElementId;
use crate::transaction::Transaction;
use crate::transport::{
    is_rejection, rejection_message, Transport, TransportError, CONTENT_TYPE_JSON,
};
use crate::wire;

/// Why the compensating deletes did not go through.
#[derive(Debug, Error)]
pub enum RollbackFailure {
    /// The delete batch could not be sent or answered.
    #[error("delete batch failed: {0}")]
    Transport(#[from] TransportError),
    /// The store refused the delete batch.
    #[error("store refused the delete batch: {}", message.as_deref().unwrap_or("no message"))]
    Rejected {
        /// Message sent by the store.
        message: Option<String>,
        /// Full response body.
        response: JsonValue,
    },
}

/// Result of a compensation attempt.
#[derive(Debug)]
pub enum RollbackOutcome {
    /// No vertex had been created, so nothing was sent.
    NothingToCompensate,
    /// Every created vertex was deleted.
    RolledBack {
        /// Ids that were deleted.
        deleted: Vec<ElementId>,
    },
    /// The delete batch failed; these vertices remain in the store.
    Exhausted {
        /// Ids left behind.
        orphaned: Vec<ElementId>,
        /// What went wrong.
        failure: RollbackFailure,
    },
}

/// Deletes vertices created by a failed commit with a single batch request.
///
/// There is no retry: a failed delete batch is reported as
/// [`RollbackOutcome::Exhausted`] and the ids are left to the caller.
pub struct RollbackCoordinator<'a, T: Transport + ?Sized> {
    transport: &'a T,
    batch_path: &'a str,
}

impl<'a, T: Transport + ?Sized> RollbackCoordinator<'a, T> {
    /// Coordinator posting deletes to `batch_path`.
    pub fn new(transport: &'a T, batch_path: &'a str) -> Self {
        Self {
            transport,
            batch_path,
        }
    }

    /// Discards the transaction's pending elements and deletes `created`,
    /// the vertices the failed commit managed to create.
    pub async fn compensate(
        &self,
        tx: &mut Transaction,
        created: &[ElementId],
    ) -> RollbackOutcome {
        tx.discard_pending_elements();
        if created.is_empty() {
            debug!(tx_id = tx.id(), "rollback: nothing to compensate");
            return RollbackOutcome::NothingToCompensate;
        }

        let body = wire::delete_vertices_body(created);
        warn!(
            tx_id = tx.id(),
            vertices = created.len(),
            "rolling back created vertices"
        );

        let failure = match self
            .transport
            .post(self.batch_path, &body, &[("Content-Type", CONTENT_TYPE_JSON)])
            .await
        {
            Ok(response) if is_rejection(&response) => RollbackFailure::Rejected {
                message: rejection_message(&response).map(str::to_owned),
                response,
            },
            Ok(_) => {
                return RollbackOutcome::RolledBack {
                    deleted: created.to_vec(),
                }
            }
            Err(err) => RollbackFailure::Transport(err),
        };

        error!(
            tx_id = tx.id(),
            orphaned = ?created,
            error = %failure,
            "rollback failed, created vertices remain in the store"
        );
        RollbackOutcome::Exhausted {
            orphaned: created.to_vec(),
            failure,
        }
    }
}
