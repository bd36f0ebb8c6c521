//! Commit of a [`Transaction`]: vertex creation fan-out, edge patching and
//! the batch request.

use std::collections::HashMap;
use std::time::Instant;

use futures::future::join_all;
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::encode::{Degradation, TypeMap};
use crate::error::TxError;
use crate::model::{ElementId, Endpoint, GraphElementDraft, VertexDraft, VertexHandle};
use crate::rollback::{RollbackCoordinator, RollbackFailure, RollbackOutcome};
use crate::transaction::{Transaction, TxState};
use crate::transport::{
    created_id, is_rejection, rejection_message, strip_bookkeeping, Transport, TransportError,
    CONTENT_TYPE_JSON, CONTENT_TYPE_TYPED,
};
use crate::wire;

const CONTENT_TYPE_HEADER: &str = "Content-Type";

/// Phase of a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitState {
    /// Not started
    Idle,
    /// Vertex creation requests in flight
    AwaitingVertexCreation,
    /// Replacing draft handles with created ids
    PatchingEdgeReferences,
    /// Batch request in flight
    SubmittingBatch,
    /// Batch accepted
    Committed,
    /// Failed, created vertices deleted
    RolledBack,
    /// Failed, created vertices could not be deleted
    RollbackExhausted,
    /// Failed without compensation
    Failed,
}

/// Request endpoints, relative to the graph's base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Vertex creation path.
    pub vertices: String,
    /// Batch transaction path.
    pub batch: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

impl From<&ClientConfig> for Endpoints {
    fn from(config: &ClientConfig) -> Self {
        Self {
            vertices: config.vertex_path.clone(),
            batch: config.batch_path.clone(),
        }
    }
}

/// Vertex created by a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedVertex {
    /// Draft handle returned by [`Transaction::add_vertex`].
    #[serde(skip)]
    pub handle: VertexHandle,
    /// Id assigned by the store.
    pub id: ElementId,
}

/// Successful commit.
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    /// Batch response without server bookkeeping fields.
    pub results: JsonValue,
    /// Vertices created before the batch, in draft order.
    pub created_vertices: Vec<CreatedVertex>,
    /// Degradations recorded by the transaction.
    pub degradations: Vec<Degradation>,
}

impl CommitOutcome {
    /// Id assigned to the draft behind `handle`.
    pub fn id_of(&self, handle: VertexHandle) -> Option<&ElementId> {
        self.created_vertices
            .iter()
            .find(|created| created.handle == handle)
            .map(|created| &created.id)
    }
}

/// Why a single vertex creation request failed.
#[derive(Debug, Error)]
pub enum CreationFailure {
    /// No usable response.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The store refused the vertex.
    #[error("store refused the vertex: {}", message.as_deref().unwrap_or("no message"))]
    Rejected {
        /// Message sent by the store.
        message: Option<String>,
    },
    /// The response carried no id.
    #[error("response carried no vertex id")]
    MissingId,
}

/// Vertex draft that could not be created.
#[derive(Debug, Error)]
#[error("{handle}: {reason}")]
pub struct DraftFailure {
    /// Draft that failed.
    pub handle: VertexHandle,
    /// What went wrong.
    #[source]
    pub reason: CreationFailure,
}

/// What made a commit roll back.
#[derive(Debug, Error)]
pub enum FailureCause {
    /// Some vertex creation requests failed.
    #[error("{} of {attempted} vertex creations failed", failed.len())]
    PartialCreation {
        /// Failed drafts in draft order.
        failed: Vec<DraftFailure>,
        /// Number of creation requests sent.
        attempted: usize,
    },
    /// The store rejected the batch after vertices were created.
    #[error("store rejected the batch: {}", message.as_deref().unwrap_or("no message"))]
    StoreRejection {
        /// Message sent by the store.
        message: Option<String>,
        /// Full response body.
        response: JsonValue,
    },
    /// An edge still referred to a draft with no id after patching.
    #[error("edge endpoint {0} was never resolved")]
    UnresolvedHandle(VertexHandle),
}

/// Failed commit.
#[derive(Debug, Error)]
pub enum CommitError {
    /// The transaction could not be committed at all.
    #[error(transparent)]
    Transaction(#[from] TxError),
    /// The batch request got no usable response, so its outcome is unknown.
    /// Vertices created by this commit are not compensated.
    #[error("batch request failed: {source}")]
    Transport {
        /// Transport failure.
        #[source]
        source: TransportError,
        /// Vertices created before the batch was sent.
        created_vertices: Vec<ElementId>,
    },
    /// The store rejected the batch and no vertex had been created.
    #[error("store rejected the transaction: {}", message.as_deref().unwrap_or("no message"))]
    Rejected {
        /// Message sent by the store.
        message: Option<String>,
        /// Full response body.
        response: JsonValue,
    },
    /// The commit failed and every vertex it created was deleted again.
    #[error("Could not complete transaction. Transaction has been rolled back. ({cause})")]
    RolledBack {
        /// What went wrong.
        #[source]
        cause: FailureCause,
        /// Number of vertices deleted; zero when nothing needed compensation.
        compensated: usize,
    },
    /// The commit failed and the vertices it created could not be deleted.
    #[error(
        "Could not complete transaction. Unable to roll back newly created vertices [{}]. ({cause})",
        join_ids(orphaned)
    )]
    RollbackExhausted {
        /// What made the commit fail.
        #[source]
        cause: FailureCause,
        /// Vertices left in the store.
        orphaned: Vec<ElementId>,
        /// Why the deletes failed.
        failure: RollbackFailure,
    },
}

impl CommitError {
    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            CommitError::Transaction(err) => err.code(),
            CommitError::Transport { .. } => "TransportFailure",
            CommitError::Rejected { .. } => "StoreRejection",
            CommitError::RolledBack { .. } => "RolledBack",
            CommitError::RollbackExhausted { .. } => "RollbackExhausted",
        }
    }

    /// Vertices left in the store by this failure, which the caller has to
    /// reconcile: orphans of a failed rollback, or vertices created before a
    /// batch whose outcome is unknown.
    pub fn orphaned(&self) -> &[ElementId] {
        match self {
            CommitError::RollbackExhausted { orphaned, .. } => orphaned,
            CommitError::Transport {
                created_vertices, ..
            } => created_vertices,
            _ => &[],
        }
    }
}

/// Drives one commit through its phases.
///
/// Vertex drafts are created first, concurrently and one request each,
/// because edges can only reference stored ids. Their handles are then
/// replaced in the pending edges and everything else goes out as one batch.
/// A failure after any vertex was created hands over to
/// [`RollbackCoordinator`].
pub struct CommitCoordinator<'a, T: Transport + ?Sized> {
    transport: &'a T,
    endpoints: Endpoints,
    state: CommitState,
}

impl<'a, T: Transport + ?Sized> CommitCoordinator<'a, T> {
    /// Coordinator posting to `endpoints` through `transport`.
    pub fn new(transport: &'a T, endpoints: Endpoints) -> Self {
        Self {
            transport,
            endpoints,
            state: CommitState::Idle,
        }
    }

    /// Phase the coordinator is in, or ended in.
    pub fn state(&self) -> CommitState {
        self.state
    }

    /// Commits `tx`. Whatever the result, the transaction is left empty and
    /// inactive.
    pub async fn commit(&mut self, tx: &mut Transaction) -> Result<CommitOutcome, CommitError> {
        tx.ensure_active()?;
        let started = Instant::now();
        let types = tx.types().cloned();
        let (elements, drafts) = tx.take_pending();
        debug!(
            tx_id = tx.id(),
            vertices = drafts.len(),
            elements = elements.len(),
            "commit started"
        );

        let mut created = Vec::with_capacity(drafts.len());
        if !drafts.is_empty() {
            self.state = CommitState::AwaitingVertexCreation;
            let (succeeded, failed) = self.create_vertices(tx, &drafts, types.as_ref()).await;
            created = succeeded;
            if !failed.is_empty() {
                let cause = FailureCause::PartialCreation {
                    failed,
                    attempted: drafts.len(),
                };
                return Err(self.roll_back(tx, &created, cause).await);
            }
        }

        self.state = CommitState::PatchingEdgeReferences;
        let resolved: HashMap<VertexHandle, ElementId> = created
            .iter()
            .map(|vertex| (vertex.handle, vertex.id.clone()))
            .collect();
        let mut operations = Vec::with_capacity(elements.len());
        for mut element in elements {
            patch_endpoints(&mut element, &resolved);
            match wire::batch_operation(&element, types.as_ref()) {
                Ok(op) => {
                    tx.record_degradations(op.degradations);
                    operations.push(op.value);
                }
                Err(handle) => {
                    let cause = FailureCause::UnresolvedHandle(handle);
                    return Err(self.roll_back(tx, &created, cause).await);
                }
            }
        }

        self.state = CommitState::SubmittingBatch;
        let body = wire::batch_body(operations);
        let response = self
            .transport
            .post(
                &self.endpoints.batch,
                &body,
                &[(CONTENT_TYPE_HEADER, CONTENT_TYPE_JSON)],
            )
            .await;

        match response {
            Err(source) => {
                let created_vertices: Vec<ElementId> =
                    created.into_iter().map(|vertex| vertex.id).collect();
                warn!(
                    tx_id = tx.id(),
                    error = %source,
                    created = ?created_vertices,
                    "batch outcome unknown"
                );
                self.finish(tx, CommitState::Failed, TxState::Failed);
                Err(CommitError::Transport {
                    source,
                    created_vertices,
                })
            }
            Ok(response) if is_rejection(&response) => {
                let message = rejection_message(&response).map(str::to_owned);
                if created.is_empty() {
                    warn!(tx_id = tx.id(), ?message, "store rejected the transaction");
                    self.finish(tx, CommitState::Failed, TxState::Failed);
                    Err(CommitError::Rejected { message, response })
                } else {
                    let cause = FailureCause::StoreRejection { message, response };
                    Err(self.roll_back(tx, &created, cause).await)
                }
            }
            Ok(response) => {
                self.finish(tx, CommitState::Committed, TxState::Committed);
                info!(
                    tx_id = tx.id(),
                    created = created.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "transaction committed"
                );
                Ok(CommitOutcome {
                    results: strip_bookkeeping(response),
                    created_vertices: created,
                    degradations: tx.degradations().to_vec(),
                })
            }
        }
    }

    /// Creates every draft concurrently and waits for all of them.
    async fn create_vertices(
        &self,
        tx: &mut Transaction,
        drafts: &[VertexDraft],
        types: Option<&TypeMap>,
    ) -> (Vec<CreatedVertex>, Vec<DraftFailure>) {
        let mut bodies = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let encoded = wire::vertex_body(draft, types);
            tx.record_degradations(encoded.degradations);
            bodies.push(encoded.value);
        }

        let headers = [(CONTENT_TYPE_HEADER, CONTENT_TYPE_TYPED)];
        let responses = join_all(
            bodies
                .iter()
                .map(|body| self.transport.post(&self.endpoints.vertices, body, &headers)),
        )
        .await;

        let mut created = Vec::with_capacity(drafts.len());
        let mut failed = Vec::new();
        for (draft, response) in drafts.iter().zip(responses) {
            match creation_result(response) {
                Ok(id) => {
                    debug!(handle = %draft.handle, %id, "vertex created");
                    created.push(CreatedVertex {
                        handle: draft.handle,
                        id,
                    });
                }
                Err(reason) => {
                    warn!(handle = %draft.handle, error = %reason, "vertex creation failed");
                    failed.push(DraftFailure {
                        handle: draft.handle,
                        reason,
                    });
                }
            }
        }
        (created, failed)
    }

    async fn roll_back(
        &mut self,
        tx: &mut Transaction,
        created: &[CreatedVertex],
        cause: FailureCause,
    ) -> CommitError {
        warn!(tx_id = tx.id(), %cause, "commit failed, rolling back");
        let ids: Vec<ElementId> = created.iter().map(|vertex| vertex.id.clone()).collect();
        let outcome = RollbackCoordinator::new(self.transport, &self.endpoints.batch)
            .compensate(tx, &ids)
            .await;
        match outcome {
            RollbackOutcome::NothingToCompensate => {
                self.finish(tx, CommitState::RolledBack, TxState::RolledBack);
                CommitError::RolledBack {
                    cause,
                    compensated: 0,
                }
            }
            RollbackOutcome::RolledBack { deleted } => {
                self.finish(tx, CommitState::RolledBack, TxState::RolledBack);
                CommitError::RolledBack {
                    cause,
                    compensated: deleted.len(),
                }
            }
            RollbackOutcome::Exhausted { orphaned, failure } => {
                self.finish(tx, CommitState::RollbackExhausted, TxState::RollbackExhausted);
                CommitError::RollbackExhausted {
                    cause,
                    orphaned,
                    failure,
                }
            }
        }
    }

    fn finish(&mut self, tx: &mut Transaction, state: CommitState, tx_state: TxState) {
        self.state = state;
        tx.finish(tx_state);
    }
}

fn join_ids(ids: &[ElementId]) -> String {
    ids.iter()
        .map(ElementId::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn creation_result(
    response: Result<JsonValue, TransportError>,
) -> Result<ElementId, CreationFailure> {
    let body = response?;
    if let Some(id) = created_id(&body) {
        return Ok(id);
    }
    if is_rejection(&body) {
        return Err(CreationFailure::Rejected {
            message: rejection_message(&body).map(str::to_owned),
        });
    }
    Err(CreationFailure::MissingId)
}

/// Replaces resolved draft handles in an edge's endpoints.
fn patch_endpoints(element: &mut GraphElementDraft, resolved: &HashMap<VertexHandle, ElementId>) {
    if !element.is_edge_creation() {
        return;
    }
    if let Some(ends) = element.edge.as_mut() {
        for endpoint in [&mut ends.out_v, &mut ends.in_v] {
            if let Endpoint::Draft(handle) = endpoint {
                if let Some(id) = resolved.get(handle) {
                    *endpoint = Endpoint::Id(id.clone());
                }
            }
        }
    }
}
