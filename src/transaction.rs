use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::encode::{Degradation, DegradationLog, TypeMap};
use crate::error::TxError;
use crate::model::{
    Action, EdgeEnds, ElementId, ElementKind, Endpoint, GraphElementDraft, VertexDraft,
    VertexHandle,
};
use crate::value::Value;

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle state of a [`Transaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    /// Accepting operations
    Active,
    /// Batch accepted by the store
    Committed,
    /// Failed and every created vertex was deleted again
    RolledBack,
    /// Failed and the compensating deletes failed too
    RollbackExhausted,
    /// Failed without compensation (batch outcome unknown, or rejected
    /// before anything was created)
    Failed,
}

/// Client-side log of graph writes, submitted as a unit by
/// [`GraphClient::commit`](crate::GraphClient::commit).
///
/// Vertices added without an id are kept apart as drafts: the store assigns
/// their ids during commit, and edges can refer to them through the
/// [`VertexHandle`] returned by [`add_vertex`](Self::add_vertex) until then.
///
/// # Example
///
/// ```rust
/// use rexbatch::{fields, Transaction, Value};
///
/// let mut tx = Transaction::new();
/// let josh = tx.add_vertex(fields([("name", Value::from("josh"))]))?;
/// let peter = tx.add_vertex(fields([("name", Value::from("peter"))]))?;
/// tx.add_edge(josh, peter, "knows", fields([("since", Value::Long(2010))]))?;
/// assert_eq!(tx.pending_vertices().len(), 2);
/// assert_eq!(tx.pending_elements().len(), 1);
/// # Ok::<(), rexbatch::TxError>(())
/// ```
#[derive(Debug)]
pub struct Transaction {
    id: u64,
    state: TxState,
    types: Option<TypeMap>,
    pending_elements: Vec<GraphElementDraft>,
    pending_vertices: Vec<VertexDraft>,
    next_sequence: u32,
    degradations: DegradationLog,
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl Transaction {
    /// Opens an empty transaction that infers property types.
    pub fn new() -> Self {
        Self::open(None)
    }

    /// Opens an empty transaction whose properties are encoded under `types`.
    pub fn with_types(types: TypeMap) -> Self {
        Self::open(Some(types))
    }

    fn open(types: Option<TypeMap>) -> Self {
        let id = NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed);
        debug!(tx_id = id, typed = types.is_some(), "transaction opened");
        Self {
            id,
            state: TxState::Active,
            types,
            pending_elements: Vec::new(),
            pending_vertices: Vec::new(),
            next_sequence: 0,
            degradations: DegradationLog::default(),
        }
    }

    /// Process-unique transaction id, the scope of its handles.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TxState {
        self.state
    }

    /// Type map applied to every element of this transaction.
    pub fn types(&self) -> Option<&TypeMap> {
        self.types.as_ref()
    }

    /// Elements written by the batch request, in insertion order.
    pub fn pending_elements(&self) -> &[GraphElementDraft] {
        &self.pending_elements
    }

    /// Vertices awaiting creation, in insertion order.
    pub fn pending_vertices(&self) -> &[VertexDraft] {
        &self.pending_vertices
    }

    /// Whether nothing has been queued.
    pub fn is_empty(&self) -> bool {
        self.pending_elements.is_empty() && self.pending_vertices.is_empty()
    }

    /// Values that were written at a less precise type than declared,
    /// first occurrence per field.
    pub fn degradations(&self) -> &[Degradation] {
        self.degradations.entries()
    }

    /// Queues a vertex whose id the store will assign.
    pub fn add_vertex(&mut self, fields: BTreeMap<String, Value>) -> Result<VertexHandle, TxError> {
        self.ensure_active()?;
        let handle = VertexHandle {
            transaction: self.id,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        self.pending_vertices.push(VertexDraft { handle, fields });
        Ok(handle)
    }

    /// Queues a vertex with a caller-chosen id; it is created by the batch.
    pub fn add_vertex_with_id(
        &mut self,
        id: impl Into<ElementId>,
        fields: BTreeMap<String, Value>,
    ) -> Result<(), TxError> {
        self.push(ElementKind::Vertex, Action::Create, Some(id.into()), fields, None)
    }

    /// Queues an edge between two vertices, either of which may be a draft
    /// of this transaction.
    pub fn add_edge(
        &mut self,
        out_v: impl Into<Endpoint>,
        in_v: impl Into<Endpoint>,
        label: impl Into<String>,
        fields: BTreeMap<String, Value>,
    ) -> Result<(), TxError> {
        self.push_edge(None, out_v.into(), in_v.into(), label.into(), fields)
    }

    /// Queues an edge with a caller-chosen id.
    pub fn add_edge_with_id(
        &mut self,
        id: impl Into<ElementId>,
        out_v: impl Into<Endpoint>,
        in_v: impl Into<Endpoint>,
        label: impl Into<String>,
        fields: BTreeMap<String, Value>,
    ) -> Result<(), TxError> {
        self.push_edge(Some(id.into()), out_v.into(), in_v.into(), label.into(), fields)
    }

    /// Queues a property update of an existing vertex.
    pub fn update_vertex(
        &mut self,
        id: impl Into<ElementId>,
        fields: BTreeMap<String, Value>,
    ) -> Result<(), TxError> {
        self.push(ElementKind::Vertex, Action::Update, Some(id.into()), fields, None)
    }

    /// Queues a property update of an existing edge.
    pub fn update_edge(
        &mut self,
        id: impl Into<ElementId>,
        fields: BTreeMap<String, Value>,
    ) -> Result<(), TxError> {
        self.push(ElementKind::Edge, Action::Update, Some(id.into()), fields, None)
    }

    /// Queues removal of a vertex, or only of the properties named in `keys`.
    pub fn remove_vertex(
        &mut self,
        id: impl Into<ElementId>,
        keys: Option<Vec<String>>,
    ) -> Result<(), TxError> {
        self.push(ElementKind::Vertex, Action::Delete, Some(id.into()), BTreeMap::new(), keys)
    }

    /// Queues removal of an edge, or only of the properties named in `keys`.
    pub fn remove_edge(
        &mut self,
        id: impl Into<ElementId>,
        keys: Option<Vec<String>>,
    ) -> Result<(), TxError> {
        self.push(ElementKind::Edge, Action::Delete, Some(id.into()), BTreeMap::new(), keys)
    }

    fn push(
        &mut self,
        kind: ElementKind,
        action: Action,
        id: Option<ElementId>,
        fields: BTreeMap<String, Value>,
        keys: Option<Vec<String>>,
    ) -> Result<(), TxError> {
        self.ensure_active()?;
        let mut element = GraphElementDraft::new(kind, action);
        element.id = id;
        element.fields = fields;
        element.keys = keys;
        self.pending_elements.push(element);
        Ok(())
    }

    fn push_edge(
        &mut self,
        id: Option<ElementId>,
        out_v: Endpoint,
        in_v: Endpoint,
        label: String,
        fields: BTreeMap<String, Value>,
    ) -> Result<(), TxError> {
        self.ensure_active()?;
        if label.is_empty() {
            return Err(TxError::EmptyLabel);
        }
        for handle in [out_v.handle(), in_v.handle()].into_iter().flatten() {
            self.check_handle(handle)?;
        }
        let mut element = GraphElementDraft::new(ElementKind::Edge, Action::Create);
        element.id = id;
        element.fields = fields;
        element.edge = Some(EdgeEnds { out_v, in_v, label });
        self.pending_elements.push(element);
        Ok(())
    }

    fn check_handle(&self, handle: VertexHandle) -> Result<(), TxError> {
        if handle.transaction != self.id {
            return Err(TxError::ForeignHandle { handle });
        }
        if handle.sequence >= self.next_sequence {
            return Err(TxError::UnknownHandle { handle });
        }
        Ok(())
    }

    pub(crate) fn ensure_active(&self) -> Result<(), TxError> {
        if self.state == TxState::Active {
            Ok(())
        } else {
            Err(TxError::Inactive { state: self.state })
        }
    }

    /// Moves both pending lists out, leaving the transaction empty.
    pub(crate) fn take_pending(&mut self) -> (Vec<GraphElementDraft>, Vec<VertexDraft>) {
        (
            std::mem::take(&mut self.pending_elements),
            std::mem::take(&mut self.pending_vertices),
        )
    }

    pub(crate) fn discard_pending_elements(&mut self) {
        self.pending_elements.clear();
    }

    pub(crate) fn record_degradations(&mut self, degradations: impl IntoIterator<Item = Degradation>) {
        self.degradations.extend(degradations);
    }

    /// Ends the transaction, clearing whatever is still queued.
    pub(crate) fn finish(&mut self, state: TxState) {
        self.pending_elements.clear();
        self.pending_vertices.clear();
        self.state = state;
        debug!(tx_id = self.id, ?state, "transaction finished");
    }
}
