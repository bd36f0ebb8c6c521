use std::collections::BTreeMap;

use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use tracing::warn;

use crate::commit::{CommitCoordinator, CommitError, CommitOutcome, Endpoints};
use crate::config::ClientConfig;
use crate::encode::TypeMap;
use crate::error::Result;
use crate::transaction::Transaction;
use crate::transport::{HttpTransport, Transport};

/// Entry point: opens transactions and commits them against one graph.
///
/// # Example
///
/// ```rust,no_run
/// use rexbatch::{fields, ClientConfig, GraphClient, Value};
///
/// # async fn run() -> rexbatch::Result<()> {
/// let client = GraphClient::connect(ClientConfig::default())?;
/// let mut tx = client.begin();
/// let josh = tx.add_vertex(fields([("name", Value::from("josh"))]))?;
/// tx.add_edge(josh, 1_i64, "knows", Default::default())?;
/// let outcome = client.commit(&mut tx).await?;
/// println!("josh is {:?}", outcome.id_of(josh));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct GraphClient<T: Transport = HttpTransport> {
    config: ClientConfig,
    transport: T,
    types: RwLock<Option<TypeMap>>,
}

impl GraphClient<HttpTransport> {
    /// Validates `config` and builds an HTTP client for it.
    pub fn connect(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::new(&config)?;
        Ok(Self::new(config, transport))
    }
}

impl<T: Transport> GraphClient<T> {
    /// Client sending requests through `transport`.
    pub fn new(config: ClientConfig, transport: T) -> Self {
        Self {
            config,
            transport,
            types: RwLock::new(None),
        }
    }

    /// Sets the type map used by [`begin`](Self::begin).
    pub fn with_types(mut self, types: TypeMap) -> Self {
        *self.types.get_mut() = Some(types);
        self
    }

    /// Snapshot of the client's type map.
    pub fn types(&self) -> Option<TypeMap> {
        self.types.read().clone()
    }

    /// Merges the declarations implied by typed store results (see
    /// [`TypeMap::from_typed_results`]) into the client's type map, so
    /// transactions opened afterwards write those properties at the types the
    /// store reported.
    ///
    /// Returns the first type conflict seen for each property.
    pub fn learn_types(&self, results: &[JsonValue]) -> BTreeMap<String, String> {
        let (captured, mismatches) = TypeMap::from_typed_results(results);
        for (field, conflict) in &mismatches {
            warn!(field = field.as_str(), conflict = conflict.as_str(), "typed results disagree on property type");
        }
        if !captured.is_empty() {
            self.types.write().get_or_insert_with(TypeMap::new).merge(captured);
        }
        mismatches
    }

    /// Configuration in use.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Transport in use.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Opens a transaction under the client's type map, if any.
    pub fn begin(&self) -> Transaction {
        match &*self.types.read() {
            Some(types) => Transaction::with_types(types.clone()),
            None => Transaction::new(),
        }
    }

    /// Opens a transaction under `types`.
    pub fn begin_with_types(&self, types: TypeMap) -> Transaction {
        Transaction::with_types(types)
    }

    /// Commits `tx`; see [`CommitCoordinator`].
    pub async fn commit(
        &self,
        tx: &mut Transaction,
    ) -> std::result::Result<CommitOutcome, CommitError> {
        CommitCoordinator::new(&self.transport, Endpoints::from(&self.config))
            .commit(tx)
            .await
    }
}
