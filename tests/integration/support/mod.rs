#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rexbatch::{Transport, TransportError};
use serde_json::{json, Value as JsonValue};
use tokio::sync::Barrier;

pub const VERTICES: &str = "/vertices";
pub const BATCH: &str = "/tp/batch/tx";

pub type Reply = Result<JsonValue, TransportError>;

/// One request seen by [`ScriptedTransport`].
#[derive(Debug, Clone)]
pub struct Request {
    pub path: String,
    pub body: JsonValue,
    pub headers: Vec<(String, String)>,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// In-memory transport answering each path from a queue of scripted
/// replies and recording every request it receives. A gated path holds
/// each request at a barrier until enough of them are in flight.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<Request>>,
    gates: Mutex<HashMap<String, Arc<Barrier>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, path: &str, reply: Reply) -> Self {
        self.replies
            .lock()
            .entry(path.to_owned())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn gate(self, path: &str, in_flight: usize) -> Self {
        self.gates
            .lock()
            .insert(path.to_owned(), Arc::new(Barrier::new(in_flight)));
        self
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<Request> {
        self.requests
            .lock()
            .iter()
            .filter(|request| request.path == path)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn post(
        &self,
        path: &str,
        body: &JsonValue,
        headers: &[(&str, &str)],
    ) -> Result<JsonValue, TransportError> {
        self.requests.lock().push(Request {
            path: path.to_owned(),
            body: body.clone(),
            headers: headers
                .iter()
                .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
                .collect(),
        });
        let gate = self.gates.lock().get(path).cloned();
        if let Some(gate) = gate {
            gate.wait().await;
        }
        self.replies
            .lock()
            .get_mut(path)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(TransportError::Unreachable(format!("no reply scripted for {path}"))))
    }
}

pub fn created(id: impl Into<JsonValue>) -> Reply {
    Ok(json!({"version": "2.5.0", "queryTime": 1.2, "results": {"_id": id.into(), "_type": "vertex"}}))
}

pub fn accepted() -> Reply {
    Ok(json!({"version": "2.5.0", "queryTime": 4.1, "txProcessed": 1, "success": true}))
}

pub fn rejected(message: &str) -> Reply {
    Ok(json!({"success": false, "message": message}))
}

pub fn unreachable() -> Reply {
    Err(TransportError::Unreachable("connection refused".into()))
}
