#![allow(missing_docs)]

mod support;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rexbatch::encode::{ScalarType, TypeDeclaration};
use rexbatch::{
    fields, ClientConfig, CommitError, ElementId, GraphClient, TxError, TxState, TypeMap, Value,
};
use serde_json::json;
use support::{accepted, created, rejected, unreachable, ScriptedTransport, BATCH, VERTICES};

fn client(transport: ScriptedTransport) -> GraphClient<ScriptedTransport> {
    GraphClient::new(ClientConfig::default(), transport)
}

#[tokio::test]
async fn without_drafts_one_batch_keeps_insertion_order() {
    let client = client(ScriptedTransport::new().reply(BATCH, accepted()));
    let mut tx = client.begin();
    tx.update_vertex(1_i64, fields([("name", Value::from("marko"))]))
        .unwrap();
    tx.add_edge(1_i64, "v2", "knows", fields([("weight", Value::Double(0.5))]))
        .unwrap();
    tx.remove_edge("e7", None).unwrap();
    tx.add_vertex_with_id(100_i64, fields([("age", Value::from("29"))]))
        .unwrap();

    let outcome = client.commit(&mut tx).await.expect("commit");

    let requests = client.transport().requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].path, BATCH);
    assert_eq!(requests[0].header("content-type"), Some("application/json"));
    assert_eq!(
        requests[0].body,
        json!({"tx": [
            {"_id": 1, "_type": "vertex", "_action": "update", "name": "marko"},
            {"_type": "edge", "_action": "create", "_outV": 1, "_inV": "v2", "_label": "knows",
             "weight": "(d,0.5)"},
            {"_id": "e7", "_type": "edge", "_action": "delete"},
            {"_id": 100, "_type": "vertex", "_action": "create", "age": "(l,29)"}
        ]})
    );
    assert_eq!(outcome.results, json!({"success": true}));
    assert!(outcome.created_vertices.is_empty());
    assert_eq!(tx.state(), TxState::Committed);
    assert!(tx.is_empty());
}

#[tokio::test]
async fn drafts_are_created_first_and_edges_patched() {
    let transport = ScriptedTransport::new()
        .reply(VERTICES, created(10))
        .reply(VERTICES, created("v11"))
        .reply(VERTICES, created(12))
        .reply(BATCH, accepted());
    let client = client(transport);
    let mut tx = client.begin();
    let a = tx.add_vertex(fields([("name", Value::from("a"))])).unwrap();
    let b = tx.add_vertex(fields([("name", Value::from("b"))])).unwrap();
    let c = tx.add_vertex(fields([("name", Value::from("c"))])).unwrap();
    tx.add_edge(a, b, "knows", BTreeMap::new()).unwrap();
    tx.add_edge(c, 3_i64, "likes", BTreeMap::new()).unwrap();

    let outcome = client.commit(&mut tx).await.expect("commit");

    let requests = client.transport().requests();
    assert_eq!(requests.len(), 4);
    for (request, name) in requests[..3].iter().zip(["a", "b", "c"]) {
        assert_eq!(request.path, VERTICES);
        assert_eq!(
            request.header("Content-Type"),
            Some("application/vnd.rexster-typed-v1+json")
        );
        assert_eq!(request.body, json!({ "name": name }));
    }
    assert_eq!(requests[3].path, BATCH);
    assert_eq!(
        requests[3].body,
        json!({"tx": [
            {"_type": "edge", "_action": "create", "_outV": 10, "_inV": "v11", "_label": "knows"},
            {"_type": "edge", "_action": "create", "_outV": 12, "_inV": 3, "_label": "likes"}
        ]})
    );
    assert_eq!(outcome.id_of(a), Some(&ElementId::Int(10)));
    assert_eq!(outcome.id_of(b), Some(&ElementId::from("v11")));
    assert_eq!(outcome.id_of(c), Some(&ElementId::Int(12)));
    assert!(tx.pending_vertices().is_empty());
}

#[tokio::test]
async fn vertex_creations_are_in_flight_together() {
    // each creation waits until all three have been sent
    let transport = ScriptedTransport::new()
        .gate(VERTICES, 3)
        .reply(VERTICES, created(1))
        .reply(VERTICES, created(2))
        .reply(VERTICES, created(3))
        .reply(BATCH, accepted());
    let client = client(transport);
    let mut tx = client.begin();
    let handles: Vec<_> = (0..3)
        .map(|n| tx.add_vertex(fields([("n", Value::Long(n))])).unwrap())
        .collect();
    tx.add_edge(handles[0], handles[2], "knows", BTreeMap::new())
        .unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), client.commit(&mut tx))
        .await
        .expect("creation requests were sent one at a time")
        .expect("commit");

    assert_eq!(outcome.created_vertices.len(), 3);
    assert_eq!(client.transport().requests_to(VERTICES).len(), 3);
    assert_eq!(tx.state(), TxState::Committed);
}

#[tokio::test]
async fn josh_knows_peter() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .reply(VERTICES, created(1))
            .reply(VERTICES, created(2))
            .reply(BATCH, accepted()),
    );
    let client = GraphClient::new(ClientConfig::default(), Arc::clone(&transport));
    let mut tx = client.begin();
    let josh = tx.add_vertex(fields([("name", Value::from("josh"))])).unwrap();
    let peter = tx.add_vertex(fields([("name", Value::from("peter"))])).unwrap();
    tx.add_edge(josh, peter, "knows", BTreeMap::new()).unwrap();

    client.commit(&mut tx).await.expect("commit");

    assert_eq!(transport.requests_to(VERTICES).len(), 2);
    let batches = transport.requests_to(BATCH);
    assert_eq!(batches.len(), 1);
    let ops = batches[0].body["tx"].as_array().expect("tx array");
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0]["_outV"], json!(1));
    assert_eq!(ops[0]["_inV"], json!(2));
    assert_eq!(ops[0]["_label"], json!("knows"));
}

#[tokio::test]
async fn type_map_applies_to_drafts_and_batch() {
    let types = TypeMap::new()
        .with("age", TypeDeclaration::Scalar(ScalarType::Integer))
        .with("since", TypeDeclaration::Scalar(ScalarType::Long));
    let transport = ScriptedTransport::new()
        .reply(VERTICES, created(5))
        .reply(BATCH, accepted());
    let client = client(transport);
    let mut tx = client.begin_with_types(types);
    let v = tx
        .add_vertex(fields([("age", Value::Long(5_000_000_000)), ("zip", Value::from("02134"))]))
        .unwrap();
    tx.add_edge(v, 1_i64, "knows", fields([("since", Value::from("2011"))]))
        .unwrap();
    tx.update_vertex(9_i64, fields([("age", Value::Long(7_000_000_000))]))
        .unwrap();

    let outcome = client.commit(&mut tx).await.expect("commit");

    let requests = client.transport().requests();
    assert_eq!(
        requests[0].body,
        json!({"age": "(l,5000000000)", "zip": "02134"})
    );
    assert_eq!(requests[1].body["tx"][0]["since"], json!("(l,2011)"));
    assert_eq!(requests[1].body["tx"][1]["age"], json!("(l,7000000000)"));
    // both ages degrade, only the first is reported
    assert_eq!(outcome.degradations.len(), 1);
    assert_eq!(outcome.degradations[0].path, "age");
    assert_eq!(tx.degradations(), outcome.degradations.as_slice());
}

#[tokio::test]
async fn types_learned_from_results_apply_to_later_transactions() {
    let client = client(ScriptedTransport::new().reply(BATCH, accepted()));
    let mismatches = client.learn_types(&[
        json!({"_id": 1, "age": {"type": "integer", "value": 29}, "name": {"type": "string", "value": "marko"}}),
        json!({"_id": 2, "age": {"type": "long", "value": 31}}),
        json!({"_id": 3, "age": {"type": "float", "value": 1.5}}),
    ]);
    assert_eq!(mismatches.len(), 1);
    assert_eq!(mismatches["age"], "integer <=> long");

    let mut tx = client.begin();
    tx.update_vertex(
        1_i64,
        fields([("age", Value::from("30")), ("name", Value::from("7"))]),
    )
    .unwrap();
    client.commit(&mut tx).await.expect("commit");

    let batch = &client.transport().requests()[0].body["tx"][0];
    assert_eq!(batch["age"], json!("(f,30)"));
    assert_eq!(batch["name"], json!("(s,7)"));
    let learned = client.types().expect("type map");
    assert_eq!(learned.get("age"), Some(&TypeDeclaration::Scalar(ScalarType::Float)));
}

#[tokio::test]
async fn rejected_batch_without_drafts_is_returned_as_is() {
    let client = client(ScriptedTransport::new().reply(BATCH, rejected("vertex 1 not found")));
    let mut tx = client.begin();
    tx.remove_vertex(1_i64, Some(vec!["age".into()])).unwrap();

    let err = client.commit(&mut tx).await.unwrap_err();

    match &err {
        CommitError::Rejected { message, response } => {
            assert_eq!(message.as_deref(), Some("vertex 1 not found"));
            assert_eq!(response["success"], json!(false));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(err.code(), "StoreRejection");
    assert_eq!(client.transport().requests().len(), 1);
    assert_eq!(tx.state(), TxState::Failed);
}

#[tokio::test]
async fn batch_transport_failure_reports_created_vertices_without_compensation() {
    let transport = ScriptedTransport::new()
        .reply(VERTICES, created(21))
        .reply(BATCH, unreachable());
    let client = client(transport);
    let mut tx = client.begin();
    let v = tx.add_vertex(BTreeMap::new()).unwrap();
    tx.add_edge(v, 1_i64, "knows", BTreeMap::new()).unwrap();

    let err = client.commit(&mut tx).await.unwrap_err();

    assert!(matches!(err, CommitError::Transport { .. }));
    assert_eq!(err.orphaned(), &[ElementId::Int(21)]);
    // one creation, one batch, no delete batch
    assert_eq!(client.transport().requests().len(), 2);
    assert!(tx.is_empty());
}

#[tokio::test]
async fn committed_transaction_cannot_be_reused() {
    let client = client(ScriptedTransport::new().reply(BATCH, accepted()));
    let mut tx = client.begin();
    tx.update_edge("e1", fields([("weight", Value::Long(1))]))
        .unwrap();
    client.commit(&mut tx).await.expect("commit");

    let err = tx.add_vertex(BTreeMap::new()).unwrap_err();
    assert_eq!(
        err,
        TxError::Inactive {
            state: TxState::Committed
        }
    );
    let err = client.commit(&mut tx).await.unwrap_err();
    assert_eq!(err.code(), "Inactive");
    assert_eq!(client.transport().requests().len(), 1);
}
