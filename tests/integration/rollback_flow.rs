#![allow(missing_docs)]

mod support;

use std::collections::BTreeMap;

use rexbatch::{
    fields, ClientConfig, CommitError, ElementId, FailureCause, GraphClient, RollbackFailure,
    TxState, Value,
};
use serde_json::json;
use support::{accepted, created, rejected, unreachable, ScriptedTransport, BATCH, VERTICES};

fn client(transport: ScriptedTransport) -> GraphClient<ScriptedTransport> {
    GraphClient::new(ClientConfig::default(), transport)
}

fn deletes(ids: &[serde_json::Value]) -> serde_json::Value {
    let ops: Vec<_> = ids
        .iter()
        .map(|id| json!({"_id": id, "_type": "vertex", "_action": "delete"}))
        .collect();
    json!({ "tx": ops })
}

#[tokio::test]
async fn failed_drafts_delete_the_others() {
    let transport = ScriptedTransport::new()
        .reply(VERTICES, created(1))
        .reply(VERTICES, rejected("duplicate key"))
        .reply(VERTICES, created(3))
        .reply(VERTICES, unreachable())
        .reply(BATCH, accepted());
    let client = client(transport);
    let mut tx = client.begin();
    let handles: Vec<_> = (0..4)
        .map(|n| tx.add_vertex(fields([("n", Value::Long(n))])).unwrap())
        .collect();
    tx.add_edge(handles[0], handles[1], "knows", BTreeMap::new())
        .unwrap();

    let err = client.commit(&mut tx).await.unwrap_err();

    match &err {
        CommitError::RolledBack {
            cause: FailureCause::PartialCreation { failed, attempted },
            compensated,
        } => {
            assert_eq!(*attempted, 4);
            assert_eq!(*compensated, 2);
            let failed_handles: Vec<_> = failed.iter().map(|f| f.handle).collect();
            assert_eq!(failed_handles, vec![handles[1], handles[3]]);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(err.orphaned().is_empty());

    let batches = client.transport().requests_to(BATCH);
    assert_eq!(batches.len(), 1, "only the delete batch is sent");
    assert_eq!(batches[0].body, deletes(&[json!(1), json!(3)]));
    assert_eq!(tx.state(), TxState::RolledBack);
    assert!(tx.is_empty());
}

#[tokio::test]
async fn failed_delete_batch_lists_orphans() {
    let transport = ScriptedTransport::new()
        .reply(VERTICES, created(1))
        .reply(VERTICES, created(2))
        .reply(VERTICES, rejected("bad property"))
        .reply(BATCH, unreachable());
    let client = client(transport);
    let mut tx = client.begin();
    for _ in 0..3 {
        tx.add_vertex(BTreeMap::new()).unwrap();
    }

    let err = client.commit(&mut tx).await.unwrap_err();

    match &err {
        CommitError::RollbackExhausted {
            orphaned, failure, ..
        } => {
            assert_eq!(orphaned, &vec![ElementId::Int(1), ElementId::Int(2)]);
            assert!(matches!(failure, RollbackFailure::Transport(_)));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(err.code(), "RollbackExhausted");
    assert_eq!(err.orphaned(), &[ElementId::Int(1), ElementId::Int(2)]);
    assert_eq!(tx.state(), TxState::RollbackExhausted);
}

fn nine_then_rejection(delete_reply: support::Reply) -> ScriptedTransport {
    ScriptedTransport::new()
        .reply(VERTICES, created("9"))
        .reply(VERTICES, rejected("no"))
        .reply(BATCH, delete_reply)
}

#[tokio::test]
async fn nine_is_rolled_back_when_delete_succeeds() {
    let client = client(nine_then_rejection(accepted()));
    let mut tx = client.begin();
    tx.add_vertex(fields([("name", Value::from("a"))])).unwrap();
    tx.add_vertex(fields([("name", Value::from("b"))])).unwrap();

    let err = client.commit(&mut tx).await.unwrap_err();

    assert!(matches!(err, CommitError::RolledBack { compensated: 1, .. }));
    assert!(err.orphaned().is_empty());
    assert!(err.to_string().contains("Transaction has been rolled back"));
    assert_eq!(
        client.transport().requests_to(BATCH)[0].body,
        deletes(&[json!("9")])
    );
}

#[tokio::test]
async fn nine_is_orphaned_when_delete_fails() {
    let client = client(nine_then_rejection(rejected("locked")));
    let mut tx = client.begin();
    tx.add_vertex(fields([("name", Value::from("a"))])).unwrap();
    tx.add_vertex(fields([("name", Value::from("b"))])).unwrap();

    let err = client.commit(&mut tx).await.unwrap_err();

    assert_eq!(err.orphaned(), &[ElementId::from("9")]);
    assert!(matches!(
        err,
        CommitError::RollbackExhausted {
            failure: RollbackFailure::Rejected { .. },
            ..
        }
    ));
    assert!(err
        .to_string()
        .contains("Unable to roll back newly created vertices [9]"));
}

#[tokio::test]
async fn batch_rejection_after_creation_rolls_back() {
    let transport = ScriptedTransport::new()
        .reply(VERTICES, created(5))
        .reply(BATCH, rejected("edge label not allowed"))
        .reply(BATCH, accepted());
    let client = client(transport);
    let mut tx = client.begin();
    let v = tx.add_vertex(BTreeMap::new()).unwrap();
    tx.add_edge(v, 1_i64, "forbidden", BTreeMap::new()).unwrap();

    let err = client.commit(&mut tx).await.unwrap_err();

    match &err {
        CommitError::RolledBack {
            cause: FailureCause::StoreRejection { message, .. },
            compensated: 1,
        } => assert_eq!(message.as_deref(), Some("edge label not allowed")),
        other => panic!("unexpected {other:?}"),
    }
    let batches = client.transport().requests_to(BATCH);
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[1].body, deletes(&[json!(5)]));
}

#[tokio::test]
async fn nothing_to_compensate_when_every_draft_fails() {
    let transport = ScriptedTransport::new()
        .reply(VERTICES, unreachable())
        .reply(VERTICES, rejected("no"));
    let client = client(transport);
    let mut tx = client.begin();
    tx.add_vertex(BTreeMap::new()).unwrap();
    tx.add_vertex(BTreeMap::new()).unwrap();
    tx.update_vertex(4_i64, fields([("x", Value::Long(1))]))
        .unwrap();

    let err = client.commit(&mut tx).await.unwrap_err();

    assert!(matches!(err, CommitError::RolledBack { compensated: 0, .. }));
    assert!(client.transport().requests_to(BATCH).is_empty());
    assert_eq!(client.transport().requests().len(), 2);
    assert!(tx.is_empty());
    assert_eq!(tx.state(), TxState::RolledBack);
}
