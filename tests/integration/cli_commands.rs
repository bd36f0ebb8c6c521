#![allow(missing_docs)]

use std::fs;
use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::{json, Value};
use tempfile::TempDir;

fn write_json(dir: &TempDir, name: &str, value: &Value) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, serde_json::to_vec_pretty(value).expect("serialize")).expect("write file");
    path
}

fn stdout_json(output: &[u8]) -> Value {
    serde_json::from_slice(output).expect("stdout is JSON")
}

#[test]
fn encode_prints_typed_field_map() {
    let dir = TempDir::new().expect("tempdir");
    let input = write_json(
        &dir,
        "doc.json",
        &json!({"name": "josh", "age": 32, "active": "TRUE", "zip": "02134", "_id": 7}),
    );
    let types = write_json(&dir, "types.json", &json!({"age": "integer"}));

    let assert = cargo_bin_cmd!("rexbatch")
        .arg("encode")
        .arg(&input)
        .arg("--types")
        .arg(&types)
        .assert()
        .success();

    let report = stdout_json(&assert.get_output().stdout);
    assert_eq!(
        report["encoded"],
        json!({"name": "josh", "age": "(i,32)", "active": "(b,true)", "zip": "02134", "_id": 7})
    );
    assert_eq!(report["degradations"], json!([]));
}

#[test]
fn encode_literal_mode_nests() {
    let dir = TempDir::new().expect("tempdir");
    let input = write_json(&dir, "doc.json", &json!({"tags": ["a", 1], "geo": {"lat": 1.5}}));

    let assert = cargo_bin_cmd!("rexbatch")
        .args(["encode", "--literal"])
        .arg(&input)
        .assert()
        .success();

    let report = stdout_json(&assert.get_output().stdout);
    assert_eq!(
        report["encoded"],
        json!("(map,(geo=(map,(lat=(d,1.5))),tags=(list,(a,(l,1)))))")
    );
}

#[test]
fn encode_rejects_unknown_type_names() {
    let dir = TempDir::new().expect("tempdir");
    let input = write_json(&dir, "doc.json", &json!({"age": 1}));
    let types = write_json(&dir, "types.json", &json!({"age": "money"}));

    let assert = cargo_bin_cmd!("rexbatch")
        .arg("encode")
        .arg(&input)
        .arg("--types")
        .arg(&types)
        .assert()
        .failure()
        .code(1);
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).into_owned();
    assert!(stderr.contains("money"), "stderr: {stderr}");
}

#[test]
fn commit_against_unreachable_store_fails_with_report() {
    let dir = TempDir::new().expect("tempdir");
    let batch = write_json(
        &dir,
        "batch.json",
        &json!({"operations": [{"op": "updateVertex", "id": 1, "fields": {"name": "x"}}]}),
    );
    let config = dir.path().join("config.toml");
    fs::write(&config, "host = \"127.0.0.1\"\nport = 1\ntimeout_ms = 2000\n").expect("write config");

    let assert = cargo_bin_cmd!("rexbatch")
        .arg("--config")
        .arg(&config)
        .env_remove("REXBATCH_HOST")
        .env_remove("REXBATCH_PORT")
        .env_remove("REXBATCH_GRAPH")
        .arg("commit")
        .arg(&batch)
        .assert()
        .failure()
        .code(2);

    let report = stdout_json(&assert.get_output().stdout);
    assert_eq!(report["committed"], json!(false));
    assert_eq!(report["error"], json!("TransportFailure"));
    assert_eq!(report["orphaned"], json!([]));
}

#[test]
fn commit_rejects_unknown_refs_before_sending() {
    let dir = TempDir::new().expect("tempdir");
    let batch = write_json(
        &dir,
        "batch.json",
        &json!({"operations": [{"op": "addEdge", "out": "@nobody", "in": 2, "label": "knows"}]}),
    );
    let config = dir.path().join("config.toml");
    fs::write(&config, "port = 1\n").expect("write config");

    let assert = cargo_bin_cmd!("rexbatch")
        .arg("--config")
        .arg(&config)
        .arg("commit")
        .arg(&batch)
        .assert()
        .failure()
        .code(1);
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).into_owned();
    assert!(stderr.contains("@nobody"), "stderr: {stderr}");
}

#[test]
fn help_lists_subcommands() {
    let assert = cargo_bin_cmd!("rexbatch").arg("--help").assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    assert!(stdout.contains("encode"));
    assert!(stdout.contains("commit"));
}
