//! Contract tests for the tool interface.
//!
//! These tests pin the JSON shapes agents depend on. Changing a field name
//! here is a breaking change for every caller.
//!
//! ```text
//! scan                  -> graph statistics
//! dead_code_analyze     -> { unreachable, entry_points_used, summary }
//! stale_files_analyze   -> { stale_days, generated_at, stale_files, untracked, diagnostics }
//! session_*             -> snapshot / { ok } / { score }
//! ```

use polyindex::*;
use serde_json::{Value, json};
use std::fs;
use std::path::PathBuf;
use std::process::Command;

fn copy_fixture() -> tempfile::TempDir {
    let src_root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/mixed");
    let temp = tempfile::tempdir().expect("tempdir");
    for entry in walkdir::WalkDir::new(&src_root) {
        let entry = entry.expect("walkdir entry");
        let dest = temp.path().join(entry.path().strip_prefix(&src_root).unwrap());
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest).expect("create dir");
        } else {
            fs::copy(entry.path(), &dest).expect("copy file");
        }
    }
    temp
}

async fn call(state: &IndexState, name: &str, arguments: Value) -> Value {
    dispatch(state, &ToolCall::new(name, arguments))
        .await
        .unwrap_or_else(|e| panic!("{name} failed: {e}"))
}

fn assert_fields(value: &Value, fields: &[&str]) {
    for field in fields {
        assert!(value.get(field).is_some(), "missing field {field:?} in {value}");
    }
}

// =============================================================================
// ANALYSIS TOOLS
// =============================================================================

#[tokio::test]
async fn contract_scan_schema() {
    let temp = copy_fixture();
    let state = IndexState::new(temp.path(), IndexConfig::default()).unwrap();

    let result = call(&state, "scan", json!({})).await;
    assert_fields(
        &result,
        &[
            "files",
            "symbols",
            "edges",
            "dangling_edges",
            "cross_language_edges",
            "entry_files",
            "parse_failures",
            "elapsed_ms",
        ],
    );
    assert_eq!(result["files"], 7);
    assert!(result["parse_failures"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn contract_dead_code_schema() {
    let temp = copy_fixture();
    let state = IndexState::new(temp.path(), IndexConfig::default()).unwrap();

    // Scans on demand
    let result = call(&state, "dead_code_analyze", Value::Null).await;
    assert_fields(&result, &["unreachable", "entry_points_used", "summary"]);
    assert_fields(
        &result["summary"],
        &["total_symbols", "roots", "reachable", "unreachable", "dangling_edges"],
    );

    let first = &result["unreachable"][0];
    assert_fields(
        first,
        &["id", "name", "qualified_name", "kind", "language", "file", "lines", "exported"],
    );
    assert_eq!(first["name"], "stale_report");
    assert_eq!(first["file"], "api/main.py");
    assert_eq!(first["kind"], "function");
    assert_eq!(first["language"], "python");
}

#[tokio::test]
async fn contract_stale_files_schema() {
    let temp = copy_fixture();
    let state = IndexState::new(temp.path(), IndexConfig::default()).unwrap();

    let result = call(&state, "stale_files_analyze", json!({ "stale_days": 30 })).await;
    assert_fields(
        &result,
        &["stale_days", "generated_at", "stale_files", "untracked", "diagnostics"],
    );
    assert_eq!(result["stale_days"], 30);
    assert!(result.get("deletion_candidates").is_none());

    let with_candidates = call(
        &state,
        "stale_files_analyze",
        json!({ "candidates": true }),
    )
    .await;
    assert!(with_candidates["deletion_candidates"].is_array());
}

// =============================================================================
// SESSION TOOLS
// =============================================================================

#[tokio::test]
async fn contract_session_schema() {
    let temp = tempfile::tempdir().unwrap();
    let state = IndexState::new(temp.path(), IndexConfig::default()).unwrap();

    let opened = call(&state, "session_open", json!({ "session_id": "s" })).await;
    assert_fields(&opened, &["id", "workspace", "files", "queries", "edits", "idle_secs"]);

    let added = call(
        &state,
        "session_add_file",
        json!({ "session_id": "s", "path": "src/lib.rs" }),
    )
    .await;
    assert_eq!(added, json!({ "ok": true }));

    let boost = call(
        &state,
        "session_boost",
        json!({ "session_id": "s", "path": "src/lib.rs" }),
    )
    .await;
    assert_fields(&boost, &["session_id", "path", "score"]);
    assert!(boost["score"].as_f64().unwrap() > BASELINE_BOOST);

    let evicted = call(&state, "session_evict_expired", json!({})).await;
    assert_eq!(evicted, json!({ "evicted": [] }));
}

// =============================================================================
// ERRORS
// =============================================================================

#[tokio::test]
async fn contract_errors_fail_the_call() {
    let temp = tempfile::tempdir().unwrap();
    let state = IndexState::new(temp.path(), IndexConfig::default()).unwrap();

    let unknown = dispatch(&state, &ToolCall::new("search", json!({}))).await;
    assert!(matches!(unknown, Err(IndexError::UnknownTool(_))));

    let blank_session = dispatch(
        &state,
        &ToolCall::new("session_add_query", json!({ "session_id": "", "query": "q" })),
    )
    .await;
    assert!(matches!(blank_session, Err(IndexError::UnknownSession(_))));

    let bad_days = dispatch(
        &state,
        &ToolCall::new("stale_files_analyze", json!({ "stale_days": -3 })),
    )
    .await;
    assert!(matches!(bad_days, Err(IndexError::InvalidConfiguration(_))));
}

#[test]
fn contract_cli_json_error_schema() {
    let output = Command::new(env!("CARGO_BIN_EXE_polyindex"))
        .args(["tool", "--json", "--workspace", env!("CARGO_MANIFEST_DIR"), "nope"])
        .output()
        .expect("Failed to execute polyindex CLI");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    let json: Value = serde_json::from_str(&stderr).unwrap_or(Value::Null);
    assert!(json["error"].is_string(), "stderr: {stderr}");
}
