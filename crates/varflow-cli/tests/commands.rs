//! Integration tests for the command layer.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;
use tempfile::TempDir;
use varflow_cli::cli::{NormalizeArgs, ReplayArgs, RequestArgs, SessionArgs};
use varflow_cli::commands::{replay_text, run_deps, run_normalize, run_replay, run_request, run_triggers};
use varflow_cli::config::{EngineConfig, load_config};
use varflow_stream::StreamStatus;

const SESSION: &str = r#"{
    "variables": [
        {
            "__typename": "DerivedVariable",
            "uid": "total",
            "variables": [
                {"__typename": "SingleVariable", "uid": "a", "default": 1},
                {"__typename": "DataVariable", "uid": "sales"}
            ],
            "deps": [0]
        },
        {"__typename": "SingleVariable", "uid": "a", "default": 1}
    ],
    "values": {"a": 5}
}"#;

fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn session_args(dir: &TempDir) -> SessionArgs {
    SessionArgs {
        session: write_file(dir.path(), "session.json", SESSION),
    }
}

#[test]
fn normalize_snapshot() {
    let dir = TempDir::new().unwrap();
    let args = NormalizeArgs {
        session: session_args(&dir),
        trigger: None,
        preload: false,
    };
    let payload = run_normalize(&args, &EngineConfig::default()).unwrap();
    insta::assert_json_snapshot!(payload, @r#"
    {
      "data": [
        {
          "type": "derived",
          "uid": "total",
          "values": [
            {
              "__ref": "SingleVariable:a"
            },
            {
              "__ref": "DataVariable:sales"
            }
          ],
          "deps": [
            0
          ],
          "force_key": null
        },
        {
          "__ref": "SingleVariable:a"
        }
      ],
      "lookup": {
        "DataVariable:sales": {
          "filters": null,
          "type": "data",
          "uid": "sales"
        },
        "SingleVariable:a": 5
      }
    }
    "#);
}

#[test]
fn normalize_with_trigger_stamps_owner() {
    let dir = TempDir::new().unwrap();
    let args = NormalizeArgs {
        session: session_args(&dir),
        trigger: Some(1),
        preload: false,
    };
    let payload = run_normalize(&args, &EngineConfig::default()).unwrap();
    assert!(payload.data[0].force_key().is_some());
    assert!(payload.data[1].force_key().is_none());
}

#[test]
fn preload_rejects_stream_session() {
    let dir = TempDir::new().unwrap();
    let session = write_file(
        dir.path(),
        "stream.json",
        r#"{"variables": [{"__typename": "StreamVariable", "uid": "ticks"}]}"#,
    );
    let args = NormalizeArgs {
        session: SessionArgs { session },
        trigger: None,
        preload: true,
    };
    let err = run_normalize(&args, &EngineConfig::default()).unwrap_err();
    assert!(format!("{err:#}").contains("ticks"));
}

#[test]
fn request_uses_configured_channel_and_force_key() {
    let dir = TempDir::new().unwrap();
    let config_path = write_file(dir.path(), "varflow.toml", "ws_channel = \"test-channel\"\n");
    let config = load_config(Some(&config_path)).unwrap();
    let args = RequestArgs {
        session: session_args(&dir),
        uid: "total".to_string(),
        trigger: Some(0),
        force_key: Some("fixed".to_string()),
    };
    let request = run_request(&args, &config).unwrap();
    assert_eq!(request.ws_channel, "test-channel");
    assert_eq!(request.force_key.as_deref(), Some("fixed"));
    assert_eq!(request.values.data.len(), 2);
}

#[test]
fn request_for_unknown_uid_fails() {
    let dir = TempDir::new().unwrap();
    let args = RequestArgs {
        session: session_args(&dir),
        uid: "missing".to_string(),
        trigger: None,
        force_key: None,
    };
    assert!(run_request(&args, &EngineConfig::default()).is_err());
}

#[test]
fn triggers_and_deps_listing() {
    let dir = TempDir::new().unwrap();
    let args = session_args(&dir);
    let config = EngineConfig::default();

    let triggers = run_triggers(&args, &config).unwrap();
    let uids: Vec<&str> = triggers.iter().map(|t| t.uid.as_str()).collect();
    assert_eq!(uids, vec!["total", "sales"]);
    assert!(triggers.iter().all(|t| t.variable_index == 0));

    let deps = run_deps(&args, &config).unwrap();
    assert_eq!(deps[0].observed, json!([5]));
    assert_eq!(deps[1].observed, json!(5));
}

#[test]
fn replay_file_with_key_accessor() {
    let dir = TempDir::new().unwrap();
    let events = write_file(
        dir.path(),
        "events.ndjson",
        concat!(
            r#"{"type":"add","data":[{"id":"a","n":1},{"id":"b","n":2}]}"#,
            "\n",
            "garbage\n",
            r#"{"type":"add","data":{"id":"a","n":3}}"#,
            "\n",
        ),
    );
    let args = ReplayArgs {
        events,
        key_accessor: Some("id".to_string()),
    };
    let report = run_replay(&args, &EngineConfig::default()).unwrap();
    assert_eq!(report.events, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.status, Some(StreamStatus::Connected));
    assert_eq!(report.value, Some(json!([{"id": "a", "n": 3}, {"id": "b", "n": 2}])));
}

#[test]
fn replay_reports_backoff_and_patch_failure() {
    let text = concat!(
        r#"{"type":"json_snapshot","data":{"count":1}}"#, "\n",
        r#"{"type":"reconnect"}"#, "\n",
        r#"{"type":"reconnect"}"#, "\n",
        r#"{"type":"reconnect"}"#, "\n",
        r#"{"type":"json_patch","data":[{"op":"remove","path":"/missing"}]}"#,
    );
    let report = replay_text(text, None, &EngineConfig::default());
    assert_eq!(report.reconnect_delays_ms, vec![1000, 2000, 4000]);
    assert_eq!(report.status, Some(StreamStatus::Error));
    assert!(report.error.as_deref().unwrap().starts_with("Patch failed"));
    assert_eq!(report.value, Some(json!({"count": 1})));
}
