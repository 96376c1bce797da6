#![forbid(unsafe_code)]

use lix_core::plugin::{ChangeDetectionPlugin, DetectedChange, PluginError};
use lix_storage::{ChangeQueueWorker, ChangeQueueWorkerConfig, Lix, LixError, LixOptions, WorkerState};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;

/// One `json_property` entity per top-level key of a JSON object.
struct JsonPlugin;

impl JsonPlugin {
    fn parse(bytes: Option<&[u8]>) -> Result<Map<String, Value>, PluginError> {
        let Some(bytes) = bytes else {
            return Ok(Map::new());
        };
        match serde_json::from_slice::<Value>(bytes) {
            Ok(Value::Object(map)) => Ok(map),
            _ => Err(PluginError::new("json_plugin", "not a json object")),
        }
    }
}

impl ChangeDetectionPlugin for JsonPlugin {
    fn key(&self) -> &str {
        "json_plugin"
    }

    fn glob(&self) -> &str {
        "*.json"
    }

    fn detect_changes(
        &self,
        before: Option<&[u8]>,
        after: Option<&[u8]>,
    ) -> Result<Vec<DetectedChange>, PluginError> {
        let before = Self::parse(before)?;
        let after = Self::parse(after)?;
        let mut changes = Vec::new();
        for (key, value) in &after {
            if before.get(key) != Some(value) {
                changes.push(DetectedChange {
                    schema_key: "json_property".to_string(),
                    schema_version: "1.0".to_string(),
                    entity_id: key.clone(),
                    snapshot: Some(json!({ "value": value })),
                });
            }
        }
        for key in before.keys() {
            if !after.contains_key(key) {
                changes.push(DetectedChange {
                    schema_key: "json_property".to_string(),
                    schema_version: "1.0".to_string(),
                    entity_id: key.clone(),
                    snapshot: None,
                });
            }
        }
        Ok(changes)
    }
}

/// Claims engine-owned entities, which the engine refuses.
struct RoguePlugin;

impl ChangeDetectionPlugin for RoguePlugin {
    fn key(&self) -> &str {
        "rogue"
    }

    fn glob(&self) -> &str {
        "*.rogue"
    }

    fn detect_changes(
        &self,
        _before: Option<&[u8]>,
        _after: Option<&[u8]>,
    ) -> Result<Vec<DetectedChange>, PluginError> {
        Ok(vec![DetectedChange {
            schema_key: "lix_key_value".to_string(),
            schema_version: "1.0".to_string(),
            entity_id: "hijacked".to_string(),
            snapshot: Some(json!({"value": true})),
        }])
    }
}

fn open() -> Lix {
    Lix::open(
        LixOptions::deterministic()
            .with_plugin(Arc::new(JsonPlugin))
            .with_plugin(Arc::new(RoguePlugin)),
    )
    .expect("open lix")
}

fn property(lix: &mut Lix, entity_id: &str) -> Option<Value> {
    lix.state(Some("json_property"))
        .expect("state")
        .into_iter()
        .find(|row| row.entity_id == entity_id)
        .map(|row| row.snapshot_content["value"].clone())
}

#[test]
fn file_writes_become_entity_changes() {
    let mut lix = open();
    assert_eq!(lix.plugin_keys(), vec!["json_plugin".to_string(), "rogue".to_string()]);

    lix.write_file("settings", "/settings.json", br#"{"a":1,"b":2}"#, None)
        .expect("write");
    assert_eq!(lix.pending_change_queue().expect("queue").len(), 1);

    let report = lix.process_change_queue().expect("process");
    assert_eq!(report.processed, 1);
    assert_eq!(report.detected_changes, 2);
    assert!(lix.pending_change_queue().expect("queue").is_empty());

    let rows = lix.state(Some("json_property")).expect("state");
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| row.file_id == "settings" && row.plugin_key == "json_plugin"));

    lix.write_file("settings", "/settings.json", br#"{"a":1,"c":3}"#, Some(json!({"tab": 2})))
        .expect("rewrite");
    let report = lix.process_change_queue().expect("process");
    assert_eq!(report.detected_changes, 2);
    assert_eq!(property(&mut lix, "a"), Some(json!(1)));
    assert_eq!(property(&mut lix, "b"), None);
    assert_eq!(property(&mut lix, "c"), Some(json!(3)));

    let file = lix.file("settings").expect("read").expect("exists");
    assert_eq!(file.metadata, Some(json!({"tab": 2})));

    assert!(lix.delete_file("settings").expect("delete"));
    assert!(!lix.delete_file("settings").expect("second delete"));
    lix.process_change_queue().expect("process");
    assert!(lix.state(Some("json_property")).expect("state").is_empty());
    assert!(lix.files().expect("files").is_empty());
}

#[test]
fn unhandled_and_failing_entries() {
    let mut lix = open();
    lix.write_file("notes", "/notes.txt", b"plain text", None).expect("write");
    lix.write_file("broken", "/broken.json", b"[1, 2", None).expect("write");
    lix.write_file("rogue", "/x.rogue", b"anything", None).expect("write");
    lix.write_file("ok", "/ok.json", br#"{"k":"v"}"#, None).expect("write");

    let report = lix.process_change_queue().expect("process");
    assert_eq!(report.unhandled, 1);
    assert_eq!(report.failed, 2);
    assert_eq!(report.processed, 1);

    let failed = lix.failed_change_queue().expect("failed");
    assert_eq!(failed.len(), 2);
    assert_eq!(failed[0].path, "/broken.json");
    assert!(failed[0].error.as_deref().is_some_and(|e| e.contains("not a json object")));
    assert!(failed[1].error.as_deref().is_some_and(|e| e.contains("plugin_key")));
    assert!(failed.iter().all(|entry| entry.failed_at.is_some()));

    assert_eq!(lix.key_value("hijacked").expect("read"), None);
    assert_eq!(property(&mut lix, "k"), Some(json!("v")));
    assert_eq!(lix.process_change_queue().expect("rerun"), Default::default());
}

#[test]
fn skipped_scopes_write_files_without_queueing() {
    let mut lix = open();
    lix.with_skipped_change_queue(|lix| {
        lix.write_file("quiet", "/quiet.json", br#"{"a":1}"#, None)?;
        lix.with_skipped_change_queue(|lix| lix.write_file("nested", "/nested.json", b"{}", None))
    })
    .expect("skipped writes");
    assert!(lix.pending_change_queue().expect("queue").is_empty());
    assert_eq!(lix.files().expect("files").len(), 2);

    lix.write_file("loud", "/loud.json", br#"{"a":1}"#, None).expect("write");
    assert_eq!(lix.pending_change_queue().expect("queue").len(), 1);

    let err = lix.write_file("bad", "relative.json", b"{}", None).unwrap_err();
    assert!(matches!(err, LixError::InvalidInput(_)));
}

#[tokio::test]
async fn worker_drains_in_the_background() {
    let lix = Arc::new(tokio::sync::Mutex::new(open()));
    let worker = ChangeQueueWorker::spawn(
        lix.clone(),
        ChangeQueueWorkerConfig {
            poll_interval: Duration::from_secs(3600),
        },
    );

    lix.lock()
        .await
        .write_file("a", "/a.json", br#"{"x":1}"#, None)
        .expect("write");
    lix.lock()
        .await
        .write_file("broken", "/broken.json", b"nope", None)
        .expect("write");

    let status = worker.settled().await.expect("settled");
    assert_ne!(status.state, WorkerState::Stopped);
    assert_eq!(status.processed_entries, 1);
    assert_eq!(status.failed_entries, 1);

    {
        let mut guard = lix.lock().await;
        assert!(guard.pending_change_queue().expect("queue").is_empty());
        assert_eq!(property(&mut guard, "x"), Some(json!(1)));
        guard
            .write_file("a", "/a.json", br#"{"x":2}"#, None)
            .expect("rewrite");
    }

    worker.settled().await.expect("settled again");
    assert_eq!(property(&mut *lix.lock().await, "x"), Some(json!(2)));
    assert!(worker.status().completed_run >= 2);

    worker.shutdown().await;
}

#[tokio::test]
async fn zero_poll_interval_still_settles() {
    let lix = Arc::new(tokio::sync::Mutex::new(open()));
    let worker = ChangeQueueWorker::spawn(
        lix.clone(),
        ChangeQueueWorkerConfig {
            poll_interval: Duration::ZERO,
        },
    );
    lix.lock()
        .await
        .write_file("a", "/a.json", br#"{"x":1}"#, None)
        .expect("write");

    let status = tokio::time::timeout(Duration::from_secs(5), worker.settled())
        .await
        .expect("settled in time")
        .expect("settled");
    assert_ne!(status.state, WorkerState::Stopped);
    assert_eq!(status.processed_entries, 1);
    assert_eq!(property(&mut *lix.lock().await, "x"), Some(json!(1)));

    worker.shutdown().await;
}

/// Declares a pattern globset cannot compile.
struct BadGlobPlugin;

impl ChangeDetectionPlugin for BadGlobPlugin {
    fn key(&self) -> &str {
        "bad_glob"
    }

    fn glob(&self) -> &str {
        "[unclosed"
    }

    fn detect_changes(
        &self,
        _before: Option<&[u8]>,
        _after: Option<&[u8]>,
    ) -> Result<Vec<DetectedChange>, PluginError> {
        Ok(Vec::new())
    }
}

#[test]
fn invalid_plugin_glob_fails_open() {
    let err = Lix::open(LixOptions::default().with_plugin(Arc::new(BadGlobPlugin))).unwrap_err();
    assert_eq!(err.code(), "PLUGIN");
    match err {
        LixError::Plugin(plugin) => assert_eq!(plugin.plugin_key, "bad_glob"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn panicking_skip_scope_restores_queueing() {
    let mut lix = open();
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        lix.with_skipped_change_queue(|_| -> Result<(), LixError> { panic!("editor crashed") })
    }));
    assert!(outcome.is_err());

    lix.write_file("after", "/after.json", br#"{"a":1}"#, None).expect("write");
    assert_eq!(lix.pending_change_queue().expect("queue").len(), 1);
}
