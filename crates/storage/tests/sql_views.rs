#![forbid(unsafe_code)]

use lix_core::model::StateWrite;
use lix_storage::{Lix, LixError, LixOptions};
use serde_json::json;

fn message(entity_id: &str, n: i64) -> StateWrite {
    StateWrite::new(entity_id, "inlang_message", "/messages.json", "inlang_plugin", json!({ "n": n }))
}

fn open() -> Lix {
    Lix::open(LixOptions::deterministic()).expect("open lix")
}

#[test]
fn state_view_is_queryable_like_a_table() {
    let mut lix = open();
    lix.insert_state(message("b", 2)).expect("insert");
    lix.insert_state(message("a", 1)).expect("insert");

    let result = lix
        .execute(
            "SELECT entity_id, json_extract(snapshot_content, '$.n') AS n FROM state \
             WHERE schema_key = 'inlang_message' ORDER BY entity_id",
            &[],
        )
        .expect("query");
    assert_eq!(result.columns, vec!["entity_id".to_string(), "n".to_string()]);
    assert_eq!(result.rows.len(), 2);
    assert_eq!(result.rows[0]["entity_id"], json!("a"));
    assert_eq!(result.rows[0]["n"], json!(1));
    assert_eq!(result.num_affected_rows, 0);

    let counted = lix
        .execute(
            "SELECT count(*) AS total FROM state_all s WHERE s.schema_key = ?1",
            &[json!("inlang_message")],
        )
        .expect("count");
    assert_eq!(counted.rows[0]["total"], json!(2));
}

#[test]
fn writes_only_invalidate_their_own_schema() {
    let mut lix = open();
    lix.insert_state(message("a", 1)).expect("insert message");
    lix.insert_state(StateWrite::new(
        "greeting",
        "inlang_bundle",
        "/messages.json",
        "inlang_plugin",
        json!({ "label": "hi" }),
    ))
    .expect("insert bundle");

    let messages = "SELECT entity_id FROM state WHERE schema_key = 'inlang_message'";
    let bundles = "SELECT entity_id FROM state WHERE schema_key = 'inlang_bundle'";
    lix.execute(messages, &[]).expect("read messages");
    lix.execute(bundles, &[]).expect("read bundles");
    assert_eq!(lix.cache_metrics().populations_for("inlang_message"), 1);
    assert_eq!(lix.cache_metrics().populations_for("inlang_bundle"), 1);

    lix.insert_state(message("b", 2)).expect("second message");
    assert_eq!(lix.execute(bundles, &[]).expect("bundles again").rows.len(), 1);
    assert_eq!(lix.cache_metrics().populations_for("inlang_bundle"), 1);

    assert_eq!(lix.execute(messages, &[]).expect("messages again").rows.len(), 2);
    assert_eq!(lix.cache_metrics().populations_for("inlang_message"), 2);
    assert_eq!(lix.cache_metrics().populations_for("inlang_bundle"), 1);
}

#[test]
fn pinned_reads_reuse_the_schema_cache() {
    let mut lix = open();
    lix.insert_state(message("a", 1)).expect("insert");
    let query = "SELECT entity_id FROM state WHERE schema_key = 'inlang_message'";

    lix.execute(query, &[]).expect("first read");
    assert_eq!(lix.cache_metrics().populations_for("inlang_message"), 1);
    lix.execute(query, &[]).expect("second read");
    lix.state(Some("inlang_message")).expect("api read");
    assert_eq!(lix.cache_metrics().populations_for("inlang_message"), 1);

    lix.insert_state(message("b", 2)).expect("insert");
    let rows = lix.execute(query, &[]).expect("read after write").rows;
    assert_eq!(rows.len(), 2);
    assert_eq!(lix.cache_metrics().populations_for("inlang_message"), 2);

    let generic_before = lix.cache_metrics().generic_materializations;
    let all = lix
        .execute("SELECT count(*) AS total FROM state", &[])
        .expect("unpinned read");
    assert_eq!(all.rows[0]["total"], json!(2));
    assert_eq!(lix.cache_metrics().generic_materializations, generic_before + 1);
    assert_eq!(lix.cache_metrics().total_populations(), 2);
}

#[test]
fn writes_through_state_views_are_rejected() {
    let mut lix = open();
    lix.insert_state(message("a", 1)).expect("insert");
    let err = lix
        .execute("DELETE FROM state WHERE entity_id = 'a'", &[])
        .unwrap_err();
    assert!(matches!(err, LixError::UnsupportedQuery(_)), "{err}");
    assert_eq!(lix.state(Some("inlang_message")).expect("state").len(), 1);
}

#[test]
fn changes_and_snapshots_are_immutable() {
    let mut lix = open();
    lix.insert_state(message("a", 1)).expect("insert");

    let err = lix
        .execute("UPDATE change SET entity_id = 'rewritten'", &[])
        .unwrap_err();
    assert_eq!(err.code(), "SQLITE");
    assert!(lix.execute("DELETE FROM snapshot", &[]).is_err());

    let remaining = lix
        .execute("SELECT count(*) AS n FROM change WHERE entity_id = 'a'", &[])
        .expect("count");
    assert_eq!(remaining.rows[0]["n"], json!(1));
}

#[test]
fn raw_writes_report_affected_rows_and_invalidate_caches() {
    let mut lix = open();
    let result = lix
        .execute(
            "INSERT INTO key_value(key, value) VALUES (?1, ?2)",
            &[json!("greeting"), json!("\"hi\"")],
        )
        .expect("insert");
    assert_eq!(result.num_affected_rows, 1);
    assert_eq!(lix.key_value("greeting").expect("read"), Some(json!("hi")));

    let bound = lix.execute("SELECT ?1 + 1 AS v", &[json!(41)]).expect("select");
    assert_eq!(bound.rows[0]["v"], json!(42));
}

#[test]
fn state_history_needs_a_pinned_change_set() {
    let mut lix = open();
    let first = lix.insert_state(message("a", 1)).expect("first")[0].clone();
    lix.insert_state(message("b", 1)).expect("second");
    let third = lix.insert_state(message("a", 2)).expect("third")[0].clone();

    let at_first = lix
        .state_history(&first.change_set_id, Some("inlang_message"))
        .expect("history");
    assert_eq!(at_first.len(), 1);
    assert_eq!(at_first[0].snapshot_content, json!({"n": 1}));
    assert_eq!(at_first[0].depth, 0);

    let sql = format!(
        "SELECT entity_id, depth, json_extract(snapshot_content, '$.n') AS n FROM state_history \
         WHERE change_set_id = '{}' ORDER BY entity_id",
        third.change_set_id
    );
    let rows = lix.execute(&sql, &[]).expect("history query").rows;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["entity_id"], json!("a"));
    assert_eq!(rows[0]["n"], json!(2));
    assert_eq!(rows[0]["depth"], json!(0));
    assert_eq!(rows[1]["entity_id"], json!("b"));
    assert_eq!(rows[1]["depth"], json!(1));

    let err = lix.execute("SELECT * FROM state_history", &[]).unwrap_err();
    assert!(matches!(err, LixError::UnsupportedQuery(_)));
}

#[test]
fn malformed_sql_is_reported() {
    let mut lix = open();
    let err = lix.execute("SELECT 1; SELECT 2", &[]).unwrap_err();
    assert_eq!(err.code(), "INVALID_SQL");
}
