#![forbid(unsafe_code)]

use lix_core::model::{Account, StateWrite};
use lix_storage::{CreateChange, Lix, LixError, LixOptions};
use rusqlite::{Connection, DatabaseName};
use serde_json::json;

fn message(entity_id: &str, n: i64) -> StateWrite {
    StateWrite::new(entity_id, "inlang_message", "/messages.json", "inlang_plugin", json!({ "n": n }))
}

fn foreign_database_image() -> Vec<u8> {
    let conn = Connection::open_in_memory().expect("open sqlite");
    conn.execute_batch("CREATE TABLE notes(id INTEGER PRIMARY KEY, body TEXT);")
        .expect("create table");
    conn.serialize(DatabaseName::Main).expect("serialize").to_vec()
}

#[test]
fn blob_round_trip_preserves_everything() {
    let mut lix = Lix::open(LixOptions::deterministic()).expect("open lix");
    lix.insert_state(message("a", 1)).expect("insert");
    lix.insert_state(message("setting", 1).untracked()).expect("untracked");
    lix.set_key_value("theme", json!("dark")).expect("key value");
    let last_id = lix.generate_id().expect("id");
    let main = lix.active_version().expect("active");

    let blob = lix.to_blob().expect("blob");
    lix.close().expect("close");

    let mut restored = Lix::open(LixOptions::default().with_blob(blob)).expect("restore");
    assert_eq!(restored.active_version().expect("active"), main);
    assert_eq!(restored.key_value("theme").expect("read"), Some(json!("dark")));
    let rows = restored.state(Some("inlang_message")).expect("state");
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().any(|row| row.entity_id == "setting" && row.untracked));

    let next_id = restored.generate_id().expect("id");
    assert!(next_id.starts_with("test_"));
    assert!(next_id > last_id);
}

const PERSISTED_TABLES: &[&str] = &[
    "change",
    "snapshot",
    "\"commit\"",
    "commit_edge",
    "change_graph_edge",
    "change_set",
    "change_set_element",
    "version",
    "version_inheritance",
    "active_version",
    "change_conflict",
    "internal_state_untracked",
    "change_queue",
    "file",
    "key_value",
    "account",
    "change_author",
    "active_account",
];

/// Every persisted table, each as a sorted list of JSON-encoded rows.
fn dump_tables(lix: &mut Lix) -> Vec<(String, Vec<String>)> {
    PERSISTED_TABLES
        .iter()
        .map(|table| {
            let result = lix
                .execute(&format!("SELECT * FROM {table}"), &[])
                .expect("read table");
            let mut rows = result
                .rows
                .iter()
                .map(|row| serde_json::to_string(row).expect("encode row"))
                .collect::<Vec<_>>();
            rows.sort();
            (table.to_string(), rows)
        })
        .collect()
}

#[test]
fn blob_round_trip_reads_every_table_back_identically() {
    let mut lix = Lix::open(LixOptions::deterministic()).expect("open lix");
    let ada = lix.create_account("Ada").expect("account");
    lix.set_active_accounts(&[ada.id.as_str()]).expect("activate");
    lix.insert_state(message("a", 1)).expect("insert");
    lix.insert_state(message("a", 2)).expect("update");
    lix.insert_state(message("setting", 1).untracked()).expect("untracked");
    lix.write_file("notes", "/notes.txt", b"queued", None).expect("file");
    let left = lix
        .create_change(CreateChange::new("x", "s", "f", "p", Some(json!(1))))
        .expect("left");
    let right = lix
        .create_change(CreateChange::new("x", "s", "f", "p", Some(json!(2))))
        .expect("right");
    let main = lix.active_version().expect("active").id;
    lix.create_change_conflict(&main, "x", &[left.id.as_str(), right.id.as_str()])
        .expect("conflict");

    let before = dump_tables(&mut lix);
    assert!(
        before
            .iter()
            .filter(|(table, _)| table != "commit_edge")
            .all(|(_, rows)| !rows.is_empty()),
        "{before:?}"
    );

    let blob = lix.to_blob().expect("blob");
    let mut restored = Lix::open(LixOptions::default().with_blob(blob)).expect("restore");
    assert_eq!(dump_tables(&mut restored), before);
}

#[test]
fn open_applies_options() {
    let lix = Lix::open(
        LixOptions::from_json(r#"{"key_values":{"locale":"de"},"account":{"id":"acc-1","name":"Ada"}}"#)
            .expect("options"),
    )
    .expect("open lix");
    assert_eq!(lix.key_value("locale").expect("read"), Some(json!("de")));
    assert_eq!(
        lix.active_accounts().expect("accounts"),
        vec![Account {
            id: "acc-1".to_string(),
            name: "Ada".to_string()
        }]
    );
}

#[test]
fn changes_credit_active_accounts() {
    let mut lix = Lix::open(LixOptions::deterministic()).expect("open lix");
    let ada = lix.create_account("Ada").expect("account");
    let bob = lix.create_account("Bob").expect("account");
    lix.set_active_accounts(&[ada.id.as_str(), bob.id.as_str()]).expect("activate");

    lix.insert_state(message("a", 1)).expect("insert");
    let row = lix.state(Some("inlang_message")).expect("state").remove(0);
    let authors = lix.change_authors(&row.change_id).expect("authors");
    assert_eq!(authors, vec![ada, bob]);
}

#[test]
fn foreign_images_are_rejected() {
    let err = Lix::open(LixOptions::default().with_blob(b"definitely not sqlite".to_vec())).unwrap_err();
    assert!(matches!(err, LixError::NotLixDatabase(_)), "{err}");

    let err = Lix::open(LixOptions::default().with_blob(foreign_database_image())).unwrap_err();
    assert_eq!(err.code(), "NOT_LIX_DATABASE");
}

#[test]
fn checkpoints_seal_the_working_change_set() {
    let mut lix = Lix::open(LixOptions::deterministic()).expect("open lix");
    let main = lix.active_version().expect("active");
    lix.insert_state(message("a", 1)).expect("insert");
    lix.insert_state(message("b", 1)).expect("insert");
    lix.insert_state(message("a", 2)).expect("update");
    let tip = lix.active_version().expect("active").commit_id;

    let working = lix.working_change_set_id(&main.id).expect("working");
    assert_eq!(lix.change_set_elements(&working).expect("elements").len(), 2);

    let checkpoint = lix.create_checkpoint(&main.id).expect("checkpoint");
    assert!(checkpoint.is_checkpoint);
    assert_eq!(lix.commit_parents(&checkpoint.id).expect("parents"), vec![tip]);
    assert_eq!(
        lix.change_set_elements(&checkpoint.change_set_id)
            .expect("elements")
            .len(),
        2
    );

    let after = lix.active_version().expect("active");
    assert_eq!(after.commit_id, checkpoint.id);
    assert_ne!(after.working_commit_id, main.working_commit_id);
    let fresh = lix.working_change_set_id(&main.id).expect("working");
    assert!(lix.change_set_elements(&fresh).expect("elements").is_empty());
    assert!(lix.commit(&main.working_commit_id).expect("read").is_none());
    assert_eq!(lix.state(Some("inlang_message")).expect("state").len(), 2);
}

#[test]
fn transition_restores_an_earlier_commit() {
    let mut lix = Lix::open(LixOptions::deterministic()).expect("open lix");
    let main = lix.active_version().expect("active").id;
    let first = lix.insert_state(message("a", 1)).expect("first")[0].clone();
    lix.insert_state(message("b", 1)).expect("second");
    let third = lix.insert_state(message("a", 2)).expect("third")[0].clone();

    let commit = lix.transition(&main, &first.id).expect("transition");
    let mut parents = lix.commit_parents(&commit.id).expect("parents");
    parents.sort();
    let mut expected = vec![first.id.clone(), third.id.clone()];
    expected.sort();
    assert_eq!(parents, expected);

    let rows = lix.state(Some("inlang_message")).expect("state");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].entity_id, "a");
    assert_eq!(rows[0].snapshot_content, json!({"n": 1}));

    let unchanged = lix.transition(&main, &commit.id).expect("no-op");
    assert_eq!(unchanged.id, commit.id);
    assert_eq!(lix.active_version().expect("active").commit_id, commit.id);

    assert_eq!(
        lix.transition(&main, "missing").unwrap_err().code(),
        "FOREIGN_KEY_VIOLATION"
    );
}

#[test]
fn commit_graph_queries() {
    let mut lix = Lix::open(LixOptions::deterministic()).expect("open lix");
    let root = lix.active_version().expect("active").commit_id;
    let first = lix.insert_state(message("a", 1)).expect("first")[0].clone();
    let second = lix.insert_state(message("a", 2)).expect("second")[0].clone();

    let ancestors = lix.commit_ancestors(&second.id).expect("ancestors");
    assert_eq!(ancestors.get(&second.id), Some(&0));
    assert_eq!(ancestors.get(&first.id), Some(&1));
    assert_eq!(ancestors.get(&root), Some(&2));

    let change_set = lix.create_change_set(&[]).expect("empty change set");
    let side = lix.create_commit(&change_set, &[first.id.as_str()]).expect("side commit");
    assert_eq!(
        lix.lowest_common_ancestor(&side.id, &second.id).expect("lca"),
        Some(first.id)
    );
}
