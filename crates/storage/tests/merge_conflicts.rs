#![forbid(unsafe_code)]

use lix_core::model::{EntityKey, StateWrite};
use lix_storage::{CreateChange, CreateVersion, Lix, LixError, LixOptions};
use serde_json::{Value, json};

fn message(entity_id: &str, text: &str) -> StateWrite {
    StateWrite::new(
        entity_id,
        "inlang_message",
        "/messages.json",
        "inlang_plugin",
        json!({ "text": text }),
    )
}

fn key(entity_id: &str) -> EntityKey {
    EntityKey::new(entity_id, "inlang_message", "/messages.json")
}

fn text_of(lix: &mut Lix, version_id: &str, entity_id: &str) -> Option<Value> {
    lix.state_entity(&key(entity_id), Some(version_id))
        .expect("read entity")
        .map(|row| row.snapshot_content["text"].clone())
}

/// Main holds `hello`; a `feature` version branches off the same tip.
fn branched() -> (Lix, String, String) {
    let mut lix = Lix::open(LixOptions::deterministic()).expect("open lix");
    lix.insert_state(message("hello", "Hello")).expect("insert");
    let main = lix.active_version().expect("active").id;
    let feature = lix
        .create_version(CreateVersion {
            name: Some("feature".to_string()),
            ..CreateVersion::default()
        })
        .expect("create feature")
        .id;
    (lix, main, feature)
}

#[test]
fn snapshots_are_content_addressed() {
    let mut lix = Lix::open(LixOptions::deterministic()).expect("open lix");
    let a = lix
        .create_change(CreateChange::new("a", "s", "f", "p", Some(json!({"b": 1, "a": 2}))))
        .expect("a");
    let b = lix
        .create_change(CreateChange::new("b", "s", "f", "p", Some(json!({"a": 2, "b": 1}))))
        .expect("b");
    assert_eq!(a.snapshot_id, b.snapshot_id);
    assert_eq!(a.snapshot_id.len(), 64);
    assert_eq!(
        lix.snapshot(&a.snapshot_id).expect("snapshot").expect("stored").content,
        Some(json!({"a": 2, "b": 1}))
    );

    let deletion = lix
        .create_change(CreateChange::new("a", "s", "f", "p", None))
        .expect("deletion");
    assert!(deletion.is_deletion());
    assert_eq!(deletion.snapshot_id, "no-content");

    let mut duplicate = CreateChange::new("a", "s", "f", "p", None);
    duplicate.id = Some(a.id.clone());
    assert!(matches!(lix.create_change(duplicate), Err(LixError::InvalidInput(_))));
}

#[test]
fn change_graph_lowest_common_ancestor() {
    let mut lix = Lix::open(LixOptions::deterministic()).expect("open lix");
    let root = lix
        .create_change(CreateChange::new("e", "s", "f", "p", Some(json!(1))))
        .expect("root");
    let mut left = CreateChange::new("e", "s", "f", "p", Some(json!(2)));
    left.parent_change_ids = vec![root.id.clone()];
    let left = lix.create_change(left).expect("left");
    let mut right = CreateChange::new("e", "s", "f", "p", Some(json!(3)));
    right.parent_change_ids = vec![root.id.clone()];
    let right = lix.create_change(right).expect("right");

    assert_eq!(
        lix.lowest_common_ancestor_change(&left.id, &right.id)
            .expect("lca"),
        Some(root.id.clone())
    );
    assert_eq!(
        lix.lowest_common_ancestor_change(&left.id, &root.id)
            .expect("lca"),
        Some(root.id)
    );

    let mut orphan = CreateChange::new("e", "s", "f", "p", Some(json!(4)));
    orphan.parent_change_ids = vec!["missing".to_string()];
    assert_eq!(lix.create_change(orphan).unwrap_err().code(), "FOREIGN_KEY_VIOLATION");
}

#[test]
fn fast_forward_and_new_entities_apply() {
    let (mut lix, main, feature) = branched();
    lix.insert_state(message("hello", "Hello!").in_version(&feature))
        .expect("edit on feature");
    lix.insert_state(message("bye", "Bye").in_version(&feature))
        .expect("new on feature");

    let outcome = lix.merge_version(&feature, &main).expect("merge");
    assert!(outcome.conflicts.is_empty());
    assert_eq!(outcome.applied_change_ids.len(), 2);
    let commit = outcome.commit.expect("merge commit");
    assert_eq!(lix.version(&main).expect("read").expect("main").commit_id, commit.id);

    assert_eq!(text_of(&mut lix, &main, "hello"), Some(json!("Hello!")));
    assert_eq!(text_of(&mut lix, &main, "bye"), Some(json!("Bye")));

    let again = lix.merge_version(&feature, &main).expect("merge again");
    assert!(again.applied_change_ids.is_empty());
    assert!(again.commit.is_none());
}

#[test]
fn stale_source_changes_are_skipped() {
    let (mut lix, main, feature) = branched();
    lix.insert_state(message("hello", "Hello again")).expect("edit on main");

    let outcome = lix.merge_version(&feature, &main).expect("merge");
    assert!(outcome.applied_change_ids.is_empty());
    assert!(outcome.conflicts.is_empty());
    assert_eq!(text_of(&mut lix, &main, "hello"), Some(json!("Hello again")));
}

#[test]
fn deletions_fast_forward_into_the_target() {
    let (mut lix, main, feature) = branched();
    lix.delete_state(&key("hello"), Some(&feature))
        .expect("delete on feature");

    let outcome = lix.merge_version(&feature, &main).expect("merge");
    assert_eq!(outcome.applied_change_ids.len(), 1);
    assert_eq!(text_of(&mut lix, &main, "hello"), None);
}

#[test]
fn divergent_edits_conflict_until_resolved() {
    let (mut lix, main, feature) = branched();
    lix.insert_state(message("hello", "Hallo").in_version(&feature))
        .expect("edit on feature");
    lix.insert_state(message("hello", "Bonjour")).expect("edit on main");

    let outcome = lix.merge_version(&feature, &main).expect("merge");
    assert!(outcome.commit.is_none());
    assert_eq!(outcome.conflicts.len(), 1);
    let conflict = outcome.conflicts[0].clone();
    assert_eq!(conflict.version_id, main);
    assert_eq!(conflict.key, key("hello").conflict_key());
    assert_eq!(text_of(&mut lix, &main, "hello"), Some(json!("Bonjour")));

    let again = lix.merge_version(&feature, &main).expect("merge again");
    assert_eq!(again.conflicts, vec![conflict.clone()]);
    assert_eq!(lix.change_conflicts(Some(&main)).expect("conflicts").len(), 1);

    let elements = lix.change_conflict_elements(&conflict.id).expect("elements");
    assert_eq!(elements.len(), 2);
    let feature_change = lix
        .state_entity(&key("hello"), Some(&feature))
        .expect("feature row")
        .expect("present")
        .change_id;
    assert!(elements.iter().any(|element| element.change_id == feature_change));

    let err = lix
        .resolve_conflict_by_selecting(&conflict.id, "not-a-member")
        .unwrap_err();
    assert!(matches!(err, LixError::ConflictSelectionInvalid { .. }));

    let commit = lix
        .resolve_conflict_by_selecting(&conflict.id, &feature_change)
        .expect("resolve");
    assert!(commit.is_some());
    assert_eq!(text_of(&mut lix, &main, "hello"), Some(json!("Hallo")));
    assert!(lix.change_conflicts(None).expect("conflicts").is_empty());

    let settled = lix.merge_version(&feature, &main).expect("merge after resolve");
    assert!(settled.conflicts.is_empty());
    assert!(settled.applied_change_ids.is_empty());

    let err = lix.change_conflict_elements(&conflict.id).unwrap_err();
    assert!(matches!(err, LixError::UnknownConflict(_)));
}

#[test]
fn equal_content_does_not_conflict() {
    let (mut lix, main, feature) = branched();
    lix.insert_state(message("hello", "Same").in_version(&feature))
        .expect("edit on feature");
    lix.insert_state(message("hello", "Same")).expect("edit on main");

    let outcome = lix.merge_version(&feature, &main).expect("merge");
    assert!(outcome.conflicts.is_empty());
    assert!(outcome.applied_change_ids.is_empty());
}

#[test]
fn manual_conflicts_are_deduplicated() {
    let (mut lix, main, feature) = branched();
    lix.insert_state(message("hello", "A").in_version(&feature))
        .expect("edit on feature");
    let a = lix
        .state_entity(&key("hello"), Some(&feature))
        .expect("read")
        .expect("row")
        .change_id;
    let b = lix
        .state_entity(&key("hello"), Some(&main))
        .expect("read")
        .expect("row")
        .change_id;

    let first = lix
        .create_change_conflict(&main, "hello", &[a.as_str(), b.as_str()])
        .expect("conflict");
    let second = lix
        .create_change_conflict(&main, "hello", &[b.as_str(), a.as_str()])
        .expect("same conflict");
    assert_eq!(first, second);

    let err = lix.create_change_conflict(&main, "hello", &[a.as_str()]).unwrap_err();
    assert!(matches!(err, LixError::InvalidInput(_)));
    assert!(matches!(
        lix.merge_version(&main, &main),
        Err(LixError::InvalidInput(_))
    ));
}

#[test]
fn merging_another_instance_imports_lineage() {
    let mut ours = Lix::open_in_memory().expect("open lix");
    ours.insert_state(message("hello", "Hello")).expect("insert");
    let blob = ours.to_blob().expect("blob");
    let mut theirs = Lix::open(LixOptions::default().with_blob(blob)).expect("reopen");

    theirs.insert_state(message("hello", "Hello, world")).expect("edit");
    theirs.insert_state(message("extra", "Extra")).expect("new");
    let their_change = theirs
        .state_entity(&key("hello"), None)
        .expect("read")
        .expect("row")
        .change_id;

    let outcome = ours.merge(&theirs).expect("merge");
    assert!(outcome.conflicts.is_empty());
    assert_eq!(outcome.applied_change_ids.len(), 2);
    assert!(ours.change(&their_change).expect("read change").is_some());
    assert_eq!(ours.change_parents(&their_change).expect("parents").len(), 1);

    let rows = ours.state(Some("inlang_message")).expect("state");
    assert_eq!(rows.len(), 2);
    assert!(
        rows.iter()
            .any(|row| row.entity_id == "hello" && row.snapshot_content == json!({"text": "Hello, world"}))
    );
}

#[test]
fn report_conflicts_records_without_applying() {
    let mut ours = Lix::open_in_memory().expect("open lix");
    ours.insert_state(message("hello", "Hello")).expect("insert");
    let mut theirs =
        Lix::open(LixOptions::default().with_blob(ours.to_blob().expect("blob"))).expect("reopen");

    ours.insert_state(message("hello", "Ours")).expect("our edit");
    theirs.insert_state(message("hello", "Theirs")).expect("their edit");
    theirs.insert_state(message("new", "New")).expect("their addition");

    let conflicts = ours.report_conflicts(&theirs).expect("report");
    assert_eq!(conflicts.len(), 1);
    let rows = ours.state(Some("inlang_message")).expect("state");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].snapshot_content, json!({"text": "Ours"}));
}

#[test]
fn unrelated_instances_merge_without_conflicts() {
    let mut ours = Lix::open_in_memory().expect("open ours");
    let mut theirs = Lix::open_in_memory().expect("open theirs");
    ours.insert_state(message("hello", "Ours")).expect("our insert");
    theirs.insert_state(message("hello", "Theirs")).expect("their insert");

    let conflicts = ours.report_conflicts(&theirs).expect("report");
    assert!(conflicts.is_empty());
    assert!(ours.change_conflicts(None).expect("conflicts").is_empty());

    let outcome = ours.merge(&theirs).expect("merge");
    assert!(outcome.conflicts.is_empty());
    assert_eq!(outcome.applied_change_ids.len(), 1);
    let rows = ours.state(Some("inlang_message")).expect("state");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].snapshot_content, json!({"text": "Theirs"}));
}
