#![forbid(unsafe_code)]

use lix_core::model::{Change, ChangeConflict, Commit, StateRow, UntrackedRow, Version};
use rusqlite::Row;
use serde_json::Value;

pub(in crate::store) const CHANGE_COLUMNS: &str = "c.id, c.entity_id, c.schema_key, c.schema_version, c.file_id, \
     c.plugin_key, c.snapshot_id, c.created_at, c.writer_key";

pub(in crate::store) fn change_from_row(row: &Row<'_>) -> rusqlite::Result<Change> {
    Ok(Change {
        id: row.get(0)?,
        entity_id: row.get(1)?,
        schema_key: row.get(2)?,
        schema_version: row.get(3)?,
        file_id: row.get(4)?,
        plugin_key: row.get(5)?,
        snapshot_id: row.get(6)?,
        created_at: row.get(7)?,
        writer_key: row.get(8)?,
    })
}

pub(in crate::store) const COMMIT_COLUMNS: &str = "id, change_set_id, created_at, is_checkpoint";

pub(in crate::store) fn commit_from_row(row: &Row<'_>) -> rusqlite::Result<Commit> {
    Ok(Commit {
        id: row.get(0)?,
        change_set_id: row.get(1)?,
        created_at: row.get(2)?,
        is_checkpoint: row.get::<_, i64>(3)? != 0,
    })
}

pub(in crate::store) const VERSION_COLUMNS: &str =
    "id, name, commit_id, working_commit_id, inherits_from_version_id, hidden";

pub(in crate::store) fn version_from_row(row: &Row<'_>) -> rusqlite::Result<Version> {
    Ok(Version {
        id: row.get(0)?,
        name: row.get(1)?,
        commit_id: row.get(2)?,
        working_commit_id: row.get(3)?,
        inherits_from_version_id: row.get(4)?,
        hidden: row.get::<_, i64>(5)? != 0,
    })
}

pub(in crate::store) const CONFLICT_COLUMNS: &str = "id, key, change_set_id, version_id, created_at";

pub(in crate::store) fn conflict_from_row(row: &Row<'_>) -> rusqlite::Result<ChangeConflict> {
    Ok(ChangeConflict {
        id: row.get(0)?,
        key: row.get(1)?,
        change_set_id: row.get(2)?,
        version_id: row.get(3)?,
        created_at: row.get(4)?,
    })
}

pub(in crate::store) const UNTRACKED_COLUMNS: &str = "entity_id, schema_key, file_id, version_id, plugin_key, \
     schema_version, snapshot_content, inheritance_delete_marker, created_at, updated_at";

pub(in crate::store) fn untracked_from_row(row: &Row<'_>) -> rusqlite::Result<UntrackedRow> {
    Ok(UntrackedRow {
        entity_id: row.get(0)?,
        schema_key: row.get(1)?,
        file_id: row.get(2)?,
        version_id: row.get(3)?,
        plugin_key: row.get(4)?,
        schema_version: row.get(5)?,
        snapshot_content: json_value_column(row, 6)?,
        inheritance_delete_marker: row.get::<_, i64>(7)? != 0,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

/// Column order shared by every state cache table and the generic materialization table.
pub(in crate::store) const STATE_COLUMNS: &str = "entity_id, schema_key, file_id, version_id, plugin_key, \
     schema_version, snapshot_content, change_id, commit_id, created_at, updated_at, \
     inherited_from_version_id, untracked";

pub(in crate::store) const STATE_TABLE_DEFINITION: &str = "(
          entity_id TEXT NOT NULL,
          schema_key TEXT NOT NULL,
          file_id TEXT NOT NULL,
          version_id TEXT NOT NULL,
          plugin_key TEXT NOT NULL,
          schema_version TEXT NOT NULL,
          snapshot_content TEXT NOT NULL,
          change_id TEXT NOT NULL,
          commit_id TEXT NOT NULL,
          created_at TEXT NOT NULL,
          updated_at TEXT NOT NULL,
          inherited_from_version_id TEXT,
          untracked INTEGER NOT NULL,
          PRIMARY KEY (version_id, entity_id, schema_key, file_id)
        )";

pub(in crate::store) fn state_from_row(row: &Row<'_>) -> rusqlite::Result<StateRow> {
    Ok(StateRow {
        entity_id: row.get(0)?,
        schema_key: row.get(1)?,
        file_id: row.get(2)?,
        version_id: row.get(3)?,
        plugin_key: row.get(4)?,
        schema_version: row.get(5)?,
        snapshot_content: json_value_column(row, 6)?.unwrap_or(Value::Null),
        change_id: row.get(7)?,
        commit_id: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
        inherited_from_version_id: row.get(11)?,
        untracked: row.get::<_, i64>(12)? != 0,
    })
}

/// Reads a nullable JSON text column, surfacing parse failures as conversion errors.
pub(in crate::store) fn json_value_column(
    row: &Row<'_>,
    index: usize,
) -> rusqlite::Result<Option<Value>> {
    let Some(raw) = row.get::<_, Option<String>>(index)? else {
        return Ok(None);
    };
    serde_json::from_str::<Value>(&raw).map(Some).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(err))
    })
}
