#![forbid(unsafe_code)]

use super::state::mark_schemas_stale_tx;
use super::support::{UNTRACKED_COLUMNS, json_column, timestamp_tx, untracked_from_row};
use super::versions::active_version_id_tx;
use super::{Lix, LixError};
use lix_core::model::{EntityKey, StateWrite, UntrackedRow};
use rusqlite::{Connection, OptionalExtension, params};

impl Lix {
    /// Untracked rows stored directly on `version_id` (the active version when `None`),
    /// tombstones included.
    pub fn untracked_rows(&self, version_id: Option<&str>) -> Result<Vec<UntrackedRow>, LixError> {
        let version_id = match version_id {
            Some(version_id) => version_id.to_string(),
            None => active_version_id_tx(&self.conn)?,
        };
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {UNTRACKED_COLUMNS} FROM internal_state_untracked WHERE version_id=?1 \
             ORDER BY schema_key ASC, file_id ASC, entity_id ASC"
        ))?;
        let rows = stmt.query_map(params![version_id], untracked_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

/// Inserts or replaces an untracked row. A tombstone at the same key is overwritten.
pub(in crate::store) fn upsert_untracked_tx(
    conn: &Connection,
    write: &StateWrite,
    version_id: &str,
) -> Result<(), LixError> {
    let content = write
        .snapshot_content
        .as_ref()
        .ok_or(LixError::InvalidInput("untracked upsert requires snapshot_content"))?;
    let now = timestamp_tx(conn)?;
    conn.execute(
        "INSERT INTO internal_state_untracked(entity_id, schema_key, file_id, version_id, plugin_key, \
         schema_version, snapshot_content, inheritance_delete_marker, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?8) \
         ON CONFLICT(entity_id, schema_key, file_id, version_id) DO UPDATE SET \
           plugin_key=excluded.plugin_key, schema_version=excluded.schema_version, \
           snapshot_content=excluded.snapshot_content, inheritance_delete_marker=0, \
           updated_at=excluded.updated_at",
        params![
            write.entity_id,
            write.schema_key,
            write.file_id,
            version_id,
            write.plugin_key,
            write.schema_version,
            json_column(Some(content)),
            now,
        ],
    )?;
    mark_schemas_stale_tx(conn, [write.schema_key.as_str()])
}

/// Removes a direct untracked row, or shadows an inherited value with a tombstone.
pub(in crate::store) fn delete_untracked_tx(
    conn: &Connection,
    key: &EntityKey,
    plugin_key: &str,
    schema_version: &str,
    version_id: &str,
) -> Result<(), LixError> {
    let direct = conn
        .query_row(
            "SELECT inheritance_delete_marker FROM internal_state_untracked \
             WHERE entity_id=?1 AND schema_key=?2 AND file_id=?3 AND version_id=?4",
            params![key.entity_id, key.schema_key, key.file_id, version_id],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;

    match direct {
        Some(0) => {
            conn.execute(
                "DELETE FROM internal_state_untracked \
                 WHERE entity_id=?1 AND schema_key=?2 AND file_id=?3 AND version_id=?4",
                params![key.entity_id, key.schema_key, key.file_id, version_id],
            )?;
        }
        Some(_) => return Ok(()),
        None => {
            let now = timestamp_tx(conn)?;
            conn.execute(
                "INSERT INTO internal_state_untracked(entity_id, schema_key, file_id, version_id, \
                 plugin_key, schema_version, snapshot_content, inheritance_delete_marker, created_at, \
                 updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, 1, ?7, ?7)",
                params![
                    key.entity_id,
                    key.schema_key,
                    key.file_id,
                    version_id,
                    plugin_key,
                    schema_version,
                    now
                ],
            )?;
        }
    }
    mark_schemas_stale_tx(conn, [key.schema_key.as_str()])
}
