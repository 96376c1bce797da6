#![forbid(unsafe_code)]

use super::super::support::canonical_json;
use super::super::LixError;
use super::materialize::Materializer;
use lix_core::model::HistoryRow;
use rusqlite::{Connection, OptionalExtension, params};

const HISTORY_TABLE: &str = "temp.lix_state_history";
pub(in crate::store) const HISTORY_COLUMNS: &str = "entity_id, schema_key, file_id, plugin_key, \
     schema_version, snapshot_content, change_id, commit_id, change_set_id, depth";

/// State as of the commit that recorded `change_set_id`, with each row's distance from it.
///
/// A change set no commit points at (a conflict set, say) yields just its own elements.
pub(in crate::store) fn history_rows_tx(
    conn: &Connection,
    change_set_id: &str,
    schema_key: Option<&str>,
) -> Result<Vec<HistoryRow>, LixError> {
    let commit_id = conn
        .query_row(
            "SELECT id FROM \"commit\" WHERE change_set_id=?1 ORDER BY created_at ASC, id ASC LIMIT 1",
            params![change_set_id],
            |row| row.get::<_, String>(0),
        )
        .optional()?;

    let materializer = Materializer::new(conn, schema_key)?.without_stage();
    let entries = match commit_id.as_deref() {
        Some(commit_id) => materializer.commit_state(commit_id)?,
        None => materializer.change_set_state(change_set_id)?,
    };

    let mut out = Vec::with_capacity(entries.len());
    for entry in entries.into_values() {
        let Some(content) = entry.content else {
            continue;
        };
        out.push(HistoryRow {
            entity_id: entry.change.entity_id,
            schema_key: entry.change.schema_key,
            file_id: entry.change.file_id,
            plugin_key: entry.change.plugin_key,
            schema_version: entry.change.schema_version,
            snapshot_content: content,
            change_id: entry.change.id,
            commit_id: entry.commit_id,
            change_set_id: change_set_id.to_string(),
            depth: u32::try_from(entry.depth).unwrap_or(0),
        });
    }
    Ok(out)
}

/// Fills the temporary history table for one change set, replacing earlier rows for it.
pub(in crate::store) fn materialize_history_tx(
    conn: &Connection,
    change_set_id: &str,
) -> Result<&'static str, LixError> {
    conn.execute_batch(
        "CREATE TEMP TABLE IF NOT EXISTS lix_state_history (
          entity_id TEXT NOT NULL,
          schema_key TEXT NOT NULL,
          file_id TEXT NOT NULL,
          plugin_key TEXT NOT NULL,
          schema_version TEXT NOT NULL,
          snapshot_content TEXT NOT NULL,
          change_id TEXT NOT NULL,
          commit_id TEXT NOT NULL,
          change_set_id TEXT NOT NULL,
          depth INTEGER NOT NULL
        );",
    )?;
    conn.execute(
        &format!("DELETE FROM {HISTORY_TABLE} WHERE change_set_id=?1"),
        params![change_set_id],
    )?;

    let rows = history_rows_tx(conn, change_set_id, None)?;
    let mut stmt = conn.prepare(&format!(
        "INSERT INTO {HISTORY_TABLE}({HISTORY_COLUMNS}) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
    ))?;
    for row in &rows {
        stmt.execute(params![
            row.entity_id,
            row.schema_key,
            row.file_id,
            row.plugin_key,
            row.schema_version,
            canonical_json(&row.snapshot_content),
            row.change_id,
            row.commit_id,
            row.change_set_id,
            i64::from(row.depth),
        ])?;
    }
    Ok(HISTORY_TABLE)
}
