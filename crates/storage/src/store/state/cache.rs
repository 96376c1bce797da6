#![forbid(unsafe_code)]

use super::super::support::{STATE_COLUMNS, STATE_TABLE_DEFINITION, canonical_json};
use super::super::LixError;
use super::materialize::Materializer;
use lix_core::model::StateRow;
use rusqlite::{Connection, OptionalExtension, params};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::debug;

/// Counters for state cache work done by this instance.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StateCacheMetrics {
    /// Full repopulations per schema key.
    pub populations: BTreeMap<String, u64>,
    /// Reads that had to materialize every schema because no `schema_key` was pinned.
    pub generic_materializations: u64,
}

impl StateCacheMetrics {
    pub fn populations_for(&self, schema_key: &str) -> u64 {
        self.populations.get(schema_key).copied().unwrap_or(0)
    }

    pub fn total_populations(&self) -> u64 {
        self.populations.values().sum()
    }
}

const GENERIC_STATE_TABLE: &str = "temp.lix_state_generic";

/// Physical cache table for one schema key: sanitized key plus a short hash of the raw key.
pub(in crate::store) fn cache_table_name(schema_key: &str) -> String {
    let sanitized = schema_key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .take(48)
        .collect::<String>();
    let digest = Sha256::digest(schema_key.as_bytes());
    let suffix = digest
        .iter()
        .take(4)
        .map(|byte| format!("{byte:02x}"))
        .collect::<String>();
    format!("internal_state_cache_{sanitized}_{suffix}")
}

/// Marks the given schemas' caches dirty. Schemas without a cache table are ignored.
pub(in crate::store) fn mark_schemas_stale_tx<'a>(
    conn: &Connection,
    schema_keys: impl IntoIterator<Item = &'a str>,
) -> Result<(), LixError> {
    let mut stmt = conn.prepare_cached(
        "INSERT OR IGNORE INTO internal_state_cache_dirty(schema_key) \
         SELECT schema_key FROM internal_state_cache_registry WHERE schema_key=?1",
    )?;
    for schema_key in schema_keys {
        stmt.execute(params![schema_key])?;
    }
    refresh_stale_flag_tx(conn)
}

pub(in crate::store) fn mark_all_schemas_stale_tx(conn: &Connection) -> Result<(), LixError> {
    conn.execute(
        "INSERT OR IGNORE INTO internal_state_cache_dirty(schema_key) \
         SELECT schema_key FROM internal_state_cache_registry",
        [],
    )?;
    refresh_stale_flag_tx(conn)
}

fn refresh_stale_flag_tx(conn: &Connection) -> Result<(), LixError> {
    conn.execute(
        "UPDATE internal_state_cache_stale \
         SET stale = EXISTS (SELECT 1 FROM internal_state_cache_dirty) WHERE singleton=1",
        [],
    )?;
    Ok(())
}

fn cache_is_stale_tx(conn: &Connection) -> Result<bool, LixError> {
    let stale = conn
        .query_row(
            "SELECT stale FROM internal_state_cache_stale WHERE singleton=1",
            [],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(stale.unwrap_or(1) != 0)
}

/// Returns a fresh cache table for `schema_key`, creating or repopulating it first if needed.
pub(in crate::store) fn ensure_schema_cache_tx(
    conn: &Connection,
    metrics: &mut StateCacheMetrics,
    schema_key: &str,
) -> Result<String, LixError> {
    let registered = conn
        .query_row(
            "SELECT table_name FROM internal_state_cache_registry WHERE schema_key=?1",
            params![schema_key],
            |row| row.get::<_, String>(0),
        )
        .optional()?;

    let table_name = match registered {
        Some(table_name) => {
            if !cache_is_stale_tx(conn)? || !schema_is_dirty_tx(conn, schema_key)? {
                return Ok(table_name);
            }
            table_name
        }
        None => {
            let table_name = cache_table_name(schema_key);
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS \"{table_name}\" {STATE_TABLE_DEFINITION};"
            ))?;
            conn.execute(
                "INSERT INTO internal_state_cache_registry(schema_key, table_name) VALUES (?1, ?2)",
                params![schema_key, table_name],
            )?;
            table_name
        }
    };

    let rows = Materializer::new(conn, Some(schema_key))?.all_rows()?;
    conn.execute(&format!("DELETE FROM \"{table_name}\""), [])?;
    insert_state_rows_tx(conn, &format!("\"{table_name}\""), &rows)?;
    conn.execute(
        "DELETE FROM internal_state_cache_dirty WHERE schema_key=?1",
        params![schema_key],
    )?;
    refresh_stale_flag_tx(conn)?;

    *metrics.populations.entry(schema_key.to_string()).or_default() += 1;
    debug!(schema_key, rows = rows.len(), "state cache populated");
    Ok(table_name)
}

/// Materializes every schema of every version into a temporary table.
pub(in crate::store) fn materialize_generic_tx(
    conn: &Connection,
    metrics: &mut StateCacheMetrics,
) -> Result<&'static str, LixError> {
    conn.execute_batch(&format!(
        "CREATE TEMP TABLE IF NOT EXISTS lix_state_generic {STATE_TABLE_DEFINITION};"
    ))?;
    let rows = Materializer::new(conn, None)?.all_rows()?;
    conn.execute(&format!("DELETE FROM {GENERIC_STATE_TABLE}"), [])?;
    insert_state_rows_tx(conn, GENERIC_STATE_TABLE, &rows)?;

    metrics.generic_materializations += 1;
    debug!(rows = rows.len(), "generic state materialized");
    Ok(GENERIC_STATE_TABLE)
}

fn schema_is_dirty_tx(conn: &Connection, schema_key: &str) -> Result<bool, LixError> {
    let dirty = conn
        .query_row(
            "SELECT 1 FROM internal_state_cache_dirty WHERE schema_key=?1",
            params![schema_key],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(dirty.is_some())
}

fn insert_state_rows_tx(conn: &Connection, table: &str, rows: &[StateRow]) -> Result<(), LixError> {
    let mut stmt = conn.prepare(&format!(
        "INSERT INTO {table}({STATE_COLUMNS}) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
    ))?;
    for row in rows {
        stmt.execute(params![
            row.entity_id,
            row.schema_key,
            row.file_id,
            row.version_id,
            row.plugin_key,
            row.schema_version,
            canonical_json(&row.snapshot_content),
            row.change_id,
            row.commit_id,
            row.created_at,
            row.updated_at,
            row.inherited_from_version_id,
            row.untracked as i64,
        ])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::cache_table_name;

    #[test]
    fn cache_table_names_are_safe_and_distinct() {
        let a = cache_table_name("inlang/message");
        let b = cache_table_name("inlang_message");
        assert!(a.starts_with("internal_state_cache_inlang_message_"));
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
    }
}
