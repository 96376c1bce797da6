#![forbid(unsafe_code)]

mod sql;

use super::super::LixError;
use rusqlite::{Connection, OptionalExtension, params};

const SCHEMA_VERSION: &str = "1";
const SCHEMA_VERSION_KEY: &str = "lix_schema_version";

pub(in crate::store) fn install_schema(conn: &Connection) -> Result<(), LixError> {
    conn.execute_batch(&sql::full_schema_sql())?;
    conn.execute(
        "INSERT OR IGNORE INTO key_value(key, value) VALUES (?1, ?2)",
        params![SCHEMA_VERSION_KEY, format!("\"{SCHEMA_VERSION}\"")],
    )?;
    Ok(())
}

/// Refuses to adopt a database that holds tables but was not written by this engine.
pub(in crate::store) fn preflight_gate(conn: &Connection) -> Result<(), LixError> {
    let table_count = conn.query_row(
        "SELECT COUNT(1) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get::<_, i64>(0),
    )?;
    if table_count == 0 {
        return Ok(());
    }

    let has_key_value = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='key_value'",
            [],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
        .is_some();
    if !has_key_value {
        return Err(LixError::NotLixDatabase("missing key_value table"));
    }

    let version = conn
        .query_row(
            "SELECT value FROM key_value WHERE key=?1",
            params![SCHEMA_VERSION_KEY],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    match version {
        Some(value) if value == format!("\"{SCHEMA_VERSION}\"") => Ok(()),
        Some(_) => Err(LixError::NotLixDatabase("unsupported schema version")),
        None => Err(LixError::NotLixDatabase("missing schema version")),
    }
}
