#![forbid(unsafe_code)]

use super::support::{canonical_json, parse_json_column};
use super::{Lix, LixError};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;

impl Lix {
    pub fn key_value(&self, key: &str) -> Result<Option<Value>, LixError> {
        key_value_tx(&self.conn, key)
    }

    /// Writes an engine setting directly, without recording a change.
    pub fn set_key_value(&mut self, key: &str, value: Value) -> Result<(), LixError> {
        if key.trim().is_empty() {
            return Err(LixError::InvalidInput("key must not be empty"));
        }
        set_key_value_tx(&self.conn, key, &value)
    }
}

pub(in crate::store) fn key_value_tx(conn: &Connection, key: &str) -> Result<Option<Value>, LixError> {
    let raw = conn
        .query_row(
            "SELECT value FROM key_value WHERE key=?1",
            params![key],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    parse_json_column(raw)
}

pub(in crate::store) fn set_key_value_tx(
    conn: &Connection,
    key: &str,
    value: &Value,
) -> Result<(), LixError> {
    conn.execute(
        "INSERT INTO key_value(key, value) VALUES (?1, ?2) \
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        params![key, canonical_json(value)],
    )?;
    Ok(())
}

pub(in crate::store) fn delete_key_value_tx(conn: &Connection, key: &str) -> Result<(), LixError> {
    conn.execute("DELETE FROM key_value WHERE key=?1", params![key])?;
    Ok(())
}
