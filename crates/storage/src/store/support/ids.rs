#![forbid(unsafe_code)]

use super::super::LixError;
use super::time::{now_ms, ts_ms_to_rfc3339};
use lix_core::ids::deterministic_id;
use rusqlite::{Connection, OptionalExtension, params};

pub(in crate::store) const DETERMINISTIC_MODE_KEY: &str = "lix_deterministic_mode";
const ID_SEQUENCE_KEY: &str = "lix_deterministic_sequence";
const CLOCK_SEQUENCE_KEY: &str = "lix_deterministic_clock";

pub(in crate::store) fn deterministic_mode_tx(conn: &Connection) -> Result<bool, LixError> {
    let value = conn
        .query_row(
            "SELECT value FROM key_value WHERE key=?1",
            params![DETERMINISTIC_MODE_KEY],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(value.is_some_and(|raw| raw.trim() == "true"))
}

/// Fresh entity id: `test_<seq>` in deterministic mode, otherwise a random UUID.
pub(in crate::store) fn generate_id_tx(conn: &Connection) -> Result<String, LixError> {
    if deterministic_mode_tx(conn)? {
        let sequence = next_sequence_tx(conn, ID_SEQUENCE_KEY)?;
        return Ok(deterministic_id(sequence));
    }
    Ok(uuid::Uuid::new_v4().to_string())
}

/// Current timestamp. Deterministic mode advances a logical clock by one millisecond per call.
pub(in crate::store) fn timestamp_tx(conn: &Connection) -> Result<String, LixError> {
    if deterministic_mode_tx(conn)? {
        let tick = next_sequence_tx(conn, CLOCK_SEQUENCE_KEY)?;
        let tick = i64::try_from(tick).map_err(|_| LixError::InvalidInput("clock overflow"))?;
        return Ok(ts_ms_to_rfc3339(tick));
    }
    Ok(ts_ms_to_rfc3339(now_ms()))
}

fn next_sequence_tx(conn: &Connection, key: &str) -> Result<u64, LixError> {
    conn.execute(
        "INSERT INTO key_value(key, value) VALUES (?1, '1') \
         ON CONFLICT(key) DO UPDATE SET value = CAST(CAST(value AS INTEGER) + 1 AS TEXT)",
        params![key],
    )?;
    let value = conn.query_row(
        "SELECT CAST(value AS INTEGER) FROM key_value WHERE key=?1",
        params![key],
        |row| row.get::<_, i64>(0),
    )?;
    u64::try_from(value).map_err(|_| LixError::InvalidInput("sequence out of range"))
}
