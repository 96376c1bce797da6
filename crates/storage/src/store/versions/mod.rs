#![forbid(unsafe_code)]

mod create;
mod inheritance;

pub(in crate::store) use inheritance::{check_inheritance_tx, verify_inheritance_acyclic_tx};

use super::commits::insert_root_commit_tx;
use super::support::{VERSION_COLUMNS, version_from_row};
use super::{Lix, LixError};
use lix_core::model::Version;
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use tracing::info;

impl Lix {
    pub fn version(&self, version_id: &str) -> Result<Option<Version>, LixError> {
        version_tx(&self.conn, version_id)
    }

    pub fn version_by_name(&self, name: &str) -> Result<Option<Version>, LixError> {
        let found = self
            .conn
            .query_row(
                &format!("SELECT {VERSION_COLUMNS} FROM version WHERE name=?1"),
                params![name],
                version_from_row,
            )
            .optional()?;
        Ok(found)
    }

    pub fn versions(&self) -> Result<Vec<Version>, LixError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {VERSION_COLUMNS} FROM version ORDER BY name ASC, id ASC"))?;
        let rows = stmt.query_map([], version_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn active_version(&self) -> Result<Version, LixError> {
        let id = active_version_id_tx(&self.conn)?;
        require_version_tx(&self.conn, &id)
    }

    /// Repoints the active-version pointer. Cached state covers every version, so nothing
    /// needs invalidating.
    pub fn switch_version(&mut self, version_id: &str) -> Result<Version, LixError> {
        let tx = self.conn.transaction()?;
        let version = require_version_tx(&tx, version_id)?;
        set_active_version_tx(&tx, &version.id)?;
        tx.commit()?;
        info!(version_id = %version.id, name = %version.name, "active version switched");
        Ok(version)
    }
}

pub(in crate::store) fn version_tx(conn: &Connection, version_id: &str) -> Result<Option<Version>, LixError> {
    let found = conn
        .query_row(
            &format!("SELECT {VERSION_COLUMNS} FROM version WHERE id=?1"),
            params![version_id],
            version_from_row,
        )
        .optional()?;
    Ok(found)
}

pub(in crate::store) fn require_version_tx(conn: &Connection, version_id: &str) -> Result<Version, LixError> {
    version_tx(conn, version_id)?.ok_or_else(|| LixError::foreign_key("version", version_id))
}

pub(in crate::store) fn parent_of_tx(conn: &Connection, version_id: &str) -> Result<Option<String>, LixError> {
    let parent = conn
        .query_row(
            "SELECT inherits_from_version_id FROM version WHERE id=?1",
            params![version_id],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()?;
    Ok(parent.flatten())
}

pub(in crate::store) fn active_version_id_tx(conn: &Connection) -> Result<String, LixError> {
    conn.query_row(
        "SELECT version_id FROM active_version WHERE singleton=1",
        [],
        |row| row.get::<_, String>(0),
    )
    .optional()?
    .ok_or(LixError::InvalidInput("no active version"))
}

pub(in crate::store) fn set_active_version_tx(conn: &Connection, version_id: &str) -> Result<(), LixError> {
    conn.execute(
        "INSERT INTO active_version(singleton, version_id) VALUES (1, ?1) \
         ON CONFLICT(singleton) DO UPDATE SET version_id=excluded.version_id",
        params![version_id],
    )?;
    Ok(())
}

/// Inserts a version at `commit_id` with a fresh, empty working commit.
pub(in crate::store) fn insert_version_tx(
    conn: &Connection,
    id: &str,
    name: &str,
    commit_id: &str,
    inherits_from_version_id: Option<&str>,
    hidden: bool,
) -> Result<Version, LixError> {
    let working = insert_root_commit_tx(conn)?;
    let version = Version {
        id: id.to_string(),
        name: name.to_string(),
        commit_id: commit_id.to_string(),
        working_commit_id: working.id,
        inherits_from_version_id: inherits_from_version_id.map(str::to_string),
        hidden,
    };

    let inserted = conn.execute(
        "INSERT INTO version(id, name, commit_id, working_commit_id, inherits_from_version_id, hidden) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            version.id,
            version.name,
            version.commit_id,
            version.working_commit_id,
            version.inherits_from_version_id,
            version.hidden as i64,
        ],
    );
    if let Err(err) = inserted {
        return Err(map_version_insert_conflict(err));
    }
    Ok(version)
}

fn map_version_insert_conflict(err: rusqlite::Error) -> LixError {
    if let rusqlite::Error::SqliteFailure(code, message) = &err {
        if code.code == ErrorCode::ConstraintViolation {
            let message = message.as_deref().unwrap_or_default();
            if message.contains("version.name") {
                return LixError::InvalidInput("version name already exists");
            }
            if message.contains("version.id") {
                return LixError::InvalidInput("version id already exists");
            }
        }
    }
    LixError::from(err)
}
