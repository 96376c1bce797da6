#![forbid(unsafe_code)]

use super::changes::create_change_tx;
use super::commits::commit_to_version_tx;
use super::own_entities::check_own_entity_plugin;
use super::state::{
    Materializer, QueryResult, StateScope, execute_tx, mark_schemas_stale_tx, read_state_tx,
};
use super::support::{generate_id_tx, json_column, json_value_column, timestamp_tx};
use super::untracked::{delete_untracked_tx, upsert_untracked_tx};
use super::versions::{active_version_id_tx, require_version_tx};
use super::{CreateChange, Lix, LixContext, LixError};
use lix_core::ids::canonical_identifier;
use lix_core::model::{Commit, EntityKey, StateRow, StateWrite};
use rusqlite::{Connection, Transaction, params};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Open state transaction. Tracked writes are staged and become changes and commits on
/// [`StateTransaction::commit`]; untracked writes apply directly. Dropping it rolls back.
pub struct StateTransaction<'a> {
    tx: Transaction<'a>,
    ctx: &'a mut LixContext,
    writer_key: Option<String>,
}

impl Lix {
    pub fn begin(&mut self) -> Result<StateTransaction<'_>, LixError> {
        let tx = self.conn.transaction()?;
        Ok(StateTransaction {
            tx,
            ctx: &mut self.ctx,
            writer_key: None,
        })
    }

    /// Single write in its own transaction.
    pub fn insert_state(&mut self, write: StateWrite) -> Result<Vec<Commit>, LixError> {
        let mut transaction = self.begin()?;
        transaction.upsert(write)?;
        transaction.commit()
    }

    pub fn delete_state(
        &mut self,
        key: &EntityKey,
        version_id: Option<&str>,
    ) -> Result<Vec<Commit>, LixError> {
        let mut transaction = self.begin()?;
        transaction.delete(key, version_id)?;
        transaction.commit()
    }
}

impl StateTransaction<'_> {
    /// Tags every change this transaction records.
    pub fn with_writer(mut self, writer_key: impl Into<String>) -> Self {
        self.writer_key = Some(writer_key.into());
        self
    }

    /// Stages `write`; `snapshot_content: None` deletes.
    pub fn upsert(&mut self, write: StateWrite) -> Result<(), LixError> {
        stage_write_tx(&self.tx, &write, self.writer_key.as_deref())
    }

    /// Deletes whatever is visible at `key`, returning `false` if nothing was.
    ///
    /// Untracked rows go through [`delete_untracked_tx`]; tracked and inherited rows get a
    /// staged deletion that shadows the parent.
    pub fn delete(&mut self, key: &EntityKey, version_id: Option<&str>) -> Result<bool, LixError> {
        let version_id = match version_id {
            Some(version_id) => version_id.to_string(),
            None => active_version_id_tx(&self.tx)?,
        };
        require_version_tx(&self.tx, &version_id)?;

        let current = Materializer::new(&self.tx, Some(&key.schema_key))?
            .version_rows(&version_id)?
            .into_iter()
            .find(|row| row.key() == *key);
        let Some(current) = current else {
            return Ok(false);
        };

        if current.untracked {
            delete_untracked_tx(
                &self.tx,
                key,
                &current.plugin_key,
                &current.schema_version,
                &version_id,
            )?;
            return Ok(true);
        }

        let write = StateWrite {
            entity_id: key.entity_id.clone(),
            schema_key: key.schema_key.clone(),
            file_id: key.file_id.clone(),
            plugin_key: current.plugin_key,
            schema_version: current.schema_version,
            snapshot_content: None,
            version_id: Some(version_id),
            untracked: false,
        };
        stage_write_tx(&self.tx, &write, self.writer_key.as_deref())?;
        Ok(true)
    }

    /// Active-version state as this transaction sees it, staged rows included.
    pub fn state(&mut self, schema_key: Option<&str>) -> Result<Vec<StateRow>, LixError> {
        let active = active_version_id_tx(&self.tx)?;
        read_state_tx(
            &self.tx,
            &mut self.ctx.cache_metrics,
            StateScope::Version(&active),
            schema_key,
        )
    }

    pub fn execute(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult, LixError> {
        execute_tx(&self.tx, &mut self.ctx.cache_metrics, sql, params)
    }

    /// Turns staged rows into changes, one commit per touched version.
    pub fn commit(self) -> Result<Vec<Commit>, LixError> {
        let commits = commit_stage_tx(&self.tx)?;
        self.tx.commit()?;
        if !commits.is_empty() {
            info!(commits = commits.len(), "state transaction committed");
        }
        Ok(commits)
    }

    pub fn rollback(self) -> Result<(), LixError> {
        self.tx.rollback()?;
        debug!("state transaction rolled back");
        Ok(())
    }
}

fn canonical(value: &str, what: &'static str) -> Result<String, LixError> {
    canonical_identifier(value).map_err(|_| LixError::InvalidInput(what))
}

pub(in crate::store) fn stage_write_tx(
    conn: &Connection,
    write: &StateWrite,
    writer_key: Option<&str>,
) -> Result<(), LixError> {
    let key = EntityKey::new(
        canonical(&write.entity_id, "invalid entity_id")?,
        canonical(&write.schema_key, "invalid schema_key")?,
        canonical(&write.file_id, "invalid file_id")?,
    );
    let plugin_key = canonical(&write.plugin_key, "invalid plugin_key")?;
    let schema_version = canonical(&write.schema_version, "invalid schema_version")?;
    let version_id = match write.version_id.as_deref() {
        Some(version_id) => version_id.to_string(),
        None => active_version_id_tx(conn)?,
    };
    require_version_tx(conn, &version_id)?;
    check_own_entity_plugin(&key.schema_key, &plugin_key)?;

    if write.untracked {
        let normalized = StateWrite {
            entity_id: key.entity_id.clone(),
            schema_key: key.schema_key.clone(),
            file_id: key.file_id.clone(),
            plugin_key,
            schema_version,
            snapshot_content: write.snapshot_content.clone(),
            version_id: Some(version_id.clone()),
            untracked: true,
        };
        return match normalized.snapshot_content {
            Some(_) => upsert_untracked_tx(conn, &normalized, &version_id),
            None => delete_untracked_tx(
                conn,
                &key,
                &normalized.plugin_key,
                &normalized.schema_version,
                &version_id,
            ),
        };
    }

    // Every staged write gets its own change id, even when it replaces an earlier one.
    let change_id = generate_id_tx(conn)?;

    conn.execute(
        "INSERT INTO transaction_stage(entity_id, schema_key, file_id, version_id, plugin_key, \
         schema_version, snapshot_content, change_id, writer_key, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
         ON CONFLICT(entity_id, file_id, schema_key, version_id) DO UPDATE SET \
           plugin_key=excluded.plugin_key, schema_version=excluded.schema_version, \
           snapshot_content=excluded.snapshot_content, change_id=excluded.change_id, \
           writer_key=excluded.writer_key, created_at=excluded.created_at",
        params![
            key.entity_id,
            key.schema_key,
            key.file_id,
            version_id,
            plugin_key,
            schema_version,
            json_column(write.snapshot_content.as_ref()),
            change_id,
            writer_key,
            timestamp_tx(conn)?,
        ],
    )?;
    mark_schemas_stale_tx(conn, [key.schema_key.as_str()])
}

struct StagedRow {
    key: EntityKey,
    plugin_key: String,
    schema_version: String,
    content: Option<Value>,
    change_id: String,
    writer_key: Option<String>,
}

/// Records every staged row as a change linked to the entity's previous change, commits per
/// version and clears the stage.
pub(in crate::store) fn commit_stage_tx(conn: &Connection) -> Result<Vec<Commit>, LixError> {
    let mut by_version: BTreeMap<String, Vec<StagedRow>> = BTreeMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT version_id, entity_id, schema_key, file_id, plugin_key, schema_version, \
             snapshot_content, change_id, writer_key FROM transaction_stage \
             ORDER BY version_id ASC, created_at ASC, change_id ASC",
        )?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let version_id: String = row.get(0)?;
            by_version.entry(version_id).or_default().push(StagedRow {
                key: EntityKey::new(
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ),
                plugin_key: row.get(4)?,
                schema_version: row.get(5)?,
                content: json_value_column(row, 6)?,
                change_id: row.get(7)?,
                writer_key: row.get(8)?,
            });
        }
    }

    let mut commits = Vec::with_capacity(by_version.len());
    for (version_id, rows) in by_version {
        let version = require_version_tx(conn, &version_id)?;
        let previous = {
            let mut materializer = Materializer::new(conn, None)?.without_stage();
            let local = materializer.local_tracked(&version)?;
            rows.iter()
                .map(|row| local.get(&row.key).map(|entry| entry.change.id.clone()))
                .collect::<Vec<_>>()
        };

        let mut elements = Vec::with_capacity(rows.len());
        for (row, parent) in rows.into_iter().zip(previous) {
            let request = CreateChange {
                id: Some(row.change_id),
                entity_id: row.key.entity_id.clone(),
                schema_key: row.key.schema_key.clone(),
                schema_version: row.schema_version,
                file_id: row.key.file_id.clone(),
                plugin_key: row.plugin_key,
                snapshot_content: row.content,
                writer_key: row.writer_key,
                parent_change_ids: parent.into_iter().collect(),
            };
            let change = create_change_tx(conn, &request)?;
            elements.push((row.key, change.id));
        }
        commits.push(commit_to_version_tx(conn, &version, &elements, &[])?);
    }

    conn.execute("DELETE FROM transaction_stage", [])?;
    Ok(commits)
}
