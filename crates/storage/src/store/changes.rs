#![forbid(unsafe_code)]

use super::accounts::attach_active_authors_tx;
use super::support::{
    CHANGE_COLUMNS, change_from_row, generate_id_tx, json_column, json_value_column,
    snapshot_id_for, timestamp_tx,
};
use super::{CreateChange, Lix, LixError};
use lix_core::graph::lowest_common_ancestor;
use lix_core::ids::canonical_identifier;
use lix_core::model::{Change, Snapshot};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;

impl Lix {
    /// Records one immutable change, storing its snapshot by content address.
    pub fn create_change(&mut self, request: CreateChange) -> Result<Change, LixError> {
        let tx = self.conn.transaction()?;
        let change = create_change_tx(&tx, &request)?;
        tx.commit()?;
        Ok(change)
    }

    pub fn change(&self, change_id: &str) -> Result<Option<Change>, LixError> {
        change_tx(&self.conn, change_id)
    }

    pub fn snapshot(&self, snapshot_id: &str) -> Result<Option<Snapshot>, LixError> {
        let found = self
            .conn
            .query_row(
                "SELECT id, content FROM snapshot WHERE id=?1",
                params![snapshot_id],
                |row| {
                    Ok(Snapshot {
                        id: row.get(0)?,
                        content: json_value_column(row, 1)?,
                    })
                },
            )
            .optional()?;
        Ok(found)
    }

    /// Parents of `change_id` in the change graph.
    pub fn change_parents(&self, change_id: &str) -> Result<Vec<String>, LixError> {
        change_parents_tx(&self.conn, change_id)
    }

    /// Closest shared ancestor of two changes in the change graph.
    pub fn lowest_common_ancestor_change(
        &self,
        a: &str,
        b: &str,
    ) -> Result<Option<String>, LixError> {
        lowest_common_ancestor(a, b, |id| change_parents_tx(&self.conn, id))
    }
}

fn canonical(value: &str, what: &'static str) -> Result<String, LixError> {
    canonical_identifier(value).map_err(|_| LixError::InvalidInput(what))
}

pub(in crate::store) fn create_change_tx(
    conn: &Connection,
    request: &CreateChange,
) -> Result<Change, LixError> {
    let entity_id = canonical(&request.entity_id, "invalid entity_id")?;
    let schema_key = canonical(&request.schema_key, "invalid schema_key")?;
    let file_id = canonical(&request.file_id, "invalid file_id")?;
    let plugin_key = canonical(&request.plugin_key, "invalid plugin_key")?;
    let schema_version = canonical(&request.schema_version, "invalid schema_version")?;

    let id = match request.id.as_deref() {
        Some(id) => canonical(id, "invalid change id")?,
        None => generate_id_tx(conn)?,
    };
    let snapshot_id = store_snapshot_tx(conn, request.snapshot_content.as_ref())?;
    let change = Change {
        id,
        entity_id,
        schema_key,
        schema_version,
        file_id,
        plugin_key,
        snapshot_id,
        created_at: timestamp_tx(conn)?,
        writer_key: request.writer_key.clone(),
    };

    insert_change_row_tx(conn, &change)?;
    attach_active_authors_tx(conn, &change.id)?;
    for parent_id in &request.parent_change_ids {
        insert_change_edge_tx(conn, parent_id, &change.id)?;
    }
    Ok(change)
}

/// Stores a snapshot (idempotent) and returns its id.
pub(in crate::store) fn store_snapshot_tx(
    conn: &Connection,
    content: Option<&Value>,
) -> Result<String, LixError> {
    let snapshot_id = snapshot_id_for(content);
    if content.is_some() {
        conn.execute(
            "INSERT OR IGNORE INTO snapshot(id, content) VALUES (?1, ?2)",
            params![snapshot_id, json_column(content)],
        )?;
    }
    Ok(snapshot_id)
}

pub(in crate::store) fn insert_change_row_tx(conn: &Connection, change: &Change) -> Result<(), LixError> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO change(id, entity_id, schema_key, schema_version, file_id, plugin_key, \
         snapshot_id, created_at, writer_key) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            change.id,
            change.entity_id,
            change.schema_key,
            change.schema_version,
            change.file_id,
            change.plugin_key,
            change.snapshot_id,
            change.created_at,
            change.writer_key,
        ],
    )?;
    if inserted == 0 {
        return Err(LixError::InvalidInput("change id already exists"));
    }
    Ok(())
}

pub(in crate::store) fn insert_change_edge_tx(
    conn: &Connection,
    parent_id: &str,
    child_id: &str,
) -> Result<(), LixError> {
    if parent_id == child_id {
        return Err(LixError::InvalidInput("a change cannot be its own parent"));
    }
    if change_tx(conn, parent_id)?.is_none() {
        return Err(LixError::foreign_key("change", parent_id));
    }
    conn.execute(
        "INSERT OR IGNORE INTO change_graph_edge(parent_id, child_id) VALUES (?1, ?2)",
        params![parent_id, child_id],
    )?;
    Ok(())
}

pub(in crate::store) fn change_tx(conn: &Connection, change_id: &str) -> Result<Option<Change>, LixError> {
    let found = conn
        .query_row(
            &format!("SELECT {CHANGE_COLUMNS} FROM change c WHERE c.id=?1"),
            params![change_id],
            change_from_row,
        )
        .optional()?;
    Ok(found)
}

/// The change together with its snapshot content (`None` for deletions).
pub(in crate::store) fn change_with_content_tx(
    conn: &Connection,
    change_id: &str,
) -> Result<Option<(Change, Option<Value>)>, LixError> {
    let found = conn
        .query_row(
            &format!(
                "SELECT {CHANGE_COLUMNS}, s.content FROM change c \
                 JOIN snapshot s ON s.id = c.snapshot_id WHERE c.id=?1"
            ),
            params![change_id],
            |row| Ok((change_from_row(row)?, json_value_column(row, 9)?)),
        )
        .optional()?;
    Ok(found)
}

pub(in crate::store) fn change_parents_tx(
    conn: &Connection,
    change_id: &str,
) -> Result<Vec<String>, LixError> {
    let mut stmt = conn.prepare_cached(
        "SELECT parent_id FROM change_graph_edge WHERE child_id=?1 ORDER BY parent_id ASC",
    )?;
    let rows = stmt.query_map(params![change_id], |row| row.get::<_, String>(0))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}
