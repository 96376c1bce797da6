#![forbid(unsafe_code)]

mod checkpoint;
mod transition;

use super::changes::{change_tx, change_with_content_tx};
use super::own_entities::apply_own_entity_change_tx;
use super::state::mark_schemas_stale_tx;
use super::support::{COMMIT_COLUMNS, commit_from_row, generate_id_tx, timestamp_tx};
use super::{Lix, LixError};
use lix_core::graph::{ParentMap, ancestors_with_depth, lowest_common_ancestor};
use lix_core::ids::is_own_entity_schema;
use lix_core::model::{ChangeSetElement, Commit, EntityKey, Version};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

impl Lix {
    /// Groups existing changes into a new change set. At most one change per entity.
    pub fn create_change_set(&mut self, change_ids: &[&str]) -> Result<String, LixError> {
        let tx = self.conn.transaction()?;
        let mut elements = Vec::with_capacity(change_ids.len());
        let mut keys = BTreeSet::new();
        for change_id in change_ids {
            let change =
                change_tx(&tx, change_id)?.ok_or_else(|| LixError::foreign_key("change", *change_id))?;
            if !keys.insert(change.key()) {
                return Err(LixError::InvalidInput(
                    "change set holds more than one change for an entity",
                ));
            }
            elements.push((change.key(), change.id));
        }
        let change_set_id = insert_change_set_tx(&tx, &elements)?;
        tx.commit()?;
        Ok(change_set_id)
    }

    pub fn change_set_elements(&self, change_set_id: &str) -> Result<Vec<ChangeSetElement>, LixError> {
        change_set_elements_tx(&self.conn, change_set_id)
    }

    pub fn create_commit(
        &mut self,
        change_set_id: &str,
        parent_commit_ids: &[&str],
    ) -> Result<Commit, LixError> {
        let tx = self.conn.transaction()?;
        let parents = parent_commit_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>();
        let commit = insert_commit_tx(&tx, change_set_id, &parents, false)?;
        tx.commit()?;
        Ok(commit)
    }

    pub fn commit(&self, commit_id: &str) -> Result<Option<Commit>, LixError> {
        commit_tx(&self.conn, commit_id)
    }

    pub fn commit_parents(&self, commit_id: &str) -> Result<Vec<String>, LixError> {
        commit_parents_tx(&self.conn, commit_id)
    }

    /// Every ancestor of `commit_id` (itself included) with its shortest distance.
    pub fn commit_ancestors(&self, commit_id: &str) -> Result<BTreeMap<String, u32>, LixError> {
        let graph = load_commit_graph_tx(&self.conn)?;
        ancestors_with_depth(commit_id, None, |id| {
            Ok::<_, LixError>(graph.parents_of(id).to_vec())
        })
    }

    /// Closest shared ancestor of two commits.
    pub fn lowest_common_ancestor(&self, a: &str, b: &str) -> Result<Option<String>, LixError> {
        lowest_common_ancestor(a, b, |id| commit_parents_tx(&self.conn, id))
    }
}

pub(in crate::store) fn insert_change_set_tx(
    conn: &Connection,
    elements: &[(EntityKey, String)],
) -> Result<String, LixError> {
    let change_set_id = generate_id_tx(conn)?;
    conn.execute(
        "INSERT INTO change_set(id, created_at) VALUES (?1, ?2)",
        params![change_set_id, timestamp_tx(conn)?],
    )?;
    for (key, change_id) in elements {
        insert_element_tx(conn, &change_set_id, key, change_id)?;
    }
    Ok(change_set_id)
}

fn insert_element_tx(
    conn: &Connection,
    change_set_id: &str,
    key: &EntityKey,
    change_id: &str,
) -> Result<(), LixError> {
    conn.execute(
        "INSERT OR IGNORE INTO change_set_element(change_set_id, change_id, entity_id, schema_key, file_id) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![change_set_id, change_id, key.entity_id, key.schema_key, key.file_id],
    )?;
    Ok(())
}

pub(in crate::store) fn change_set_elements_tx(
    conn: &Connection,
    change_set_id: &str,
) -> Result<Vec<ChangeSetElement>, LixError> {
    let mut stmt = conn.prepare_cached(
        "SELECT change_set_id, change_id, entity_id, schema_key, file_id \
         FROM change_set_element WHERE change_set_id=?1 \
         ORDER BY schema_key ASC, file_id ASC, entity_id ASC, change_id ASC",
    )?;
    let rows = stmt.query_map(params![change_set_id], |row| {
        Ok(ChangeSetElement {
            change_set_id: row.get(0)?,
            change_id: row.get(1)?,
            entity_id: row.get(2)?,
            schema_key: row.get(3)?,
            file_id: row.get(4)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub(in crate::store) fn insert_commit_tx(
    conn: &Connection,
    change_set_id: &str,
    parent_ids: &[String],
    is_checkpoint: bool,
) -> Result<Commit, LixError> {
    let change_set_exists = conn
        .query_row(
            "SELECT 1 FROM change_set WHERE id=?1",
            params![change_set_id],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
        .is_some();
    if !change_set_exists {
        return Err(LixError::foreign_key("change_set", change_set_id));
    }

    let commit = Commit {
        id: generate_id_tx(conn)?,
        change_set_id: change_set_id.to_string(),
        created_at: timestamp_tx(conn)?,
        is_checkpoint,
    };
    conn.execute(
        "INSERT INTO \"commit\"(id, change_set_id, created_at, is_checkpoint) VALUES (?1, ?2, ?3, ?4)",
        params![
            commit.id,
            commit.change_set_id,
            commit.created_at,
            commit.is_checkpoint as i64
        ],
    )?;

    let mut seen = BTreeSet::new();
    for parent_id in parent_ids {
        if !seen.insert(parent_id.as_str()) {
            continue;
        }
        if commit_tx(conn, parent_id)?.is_none() {
            return Err(LixError::foreign_key("commit", parent_id.as_str()));
        }
        conn.execute(
            "INSERT INTO commit_edge(parent_id, child_id) VALUES (?1, ?2)",
            params![parent_id, commit.id],
        )?;
    }
    Ok(commit)
}

/// Parentless commit over an empty change set.
pub(in crate::store) fn insert_root_commit_tx(conn: &Connection) -> Result<Commit, LixError> {
    let change_set_id = insert_change_set_tx(conn, &[])?;
    insert_commit_tx(conn, &change_set_id, &[], false)
}

pub(in crate::store) fn commit_tx(conn: &Connection, commit_id: &str) -> Result<Option<Commit>, LixError> {
    let found = conn
        .query_row(
            &format!("SELECT {COMMIT_COLUMNS} FROM \"commit\" WHERE id=?1"),
            params![commit_id],
            commit_from_row,
        )
        .optional()?;
    Ok(found)
}

pub(in crate::store) fn require_commit_tx(conn: &Connection, commit_id: &str) -> Result<Commit, LixError> {
    commit_tx(conn, commit_id)?.ok_or_else(|| LixError::foreign_key("commit", commit_id))
}

pub(in crate::store) fn commit_parents_tx(
    conn: &Connection,
    commit_id: &str,
) -> Result<Vec<String>, LixError> {
    let mut stmt = conn.prepare_cached(
        "SELECT parent_id FROM commit_edge WHERE child_id=?1 ORDER BY parent_id ASC",
    )?;
    let rows = stmt.query_map(params![commit_id], |row| row.get::<_, String>(0))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub(in crate::store) fn load_commit_graph_tx(conn: &Connection) -> Result<ParentMap, LixError> {
    let mut stmt = conn.prepare_cached("SELECT parent_id, child_id FROM commit_edge")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
    let mut graph = ParentMap::new();
    for row in rows {
        let (parent, child) = row?;
        graph.insert_edge(parent, child);
    }
    Ok(graph)
}

/// Commits `elements` on top of the version's tip and moves the tip.
///
/// The working change set absorbs the same elements (one per entity), own-entity changes are
/// projected and the touched schemas are marked stale.
pub(in crate::store) fn commit_to_version_tx(
    conn: &Connection,
    version: &Version,
    elements: &[(EntityKey, String)],
    extra_parents: &[String],
) -> Result<Commit, LixError> {
    let change_set_id = insert_change_set_tx(conn, elements)?;
    let mut parents = vec![version.commit_id.clone()];
    parents.extend(extra_parents.iter().cloned());
    let commit = insert_commit_tx(conn, &change_set_id, &parents, false)?;

    conn.execute(
        "UPDATE version SET commit_id=?2 WHERE id=?1",
        params![version.id, commit.id],
    )?;

    let working = require_commit_tx(conn, &version.working_commit_id)?;
    for (key, change_id) in elements {
        conn.execute(
            "DELETE FROM change_set_element \
             WHERE change_set_id=?1 AND entity_id=?2 AND schema_key=?3 AND file_id=?4",
            params![working.change_set_id, key.entity_id, key.schema_key, key.file_id],
        )?;
        insert_element_tx(conn, &working.change_set_id, key, change_id)?;
    }

    for (key, change_id) in elements {
        if !is_own_entity_schema(&key.schema_key) {
            continue;
        }
        let (change, content) = change_with_content_tx(conn, change_id)?
            .ok_or_else(|| LixError::foreign_key("change", change_id.as_str()))?;
        apply_own_entity_change_tx(conn, &change, content.as_ref())?;
    }

    mark_schemas_stale_tx(conn, elements.iter().map(|(key, _)| key.schema_key.as_str()))?;
    debug!(
        version_id = %version.id,
        commit_id = %commit.id,
        elements = elements.len(),
        "version advanced"
    );
    Ok(commit)
}
