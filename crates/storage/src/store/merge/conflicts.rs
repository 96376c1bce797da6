#![forbid(unsafe_code)]

use super::super::changes::{change_parents_tx, change_tx, insert_change_edge_tx};
use super::super::commits::{change_set_elements_tx, commit_to_version_tx, insert_change_set_tx};
use super::super::state::Materializer;
use super::super::support::{CONFLICT_COLUMNS, conflict_from_row, generate_id_tx, timestamp_tx};
use super::super::versions::require_version_tx;
use super::super::{Lix, LixError};
use lix_core::graph::{MAX_ANCESTOR_DEPTH, ancestors_with_depth};
use lix_core::model::{ChangeConflict, ChangeSetElement, Commit};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeSet;
use tracing::{debug, info};

impl Lix {
    /// Records a conflict between `change_ids` for `key` in `version_id`.
    ///
    /// Returns the existing conflict when one with the same key, version and change set is
    /// already recorded.
    pub fn create_change_conflict(
        &mut self,
        version_id: &str,
        key: &str,
        change_ids: &[&str],
    ) -> Result<ChangeConflict, LixError> {
        let tx = self.conn.transaction()?;
        let change_ids = change_ids.iter().map(|id| id.to_string()).collect::<Vec<_>>();
        let conflict = create_change_conflict_tx(&tx, version_id, key, &change_ids)?;
        tx.commit()?;
        Ok(conflict)
    }

    /// Open conflicts, for one version or all of them.
    pub fn change_conflicts(&self, version_id: Option<&str>) -> Result<Vec<ChangeConflict>, LixError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CONFLICT_COLUMNS} FROM change_conflict \
             WHERE ?1 IS NULL OR version_id=?1 ORDER BY created_at ASC, id ASC"
        ))?;
        let rows = stmt.query_map(params![version_id], conflict_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn change_conflict_elements(&self, conflict_id: &str) -> Result<Vec<ChangeSetElement>, LixError> {
        let conflict = conflict_tx(&self.conn, conflict_id)?
            .ok_or_else(|| LixError::UnknownConflict(conflict_id.to_string()))?;
        change_set_elements_tx(&self.conn, &conflict.change_set_id)
    }

    /// Resolves a conflict by making `change_id` the entity's current change in the
    /// conflict's version, then removes the conflict.
    ///
    /// Returns the new commit, or `None` when `change_id` was already current.
    pub fn resolve_conflict_by_selecting(
        &mut self,
        conflict_id: &str,
        change_id: &str,
    ) -> Result<Option<Commit>, LixError> {
        let tx = self.conn.transaction()?;
        let conflict = conflict_tx(&tx, conflict_id)?
            .ok_or_else(|| LixError::UnknownConflict(conflict_id.to_string()))?;
        let members = change_set_elements_tx(&tx, &conflict.change_set_id)?;
        if !members.iter().any(|element| element.change_id == change_id) {
            return Err(LixError::ConflictSelectionInvalid {
                conflict_id: conflict.id,
                change_id: change_id.to_string(),
            });
        }

        let selected = change_tx(&tx, change_id)?
            .ok_or_else(|| LixError::foreign_key("change", change_id))?;
        let version = require_version_tx(&tx, &conflict.version_id)?;
        let current = {
            let mut materializer = Materializer::new(&tx, None)?.without_stage();
            materializer
                .local_tracked(&version)?
                .get(&selected.key())
                .map(|entry| entry.change.id.clone())
        };

        let commit = if current.as_deref() == Some(selected.id.as_str()) {
            None
        } else {
            if let Some(current) = current.as_deref() {
                if !is_change_ancestor_tx(&tx, &selected.id, current)? {
                    insert_change_edge_tx(&tx, current, &selected.id)?;
                }
            }
            Some(commit_to_version_tx(
                &tx,
                &version,
                &[(selected.key(), selected.id.clone())],
                &[],
            )?)
        };

        tx.execute("DELETE FROM change_conflict WHERE id=?1", params![conflict.id])?;
        tx.commit()?;

        info!(
            conflict_id = %conflict.id,
            change_id = %selected.id,
            committed = commit.is_some(),
            "conflict resolved"
        );
        Ok(commit)
    }
}

pub(in crate::store) fn create_change_conflict_tx(
    conn: &Connection,
    version_id: &str,
    key: &str,
    change_ids: &[String],
) -> Result<ChangeConflict, LixError> {
    if key.trim().is_empty() {
        return Err(LixError::InvalidInput("conflict key must not be empty"));
    }
    if change_ids.len() < 2 {
        return Err(LixError::InvalidInput("a conflict needs at least two changes"));
    }
    require_version_tx(conn, version_id)?;
    let wanted = change_ids.iter().cloned().collect::<BTreeSet<_>>();

    let existing = {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {CONFLICT_COLUMNS} FROM change_conflict WHERE version_id=?1 AND key=?2 \
             ORDER BY created_at ASC, id ASC"
        ))?;
        let rows = stmt.query_map(params![version_id, key], conflict_from_row)?;
        rows.collect::<Result<Vec<_>, _>>()?
    };
    for conflict in existing {
        let members = change_set_elements_tx(conn, &conflict.change_set_id)?
            .into_iter()
            .map(|element| element.change_id)
            .collect::<BTreeSet<_>>();
        if members == wanted {
            debug!(conflict_id = %conflict.id, key, "conflict already recorded");
            return Ok(conflict);
        }
    }

    let mut elements = Vec::with_capacity(wanted.len());
    for change_id in &wanted {
        let change = change_tx(conn, change_id)?
            .ok_or_else(|| LixError::foreign_key("change", change_id.as_str()))?;
        elements.push((change.key(), change.id));
    }
    let change_set_id = insert_change_set_tx(conn, &elements)?;

    let conflict = ChangeConflict {
        id: generate_id_tx(conn)?,
        key: key.to_string(),
        change_set_id,
        version_id: version_id.to_string(),
        created_at: timestamp_tx(conn)?,
    };
    conn.execute(
        "INSERT INTO change_conflict(id, key, change_set_id, version_id, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            conflict.id,
            conflict.key,
            conflict.change_set_id,
            conflict.version_id,
            conflict.created_at
        ],
    )?;
    info!(conflict_id = %conflict.id, key, version_id, "change conflict recorded");
    Ok(conflict)
}

fn conflict_tx(conn: &Connection, conflict_id: &str) -> Result<Option<ChangeConflict>, LixError> {
    let found = conn
        .query_row(
            &format!("SELECT {CONFLICT_COLUMNS} FROM change_conflict WHERE id=?1"),
            params![conflict_id],
            conflict_from_row,
        )
        .optional()?;
    Ok(found)
}

/// Whether `ancestor` is reachable from `descendant` in the change graph (bounded walk).
fn is_change_ancestor_tx(conn: &Connection, ancestor: &str, descendant: &str) -> Result<bool, LixError> {
    let reachable =
        ancestors_with_depth(descendant, Some(MAX_ANCESTOR_DEPTH), |id| change_parents_tx(conn, id))?;
    Ok(reachable.contains_key(ancestor))
}
