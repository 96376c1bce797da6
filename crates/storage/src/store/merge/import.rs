#![forbid(unsafe_code)]

use super::super::changes::{change_parents_tx, change_tx, change_with_content_tx, insert_change_row_tx, store_snapshot_tx};
use super::super::LixError;
use lix_core::model::Account;
use rusqlite::{Connection, params};
use std::collections::BTreeSet;
use tracing::debug;

/// Copies `change_id` and every ancestor the target lacks from `source` into `target`, with
/// snapshots, change-graph edges and authors. Returns how many changes were copied.
pub(super) fn import_change_lineage_tx(
    target: &Connection,
    source: &Connection,
    change_id: &str,
) -> Result<usize, LixError> {
    let mut pending = vec![change_id.to_string()];
    let mut visited = BTreeSet::new();
    let mut edges = Vec::new();
    let mut copied = 0usize;

    while let Some(id) = pending.pop() {
        if !visited.insert(id.clone()) || change_tx(target, &id)?.is_some() {
            continue;
        }
        let (change, content) = change_with_content_tx(source, &id)?
            .ok_or_else(|| LixError::foreign_key("change", id.as_str()))?;

        store_snapshot_tx(target, content.as_ref())?;
        insert_change_row_tx(target, &change)?;
        copy_authors_tx(target, source, &change.id)?;
        copied += 1;

        for parent in change_parents_tx(source, &id)? {
            edges.push((parent.clone(), id.clone()));
            pending.push(parent);
        }
    }

    for (parent, child) in &edges {
        target.execute(
            "INSERT OR IGNORE INTO change_graph_edge(parent_id, child_id) VALUES (?1, ?2)",
            params![parent, child],
        )?;
    }
    if copied > 0 {
        debug!(change_id, copied, edges = edges.len(), "change lineage imported");
    }
    Ok(copied)
}

fn copy_authors_tx(target: &Connection, source: &Connection, change_id: &str) -> Result<(), LixError> {
    let mut stmt = source.prepare_cached(
        "SELECT a.id, a.name FROM change_author ca JOIN account a ON a.id = ca.account_id \
         WHERE ca.change_id=?1",
    )?;
    let authors = stmt
        .query_map(params![change_id], |row| {
            Ok(Account {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    for author in authors {
        target.execute(
            "INSERT OR IGNORE INTO account(id, name) VALUES (?1, ?2)",
            params![author.id, author.name],
        )?;
        target.execute(
            "INSERT OR IGNORE INTO change_author(change_id, account_id) VALUES (?1, ?2)",
            params![change_id, author.id],
        )?;
    }
    Ok(())
}
