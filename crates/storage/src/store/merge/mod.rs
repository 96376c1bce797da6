#![forbid(unsafe_code)]

mod conflicts;
mod import;

use conflicts::create_change_conflict_tx;

use super::changes::change_parents_tx;
use super::commits::commit_to_version_tx;
use super::state::{Materializer, TrackedEntry};
use super::versions::{active_version_id_tx, require_version_tx};
use super::{Lix, LixError};
use import::import_change_lineage_tx;
use lix_core::graph::lowest_common_ancestor;
use lix_core::model::{Change, ChangeConflict, Commit, EntityKey, Version};
use rusqlite::Connection;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::info;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Commit on the target version carrying the applied changes, if any were applied.
    pub commit: Option<Commit>,
    pub applied_change_ids: Vec<String>,
    pub conflicts: Vec<ChangeConflict>,
}

/// Source change offered to the target, with its content.
struct Candidate {
    change: Change,
    content: Option<Value>,
}

#[derive(Debug, PartialEq, Eq)]
enum Decision {
    Apply,
    Skip,
    Conflict { target_change_id: String },
}

impl Lix {
    /// Records (and returns) the conflicts merging `source`'s active version into this
    /// instance's active version would raise, without applying anything.
    pub fn report_conflicts(&mut self, source: &Lix) -> Result<Vec<ChangeConflict>, LixError> {
        Ok(self.merge_from(source, false)?.conflicts)
    }

    /// Merges `source`'s active version into this instance's active version.
    ///
    /// Source changes this instance lacks are copied in with their lineage. Fast-forwards and
    /// new entities are applied in one commit; divergent edits become change conflicts.
    pub fn merge(&mut self, source: &Lix) -> Result<MergeOutcome, LixError> {
        self.merge_from(source, true)
    }

    /// Merges one version of this instance into another.
    pub fn merge_version(
        &mut self,
        source_version_id: &str,
        target_version_id: &str,
    ) -> Result<MergeOutcome, LixError> {
        let tx = self.conn.transaction()?;
        let source = require_version_tx(&tx, source_version_id)?;
        let target = require_version_tx(&tx, target_version_id)?;
        if source.id == target.id {
            return Err(LixError::InvalidInput("cannot merge a version into itself"));
        }
        let candidates = local_candidates(&tx, &source)?;
        let outcome = merge_candidates_tx(&tx, candidates, &target, true)?;
        tx.commit()?;

        info!(
            source_version_id = %source.id,
            target_version_id = %target.id,
            applied = outcome.applied_change_ids.len(),
            conflicts = outcome.conflicts.len(),
            "versions merged"
        );
        Ok(outcome)
    }

    fn merge_from(&mut self, source: &Lix, apply: bool) -> Result<MergeOutcome, LixError> {
        let source_version = {
            let id = active_version_id_tx(&source.conn)?;
            require_version_tx(&source.conn, &id)?
        };
        let candidates = local_candidates(&source.conn, &source_version)?;

        let tx = self.conn.transaction()?;
        for candidate in &candidates {
            import_change_lineage_tx(&tx, &source.conn, &candidate.change.id)?;
        }
        let target_id = active_version_id_tx(&tx)?;
        let target = require_version_tx(&tx, &target_id)?;
        let outcome = merge_candidates_tx(&tx, candidates, &target, apply)?;
        tx.commit()?;

        info!(
            source_version_id = %source_version.id,
            target_version_id = %target.id,
            applied = outcome.applied_change_ids.len(),
            conflicts = outcome.conflicts.len(),
            apply,
            "merge evaluated"
        );
        Ok(outcome)
    }
}

/// The version's own tracked state (inheritance excluded), deletions included.
fn local_candidates(conn: &Connection, version: &Version) -> Result<Vec<Candidate>, LixError> {
    let mut materializer = Materializer::new(conn, None)?.without_stage();
    let local = materializer.local_tracked(version)?;
    Ok(local
        .values()
        .map(|entry| Candidate {
            change: entry.change.clone(),
            content: entry.content.clone(),
        })
        .collect())
}

fn merge_candidates_tx(
    conn: &Connection,
    candidates: Vec<Candidate>,
    target: &Version,
    apply: bool,
) -> Result<MergeOutcome, LixError> {
    let target_state: BTreeMap<EntityKey, TrackedEntry> = {
        let mut materializer = Materializer::new(conn, None)?.without_stage();
        materializer.local_tracked(target)?.clone()
    };

    let mut applied = Vec::new();
    let mut conflicts = Vec::new();
    for candidate in candidates {
        let key = candidate.change.key();
        match classify(conn, &candidate, target_state.get(&key))? {
            Decision::Apply => applied.push((key, candidate.change.id)),
            Decision::Skip => {}
            Decision::Conflict { target_change_id } => {
                let change_ids = vec![candidate.change.id.clone(), target_change_id];
                conflicts.push(create_change_conflict_tx(
                    conn,
                    &target.id,
                    &key.conflict_key(),
                    &change_ids,
                )?);
            }
        }
    }

    let commit = if apply && !applied.is_empty() {
        Some(commit_to_version_tx(conn, target, &applied, &[])?)
    } else {
        None
    };

    Ok(MergeOutcome {
        commit,
        applied_change_ids: applied.into_iter().map(|(_, change_id)| change_id).collect(),
        conflicts,
    })
}

/// Three-way decision for one entity, using the lowest common ancestor in the change graph.
fn classify(
    conn: &Connection,
    candidate: &Candidate,
    target: Option<&TrackedEntry>,
) -> Result<Decision, LixError> {
    let Some(target) = target else {
        return Ok(if candidate.change.is_deletion() {
            Decision::Skip
        } else {
            Decision::Apply
        });
    };
    if target.change.id == candidate.change.id {
        return Ok(Decision::Skip);
    }

    let ancestor = lowest_common_ancestor(&candidate.change.id, &target.change.id, |id| {
        change_parents_tx(conn, id)
    })?;
    match ancestor.as_deref() {
        // Unrelated lineages: the source change is taken as an insert.
        None => return Ok(Decision::Apply),
        Some(id) if id == target.change.id => return Ok(Decision::Apply),
        Some(id) if id == candidate.change.id => return Ok(Decision::Skip),
        Some(_) => {}
    }

    if target.content == candidate.content {
        return Ok(Decision::Skip);
    }
    Ok(Decision::Conflict {
        target_change_id: target.change.id.clone(),
    })
}
