#![forbid(unsafe_code)]

use super::super::changes::create_change_tx;
use super::super::state::{Materializer, mark_all_schemas_stale_tx};
use super::super::versions::require_version_tx;
use super::super::{CreateChange, Lix, LixError};
use super::{commit_to_version_tx, require_commit_tx};
use lix_core::model::Commit;
use tracing::info;

impl Lix {
    /// Makes the version's state equal to the state at `to_commit_id`.
    ///
    /// Records one commit (parents: current tip and target) holding the target's changes for
    /// every entity that differs, plus fresh deletion changes for entities the target lacks.
    /// A version already at the target is left untouched.
    pub fn transition(&mut self, version_id: &str, to_commit_id: &str) -> Result<Commit, LixError> {
        let tx = self.conn.transaction()?;
        let version = require_version_tx(&tx, version_id)?;
        let target_commit = require_commit_tx(&tx, to_commit_id)?;
        if version.commit_id == target_commit.id {
            tx.commit()?;
            return Ok(target_commit);
        }

        let materializer = Materializer::new(&tx, None)?.without_stage();
        let current = materializer.commit_state(&version.commit_id)?;
        let target = materializer.commit_state(&target_commit.id)?;

        let mut elements = Vec::new();
        for (key, entry) in &target {
            let unchanged = current
                .get(key)
                .is_some_and(|existing| existing.change.id == entry.change.id);
            if !unchanged {
                elements.push((key.clone(), entry.change.id.clone()));
            }
        }
        for (key, entry) in &current {
            if target.contains_key(key) || entry.change.is_deletion() {
                continue;
            }
            let mut deletion = CreateChange::new(
                &key.entity_id,
                &key.schema_key,
                &key.file_id,
                &entry.change.plugin_key,
                None,
            );
            deletion.schema_version = entry.change.schema_version.clone();
            deletion.parent_change_ids = vec![entry.change.id.clone()];
            let change = create_change_tx(&tx, &deletion)?;
            elements.push((key.clone(), change.id));
        }

        let commit = commit_to_version_tx(&tx, &version, &elements, &[target_commit.id.clone()])?;
        mark_all_schemas_stale_tx(&tx)?;
        tx.commit()?;

        info!(
            version_id = %version.id,
            to_commit_id = %target_commit.id,
            commit_id = %commit.id,
            elements = elements.len(),
            "version transitioned"
        );
        Ok(commit)
    }
}
