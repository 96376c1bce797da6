#![forbid(unsafe_code)]

use super::super::state::mark_schemas_stale_tx;
use super::super::versions::require_version_tx;
use super::super::{Lix, LixError};
use super::{change_set_elements_tx, insert_change_set_tx, insert_commit_tx, insert_root_commit_tx, require_commit_tx};
use lix_core::model::Commit;
use rusqlite::params;
use tracing::info;

impl Lix {
    /// Turns the version's working change set into a durable checkpoint commit on top of its tip,
    /// then starts an empty working change set.
    pub fn create_checkpoint(&mut self, version_id: &str) -> Result<Commit, LixError> {
        let tx = self.conn.transaction()?;
        let version = require_version_tx(&tx, version_id)?;
        let working = require_commit_tx(&tx, &version.working_commit_id)?;

        let elements = change_set_elements_tx(&tx, &working.change_set_id)?
            .into_iter()
            .map(|element| (element.key(), element.change_id))
            .collect::<Vec<_>>();
        let change_set_id = insert_change_set_tx(&tx, &elements)?;
        let checkpoint = insert_commit_tx(&tx, &change_set_id, &[version.commit_id.clone()], true)?;
        let fresh_working = insert_root_commit_tx(&tx)?;

        tx.execute(
            "UPDATE version SET commit_id=?2, working_commit_id=?3 WHERE id=?1",
            params![version.id, checkpoint.id, fresh_working.id],
        )?;
        tx.execute("DELETE FROM \"commit\" WHERE id=?1", params![working.id])?;
        tx.execute(
            "DELETE FROM change_set WHERE id=?1",
            params![working.change_set_id],
        )?;

        mark_schemas_stale_tx(&tx, elements.iter().map(|(key, _)| key.schema_key.as_str()))?;
        tx.commit()?;

        info!(
            version_id = %version.id,
            commit_id = %checkpoint.id,
            elements = elements.len(),
            "checkpoint created"
        );
        Ok(checkpoint)
    }

    /// Change set accumulating the version's changes since its last checkpoint.
    pub fn working_change_set_id(&self, version_id: &str) -> Result<String, LixError> {
        let version = require_version_tx(&self.conn, version_id)?;
        Ok(require_commit_tx(&self.conn, &version.working_commit_id)?.change_set_id)
    }
}
