#![forbid(unsafe_code)]

use super::super::commits::require_commit_tx;
use super::super::state::mark_all_schemas_stale_tx;
use super::super::support::generate_id_tx;
use super::super::{CreateVersion, Lix, LixError};
use super::{active_version_id_tx, check_inheritance_tx, insert_version_tx, require_version_tx};
use lix_core::ids::canonical_identifier;
use lix_core::model::Version;
use tracing::info;

impl Lix {
    /// Creates a version at `from_commit_id` (default: the active version's tip).
    pub fn create_version(&mut self, request: CreateVersion) -> Result<Version, LixError> {
        let tx = self.conn.transaction()?;

        let id = match request.id.as_deref() {
            Some(id) => canonical_identifier(id).map_err(|err| LixError::InvalidInput(err.message()))?,
            None => generate_id_tx(&tx)?,
        };
        let name = match request.name.as_deref() {
            Some(name) => {
                canonical_identifier(name).map_err(|err| LixError::InvalidInput(err.message()))?
            }
            None => id.clone(),
        };

        let commit_id = match request.from_commit_id {
            Some(commit_id) => require_commit_tx(&tx, &commit_id)?.id,
            None => {
                let active = active_version_id_tx(&tx)?;
                require_version_tx(&tx, &active)?.commit_id
            }
        };

        let parent = request.inherits_from.parent_id();
        if let Some(parent) = parent {
            check_inheritance_tx(&tx, &id, parent)?;
        }

        let version = insert_version_tx(&tx, &id, &name, &commit_id, parent, request.hidden)?;
        mark_all_schemas_stale_tx(&tx)?;
        tx.commit()?;

        info!(version_id = %version.id, name = %version.name, commit_id = %version.commit_id, "version created");
        Ok(version)
    }
}
