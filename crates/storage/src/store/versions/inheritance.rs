#![forbid(unsafe_code)]

use super::super::state::mark_all_schemas_stale_tx;
use super::super::{Lix, LixError};
use super::{parent_of_tx, require_version_tx};
use lix_core::graph::{inheritance_chain, would_create_cycle};
use lix_core::model::{InheritsFrom, Version};
use rusqlite::{Connection, params};
use tracing::info;

impl Lix {
    /// Changes which version `version_id` inherits from.
    pub fn set_version_inheritance(
        &mut self,
        version_id: &str,
        inherits_from: InheritsFrom,
    ) -> Result<Version, LixError> {
        let tx = self.conn.transaction()?;
        let version = require_version_tx(&tx, version_id)?;
        let parent = inherits_from.parent_id();
        if let Some(parent) = parent {
            check_inheritance_tx(&tx, &version.id, parent)?;
        }
        tx.execute(
            "UPDATE version SET inherits_from_version_id=?2 WHERE id=?1",
            params![version.id, parent],
        )?;
        mark_all_schemas_stale_tx(&tx)?;
        let updated = require_version_tx(&tx, &version.id)?;
        tx.commit()?;

        info!(version_id = %updated.id, parent = ?updated.inherits_from_version_id, "inheritance updated");
        Ok(updated)
    }

    /// `version_id` followed by each version it inherits from.
    pub fn version_inheritance_chain(&self, version_id: &str) -> Result<Vec<String>, LixError> {
        require_version_tx(&self.conn, version_id)?;
        let chain = inheritance_chain(version_id, |id| parent_of_tx(&self.conn, id))?;
        Ok(chain.ids)
    }
}

/// Fails unless `parent` exists and making it the parent of `child` keeps inheritance acyclic.
pub(in crate::store) fn check_inheritance_tx(
    conn: &Connection,
    child: &str,
    parent: &str,
) -> Result<(), LixError> {
    require_version_tx(conn, parent)?;
    if would_create_cycle(child, parent, |id| parent_of_tx(conn, id))? {
        return Err(LixError::InheritanceCycle {
            version_id: child.to_string(),
            parent_id: parent.to_string(),
        });
    }
    Ok(())
}

/// Rejects a database state where any version reaches itself through inheritance.
pub(in crate::store) fn verify_inheritance_acyclic_tx(conn: &Connection) -> Result<(), LixError> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, inherits_from_version_id FROM version WHERE inherits_from_version_id IS NOT NULL",
    )?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
    for row in rows {
        let (id, parent) = row?;
        let chain = inheritance_chain(&id, |current| parent_of_tx(conn, current))?;
        if chain.cyclic {
            return Err(LixError::InheritanceCycle {
                version_id: id,
                parent_id: parent,
            });
        }
    }
    Ok(())
}
