#![forbid(unsafe_code)]

mod cache;
mod history;
mod materialize;
mod query;

pub use cache::StateCacheMetrics;
pub use query::QueryResult;

pub(in crate::store) use cache::{mark_all_schemas_stale_tx, mark_schemas_stale_tx};
pub(in crate::store) use materialize::{Materializer, TrackedEntry};
pub(in crate::store) use query::execute_tx;

use super::support::{STATE_COLUMNS, state_from_row};
use super::versions::{active_version_id_tx, require_version_tx};
use super::{Lix, LixError};
use cache::ensure_schema_cache_tx;
use history::history_rows_tx;
use lix_core::model::{EntityKey, HistoryRow, StateRow};
use rusqlite::{Connection, params};
use serde_json::Value;

/// Which versions a state read covers.
#[derive(Clone, Copy, Debug)]
pub(in crate::store) enum StateScope<'a> {
    Version(&'a str),
    All,
}

impl Lix {
    /// Rows visible in the active version, optionally for one schema.
    pub fn state(&mut self, schema_key: Option<&str>) -> Result<Vec<StateRow>, LixError> {
        let tx = self.conn.transaction()?;
        let active = active_version_id_tx(&tx)?;
        let rows = read_state_tx(&tx, &mut self.ctx.cache_metrics, StateScope::Version(&active), schema_key)?;
        tx.commit()?;
        Ok(rows)
    }

    /// Rows of every version.
    pub fn state_all(&mut self, schema_key: Option<&str>) -> Result<Vec<StateRow>, LixError> {
        let tx = self.conn.transaction()?;
        let rows = read_state_tx(&tx, &mut self.ctx.cache_metrics, StateScope::All, schema_key)?;
        tx.commit()?;
        Ok(rows)
    }

    pub fn state_in_version(
        &mut self,
        version_id: &str,
        schema_key: Option<&str>,
    ) -> Result<Vec<StateRow>, LixError> {
        let tx = self.conn.transaction()?;
        require_version_tx(&tx, version_id)?;
        let rows = read_state_tx(
            &tx,
            &mut self.ctx.cache_metrics,
            StateScope::Version(version_id),
            schema_key,
        )?;
        tx.commit()?;
        Ok(rows)
    }

    /// One entity in `version_id` (the active version when `None`).
    pub fn state_entity(
        &mut self,
        key: &EntityKey,
        version_id: Option<&str>,
    ) -> Result<Option<StateRow>, LixError> {
        let rows = match version_id {
            Some(version_id) => self.state_in_version(version_id, Some(&key.schema_key))?,
            None => self.state(Some(&key.schema_key))?,
        };
        Ok(rows
            .into_iter()
            .find(|row| row.entity_id == key.entity_id && row.file_id == key.file_id))
    }

    /// State as recorded by the commit of `change_set_id`.
    pub fn state_history(
        &self,
        change_set_id: &str,
        schema_key: Option<&str>,
    ) -> Result<Vec<HistoryRow>, LixError> {
        history_rows_tx(&self.conn, change_set_id, schema_key)
    }

    /// Executes one SQL statement inside its own transaction.
    ///
    /// `state`, `state_all` and `state_history` may be referenced like tables. `params` bind
    /// positionally.
    pub fn execute(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult, LixError> {
        let tx = self.conn.transaction()?;
        let result = execute_tx(&tx, &mut self.ctx.cache_metrics, sql, params)?;
        tx.commit()?;
        Ok(result)
    }

    pub fn cache_metrics(&self) -> &StateCacheMetrics {
        &self.ctx.cache_metrics
    }
}

/// Schema-pinned reads go through that schema's cache table; the rest materialize directly.
pub(in crate::store) fn read_state_tx(
    conn: &Connection,
    metrics: &mut StateCacheMetrics,
    scope: StateScope<'_>,
    schema_key: Option<&str>,
) -> Result<Vec<StateRow>, LixError> {
    let Some(schema_key) = schema_key else {
        metrics.generic_materializations += 1;
        let mut materializer = Materializer::new(conn, None)?;
        return match scope {
            StateScope::Version(version_id) => materializer.version_rows(version_id),
            StateScope::All => materializer.all_rows(),
        };
    };

    let table = ensure_schema_cache_tx(conn, metrics, schema_key)?;
    let order = "ORDER BY version_id ASC, schema_key ASC, file_id ASC, entity_id ASC";
    let rows = match scope {
        StateScope::Version(version_id) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {STATE_COLUMNS} FROM \"{table}\" WHERE version_id=?1 {order}"
            ))?;
            let rows = stmt.query_map(params![version_id], state_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()?
        }
        StateScope::All => {
            let mut stmt = conn.prepare(&format!("SELECT {STATE_COLUMNS} FROM \"{table}\" {order}"))?;
            let rows = stmt.query_map([], state_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()?
        }
    };
    Ok(rows)
}
