#![forbid(unsafe_code)]

mod worker;

pub use worker::{ChangeQueueWorker, ChangeQueueWorkerConfig, WorkerState, WorkerStatus};

use super::support::{json_column, json_value_column, timestamp_tx};
use super::transaction::{commit_stage_tx, stage_write_tx};
use super::versions::active_version_id_tx;
use super::{Lix, LixError};
use lix_core::ids::canonical_identifier;
use lix_core::model::StateWrite;
use lix_core::plugin::{ChangeDetectionPlugin, DetectedChange};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info};

#[derive(Clone, Debug, PartialEq)]
pub struct FileRecord {
    pub id: String,
    pub path: String,
    pub data: Vec<u8>,
    pub metadata: Option<Value>,
}

/// One pending (or failed) file mutation waiting for change detection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeQueueEntry {
    pub id: i64,
    pub file_id: String,
    pub path: String,
    pub data_before: Option<Vec<u8>>,
    pub data_after: Option<Vec<u8>>,
    pub version_id: String,
    pub created_at: String,
    pub failed_at: Option<String>,
    pub error: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueRunReport {
    pub processed: usize,
    pub failed: usize,
    /// Entries no registered plugin handles; dropped without changes.
    pub unhandled: usize,
    pub detected_changes: usize,
}

const QUEUE_COLUMNS: &str =
    "id, file_id, path, data_before, data_after, version_id, created_at, failed_at, error";

fn queue_entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChangeQueueEntry> {
    Ok(ChangeQueueEntry {
        id: row.get(0)?,
        file_id: row.get(1)?,
        path: row.get(2)?,
        data_before: row.get(3)?,
        data_after: row.get(4)?,
        version_id: row.get(5)?,
        created_at: row.get(6)?,
        failed_at: row.get(7)?,
        error: row.get(8)?,
    })
}

/// Holds one level of change-queue skipping; unwinding out of the scope releases it too.
struct SkipScope<'a>(&'a mut Lix);

impl<'a> SkipScope<'a> {
    fn enter(lix: &'a mut Lix) -> Self {
        lix.ctx.skip_change_queue_depth += 1;
        Self(lix)
    }
}

impl Drop for SkipScope<'_> {
    fn drop(&mut self) {
        self.0.ctx.skip_change_queue_depth -= 1;
    }
}

impl Lix {
    /// Creates or replaces a file and queues the mutation for change detection.
    pub fn write_file(
        &mut self,
        file_id: &str,
        path: &str,
        data: &[u8],
        metadata: Option<Value>,
    ) -> Result<(), LixError> {
        let file_id =
            canonical_identifier(file_id).map_err(|err| LixError::InvalidInput(err.message()))?;
        if !path.starts_with('/') {
            return Err(LixError::InvalidInput("file path must be absolute"));
        }

        let enqueue = self.ctx.skip_change_queue_depth == 0;
        let tx = self.conn.transaction()?;
        let before = file_tx(&tx, &file_id)?.map(|file| file.data);
        tx.execute(
            "INSERT INTO file(id, path, data, metadata) VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(id) DO UPDATE SET path=excluded.path, data=excluded.data, \
             metadata=excluded.metadata",
            params![file_id, path, data, json_column(metadata.as_ref())],
        )?;
        if enqueue {
            enqueue_tx(&tx, &file_id, path, before.as_deref(), Some(data))?;
        }
        tx.commit()?;

        debug!(file_id = %file_id, path, bytes = data.len(), enqueued = enqueue, "file written");
        Ok(())
    }

    /// Removes a file and queues the deletion. Returns `false` when there was no such file.
    pub fn delete_file(&mut self, file_id: &str) -> Result<bool, LixError> {
        let enqueue = self.ctx.skip_change_queue_depth == 0;
        let tx = self.conn.transaction()?;
        let Some(existing) = file_tx(&tx, file_id)? else {
            return Ok(false);
        };
        tx.execute("DELETE FROM file WHERE id=?1", params![file_id])?;
        if enqueue {
            enqueue_tx(&tx, &existing.id, &existing.path, Some(&existing.data), None)?;
        }
        tx.commit()?;

        debug!(file_id, enqueued = enqueue, "file deleted");
        Ok(true)
    }

    pub fn file(&self, file_id: &str) -> Result<Option<FileRecord>, LixError> {
        file_tx(&self.conn, file_id)
    }

    pub fn files(&self) -> Result<Vec<FileRecord>, LixError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, path, data, metadata FROM file ORDER BY path ASC")?;
        let rows = stmt.query_map([], file_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Runs `f` with file mutations bypassing the change queue. Scopes nest.
    pub fn with_skipped_change_queue<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, LixError>,
    ) -> Result<T, LixError> {
        let scope = SkipScope::enter(self);
        f(&mut *scope.0)
    }

    pub fn pending_change_queue(&self) -> Result<Vec<ChangeQueueEntry>, LixError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {QUEUE_COLUMNS} FROM change_queue WHERE failed_at IS NULL ORDER BY id ASC"
        ))?;
        let rows = stmt.query_map([], queue_entry_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn failed_change_queue(&self) -> Result<Vec<ChangeQueueEntry>, LixError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {QUEUE_COLUMNS} FROM change_queue WHERE failed_at IS NOT NULL ORDER BY id ASC"
        ))?;
        let rows = stmt.query_map([], queue_entry_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Drains the queue in order on the calling thread.
    ///
    /// A plugin failure marks that entry failed and moves on; failed entries are not retried.
    pub fn process_change_queue(&mut self) -> Result<QueueRunReport, LixError> {
        let mut report = QueueRunReport::default();
        while let Some(entry) = self.next_change_queue_entry()? {
            let Some(plugin) = self.plugin_for_path(&entry.path) else {
                self.discard_change_queue_entry(&entry)?;
                report.unhandled += 1;
                continue;
            };
            let detected = plugin.detect_changes(entry.data_before.as_deref(), entry.data_after.as_deref());
            match detected {
                Ok(changes) => match self.complete_change_queue_entry(&entry, plugin.key(), changes)? {
                    Some(count) => {
                        report.detected_changes += count;
                        report.processed += 1;
                    }
                    None => report.failed += 1,
                },
                Err(err) => {
                    self.fail_change_queue_entry(&entry, &err.to_string())?;
                    report.failed += 1;
                }
            }
        }
        if report != QueueRunReport::default() {
            info!(
                processed = report.processed,
                failed = report.failed,
                unhandled = report.unhandled,
                detected_changes = report.detected_changes,
                "change queue drained"
            );
        }
        Ok(report)
    }

    pub(crate) fn next_change_queue_entry(&self) -> Result<Option<ChangeQueueEntry>, LixError> {
        let found = self
            .conn
            .query_row(
                &format!(
                    "SELECT {QUEUE_COLUMNS} FROM change_queue WHERE failed_at IS NULL \
                     ORDER BY id ASC LIMIT 1"
                ),
                [],
                queue_entry_from_row,
            )
            .optional()?;
        Ok(found)
    }

    pub(crate) fn plugin_for_path(&self, path: &str) -> Option<Arc<dyn ChangeDetectionPlugin>> {
        self.ctx
            .plugins
            .iter()
            .find(|registered| registered.matcher.is_match(path))
            .map(|registered| registered.plugin.clone())
    }

    /// Stages and commits what the plugin detected, then drops the entry. If applying fails
    /// (for instance an own-entity schema under a foreign plugin key) the entry is marked
    /// failed instead and `None` is returned.
    pub(crate) fn complete_change_queue_entry(
        &mut self,
        entry: &ChangeQueueEntry,
        plugin_key: &str,
        detected: Vec<DetectedChange>,
    ) -> Result<Option<usize>, LixError> {
        let count = detected.len();
        let applied = {
            let tx = self.conn.transaction()?;
            let result = apply_detected_tx(&tx, entry, plugin_key, detected);
            match result {
                Ok(()) => {
                    tx.execute("DELETE FROM change_queue WHERE id=?1", params![entry.id])?;
                    tx.commit()?;
                    Ok(())
                }
                Err(err) => Err(err),
            }
        };
        if let Err(err) = applied {
            self.fail_change_queue_entry(entry, &err.to_string())?;
            return Ok(None);
        }
        debug!(entry_id = entry.id, path = %entry.path, plugin_key, changes = count, "queue entry processed");
        Ok(Some(count))
    }

    pub(crate) fn fail_change_queue_entry(
        &mut self,
        entry: &ChangeQueueEntry,
        message: &str,
    ) -> Result<(), LixError> {
        let failed_at = timestamp_tx(&self.conn)?;
        self.conn.execute(
            "UPDATE change_queue SET failed_at=?2, error=?3 WHERE id=?1",
            params![entry.id, failed_at, message],
        )?;
        error!(entry_id = entry.id, path = %entry.path, error = message, "change detection failed");
        Ok(())
    }

    pub(crate) fn discard_change_queue_entry(&mut self, entry: &ChangeQueueEntry) -> Result<(), LixError> {
        self.conn
            .execute("DELETE FROM change_queue WHERE id=?1", params![entry.id])?;
        debug!(entry_id = entry.id, path = %entry.path, "no plugin handles path");
        Ok(())
    }
}

fn apply_detected_tx(
    conn: &Connection,
    entry: &ChangeQueueEntry,
    plugin_key: &str,
    detected: Vec<DetectedChange>,
) -> Result<(), LixError> {
    for change in detected {
        let write = StateWrite {
            entity_id: change.entity_id,
            schema_key: change.schema_key,
            file_id: entry.file_id.clone(),
            plugin_key: plugin_key.to_string(),
            schema_version: change.schema_version,
            snapshot_content: change.snapshot,
            version_id: Some(entry.version_id.clone()),
            untracked: false,
        };
        stage_write_tx(conn, &write, None)?;
    }
    commit_stage_tx(conn)?;
    Ok(())
}

fn enqueue_tx(
    conn: &Connection,
    file_id: &str,
    path: &str,
    before: Option<&[u8]>,
    after: Option<&[u8]>,
) -> Result<(), LixError> {
    let version_id = active_version_id_tx(conn)?;
    conn.execute(
        "INSERT INTO change_queue(file_id, path, data_before, data_after, version_id, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![file_id, path, before, after, version_id, timestamp_tx(conn)?],
    )?;
    Ok(())
}

fn file_tx(conn: &Connection, file_id: &str) -> Result<Option<FileRecord>, LixError> {
    let found = conn
        .query_row(
            "SELECT id, path, data, metadata FROM file WHERE id=?1",
            params![file_id],
            file_from_row,
        )
        .optional()?;
    Ok(found)
}

fn file_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(0)?,
        path: row.get(1)?,
        data: row.get(2)?,
        metadata: json_value_column(row, 3)?,
    })
}
