#![forbid(unsafe_code)]

mod accounts;
mod changes;
mod commits;
mod error;
mod key_values;
mod merge;
mod options;
mod own_entities;
mod queue;
mod requests;
mod state;
mod support;
mod transaction;
mod untracked;
mod versions;

pub use error::LixError;
pub use merge::MergeOutcome;
pub use options::LixOptions;
pub use queue::{
    ChangeQueueEntry, ChangeQueueWorker, ChangeQueueWorkerConfig, FileRecord, QueueRunReport,
    WorkerState, WorkerStatus,
};
pub use requests::*;
pub use state::{QueryResult, StateCacheMetrics};
pub use transaction::StateTransaction;

use globset::GlobMatcher;
use lix_core::ids::{GLOBAL_VERSION_ID, MAIN_VERSION_NAME};
use lix_core::model::InheritsFrom;
use lix_core::plugin::{ChangeDetectionPlugin, compile_glob};
use rusqlite::{Connection, DatabaseName};
use std::path::PathBuf;
use std::sync::Arc;
use support::{generate_id_tx, install_schema, preflight_gate};
use tracing::{debug, info};

/// One open Lix instance: an in-memory SQLite database plus the engine state around it.
pub struct Lix {
    conn: Connection,
    ctx: LixContext,
}

struct LixContext {
    plugins: Vec<RegisteredPlugin>,
    cache_metrics: StateCacheMetrics,
    skip_change_queue_depth: usize,
}

/// A plugin with its file pattern compiled once at open.
struct RegisteredPlugin {
    plugin: Arc<dyn ChangeDetectionPlugin>,
    matcher: GlobMatcher,
}

impl LixContext {
    fn new(plugins: Vec<Arc<dyn ChangeDetectionPlugin>>) -> Result<Self, LixError> {
        let plugins = plugins
            .into_iter()
            .map(|plugin| -> Result<RegisteredPlugin, LixError> {
                let matcher = compile_glob(plugin.key(), plugin.glob())?;
                Ok(RegisteredPlugin { plugin, matcher })
            })
            .collect::<Result<Vec<_>, LixError>>()?;
        Ok(Self {
            plugins,
            cache_metrics: StateCacheMetrics::default(),
            skip_change_queue_depth: 0,
        })
    }
}

impl std::fmt::Debug for Lix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let plugins = self
            .ctx
            .plugins
            .iter()
            .map(|registered| registered.plugin.key().to_string())
            .collect::<Vec<_>>();
        f.debug_struct("Lix")
            .field("plugins", &plugins)
            .field("cache_metrics", &self.ctx.cache_metrics)
            .finish_non_exhaustive()
    }
}

impl Lix {
    /// Opens a fresh instance, or restores one from `options.blob`.
    pub fn open(options: LixOptions) -> Result<Self, LixError> {
        let LixOptions {
            blob,
            key_values,
            account,
            plugins,
        } = options;
        let ctx = LixContext::new(plugins)?;

        let mut conn = Connection::open_in_memory()?;
        let restored = blob.is_some();
        if let Some(blob) = blob.as_deref() {
            restore_blob(&mut conn, blob)?;
        }
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        preflight_gate(&conn)?;
        install_schema(&conn)?;

        let mut lix = Self { conn, ctx };
        lix.bootstrap(&key_values)?;
        if let Some(account) = account {
            lix.upsert_account(&account)?;
            lix.set_active_accounts(&[account.id.as_str()])?;
        }

        info!(
            restored,
            plugins = lix.ctx.plugins.len(),
            "lix opened"
        );
        Ok(lix)
    }

    pub fn open_in_memory() -> Result<Self, LixError> {
        Self::open(LixOptions::default())
    }

    /// Serializes the whole database in memory. Temporary tables are not part of the image.
    pub fn to_blob(&self) -> Result<Vec<u8>, LixError> {
        let blob = self.conn.serialize(DatabaseName::Main)?.to_vec();
        debug!(bytes = blob.len(), "lix serialized");
        Ok(blob)
    }

    pub fn close(self) -> Result<(), LixError> {
        self.conn.close().map_err(|(_, err)| LixError::from(err))
    }

    pub fn generate_id(&mut self) -> Result<String, LixError> {
        generate_id_tx(&self.conn)
    }

    pub fn timestamp(&mut self) -> Result<String, LixError> {
        support::timestamp_tx(&self.conn)
    }

    pub fn plugin_keys(&self) -> Vec<String> {
        self.ctx
            .plugins
            .iter()
            .map(|registered| registered.plugin.key().to_string())
            .collect()
    }

    fn bootstrap(&mut self, key_values: &[(String, serde_json::Value)]) -> Result<(), LixError> {
        let tx = self.conn.transaction()?;
        for (key, value) in key_values {
            key_values::set_key_value_tx(&tx, key, value)?;
        }

        if versions::version_tx(&tx, GLOBAL_VERSION_ID)?.is_none() {
            let root = commits::insert_root_commit_tx(&tx)?;
            versions::insert_version_tx(
                &tx,
                GLOBAL_VERSION_ID,
                GLOBAL_VERSION_ID,
                &root.id,
                None,
                false,
            )?;
            let main_id = generate_id_tx(&tx)?;
            let inherits = InheritsFrom::Global;
            versions::insert_version_tx(
                &tx,
                &main_id,
                MAIN_VERSION_NAME,
                &root.id,
                inherits.parent_id(),
                false,
            )?;
            versions::set_active_version_tx(&tx, &main_id)?;
            debug!(main_version = %main_id, "boot versions created");
        }

        tx.commit()?;
        Ok(())
    }
}

const SQLITE_HEADER: &[u8] = b"SQLite format 3\0";

fn temp_image_path() -> PathBuf {
    std::env::temp_dir().join(format!("lix-image-{}.sqlite", uuid::Uuid::new_v4()))
}

/// Loads an image through the backup API. rusqlite's `deserialize` only takes an
/// `sqlite3_malloc` buffer, which cannot be built without `unsafe`.
fn restore_blob(conn: &mut Connection, blob: &[u8]) -> Result<(), LixError> {
    if !blob.starts_with(SQLITE_HEADER) {
        return Err(LixError::NotLixDatabase("blob is not a database image"));
    }
    let path = temp_image_path();
    std::fs::write(&path, blob)?;
    let result = conn.restore(
        DatabaseName::Main,
        &path,
        None::<fn(rusqlite::backup::Progress)>,
    );
    let _ = std::fs::remove_file(&path);
    result.map_err(|err| match err {
        rusqlite::Error::SqliteFailure(_, _) => LixError::NotLixDatabase("blob is not a database image"),
        other => LixError::from(other),
    })
}
