#![forbid(unsafe_code)]

use super::super::commits::load_commit_graph_tx;
use super::super::support::{
    CHANGE_COLUMNS, UNTRACKED_COLUMNS, change_from_row, json_value_column, snapshot_id_for,
    untracked_from_row,
};
use super::super::versions::{parent_of_tx, version_tx};
use super::super::LixError;
use lix_core::graph::{ParentMap, ancestors_with_depth, inheritance_chain};
use lix_core::model::{Change, EntityKey, StateRow, UntrackedRow, Version};
use rusqlite::{Connection, params};
use serde_json::Value;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};

/// Commit id reported for rows staged in an open transaction.
const PENDING_COMMIT_ID: &str = "pending";
/// Change and commit id reported for untracked rows.
const UNTRACKED_ID: &str = "untracked";

/// Winning change for one entity as seen from one commit (or the stage).
#[derive(Clone, Debug)]
pub(in crate::store) struct TrackedEntry {
    pub change: Change,
    pub content: Option<Value>,
    pub commit_id: String,
    /// Distance from the starting commit; `-1` for staged rows.
    pub depth: i64,
    pub first_created_at: String,
}

impl TrackedEntry {
    fn outranks(&self, other: &TrackedEntry) -> bool {
        if self.depth != other.depth {
            return self.depth < other.depth;
        }
        (&self.change.created_at, &self.change.id) > (&other.change.created_at, &other.change.id)
    }
}

/// Resolves entity state from the commit graph, inheritance chain and untracked rows.
///
/// Per-version results are memoized, so one instance serves a whole read.
pub(in crate::store) struct Materializer<'c> {
    conn: &'c Connection,
    schema_key: Option<String>,
    include_stage: bool,
    graph: ParentMap,
    tracked: HashMap<String, BTreeMap<EntityKey, TrackedEntry>>,
    untracked: HashMap<String, BTreeMap<EntityKey, UntrackedRow>>,
}

impl<'c> Materializer<'c> {
    pub fn new(conn: &'c Connection, schema_key: Option<&str>) -> Result<Self, LixError> {
        Ok(Self {
            conn,
            schema_key: schema_key.map(str::to_string),
            include_stage: true,
            graph: load_commit_graph_tx(conn)?,
            tracked: HashMap::new(),
            untracked: HashMap::new(),
        })
    }

    /// Ignores rows staged by an open transaction.
    pub fn without_stage(mut self) -> Self {
        self.include_stage = false;
        self
    }

    /// Winning change per entity reachable from `commit_id`, deletions included.
    ///
    /// The closest commit wins; ties go to the newer change.
    pub fn commit_state(&self, commit_id: &str) -> Result<BTreeMap<EntityKey, TrackedEntry>, LixError> {
        let depths = ancestors_with_depth(commit_id, None, |id| {
            Ok::<_, LixError>(self.graph.parents_of(id).to_vec())
        })?;

        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {CHANGE_COLUMNS}, s.content FROM \"commit\" k \
             JOIN change_set_element e ON e.change_set_id = k.change_set_id \
             JOIN change c ON c.id = e.change_id \
             JOIN snapshot s ON s.id = c.snapshot_id \
             WHERE k.id = ?1 AND (?2 IS NULL OR c.schema_key = ?2)"
        ))?;

        let mut best = BTreeMap::new();
        for (ancestor, depth) in depths {
            let mut rows = stmt.query(params![ancestor, self.schema_key])?;
            while let Some(row) = rows.next()? {
                let change = change_from_row(row)?;
                let content = json_value_column(row, 9)?;
                consider(
                    &mut best,
                    TrackedEntry {
                        first_created_at: change.created_at.clone(),
                        change,
                        content,
                        commit_id: ancestor.clone(),
                        depth: i64::from(depth),
                    },
                );
            }
        }
        Ok(best)
    }

    /// Elements of a change set that no commit records, all at depth 0.
    pub fn change_set_state(
        &self,
        change_set_id: &str,
    ) -> Result<BTreeMap<EntityKey, TrackedEntry>, LixError> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {CHANGE_COLUMNS}, s.content FROM change_set_element e \
             JOIN change c ON c.id = e.change_id \
             JOIN snapshot s ON s.id = c.snapshot_id \
             WHERE e.change_set_id = ?1 AND (?2 IS NULL OR c.schema_key = ?2)"
        ))?;
        let mut rows = stmt.query(params![change_set_id, self.schema_key])?;
        let mut best = BTreeMap::new();
        while let Some(row) = rows.next()? {
            let change = change_from_row(row)?;
            let content = json_value_column(row, 9)?;
            consider(
                &mut best,
                TrackedEntry {
                    first_created_at: change.created_at.clone(),
                    change,
                    content,
                    commit_id: String::new(),
                    depth: 0,
                },
            );
        }
        Ok(best)
    }

    /// Tracked state of the version itself: its tip, overlaid with staged rows.
    pub fn local_tracked(&mut self, version: &Version) -> Result<&BTreeMap<EntityKey, TrackedEntry>, LixError> {
        if !self.tracked.contains_key(&version.id) {
            let mut state = self.commit_state(&version.commit_id)?;
            if self.include_stage {
                for entry in self.staged_entries(&version.id)? {
                    consider(&mut state, entry);
                }
            }
            self.tracked.insert(version.id.clone(), state);
        }
        self.tracked
            .get(&version.id)
            .ok_or(LixError::InvalidInput("version state unavailable"))
    }

    fn local_untracked(&mut self, version_id: &str) -> Result<(), LixError> {
        if self.untracked.contains_key(version_id) {
            return Ok(());
        }
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {UNTRACKED_COLUMNS} FROM internal_state_untracked \
             WHERE version_id = ?1 AND (?2 IS NULL OR schema_key = ?2)"
        ))?;
        let rows = stmt.query_map(params![version_id, self.schema_key], untracked_from_row)?;
        let mut out = BTreeMap::new();
        for row in rows {
            let row = row?;
            out.insert(EntityKey::new(&row.entity_id, &row.schema_key, &row.file_id), row);
        }
        self.untracked.insert(version_id.to_string(), out);
        Ok(())
    }

    fn staged_entries(&self, version_id: &str) -> Result<Vec<TrackedEntry>, LixError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT change_id, entity_id, schema_key, schema_version, file_id, plugin_key, \
             snapshot_content, created_at, writer_key \
             FROM transaction_stage WHERE version_id = ?1 AND (?2 IS NULL OR schema_key = ?2)",
        )?;
        let mut rows = stmt.query(params![version_id, self.schema_key])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let content = json_value_column(row, 6)?;
            let created_at: String = row.get(7)?;
            out.push(TrackedEntry {
                change: Change {
                    id: row.get(0)?,
                    entity_id: row.get(1)?,
                    schema_key: row.get(2)?,
                    schema_version: row.get(3)?,
                    file_id: row.get(4)?,
                    plugin_key: row.get(5)?,
                    snapshot_id: snapshot_id_for(content.as_ref()),
                    created_at: created_at.clone(),
                    writer_key: row.get(8)?,
                },
                content,
                commit_id: PENDING_COMMIT_ID.to_string(),
                depth: -1,
                first_created_at: created_at,
            });
        }
        Ok(out)
    }

    /// Rows visible in `version_id`, walking its inheritance chain.
    ///
    /// At each level an untracked row shadows tracked state; a tombstone or deletion stops
    /// the walk for that entity.
    pub fn version_rows(&mut self, version_id: &str) -> Result<Vec<StateRow>, LixError> {
        let conn = self.conn;
        let chain = inheritance_chain(version_id, |id| parent_of_tx(conn, id))?;

        let mut resolved: BTreeMap<EntityKey, Option<StateRow>> = BTreeMap::new();
        for (level, level_id) in chain.ids.iter().enumerate() {
            let Some(version) = version_tx(conn, level_id)? else {
                break;
            };
            self.local_untracked(&version.id)?;
            self.local_tracked(&version)?;
            let inherited_from = (level > 0).then(|| version.id.clone());

            if let Some(rows) = self.untracked.get(&version.id) {
                for (key, row) in rows {
                    if resolved.contains_key(key) {
                        continue;
                    }
                    let state = (!row.inheritance_delete_marker)
                        .then(|| untracked_state_row(row, version_id, inherited_from.clone()))
                        .flatten();
                    resolved.insert(key.clone(), state);
                }
            }
            if let Some(entries) = self.tracked.get(&version.id) {
                for (key, entry) in entries {
                    if resolved.contains_key(key) {
                        continue;
                    }
                    resolved.insert(
                        key.clone(),
                        tracked_state_row(entry, version_id, inherited_from.clone()),
                    );
                }
            }
        }

        Ok(resolved.into_values().flatten().collect())
    }

    /// Rows of every version, ordered by version id.
    pub fn all_rows(&mut self) -> Result<Vec<StateRow>, LixError> {
        let ids = {
            let mut stmt = self.conn.prepare_cached("SELECT id FROM version ORDER BY id ASC")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        let mut out = Vec::new();
        for id in ids {
            out.extend(self.version_rows(&id)?);
        }
        Ok(out)
    }
}

fn consider(best: &mut BTreeMap<EntityKey, TrackedEntry>, entry: TrackedEntry) {
    match best.entry(entry.change.key()) {
        Entry::Vacant(slot) => {
            slot.insert(entry);
        }
        Entry::Occupied(mut slot) => {
            let first_created_at = slot
                .get()
                .first_created_at
                .clone()
                .min(entry.first_created_at.clone());
            if entry.outranks(slot.get()) {
                slot.insert(entry);
            }
            slot.get_mut().first_created_at = first_created_at;
        }
    }
}

fn tracked_state_row(
    entry: &TrackedEntry,
    version_id: &str,
    inherited_from_version_id: Option<String>,
) -> Option<StateRow> {
    let content = entry.content.clone()?;
    Some(StateRow {
        entity_id: entry.change.entity_id.clone(),
        schema_key: entry.change.schema_key.clone(),
        file_id: entry.change.file_id.clone(),
        version_id: version_id.to_string(),
        plugin_key: entry.change.plugin_key.clone(),
        schema_version: entry.change.schema_version.clone(),
        snapshot_content: content,
        change_id: entry.change.id.clone(),
        commit_id: entry.commit_id.clone(),
        created_at: entry.first_created_at.clone(),
        updated_at: entry.change.created_at.clone(),
        inherited_from_version_id,
        untracked: false,
    })
}

fn untracked_state_row(
    row: &UntrackedRow,
    version_id: &str,
    inherited_from_version_id: Option<String>,
) -> Option<StateRow> {
    let content = row.snapshot_content.clone()?;
    Some(StateRow {
        entity_id: row.entity_id.clone(),
        schema_key: row.schema_key.clone(),
        file_id: row.file_id.clone(),
        version_id: version_id.to_string(),
        plugin_key: row.plugin_key.clone(),
        schema_version: row.schema_version.clone(),
        snapshot_content: content,
        change_id: UNTRACKED_ID.to_string(),
        commit_id: UNTRACKED_ID.to_string(),
        created_at: row.created_at.clone(),
        updated_at: row.updated_at.clone(),
        inherited_from_version_id,
        untracked: true,
    })
}
