#![forbid(unsafe_code)]

use crate::ids::{GLOBAL_VERSION_ID, NO_CONTENT_SNAPSHOT_ID};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identity of one entity inside one file under one schema.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub entity_id: String,
    pub schema_key: String,
    pub file_id: String,
}

impl EntityKey {
    pub fn new(
        entity_id: impl Into<String>,
        schema_key: impl Into<String>,
        file_id: impl Into<String>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            schema_key: schema_key.into(),
            file_id: file_id.into(),
        }
    }

    /// Key recorded on change conflicts for this entity.
    pub fn conflict_key(&self) -> String {
        format!("{}|{}|{}", self.schema_key, self.file_id, self.entity_id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub id: String,
    pub entity_id: String,
    pub schema_key: String,
    pub schema_version: String,
    pub file_id: String,
    pub plugin_key: String,
    pub snapshot_id: String,
    pub created_at: String,
    pub writer_key: Option<String>,
}

impl Change {
    pub fn key(&self) -> EntityKey {
        EntityKey::new(&self.entity_id, &self.schema_key, &self.file_id)
    }

    pub fn is_deletion(&self) -> bool {
        self.snapshot_id == NO_CONTENT_SNAPSHOT_ID
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub content: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSetElement {
    pub change_set_id: String,
    pub change_id: String,
    pub entity_id: String,
    pub schema_key: String,
    pub file_id: String,
}

impl ChangeSetElement {
    pub fn key(&self) -> EntityKey {
        EntityKey::new(&self.entity_id, &self.schema_key, &self.file_id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub id: String,
    pub change_set_id: String,
    pub created_at: String,
    pub is_checkpoint: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub id: String,
    pub name: String,
    pub commit_id: String,
    pub working_commit_id: String,
    pub inherits_from_version_id: Option<String>,
    pub hidden: bool,
}

/// Inheritance parent requested for a version.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum InheritsFrom {
    #[default]
    Global,
    Version(String),
    Nothing,
}

impl InheritsFrom {
    pub fn parent_id(&self) -> Option<&str> {
        match self {
            Self::Global => Some(GLOBAL_VERSION_ID),
            Self::Version(id) => Some(id.as_str()),
            Self::Nothing => None,
        }
    }
}

/// One materialized row of the `state` / `state_all` views.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateRow {
    pub entity_id: String,
    pub schema_key: String,
    pub file_id: String,
    pub version_id: String,
    pub plugin_key: String,
    pub schema_version: String,
    pub snapshot_content: Value,
    pub change_id: String,
    pub commit_id: String,
    pub created_at: String,
    pub updated_at: String,
    pub inherited_from_version_id: Option<String>,
    pub untracked: bool,
}

impl StateRow {
    pub fn key(&self) -> EntityKey {
        EntityKey::new(&self.entity_id, &self.schema_key, &self.file_id)
    }
}

/// One row of the `state_history` view, resolved from `change_set_id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryRow {
    pub entity_id: String,
    pub schema_key: String,
    pub file_id: String,
    pub plugin_key: String,
    pub schema_version: String,
    pub snapshot_content: Value,
    pub change_id: String,
    pub commit_id: String,
    pub change_set_id: String,
    pub depth: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeConflict {
    pub id: String,
    pub key: String,
    pub change_set_id: String,
    pub version_id: String,
    pub created_at: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UntrackedRow {
    pub entity_id: String,
    pub schema_key: String,
    pub file_id: String,
    pub version_id: String,
    pub plugin_key: String,
    pub schema_version: String,
    pub snapshot_content: Option<Value>,
    pub inheritance_delete_marker: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
}

/// A state mutation as handed to the engine. `snapshot_content: None` deletes the entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateWrite {
    pub entity_id: String,
    pub schema_key: String,
    pub file_id: String,
    pub plugin_key: String,
    pub schema_version: String,
    pub snapshot_content: Option<Value>,
    /// Defaults to the active version.
    pub version_id: Option<String>,
    pub untracked: bool,
}

impl StateWrite {
    pub fn new(
        entity_id: impl Into<String>,
        schema_key: impl Into<String>,
        file_id: impl Into<String>,
        plugin_key: impl Into<String>,
        snapshot_content: Value,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            schema_key: schema_key.into(),
            file_id: file_id.into(),
            plugin_key: plugin_key.into(),
            schema_version: "1.0".to_string(),
            snapshot_content: Some(snapshot_content),
            version_id: None,
            untracked: false,
        }
    }

    pub fn in_version(mut self, version_id: impl Into<String>) -> Self {
        self.version_id = Some(version_id.into());
        self
    }

    pub fn untracked(mut self) -> Self {
        self.untracked = true;
        self
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::new(&self.entity_id, &self.schema_key, &self.file_id)
    }
}
