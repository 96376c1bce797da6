#![forbid(unsafe_code)]

use lix_core::model::InheritsFrom;
use serde_json::Value;

#[derive(Clone, Debug, PartialEq)]
pub struct CreateChange {
    /// Generated when absent.
    pub id: Option<String>,
    pub entity_id: String,
    pub schema_key: String,
    pub schema_version: String,
    pub file_id: String,
    pub plugin_key: String,
    /// `None` records a deletion.
    pub snapshot_content: Option<Value>,
    pub writer_key: Option<String>,
    /// Predecessors in the entity's change graph.
    pub parent_change_ids: Vec<String>,
}

impl CreateChange {
    pub fn new(
        entity_id: impl Into<String>,
        schema_key: impl Into<String>,
        file_id: impl Into<String>,
        plugin_key: impl Into<String>,
        snapshot_content: Option<Value>,
    ) -> Self {
        Self {
            id: None,
            entity_id: entity_id.into(),
            schema_key: schema_key.into(),
            schema_version: "1.0".to_string(),
            file_id: file_id.into(),
            plugin_key: plugin_key.into(),
            snapshot_content,
            writer_key: None,
            parent_change_ids: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateVersion {
    pub id: Option<String>,
    pub name: Option<String>,
    /// Defaults to the active version's tip.
    pub from_commit_id: Option<String>,
    pub inherits_from: InheritsFrom,
    pub hidden: bool,
}
