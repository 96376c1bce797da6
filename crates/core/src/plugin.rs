#![forbid(unsafe_code)]

use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entity-level change reported by a plugin. `snapshot: None` means the entity is gone.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectedChange {
    pub schema_key: String,
    pub schema_version: String,
    pub entity_id: String,
    pub snapshot: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PluginError {
    pub plugin_key: String,
    pub message: String,
}

impl PluginError {
    pub fn new(plugin_key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            plugin_key: plugin_key.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for PluginError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "plugin {}: {}", self.plugin_key, self.message)
    }
}

impl std::error::Error for PluginError {}

/// Contract between the engine and a file-format collaborator.
///
/// `detect_changes` must be deterministic: identical `before`/`after` bytes yield identical
/// output. It is invoked once per queued file mutation, with `before: None` for new files and
/// `after: None` for deleted ones.
pub trait ChangeDetectionPlugin: Send + Sync {
    fn key(&self) -> &str;

    /// File-path pattern this plugin handles, e.g. `*.json`.
    fn glob(&self) -> &str;

    fn detect_changes(
        &self,
        before: Option<&[u8]>,
        after: Option<&[u8]>,
    ) -> Result<Vec<DetectedChange>, PluginError>;
}

/// Compiles a plugin's file pattern. `*` also crosses `/`, so `*.json` matches nested paths.
pub fn compile_glob(plugin_key: &str, pattern: &str) -> Result<GlobMatcher, PluginError> {
    Glob::new(pattern)
        .map(|glob| glob.compile_matcher())
        .map_err(|err| PluginError::new(plugin_key, format!("invalid glob {pattern:?}: {err}")))
}
