#![forbid(unsafe_code)]

use lix_core::plugin::PluginError;
use lix_core::sql::SqlError;

#[derive(Debug)]
pub enum LixError {
    Io(std::io::Error),
    Sql(rusqlite::Error),
    Json(serde_json::Error),
    Query(SqlError),
    InvalidInput(&'static str),
    ForeignKeyViolation {
        table: String,
        key: String,
    },
    InheritanceCycle {
        version_id: String,
        parent_id: String,
    },
    PluginKeyMismatch {
        expected: String,
        actual: String,
    },
    UnknownConflict(String),
    ConflictSelectionInvalid {
        conflict_id: String,
        change_id: String,
    },
    UnsupportedQuery(&'static str),
    Plugin(PluginError),
    NotLixDatabase(&'static str),
}

impl LixError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "IO",
            Self::Sql(_) => "SQLITE",
            Self::Json(_) => "JSON",
            Self::Query(_) => "INVALID_SQL",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::ForeignKeyViolation { .. } => "FOREIGN_KEY_VIOLATION",
            Self::InheritanceCycle { .. } => "INHERITANCE_CYCLE",
            Self::PluginKeyMismatch { .. } => "PLUGIN_KEY_MISMATCH",
            Self::UnknownConflict(_) => "UNKNOWN_CONFLICT",
            Self::ConflictSelectionInvalid { .. } => "CONFLICT_SELECTION_INVALID",
            Self::UnsupportedQuery(_) => "UNSUPPORTED_QUERY",
            Self::Plugin(_) => "PLUGIN",
            Self::NotLixDatabase(_) => "NOT_LIX_DATABASE",
        }
    }

    pub(in crate::store) fn foreign_key(table: &str, key: impl Into<String>) -> Self {
        Self::ForeignKeyViolation {
            table: table.to_string(),
            key: key.into(),
        }
    }
}

impl std::fmt::Display for LixError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io: {err}"),
            Self::Sql(err) => write!(f, "sqlite: {err}"),
            Self::Json(err) => write!(f, "json: {err}"),
            Self::Query(err) => write!(f, "invalid sql: {err}"),
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::ForeignKeyViolation { table, key } => write!(
                f,
                "Foreign key constraint violation (table={table}, key={key})"
            ),
            Self::InheritanceCycle {
                version_id,
                parent_id,
            } => write!(
                f,
                "circular version inheritance (version={version_id}, parent={parent_id})"
            ),
            Self::PluginKeyMismatch { expected, actual } => write!(
                f,
                "unexpected plugin_key for own entity (expected={expected}, actual={actual})"
            ),
            Self::UnknownConflict(id) => write!(f, "unknown change conflict {id}"),
            Self::ConflictSelectionInvalid {
                conflict_id,
                change_id,
            } => write!(
                f,
                "change {change_id} is not part of conflict {conflict_id}"
            ),
            Self::UnsupportedQuery(message) => write!(f, "unsupported query: {message}"),
            Self::Plugin(err) => write!(f, "{err}"),
            Self::NotLixDatabase(message) => write!(f, "not a lix database: {message}"),
        }
    }
}

impl std::error::Error for LixError {}

impl From<std::io::Error> for LixError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<rusqlite::Error> for LixError {
    fn from(value: rusqlite::Error) -> Self {
        if is_foreign_key_failure(&value) {
            return Self::ForeignKeyViolation {
                table: "sqlite".to_string(),
                key: value.to_string(),
            };
        }
        Self::Sql(value)
    }
}

impl From<serde_json::Error> for LixError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<SqlError> for LixError {
    fn from(value: SqlError) -> Self {
        Self::Query(value)
    }
}

impl From<PluginError> for LixError {
    fn from(value: PluginError) -> Self {
        Self::Plugin(value)
    }
}

fn is_foreign_key_failure(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(code, message) => {
            code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY
                || message
                    .as_deref()
                    .is_some_and(|value| value.contains("FOREIGN KEY constraint failed"))
        }
        _ => false,
    }
}
