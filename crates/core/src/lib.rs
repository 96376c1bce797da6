#![forbid(unsafe_code)]

pub mod graph;
pub mod model;
pub mod plugin;
pub mod sql;

pub mod ids {
    /// Version every other version inherits from unless told otherwise.
    pub const GLOBAL_VERSION_ID: &str = "global";
    pub const MAIN_VERSION_NAME: &str = "main";

    /// Snapshot id shared by every deletion change.
    pub const NO_CONTENT_SNAPSHOT_ID: &str = "no-content";

    /// Plugin key owning the engine's own entities (`lix_*` schemas).
    pub const OWN_ENTITY_PLUGIN_KEY: &str = "lix_own_entity";
    pub const OWN_ENTITY_SCHEMA_PREFIX: &str = "lix_";

    pub const DETERMINISTIC_ID_PREFIX: &str = "test_";

    pub fn deterministic_id(sequence: u64) -> String {
        format!("{DETERMINISTIC_ID_PREFIX}{sequence:010}")
    }

    pub fn is_own_entity_schema(schema_key: &str) -> bool {
        schema_key.starts_with(OWN_ENTITY_SCHEMA_PREFIX)
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum IdentifierError {
        Empty,
        TooLong,
        ContainsControl,
    }

    impl IdentifierError {
        pub fn message(&self) -> &'static str {
            match self {
                Self::Empty => "identifier must not be empty",
                Self::TooLong => "identifier is too long",
                Self::ContainsControl => "identifier contains control characters",
            }
        }
    }

    /// Trims and validates an entity/schema/file/version identifier.
    pub fn canonical_identifier(value: &str) -> Result<String, IdentifierError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(IdentifierError::Empty);
        }
        if trimmed.len() > 512 {
            return Err(IdentifierError::TooLong);
        }
        if trimmed.chars().any(|c| c.is_control()) {
            return Err(IdentifierError::ContainsControl);
        }
        Ok(trimmed.to_string())
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn deterministic_ids_are_zero_padded() {
            assert_eq!(deterministic_id(1), "test_0000000001");
            assert_eq!(deterministic_id(42), "test_0000000042");
        }

        #[test]
        fn identifier_validation() {
            assert_eq!(canonical_identifier("  ").unwrap_err(), IdentifierError::Empty);
            assert_eq!(
                canonical_identifier("bad\u{0007}id").unwrap_err(),
                IdentifierError::ContainsControl
            );
            assert_eq!(canonical_identifier(" entity-1 ").unwrap(), "entity-1");
            assert!(is_own_entity_schema("lix_key_value"));
            assert!(!is_own_entity_schema("inlang_message"));
        }
    }
}
