#![forbid(unsafe_code)]

pub(super) const SQL: &str = r#"

        -- Per-schema cache tables are created on first read and registered here.
        CREATE TABLE IF NOT EXISTS internal_state_cache_registry (
          schema_key TEXT PRIMARY KEY,
          table_name TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS internal_state_cache_stale (
          singleton INTEGER PRIMARY KEY CHECK (singleton = 1),
          stale INTEGER NOT NULL
        );

        INSERT OR IGNORE INTO internal_state_cache_stale(singleton, stale) VALUES (1, 0);

        CREATE TABLE IF NOT EXISTS internal_state_cache_dirty (
          schema_key TEXT PRIMARY KEY
        );
"#;
