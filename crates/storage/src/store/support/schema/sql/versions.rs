#![forbid(unsafe_code)]

pub(super) const SQL: &str = r#"

        CREATE TABLE IF NOT EXISTS version (
          id TEXT PRIMARY KEY,
          name TEXT NOT NULL UNIQUE,
          commit_id TEXT NOT NULL REFERENCES "commit"(id),
          working_commit_id TEXT NOT NULL REFERENCES "commit"(id),
          inherits_from_version_id TEXT REFERENCES version(id),
          hidden INTEGER NOT NULL DEFAULT 0,
          CHECK (inherits_from_version_id IS NULL OR inherits_from_version_id <> id)
        );

        CREATE VIEW IF NOT EXISTS version_inheritance AS
          SELECT id AS version_id, inherits_from_version_id AS parent_version_id
          FROM version
          WHERE inherits_from_version_id IS NOT NULL;

        CREATE TABLE IF NOT EXISTS active_version (
          singleton INTEGER PRIMARY KEY CHECK (singleton = 1),
          version_id TEXT NOT NULL REFERENCES version(id)
        );

        -- Tracked writes of the open transaction, keyed like the state they shadow.
        CREATE TABLE IF NOT EXISTS transaction_stage (
          entity_id TEXT NOT NULL,
          schema_key TEXT NOT NULL,
          file_id TEXT NOT NULL,
          version_id TEXT NOT NULL REFERENCES version(id),
          plugin_key TEXT NOT NULL,
          schema_version TEXT NOT NULL,
          snapshot_content TEXT,
          change_id TEXT NOT NULL,
          writer_key TEXT,
          created_at TEXT NOT NULL,
          PRIMARY KEY (entity_id, file_id, schema_key, version_id)
        );

        CREATE TABLE IF NOT EXISTS internal_state_untracked (
          entity_id TEXT NOT NULL,
          schema_key TEXT NOT NULL,
          file_id TEXT NOT NULL,
          version_id TEXT NOT NULL REFERENCES version(id) ON DELETE CASCADE,
          plugin_key TEXT NOT NULL,
          schema_version TEXT NOT NULL,
          snapshot_content TEXT,
          inheritance_delete_marker INTEGER NOT NULL DEFAULT 0,
          created_at TEXT NOT NULL,
          updated_at TEXT NOT NULL,
          PRIMARY KEY (entity_id, schema_key, file_id, version_id),
          CHECK (inheritance_delete_marker = 0 OR snapshot_content IS NULL),
          CHECK (inheritance_delete_marker = 1 OR snapshot_content IS NOT NULL)
        );
"#;
