#![forbid(unsafe_code)]

pub(super) const SQL: &str = r#"

        CREATE TABLE IF NOT EXISTS change_set (
          id TEXT PRIMARY KEY,
          created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS change_set_element (
          change_set_id TEXT NOT NULL REFERENCES change_set(id) ON DELETE CASCADE,
          change_id TEXT NOT NULL REFERENCES change(id),
          entity_id TEXT NOT NULL,
          schema_key TEXT NOT NULL,
          file_id TEXT NOT NULL,
          PRIMARY KEY (change_set_id, change_id)
        );

        CREATE INDEX IF NOT EXISTS idx_change_set_element_key
          ON change_set_element(change_set_id, entity_id, schema_key, file_id);

        CREATE TABLE IF NOT EXISTS "commit" (
          id TEXT PRIMARY KEY,
          change_set_id TEXT NOT NULL REFERENCES change_set(id),
          created_at TEXT NOT NULL,
          is_checkpoint INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_commit_change_set
          ON "commit"(change_set_id);

        CREATE TABLE IF NOT EXISTS commit_edge (
          parent_id TEXT NOT NULL REFERENCES "commit"(id),
          child_id TEXT NOT NULL REFERENCES "commit"(id),
          PRIMARY KEY (parent_id, child_id),
          CHECK (parent_id <> child_id)
        );

        CREATE INDEX IF NOT EXISTS idx_commit_edge_child
          ON commit_edge(child_id);

        CREATE TABLE IF NOT EXISTS change_conflict (
          id TEXT PRIMARY KEY,
          key TEXT NOT NULL,
          change_set_id TEXT NOT NULL REFERENCES change_set(id),
          version_id TEXT NOT NULL REFERENCES version(id) ON DELETE CASCADE,
          created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_change_conflict_key
          ON change_conflict(version_id, key);
"#;
