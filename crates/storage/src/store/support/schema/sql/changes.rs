#![forbid(unsafe_code)]

pub(super) const SQL: &str = r#"

        -- `content IS NULL` only for the shared deletion snapshot.
        CREATE TABLE IF NOT EXISTS snapshot (
          id TEXT PRIMARY KEY,
          content TEXT
        );

        INSERT OR IGNORE INTO snapshot(id, content) VALUES ('no-content', NULL);

        CREATE TABLE IF NOT EXISTS change (
          id TEXT PRIMARY KEY,
          entity_id TEXT NOT NULL,
          schema_key TEXT NOT NULL,
          schema_version TEXT NOT NULL,
          file_id TEXT NOT NULL,
          plugin_key TEXT NOT NULL,
          snapshot_id TEXT NOT NULL REFERENCES snapshot(id),
          created_at TEXT NOT NULL,
          writer_key TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_change_entity
          ON change(entity_id, schema_key, file_id);

        CREATE TRIGGER IF NOT EXISTS change_no_update
        BEFORE UPDATE ON change
        BEGIN
          SELECT RAISE(ABORT, 'change rows are immutable');
        END;

        CREATE TRIGGER IF NOT EXISTS change_no_delete
        BEFORE DELETE ON change
        BEGIN
          SELECT RAISE(ABORT, 'change rows are immutable');
        END;

        CREATE TRIGGER IF NOT EXISTS snapshot_no_update
        BEFORE UPDATE ON snapshot
        BEGIN
          SELECT RAISE(ABORT, 'snapshot rows are immutable');
        END;

        CREATE TRIGGER IF NOT EXISTS snapshot_no_delete
        BEFORE DELETE ON snapshot
        BEGIN
          SELECT RAISE(ABORT, 'snapshot rows are immutable');
        END;

        CREATE TABLE IF NOT EXISTS change_author (
          change_id TEXT NOT NULL REFERENCES change(id),
          account_id TEXT NOT NULL REFERENCES account(id),
          PRIMARY KEY (change_id, account_id)
        );

        -- Per-entity lineage: `child_id` supersedes `parent_id`.
        CREATE TABLE IF NOT EXISTS change_graph_edge (
          parent_id TEXT NOT NULL REFERENCES change(id),
          child_id TEXT NOT NULL REFERENCES change(id),
          PRIMARY KEY (parent_id, child_id),
          CHECK (parent_id <> child_id)
        );

        CREATE INDEX IF NOT EXISTS idx_change_graph_edge_child
          ON change_graph_edge(child_id);
"#;
