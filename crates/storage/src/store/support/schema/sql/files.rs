#![forbid(unsafe_code)]

pub(super) const SQL: &str = r#"

        CREATE TABLE IF NOT EXISTS file (
          id TEXT PRIMARY KEY,
          path TEXT NOT NULL UNIQUE,
          data BLOB NOT NULL,
          metadata TEXT
        );

        -- Pending plugin work. Rows are deleted once processed; failed rows keep the error.
        CREATE TABLE IF NOT EXISTS change_queue (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          file_id TEXT NOT NULL,
          path TEXT NOT NULL,
          data_before BLOB,
          data_after BLOB,
          version_id TEXT NOT NULL REFERENCES version(id),
          created_at TEXT NOT NULL,
          failed_at TEXT,
          error TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_change_queue_pending
          ON change_queue(failed_at, id);
"#;
