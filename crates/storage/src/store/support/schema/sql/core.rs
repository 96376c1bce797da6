#![forbid(unsafe_code)]

pub(super) const SQL: &str = r#"

        -- Engine settings. Values are JSON text.
        CREATE TABLE IF NOT EXISTS key_value (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS account (
          id TEXT PRIMARY KEY,
          name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS active_account (
          account_id TEXT PRIMARY KEY REFERENCES account(id) ON DELETE CASCADE
        );
"#;
