#![forbid(unsafe_code)]

use super::support::generate_id_tx;
use super::{Lix, LixError};
use lix_core::ids::canonical_identifier;
use lix_core::model::Account;
use rusqlite::{Connection, params};

impl Lix {
    pub fn create_account(&mut self, name: &str) -> Result<Account, LixError> {
        let account = Account {
            id: generate_id_tx(&self.conn)?,
            name: name.to_string(),
        };
        upsert_account_tx(&self.conn, &account)?;
        Ok(account)
    }

    pub fn upsert_account(&mut self, account: &Account) -> Result<(), LixError> {
        upsert_account_tx(&self.conn, account)
    }

    pub fn accounts(&self) -> Result<Vec<Account>, LixError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM account ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok(Account {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Replaces the set of accounts credited as authors of new changes.
    pub fn set_active_accounts(&mut self, account_ids: &[&str]) -> Result<(), LixError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM active_account", [])?;
        for account_id in account_ids {
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO active_account(account_id) \
                 SELECT id FROM account WHERE id=?1",
                params![account_id],
            )?;
            if inserted == 0 && !account_exists_tx(&tx, account_id)? {
                return Err(LixError::foreign_key("account", *account_id));
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn active_accounts(&self) -> Result<Vec<Account>, LixError> {
        let mut stmt = self.conn.prepare(
            "SELECT a.id, a.name FROM active_account aa JOIN account a ON a.id = aa.account_id \
             ORDER BY a.id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Account {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn change_authors(&self, change_id: &str) -> Result<Vec<Account>, LixError> {
        let mut stmt = self.conn.prepare(
            "SELECT a.id, a.name FROM change_author ca JOIN account a ON a.id = ca.account_id \
             WHERE ca.change_id=?1 ORDER BY a.id ASC",
        )?;
        let rows = stmt.query_map(params![change_id], |row| {
            Ok(Account {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

pub(in crate::store) fn upsert_account_tx(conn: &Connection, account: &Account) -> Result<(), LixError> {
    let id = canonical_identifier(&account.id).map_err(|err| LixError::InvalidInput(err.message()))?;
    conn.execute(
        "INSERT INTO account(id, name) VALUES (?1, ?2) \
         ON CONFLICT(id) DO UPDATE SET name=excluded.name",
        params![id, account.name],
    )?;
    Ok(())
}

pub(in crate::store) fn delete_account_tx(conn: &Connection, account_id: &str) -> Result<(), LixError> {
    conn.execute("DELETE FROM active_account WHERE account_id=?1", params![account_id])?;
    // Authorship rows keep the account alive.
    conn.execute(
        "DELETE FROM account WHERE id=?1 \
         AND NOT EXISTS (SELECT 1 FROM change_author WHERE account_id=?1)",
        params![account_id],
    )?;
    Ok(())
}

fn account_exists_tx(conn: &Connection, account_id: &str) -> Result<bool, LixError> {
    let count = conn.query_row(
        "SELECT COUNT(1) FROM account WHERE id=?1",
        params![account_id],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(count > 0)
}

/// Credits every active account as author of `change_id`.
pub(in crate::store) fn attach_active_authors_tx(
    conn: &Connection,
    change_id: &str,
) -> Result<(), LixError> {
    conn.execute(
        "INSERT OR IGNORE INTO change_author(change_id, account_id) \
         SELECT ?1, account_id FROM active_account",
        params![change_id],
    )?;
    Ok(())
}
