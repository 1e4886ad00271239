//! Table schema and the statements issued against it
//!
//! Every store owns one table `(key PRIMARY KEY, value)`. The key column has
//! no declared type, so any scalar is accepted and keeps its storage class.
//! The table name is interpolated into SQL, so it is always quoted.

use rusqlite::Connection;

use crate::error::{KvError, Result};

/// Quote a table name as an SQL identifier
pub fn quote_identifier(name: &str) -> Result<String> {
    if name.is_empty() || name.contains('\0') {
        return Err(KvError::InvalidTable(name.to_string()));
    }
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// SQL text for one table, built once when the store opens.
#[derive(Debug, Clone)]
pub(crate) struct TableSql {
    pub create: String,
    pub count: String,
    pub select: String,
    pub select_null: String,
    pub upsert: String,
    pub update_null: String,
    pub insert_null: String,
    pub delete: String,
    pub delete_null: String,
    pub page_keys: String,
}

impl TableSql {
    pub fn new(table: &str) -> Result<Self> {
        let t = quote_identifier(table)?;
        Ok(Self {
            create: format!("CREATE TABLE IF NOT EXISTS {t} (key PRIMARY KEY, value)"),
            count: format!("SELECT COUNT(*) FROM {t}"),
            select: format!("SELECT value FROM {t} WHERE key = ?1 LIMIT 1"),
            select_null: format!("SELECT value FROM {t} WHERE key IS NULL LIMIT 1"),
            // NULL keys never conflict, they take the explicit path below
            upsert: format!(
                "INSERT INTO {t} (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value"
            ),
            update_null: format!("UPDATE {t} SET value = ?1 WHERE key IS NULL"),
            insert_null: format!("INSERT INTO {t} (key, value) VALUES (NULL, ?1)"),
            delete: format!("DELETE FROM {t} WHERE key = ?1"),
            delete_null: format!("DELETE FROM {t} WHERE key IS NULL"),
            page_keys: format!(
                "SELECT rowid, key FROM {t} WHERE rowid > ?1 ORDER BY rowid LIMIT ?2"
            ),
        })
    }
}

/// Create the table if it does not exist yet
pub(crate) fn ensure_table(conn: &Connection, sql: &TableSql) -> Result<()> {
    conn.execute_batch(&sql.create)?;
    Ok(())
}
