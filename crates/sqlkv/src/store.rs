//! SQLite-backed table store
//!
//! [`SqliteKv`] owns a single connection and one table inside it. Reads go
//! straight to the connection; writes run under the transaction lock (see
//! [`crate::lock`]) so they join any transaction the caller already holds.

use std::cell::Cell;
use std::collections::VecDeque;

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::config::KvConfig;
use crate::error::{KvError, Result};
use crate::json;
use crate::key::Key;
use crate::lock::IfLocked;
use crate::schema::{self, TableSql};

/// Key-value store over one SQLite table.
///
/// One instance is meant for one thread at a time: it is `Send` but not
/// `Sync`, because the lock depth is a plain counter. Open a separate store
/// per thread or process; SQLite coordinates them through its file lock.
pub struct SqliteKv {
    pub(crate) conn: Option<Connection>,
    pub(crate) depth: Cell<usize>,
    db_uri: String,
    table: String,
    sql: TableSql,
    iter_batch: usize,
}

impl SqliteKv {
    /// Open (or create) a store on `db_uri` with the default configuration.
    ///
    /// `db_uri` is a file path, `:memory:`, or a `file:` URI.
    pub fn open(db_uri: impl AsRef<str>) -> Result<Self> {
        Self::open_with(db_uri, KvConfig::default())
    }

    /// Open (or create) a store with explicit options
    pub fn open_with(db_uri: impl AsRef<str>, config: KvConfig) -> Result<Self> {
        let db_uri = db_uri.as_ref();
        let sql = TableSql::new(&config.table)?;

        let conn = Connection::open(db_uri)?;
        conn.busy_timeout(config.timeout)?;
        schema::ensure_table(&conn, &sql)?;

        debug!(db_uri, table = %config.table, "opened key-value store");

        Ok(Self {
            conn: Some(conn),
            depth: Cell::new(0),
            db_uri: db_uri.to_string(),
            table: config.table,
            sql,
            iter_batch: config.iter_batch.max(1),
        })
    }

    /// Create a new in-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    /// Database path or URI the store was opened with
    pub fn db_uri(&self) -> &str {
        &self.db_uri
    }

    /// Name of the table holding the entries
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    pub(crate) fn conn(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or(KvError::Closed)
    }

    /// Number of rows in the table
    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn()?
            .prepare_cached(&self.sql.count)?
            .query_row([], |row| row.get(0))?;
        Ok(usize::try_from(n).unwrap_or_default())
    }

    /// Decoded value stored at `key`, if any
    pub fn fetch(&self, key: &Key) -> Result<Option<Value>> {
        key.validate()?;
        let conn = self.conn()?;
        let text: Option<String> = if key.is_null() {
            conn.prepare_cached(&self.sql.select_null)?
                .query_row([], |row| row.get(0))
                .optional()?
        } else {
            conn.prepare_cached(&self.sql.select)?
                .query_row([key], |row| row.get(0))
                .optional()?
        };
        text.as_deref().map(json::decode::<Value>).transpose()
    }

    /// Insert or replace the value at `key`.
    ///
    /// Runs under the transaction lock, so inside an explicit lock the write
    /// becomes visible to other connections only when the outermost lock is
    /// released.
    pub fn put(&self, key: &Key, value: &Value) -> Result<()> {
        key.validate()?;
        let encoded = json::encode(value)?;
        let guard = self.lock()?;
        let conn = self.conn()?;
        if key.is_null() {
            let changed = conn
                .prepare_cached(&self.sql.update_null)?
                .execute([&encoded])?;
            if changed == 0 {
                conn.prepare_cached(&self.sql.insert_null)?
                    .execute([&encoded])?;
            }
        } else {
            conn.prepare_cached(&self.sql.upsert)?
                .execute(params![key, encoded])?;
        }
        guard.release()
    }

    /// Remove the entry at `key`, failing with [`KvError::NotFound`] when
    /// there is none.
    pub fn remove(&self, key: &Key) -> Result<()> {
        key.validate()?;
        let guard = self.lock()?;
        let conn = self.conn()?;
        let removed = if key.is_null() {
            conn.prepare_cached(&self.sql.delete_null)?.execute([])?
        } else {
            conn.prepare_cached(&self.sql.delete)?.execute([key])?
        };
        guard.release()?;

        if removed == 0 {
            return Err(KvError::NotFound(key.clone()));
        }
        Ok(())
    }

    /// Lazily iterate the keys in storage order.
    ///
    /// Keys are read in pages, so the sequence is only stable while the
    /// table is not modified.
    pub fn scan(&self) -> Result<Keys<'_>> {
        self.conn()?;
        Ok(Keys {
            store: self,
            after: i64::MIN,
            page: VecDeque::new(),
            exhausted: false,
        })
    }

    /// Close the connection.
    ///
    /// `if_locked` decides what happens to a transaction still held through
    /// [`SqliteKv::acquire`]. Closing an already closed store is a no-op.
    pub fn close(&mut self, if_locked: IfLocked) -> Result<()> {
        let Some(conn) = self.conn.as_ref() else {
            return Ok(());
        };

        let depth = self.depth.get();
        if depth > 0 {
            match if_locked {
                IfLocked::Raise => return Err(KvError::Locked { depth }),
                IfLocked::Abandon => conn.execute_batch("ROLLBACK")?,
                IfLocked::Flush => conn.execute_batch("COMMIT")?,
            }
            debug!(depth, policy = %if_locked, "settled transaction before close");
        }
        self.depth.set(0);

        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, err)| KvError::from(err))?;
        }
        debug!(db_uri = %self.db_uri, table = %self.table, "closed key-value store");
        Ok(())
    }
}

impl Drop for SqliteKv {
    fn drop(&mut self) {
        if self.conn.is_none() {
            return;
        }
        if self.locked() {
            warn!(
                depth = self.depth.get(),
                table = %self.table,
                "store dropped while locked, rolling back"
            );
        }
        if let Err(err) = self.close(IfLocked::Abandon) {
            error!(%err, "failed to close key-value store");
        }
    }
}

impl std::fmt::Debug for SqliteKv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteKv")
            .field("db_uri", &self.db_uri)
            .field("table", &self.table)
            .field("depth", &self.depth.get())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Lazy iterator over the keys of a store, see [`SqliteKv::scan`].
pub struct Keys<'a> {
    store: &'a SqliteKv,
    after: i64,
    page: VecDeque<Key>,
    exhausted: bool,
}

impl Keys<'_> {
    fn fill(&mut self) -> Result<()> {
        let store = self.store;
        let conn = store.conn()?;
        let mut stmt = conn.prepare_cached(&store.sql.page_keys)?;
        let limit = i64::try_from(store.iter_batch).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![self.after, limit], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, Key>(1)?))
        })?;

        let mut fetched = 0;
        for row in rows {
            let (rowid, key) = row?;
            self.after = rowid;
            self.page.push_back(key);
            fetched += 1;
        }
        if fetched < store.iter_batch {
            self.exhausted = true;
        }
        Ok(())
    }
}

impl Iterator for Keys<'_> {
    type Item = Result<Key>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.page.is_empty() && !self.exhausted {
            if let Err(err) = self.fill() {
                self.exhausted = true;
                return Some(Err(err));
            }
        }
        self.page.pop_front().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_put_then_fetch() {
        let kv = SqliteKv::in_memory().unwrap();
        kv.put(&Key::from("a"), &json!("b")).unwrap();
        assert_eq!(kv.fetch(&Key::from("a")).unwrap(), Some(json!("b")));
        assert_eq!(kv.fetch(&Key::from("missing")).unwrap(), None);
    }

    #[test]
    fn test_null_key_overwrite_keeps_one_row() {
        let kv = SqliteKv::in_memory().unwrap();
        kv.put(&Key::Null, &json!(1)).unwrap();
        kv.put(&Key::Null, &json!(2)).unwrap();
        assert_eq!(kv.count().unwrap(), 1);
        assert_eq!(kv.fetch(&Key::Null).unwrap(), Some(json!(2)));
    }

    #[test]
    fn test_nan_key_is_rejected() {
        let kv = SqliteKv::in_memory().unwrap();
        let nan = Key::from(f64::NAN);
        for _ in 0..2 {
            let err = kv.put(&nan, &json!(1)).unwrap_err();
            assert!(matches!(err, KvError::InvalidKey(_)));
        }
        assert!(matches!(kv.fetch(&nan), Err(KvError::InvalidKey(_))));
        assert!(matches!(kv.remove(&nan), Err(KvError::InvalidKey(_))));
        assert_eq!(kv.count().unwrap(), 0);
        assert!(!kv.locked());

        kv.put(&Key::Null, &json!(3)).unwrap();
        assert_eq!(kv.count().unwrap(), 1);
        assert_eq!(kv.fetch(&Key::Null).unwrap(), Some(json!(3)));
    }

    #[test]
    fn test_remove_missing_is_not_found() {
        let kv = SqliteKv::in_memory().unwrap();
        let err = kv.remove(&Key::from("missing")).unwrap_err();
        assert!(err.is_not_found());
        assert!(!kv.locked());
    }

    #[test]
    fn test_scan_pages_through_all_keys() {
        let kv = SqliteKv::open_with(":memory:", KvConfig::new().with_iter_batch(2)).unwrap();
        for i in 0..5 {
            kv.put(&Key::from(i), &json!(i)).unwrap();
        }
        let keys: Vec<Key> = kv.scan().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(keys, (0..5).map(Key::from).collect::<Vec<_>>());
    }

    #[test]
    fn test_scan_empty_table() {
        let kv = SqliteKv::in_memory().unwrap();
        assert_eq!(kv.scan().unwrap().count(), 0);
    }

    #[test]
    fn test_open_rejects_empty_table_name() {
        let result = SqliteKv::open_with(":memory:", KvConfig::new().with_table(""));
        assert!(matches!(result, Err(KvError::InvalidTable(_))));
    }

    #[test]
    fn test_operations_after_close_fail() {
        let mut kv = SqliteKv::in_memory().unwrap();
        kv.close(IfLocked::Raise).unwrap();
        assert!(kv.is_closed());
        assert!(matches!(kv.count(), Err(KvError::Closed)));
        assert!(matches!(kv.fetch(&Key::Null), Err(KvError::Closed)));
        assert!(matches!(kv.put(&Key::Null, &json!(1)), Err(KvError::Closed)));
        assert!(matches!(kv.scan(), Err(KvError::Closed)));
        // closing twice is fine
        kv.close(IfLocked::Raise).unwrap();
    }
}
