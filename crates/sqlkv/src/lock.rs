//! Reentrant transaction lock
//!
//! The lock is SQLite's own write lock: the outermost acquisition issues
//! `BEGIN IMMEDIATE TRANSACTION`, which takes the database's RESERVED lock
//! at once, and the matching outermost release issues `COMMIT`. Nested
//! acquisitions only move a depth counter, so a caller can hold the lock
//! around a read-modify-write while `put`/`remove` take it again inside.
//!
//! Contention is resolved by the engine. Another connection holding the lock
//! makes `BEGIN IMMEDIATE` wait for the busy timeout and then fail with
//! `SQLITE_BUSY`; that error is returned as is and the depth is untouched.
//!
//! ```rust,no_run
//! use serde_json::json;
//! use sqlkv::{Mapping, SqliteKv};
//!
//! # fn main() -> sqlkv::Result<()> {
//! let kv = SqliteKv::open("/tmp/demo.kv")?;
//! kv.with_lock(|kv| {
//!     let mut list = kv.get_or(42, json!([]))?;
//!     if let Some(items) = list.as_array_mut() {
//!         items.push(json!("or is it?"));
//!     }
//!     kv.set(42, &list)
//! })?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::str::FromStr;

use tracing::{error, trace, warn};

use crate::error::{KvError, Result};
use crate::store::SqliteKv;

/// What [`SqliteKv::close`] does when the lock is still held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IfLocked {
    /// Refuse to close and leave the store open
    #[default]
    Raise,
    /// Roll back the open transaction, then close
    Abandon,
    /// Commit the open transaction, then close
    Flush,
}

impl FromStr for IfLocked {
    type Err = KvError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "raise" => Ok(IfLocked::Raise),
            "abandon" => Ok(IfLocked::Abandon),
            "flush" => Ok(IfLocked::Flush),
            other => Err(KvError::InvalidPolicy(other.to_string())),
        }
    }
}

impl fmt::Display for IfLocked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IfLocked::Raise => "raise",
            IfLocked::Abandon => "abandon",
            IfLocked::Flush => "flush",
        })
    }
}

impl SqliteKv {
    /// Take the lock, beginning a transaction if this is the outermost
    /// acquisition.
    ///
    /// Every successful call must be paired with one [`SqliteKv::release`];
    /// prefer [`SqliteKv::lock`], which pairs them automatically.
    pub fn acquire(&self) -> Result<()> {
        let conn = self.conn()?;
        let depth = self.depth.get();
        if depth == 0 {
            conn.execute_batch("BEGIN IMMEDIATE TRANSACTION")?;
            trace!(table = self.table(), "began immediate transaction");
        }
        self.depth.set(depth + 1);
        Ok(())
    }

    /// Give back one level of the lock, committing when the outermost level
    /// is released.
    ///
    /// A failed outermost commit rolls the transaction back and returns the
    /// error; the lock is no longer held afterwards either way.
    pub fn release(&self) -> Result<()> {
        let conn = self.conn()?;
        let depth = self.depth.get();
        if depth == 0 {
            return Err(KvError::NotLocked);
        }

        self.depth.set(depth - 1);
        if depth == 1 {
            if let Err(err) = conn.execute_batch("COMMIT") {
                // a busy COMMIT leaves the transaction open; nobody holds a
                // level of it any more, so drop its writes
                if !conn.is_autocommit() {
                    if let Err(rollback) = conn.execute_batch("ROLLBACK") {
                        error!(%rollback, table = self.table(), "rollback after failed commit");
                    }
                }
                warn!(%err, table = self.table(), "commit failed, transaction rolled back");
                return Err(err.into());
            }
            trace!(table = self.table(), "committed transaction");
        }
        Ok(())
    }

    /// Take the lock for the lifetime of the returned guard.
    pub fn lock(&self) -> Result<LockGuard<'_>> {
        self.acquire()?;
        Ok(LockGuard {
            store: self,
            released: false,
        })
    }

    /// Run `f` while holding the lock.
    ///
    /// The lock is released whatever `f` returns; at the outermost level that
    /// commits the work `f` did even when it failed. An error from `f` takes
    /// precedence over a release error.
    pub fn with_lock<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        let guard = self.lock()?;
        let outcome = f(self);
        let released = guard.release();
        let value = outcome?;
        released?;
        Ok(value)
    }

    /// Whether the lock is currently held
    pub fn locked(&self) -> bool {
        self.depth.get() > 0
    }

    /// Current nesting depth of the lock
    pub fn depth(&self) -> usize {
        self.depth.get()
    }
}

/// Holds one level of a store's lock; dropping it releases that level.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    store: &'a SqliteKv,
    released: bool,
}

impl LockGuard<'_> {
    /// Release now and report a failed commit, which `Drop` can only log.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.store.release()
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = self.store.release() {
            error!(%err, table = self.store.table(), "failed to release store lock");
        }
    }
}

impl fmt::Debug for LockGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("table", &self.store.table())
            .field("depth", &self.store.depth())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Key;
    use serde_json::json;

    fn in_transaction(kv: &SqliteKv) -> bool {
        !kv.conn().unwrap().is_autocommit()
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("raise".parse::<IfLocked>().unwrap(), IfLocked::Raise);
        assert_eq!("abandon".parse::<IfLocked>().unwrap(), IfLocked::Abandon);
        assert_eq!("flush".parse::<IfLocked>().unwrap(), IfLocked::Flush);
        assert!(matches!(
            "explode".parse::<IfLocked>(),
            Err(KvError::InvalidPolicy(_))
        ));
        assert_eq!(IfLocked::default(), IfLocked::Raise);
        assert_eq!(IfLocked::Flush.to_string(), "flush");
    }

    #[test]
    fn test_nested_acquire_opens_one_transaction() {
        let kv = SqliteKv::in_memory().unwrap();
        assert!(!in_transaction(&kv));

        kv.acquire().unwrap();
        assert!(in_transaction(&kv));
        kv.acquire().unwrap();
        assert_eq!(kv.depth(), 2);

        kv.release().unwrap();
        assert!(kv.locked());
        assert!(in_transaction(&kv));

        kv.release().unwrap();
        assert!(!kv.locked());
        assert!(!in_transaction(&kv));
    }

    #[test]
    fn test_release_without_acquire() {
        let kv = SqliteKv::in_memory().unwrap();
        assert!(matches!(kv.release(), Err(KvError::NotLocked)));
        assert_eq!(kv.depth(), 0);
    }

    #[test]
    fn test_guard_releases_on_error_path() {
        let kv = SqliteKv::in_memory().unwrap();
        let result = (|| -> Result<()> {
            let _guard = kv.lock()?;
            kv.fail_statement()?;
            Ok(())
        })();
        assert!(result.is_err());
        assert!(!kv.locked());
        assert!(!in_transaction(&kv));
    }

    #[test]
    fn test_with_lock_commits_and_returns_value() {
        let kv = SqliteKv::in_memory().unwrap();
        let n = kv
            .with_lock(|kv| {
                assert_eq!(kv.depth(), 1);
                kv.put(&Key::from("a"), &json!(1))?;
                assert_eq!(kv.depth(), 1);
                kv.count()
            })
            .unwrap();
        assert_eq!(n, 1);
        assert!(!kv.locked());
    }

    #[test]
    fn test_with_lock_keeps_closure_error() {
        let kv = SqliteKv::in_memory().unwrap();
        let err = kv
            .with_lock(|kv| kv.remove(&Key::from("missing")))
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(!kv.locked());
    }

    #[test]
    fn test_acquire_on_closed_store() {
        let mut kv = SqliteKv::in_memory().unwrap();
        kv.close(IfLocked::Raise).unwrap();
        assert!(matches!(kv.acquire(), Err(KvError::Closed)));
        assert!(matches!(kv.lock(), Err(KvError::Closed)));
        assert_eq!(kv.depth(), 0);
    }

    #[test]
    fn test_close_raise_keeps_store_open() {
        let mut kv = SqliteKv::in_memory().unwrap();
        kv.acquire().unwrap();
        assert!(matches!(
            kv.close(IfLocked::Raise),
            Err(KvError::Locked { depth: 1 })
        ));
        assert!(!kv.is_closed());
        kv.release().unwrap();
        kv.close(IfLocked::Raise).unwrap();
        assert!(kv.is_closed());
    }

    impl SqliteKv {
        fn fail_statement(&self) -> Result<()> {
            self.conn()?.execute_batch("INSERT INTO no_such_table VALUES (1)")?;
            Ok(())
        }
    }
}
