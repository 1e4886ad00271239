//! Dictionary-style access to a store
//!
//! [`Mapping`] is the interface applications program against: typed
//! get/set/delete/iterate/len plus the usual dictionary conveniences built on
//! top of them. Writes that touch several entries run inside
//! [`Mapping::atomically`], so they commit as a single transaction.

use serde_json::Value;

use crate::error::{KvError, Result};
use crate::key::Key;
use crate::store::{Keys, SqliteKv};

/// Dictionary semantics over a persistent table.
pub trait Mapping {
    /// Lazy key iterator returned by [`Mapping::iter`]
    type Iter<'a>: Iterator<Item = Result<Key>>
    where
        Self: 'a;

    /// Number of entries
    fn len(&self) -> Result<usize>;

    /// Value at `key`, or `None` when absent
    fn get<K: Into<Key>>(&self, key: K) -> Result<Option<Value>>;

    /// Insert or overwrite the value at `key`
    fn set<K: Into<Key>>(&self, key: K, value: &Value) -> Result<()>;

    /// Remove `key`; [`KvError::NotFound`] when absent
    fn delete<K: Into<Key>>(&self, key: K) -> Result<()>;

    /// Iterate the keys in storage order
    fn iter(&self) -> Result<Self::Iter<'_>>;

    /// Run `f` as one transaction, holding the store's lock throughout
    fn atomically<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn contains<K: Into<Key>>(&self, key: K) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Value at `key`, or `default` when absent
    fn get_or<K: Into<Key>>(&self, key: K, default: Value) -> Result<Value> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// Value at `key`; [`KvError::NotFound`] when absent
    fn item<K: Into<Key>>(&self, key: K) -> Result<Value> {
        let key = key.into();
        match self.get(&key)? {
            Some(value) => Ok(value),
            None => Err(KvError::NotFound(key)),
        }
    }

    /// All keys, collected
    fn keys(&self) -> Result<Vec<Key>> {
        self.iter()?.collect()
    }

    /// Set every entry of `entries` in one transaction
    fn update<I, K>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<Key>,
    {
        self.atomically(|map| {
            for (key, value) in entries {
                map.set(key, &value)?;
            }
            Ok(())
        })
    }

    /// Remove `key` and return the value it held
    fn pop<K: Into<Key>>(&self, key: K) -> Result<Value> {
        let key = key.into();
        self.atomically(|map| {
            let value = map.item(&key)?;
            map.delete(&key)?;
            Ok(value)
        })
    }

    /// All `(key, value)` pairs.
    ///
    /// Keys deleted by another connection between listing and reading are
    /// skipped.
    fn items(&self) -> Result<Vec<(Key, Value)>> {
        let mut items = Vec::new();
        for key in self.keys()? {
            if let Some(value) = self.get(&key)? {
                items.push((key, value));
            }
        }
        Ok(items)
    }

    fn values(&self) -> Result<Vec<Value>> {
        Ok(self.items()?.into_iter().map(|(_, value)| value).collect())
    }

    /// Remove every entry in one transaction
    fn clear(&self) -> Result<()> {
        self.atomically(|map| {
            for key in map.keys()? {
                // duplicate NULL keys are all removed by the first delete
                match map.delete(key) {
                    Ok(()) | Err(KvError::NotFound(_)) => {}
                    Err(err) => return Err(err),
                }
            }
            Ok(())
        })
    }
}

impl Mapping for SqliteKv {
    type Iter<'a> = Keys<'a>;

    fn len(&self) -> Result<usize> {
        self.count()
    }

    fn get<K: Into<Key>>(&self, key: K) -> Result<Option<Value>> {
        self.fetch(&key.into())
    }

    fn set<K: Into<Key>>(&self, key: K, value: &Value) -> Result<()> {
        self.put(&key.into(), value)
    }

    fn delete<K: Into<Key>>(&self, key: K) -> Result<()> {
        self.remove(&key.into())
    }

    fn iter(&self) -> Result<Self::Iter<'_>> {
        self.scan()
    }

    fn atomically<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        self.with_lock(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_get_or_default() {
        let kv = SqliteKv::in_memory().unwrap();
        assert_eq!(kv.get_or("missing", json!("fallback")).unwrap(), json!("fallback"));
        kv.set("present", &json!(1)).unwrap();
        assert_eq!(kv.get_or("present", json!("fallback")).unwrap(), json!(1));
    }

    #[test]
    fn test_item_missing_is_not_found() {
        let kv = SqliteKv::in_memory().unwrap();
        let err = kv.item("missing").unwrap_err();
        assert!(matches!(err, KvError::NotFound(Key::Text(ref k)) if k == "missing"));
    }

    #[test]
    fn test_update_is_one_transaction() {
        let kv = SqliteKv::in_memory().unwrap();
        kv.update([("a", json!(1)), ("b", json!(2))]).unwrap();
        assert_eq!(kv.len().unwrap(), 2);
        assert!(!kv.locked());
    }

    #[test]
    fn test_pop() {
        let kv = SqliteKv::in_memory().unwrap();
        kv.set("a", &json!({"x": 1})).unwrap();
        assert_eq!(kv.pop("a").unwrap(), json!({"x": 1}));
        assert!(!kv.contains("a").unwrap());
        assert!(kv.pop("a").unwrap_err().is_not_found());
        assert!(!kv.locked());
    }

    #[test]
    fn test_items_values_and_clear() {
        let kv = SqliteKv::in_memory().unwrap();
        kv.set("a", &json!("x")).unwrap();
        kv.set(2, &json!("y")).unwrap();

        assert_eq!(
            kv.items().unwrap(),
            vec![(Key::from("a"), json!("x")), (Key::Integer(2), json!("y"))]
        );
        assert_eq!(kv.values().unwrap(), vec![json!("x"), json!("y")]);

        kv.clear().unwrap();
        assert!(kv.is_empty().unwrap());
    }
}
