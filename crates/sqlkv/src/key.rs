//! Typed keys
//!
//! The key column is declared without a type, so SQLite keeps the storage
//! class of whatever is bound to it. [`Key`] mirrors the four scalar classes
//! a key can have, which keeps the integer `13` and the text `"13"` apart.

use std::fmt;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

use crate::error::{KvError, Result};

/// Key of a stored entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Key {
    /// SQL `NULL`
    Null,
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit float
    Real(f64),
    /// UTF-8 text
    Text(String),
}

impl Key {
    /// True for [`Key::Null`], which needs `IS NULL` predicates.
    pub fn is_null(&self) -> bool {
        matches!(self, Key::Null)
    }

    /// Reject keys SQLite cannot store as themselves.
    ///
    /// SQLite binds a NaN double as `NULL`, which would alias the null key.
    pub fn validate(&self) -> Result<&Self> {
        match self {
            Key::Real(r) if r.is_nan() => Err(KvError::InvalidKey(self.clone())),
            _ => Ok(self),
        }
    }

    /// Borrow the text of a [`Key::Text`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Key::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Null => f.write_str("null"),
            Key::Integer(n) => write!(f, "{n}"),
            Key::Real(r) => write!(f, "{r:?}"),
            Key::Text(text) => write!(f, "{text:?}"),
        }
    }
}

impl From<&str> for Key {
    fn from(text: &str) -> Self {
        Key::Text(text.to_owned())
    }
}

impl From<String> for Key {
    fn from(text: String) -> Self {
        Key::Text(text)
    }
}

impl From<&String> for Key {
    fn from(text: &String) -> Self {
        Key::Text(text.clone())
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Integer(n)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Key::Integer(n.into())
    }
}

impl From<u32> for Key {
    fn from(n: u32) -> Self {
        Key::Integer(n.into())
    }
}

impl From<f64> for Key {
    fn from(r: f64) -> Self {
        Key::Real(r)
    }
}

impl From<&Key> for Key {
    fn from(key: &Key) -> Self {
        key.clone()
    }
}

impl<T: Into<Key>> From<Option<T>> for Key {
    fn from(key: Option<T>) -> Self {
        key.map_or(Key::Null, Into::into)
    }
}

impl ToSql for Key {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Key::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Key::Integer(n) => ToSqlOutput::from(*n),
            Key::Real(r) => ToSqlOutput::from(*r),
            Key::Text(text) => ToSqlOutput::from(text.as_str()),
        })
    }
}

impl FromSql for Key {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Null => Ok(Key::Null),
            ValueRef::Integer(n) => Ok(Key::Integer(n)),
            ValueRef::Real(r) => Ok(Key::Real(r)),
            ValueRef::Text(bytes) => std::str::from_utf8(bytes)
                .map(|text| Key::Text(text.to_owned()))
                .map_err(|e| FromSqlError::Other(Box::new(e))),
            ValueRef::Blob(_) => Err(FromSqlError::InvalidType),
        }
    }
}
