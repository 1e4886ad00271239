//! Persistent key-value store on top of SQLite
//!
//! Entries live in one table `(key PRIMARY KEY, value)`. Keys are typed
//! scalars ([`Key`]: text, integer, float or null) and keep their type, so
//! `13` and `"13"` are different keys. Values are any JSON value, stored as
//! JSON text.
//!
//! # Features
//!
//! - Dictionary-style API through the [`Mapping`] trait
//! - Reentrant lock built on SQLite's `BEGIN IMMEDIATE` transactions, shared
//!   safely between processes by the engine's file lock
//! - Several independent namespaces per database file (one table each)
//! - In-memory databases for testing
//!
//! # Example: Basic Usage
//!
//! ```rust,no_run
//! use serde_json::json;
//! use sqlkv::{Mapping, SqliteKv};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let kv = SqliteKv::open("/tmp/demo.kv")?;
//!
//! kv.set("hello", &json!("world"))?;
//! kv.set(42, &json!(["answer", 2, {"ultimate": "question"}]))?;
//!
//! assert_eq!(kv.get("hello")?, Some(json!("world")));
//! assert_eq!(kv.len()?, 2);
//! # Ok(())
//! # }
//! ```
//!
//! # Example: Locking
//!
//! ```rust,no_run
//! use serde_json::json;
//! use sqlkv::{IfLocked, Mapping, SqliteKv};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut kv = SqliteKv::open("/tmp/demo.kv")?;
//!
//! {
//!     let _guard = kv.lock()?;
//!     let n = kv.get_or("counter", json!(0))?.as_i64().unwrap_or(0);
//!     kv.set("counter", &json!(n + 1))?;
//! } // committed here
//!
//! kv.close(IfLocked::Raise)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod json;
pub mod key;
pub mod lock;
pub mod mapping;
pub mod schema;
pub mod store;

// Re-export main types
pub use config::KvConfig;
pub use error::{KvError, Result};
pub use key::Key;
pub use lock::{IfLocked, LockGuard};
pub use mapping::Mapping;
pub use store::{Keys, SqliteKv};
