//! JSON value codec
//!
//! Values are stored as JSON text in the `value` column. Any `serde` type can
//! be encoded; the mapping API works with [`serde_json::Value`].

use serde::{de::DeserializeOwned, Serialize};

use crate::error::Result;

/// Serialize a value to JSON text for storage
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Deserialize JSON text read from the store
pub fn decode<T: DeserializeOwned>(text: &str) -> Result<T> {
    Ok(serde_json::from_str(text)?)
}
