//! Save and load model values as JSON files.
//!
//! Operator tooling for snapshotting sections to disk (zone transfers,
//! debugging). The caches themselves are never persisted.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Write `value` to `path` as pretty-printed JSON.
pub fn save<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<()> {
    let data = serde_json::to_vec_pretty(value)?;
    fs::write(path, data)?;
    Ok(())
}

/// Read a value of type `T` back from `path`.
///
/// A missing file surfaces as an io error, malformed content as a
/// serialization error.
pub fn load<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let data = fs::read(path)?;
    Ok(serde_json::from_slice(&data)?)
}
