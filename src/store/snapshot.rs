use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;

use crate::store::{MemoryStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Failed to read snapshot: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed snapshot: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Snapshot value for {0} must be a string or an object")]
    InvalidValue(String),

    #[error("Snapshot key conflict: {0}")]
    Store(#[from] StoreError),
}

/// Parses a flat `{ "key": value }` dump of the key-space.
///
/// String values are stored verbatim; any other JSON value is stored in its
/// serialized form, so job and payload records can be written inline.
pub fn parse_snapshot(json: &str) -> Result<BTreeMap<String, String>, SnapshotError> {
    let raw: BTreeMap<String, Value> = serde_json::from_str(json)?;
    raw.into_iter()
        .map(|(key, value)| match value {
            Value::String(s) => Ok((key, s)),
            Value::Object(_) => Ok((key, value.to_string())),
            _ => Err(SnapshotError::InvalidValue(key)),
        })
        .collect()
}

/// Loads a snapshot file into a fresh [`MemoryStore`].
pub fn load_snapshot(path: &Path) -> Result<MemoryStore, SnapshotError> {
    let json = std::fs::read_to_string(path)?;
    let entries = parse_snapshot(&json)?;
    tracing::debug!(path = %path.display(), keys = entries.len(), "Loaded snapshot");
    Ok(MemoryStore::with_entries(entries)?)
}
