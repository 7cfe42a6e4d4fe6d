//! Read operation types.

use serde::Deserialize;
use serde::Serialize;

use crate::KeyValueWithRevision;

/// Request to read a single key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadRequest {
    pub key: String,
}

impl ReadRequest {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// Response from a read operation; `kv` is `None` when the key is absent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadResult {
    pub kv: Option<KeyValueWithRevision>,
}

impl ReadResult {
    /// The stored value, if any.
    pub fn value(&self) -> Option<&str> {
        self.kv.as_ref().map(|kv| kv.value.as_str())
    }
}
