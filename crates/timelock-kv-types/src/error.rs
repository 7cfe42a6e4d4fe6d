//! Errors reported by key-value engines.

use thiserror::Error;

/// Errors from key-value store operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyValueStoreError {
    #[error("key '{key}' not found")]
    NotFound { key: String },
    #[error("operation failed: {reason}")]
    Failed { reason: String },
    #[error("operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },
    #[error("compare-and-swap failed for key '{key}': expected {expected:?}, found {actual:?}")]
    CompareAndSwapFailed {
        key: String,
        expected: Option<String>,
        actual: Option<String>,
    },
    #[error("key cannot be empty")]
    EmptyKey,
    #[error("storage unavailable: {reason}")]
    Unavailable { reason: String },
}

impl KeyValueStoreError {
    /// Whether the failure is a lost compare-and-swap rather than a transport problem.
    pub fn is_cas_conflict(&self) -> bool {
        matches!(self, KeyValueStoreError::CompareAndSwapFailed { .. })
    }
}
