//! Write operation types.

use serde::Deserialize;
use serde::Serialize;

/// Commands for modifying key-value state.
///
/// The core only ever writes through a single-key compare-and-swap.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum WriteCommand {
    /// Atomically replace the value if the current value equals `expected`.
    ///
    /// `expected: None` means "the key must be absent".
    CompareAndSwap {
        key: String,
        expected: Option<String>,
        new_value: String,
    },
}

impl WriteCommand {
    /// The key this command touches.
    pub fn key(&self) -> &str {
        match self {
            WriteCommand::CompareAndSwap { key, .. } => key,
        }
    }
}

/// Request to perform a write operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WriteRequest {
    pub command: WriteCommand,
}

impl WriteRequest {
    /// Create a CompareAndSwap command.
    pub fn compare_and_swap(key: impl Into<String>, expected: Option<String>, new_value: impl Into<String>) -> Self {
        Self {
            command: WriteCommand::CompareAndSwap {
                key: key.into(),
                expected,
                new_value: new_value.into(),
            },
        }
    }
}

/// Result of a write operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct WriteResult {
    /// Revision assigned to the write by the engine.
    pub header_revision: Option<u64>,
    /// For conditional writes, whether the condition held.
    pub succeeded: Option<bool>,
}
