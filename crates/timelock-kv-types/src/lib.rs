//! Key-value types shared between the timelock core and storage engines.
//!
//! The core only needs point reads and a single-key compare-and-swap.
//! Engines map these onto their own primitives.

mod error;
mod read;
mod write;

pub use error::KeyValueStoreError;
pub use read::ReadRequest;
pub use read::ReadResult;
pub use write::WriteCommand;
pub use write::WriteRequest;
pub use write::WriteResult;

use serde::Deserialize;
use serde::Serialize;

/// A stored value together with its revision metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyValueWithRevision {
    pub key: String,
    pub value: String,
    /// Revision at which the key was first created.
    pub create_revision: u64,
    /// Revision of the most recent modification.
    pub mod_revision: u64,
    /// Number of modifications since creation.
    pub version: u64,
}
