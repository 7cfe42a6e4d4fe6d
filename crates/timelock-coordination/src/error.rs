//! Error types for the consistency core.

use snafu::Snafu;
use timelock_kv_types::KeyValueStoreError;

use crate::types::LeaderAddress;

fn describe_leader(leader: &Option<LeaderAddress>) -> String {
    match leader {
        Some(address) => format!("; current leader: {address}"),
        None => String::new(),
    }
}

fn describe_bound(value: &Option<u64>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "<absent>".to_string(),
    }
}

/// Errors from the bound store, allocator, coordinator, and lock primitives.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CoordinationError {
    /// The durable bound changed underneath us: another process is allocating.
    ///
    /// Fatal. Retrying risks issuing duplicate timestamps.
    #[snafu(display(
        "timestamp bound '{key}' changed underneath us (expected {}, found {actual:?}); \
         another timestamp service may be running against this store",
        describe_bound(expected)
    ))]
    MultipleWriters {
        /// Key of the bound record.
        key: String,
        /// Value we expected to replace (`None` = absent).
        expected: Option<u64>,
        /// Raw value actually stored, if any.
        actual: Option<String>,
    },

    /// This process is not the leader; retry against `leader` when known.
    #[snafu(display("not current leader: {message}{}", describe_leader(leader)))]
    NotCurrentLeader {
        /// What was attempted.
        message: String,
        /// Last pinged leader, for client redirection.
        leader: Option<LeaderAddress>,
    },

    /// The coordinator or service has been closed.
    #[snafu(display("closed"))]
    Closed,

    /// Data in storage is corrupted or unparseable.
    #[snafu(display("corrupted data in key '{key}': {reason}"))]
    CorruptedData {
        /// The key with corrupted data.
        key: String,
        /// Description of what went wrong.
        reason: String,
    },

    /// The request is invalid and will never succeed as given.
    #[snafu(display("invalid request: {reason}"))]
    InvalidRequest {
        /// Why the request was rejected.
        reason: String,
    },

    /// Timestamp space exhausted (u64 overflow).
    #[snafu(display("timestamps exhausted for '{key}'"))]
    TimestampsExhausted {
        /// The bound key.
        key: String,
    },

    /// The elector could not be consulted.
    #[snafu(display("leader elector unavailable: {reason}"))]
    ElectorUnavailable {
        /// Description of the failure.
        reason: String,
    },

    /// Maximum retries exceeded.
    #[snafu(display("max retries exceeded for {operation}: {attempts} attempts"))]
    MaxRetriesExceeded {
        /// Description of the operation.
        operation: String,
        /// Number of attempts made.
        attempts: u32,
    },

    /// Underlying storage error.
    #[snafu(display("storage error: {source}"))]
    Storage {
        /// The underlying error.
        source: KeyValueStoreError,
    },

    /// JSON serialization/deserialization error.
    #[snafu(display("serialization error: {source}"))]
    Serialization {
        /// The underlying error.
        source: serde_json::Error,
    },
}

impl CoordinationError {
    /// Split-brain detected by a bound store CAS.
    pub fn is_multiple_writers(&self) -> bool {
        matches!(self, CoordinationError::MultipleWriters { .. })
    }

    /// Transient failures that a caller's retry policy may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoordinationError::Storage { .. }
                | CoordinationError::NotCurrentLeader { .. }
                | CoordinationError::ElectorUnavailable { .. }
        )
    }

    /// Errors that only arise from an intentional shutdown.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, CoordinationError::Closed)
    }
}

impl From<KeyValueStoreError> for CoordinationError {
    fn from(source: KeyValueStoreError) -> Self {
        CoordinationError::Storage { source }
    }
}

impl From<serde_json::Error> for CoordinationError {
    fn from(source: serde_json::Error) -> Self {
        CoordinationError::Serialization { source }
    }
}

/// Failure of one unit of scheduled work.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TaskError {
    /// A dependency the work needs (database nodes, quorum) is not available.
    #[snafu(display("dependency unavailable: {reason}"))]
    DependencyUnavailable {
        /// Which dependency and why.
        reason: String,
    },

    /// The work failed unexpectedly.
    #[snafu(display("task failed: {reason}"))]
    Failed {
        /// Description of the failure.
        reason: String,
    },
}

/// Configuration loading and validation errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// A configuration value is out of range or malformed.
    #[snafu(display("invalid value for {key}: '{value}' ({reason})"))]
    InvalidValue {
        /// Configuration key or environment variable.
        key: String,
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The configuration file could not be read.
    #[snafu(display("failed to read config file {path}: {source}"))]
    ReadFile {
        /// Path of the file.
        path: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for this schema.
    #[snafu(display("failed to parse config file {path}: {source}"))]
    ParseToml {
        /// Path of the file.
        path: String,
        /// The underlying parse error.
        source: toml::de::Error,
    },
}
