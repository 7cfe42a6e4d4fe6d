//! Durable, CAS-guarded timestamp bound.
//!
//! The bound is the exclusive upper limit of every timestamp ever handed out
//! for a namespace. It only moves forward, and every move is a
//! compare-and-swap against the value this process last observed. A CAS that
//! finds anything else means a second process is allocating from the same
//! namespace. That is reported as [`CoordinationError::MultipleWriters`] and
//! is never retried: retrying could hand out timestamps the other writer has
//! already issued.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use timelock_constants::timestamp::BOUND_KEY_PREFIX;
use timelock_constants::timestamp::INITIAL_BOUND;
use timelock_kv_types::KeyValueStoreError;
use timelock_kv_types::ReadRequest;
use timelock_kv_types::WriteRequest;
use timelock_traits::KeyValueStore;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::error::CoordinationError;
use crate::pure::ParseBoundResult;
use crate::pure::encode_bound;
use crate::pure::is_valid_advance;
use crate::pure::parse_bound;

/// Durable bound operations used by the allocator.
#[async_trait]
pub trait BoundStore: Send + Sync {
    /// Read the durable bound, creating it with the initial value if absent.
    async fn read(&self) -> Result<u64, CoordinationError>;

    /// Move the bound from `observed_previous` to `new_bound`.
    ///
    /// Fails with [`CoordinationError::MultipleWriters`] if the durable value
    /// is no longer `observed_previous`.
    async fn advance(&self, observed_previous: u64, new_bound: u64) -> Result<(), CoordinationError>;
}

#[async_trait]
impl<T: BoundStore + ?Sized> BoundStore for Arc<T> {
    async fn read(&self) -> Result<u64, CoordinationError> {
        (**self).read().await
    }

    async fn advance(&self, observed_previous: u64, new_bound: u64) -> Result<(), CoordinationError> {
        (**self).advance(observed_previous, new_bound).await
    }
}

/// Configuration for a bound store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundConfig {
    /// Namespace of the bound record. One record per namespace.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Value written when the record does not exist yet.
    #[serde(default = "default_initial_bound")]
    pub initial_bound: u64,
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_initial_bound() -> u64 {
    INITIAL_BOUND
}

impl Default for BoundConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            initial_bound: default_initial_bound(),
        }
    }
}

#[derive(Default)]
struct BoundState {
    /// Last value this process read or successfully wrote.
    current_limit: Option<u64>,
    /// Description of the last failed write, cleared by a successful one.
    last_write_failure: Option<String>,
}

/// [`BoundStore`] over a linearizable key-value store.
pub struct TimestampBoundStore<S: KeyValueStore + ?Sized> {
    store: Arc<S>,
    key: String,
    initial_bound: u64,
    state: Mutex<BoundState>,
}

impl<S: KeyValueStore + ?Sized> TimestampBoundStore<S> {
    /// Create a bound store for `config.namespace`.
    pub fn new(store: Arc<S>, config: &BoundConfig) -> Self {
        // Tiger Style: argument validation
        assert!(!config.namespace.is_empty(), "BOUND: namespace must not be empty");

        Self {
            store,
            key: format!("{BOUND_KEY_PREFIX}{}", config.namespace),
            initial_bound: config.initial_bound,
            state: Mutex::new(BoundState::default()),
        }
    }

    /// Key of the bound record.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Last limit read or written by this process, without I/O.
    pub async fn current_limit(&self) -> Option<u64> {
        self.state.lock().await.current_limit
    }

    /// Description of the most recent failed write, if the last write failed.
    pub async fn last_write_failure(&self) -> Option<String> {
        self.state.lock().await.last_write_failure.clone()
    }

    /// Advance from the last observed limit to `new_limit`.
    ///
    /// Requires a prior [`read`](BoundStore::read).
    pub async fn store_upper_limit(&self, new_limit: u64) -> Result<(), CoordinationError> {
        let mut state = self.state.lock().await;
        let previous = state.current_limit.ok_or_else(|| CoordinationError::InvalidRequest {
            reason: format!("bound '{}' must be read before it is advanced", self.key),
        })?;
        self.check_advance(previous, new_limit)?;
        self.cas(&mut state, Some(previous), new_limit).await
    }

    fn check_advance(&self, previous: u64, new_bound: u64) -> Result<(), CoordinationError> {
        if is_valid_advance(previous, new_bound) {
            Ok(())
        } else {
            Err(CoordinationError::InvalidRequest {
                reason: format!("bound '{}' cannot decrease from {previous} to {new_bound}", self.key),
            })
        }
    }

    async fn read_stored(&self) -> Result<Option<u64>, CoordinationError> {
        let result = match self.store.read(ReadRequest::new(self.key.clone())).await {
            Ok(result) => result,
            Err(KeyValueStoreError::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(CoordinationError::Storage { source: e }),
        };
        let Some(raw) = result.value() else {
            return Ok(None);
        };
        match parse_bound(raw) {
            ParseBoundResult::Value(v) => Ok(Some(v)),
            ParseBoundResult::Invalid => Err(CoordinationError::CorruptedData {
                key: self.key.clone(),
                reason: format!("'{raw}' is not a 16-digit hex bound"),
            }),
        }
    }

    async fn cas(&self, state: &mut BoundState, expected: Option<u64>, new_bound: u64) -> Result<(), CoordinationError> {
        let request = WriteRequest::compare_and_swap(self.key.clone(), expected.map(encode_bound), encode_bound(new_bound));

        match self.store.write(request).await {
            Ok(_) => {
                state.current_limit = Some(new_bound);
                state.last_write_failure = None;
                debug!(key = %self.key, ?expected, new_bound, "advanced timestamp bound");
                Ok(())
            }
            Err(KeyValueStoreError::CompareAndSwapFailed { actual, .. }) => {
                let err = CoordinationError::MultipleWriters {
                    key: self.key.clone(),
                    expected,
                    actual,
                };
                error!(
                    key = %self.key,
                    ?expected,
                    new_bound,
                    error = %err,
                    "timestamp bound CAS failed; another timestamp service is running against this store"
                );
                state.last_write_failure = Some(err.to_string());
                Err(err)
            }
            Err(e) => {
                warn!(key = %self.key, ?expected, new_bound, error = %e, "timestamp bound write failed");
                state.last_write_failure = Some(e.to_string());
                Err(CoordinationError::Storage { source: e })
            }
        }
    }
}

#[async_trait]
impl<S: KeyValueStore + ?Sized + 'static> BoundStore for TimestampBoundStore<S> {
    async fn read(&self) -> Result<u64, CoordinationError> {
        let mut state = self.state.lock().await;
        match self.read_stored().await? {
            Some(limit) => {
                state.current_limit = Some(limit);
                Ok(limit)
            }
            None => {
                info!(key = %self.key, initial_bound = self.initial_bound, "creating timestamp bound");
                self.cas(&mut state, None, self.initial_bound).await?;
                Ok(self.initial_bound)
            }
        }
    }

    async fn advance(&self, observed_previous: u64, new_bound: u64) -> Result<(), CoordinationError> {
        self.check_advance(observed_previous, new_bound)?;
        let mut state = self.state.lock().await;
        self.cas(&mut state, Some(observed_previous), new_bound).await
    }
}
