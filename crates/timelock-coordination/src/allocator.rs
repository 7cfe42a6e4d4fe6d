//! Batching timestamp allocator.
//!
//! Hands out strictly increasing timestamps from an in-memory reservation
//! `[next, upper_limit)` and only touches the [`BoundStore`] when the
//! reservation runs out. Every timestamp returned is below the last durably
//! persisted bound, so a restarted allocator (which starts from the durable
//! bound) can never repeat one.

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use timelock_constants::timestamp::DEFAULT_MIN_BUFFER;
use timelock_constants::timestamp::DEFAULT_OVERALLOCATION_MULTIPLIER;
use timelock_constants::timestamp::FAST_FORWARD_SENTINEL;
use timelock_constants::timestamp::MAX_TIMESTAMPS_PER_REQUEST;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::bound_store::BoundStore;
use crate::error::CoordinationError;
use crate::pure::can_serve_from_reservation;
use crate::pure::compute_refill_target;
use crate::types::TimestampRange;

/// Timestamp management surface exposed to clients.
#[async_trait]
pub trait TimestampService: Send + Sync {
    /// One fresh timestamp.
    async fn fresh_timestamp(&self) -> Result<u64, CoordinationError>;

    /// `count` consecutive fresh timestamps.
    async fn fresh_timestamps(&self, count: u64) -> Result<TimestampRange, CoordinationError>;

    /// Ensure every later timestamp is greater than `timestamp`. Never moves backward.
    async fn fast_forward(&self, timestamp: u64) -> Result<(), CoordinationError>;

    /// Liveness check.
    async fn ping(&self) -> &'static str {
        "pong"
    }
}

/// Allocator tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatorConfig {
    /// A refill reserves at least `count * overallocation_multiplier` timestamps.
    #[serde(default = "default_overallocation_multiplier")]
    pub overallocation_multiplier: u64,
    /// A refill reserves at least this many timestamps.
    #[serde(default = "default_min_buffer")]
    pub min_buffer: u64,
}

fn default_overallocation_multiplier() -> u64 {
    DEFAULT_OVERALLOCATION_MULTIPLIER
}

fn default_min_buffer() -> u64 {
    DEFAULT_MIN_BUFFER
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            overallocation_multiplier: default_overallocation_multiplier(),
            min_buffer: default_min_buffer(),
        }
    }
}

/// Evidence of a concurrent writer, kept so later calls fail the same way.
#[derive(Clone)]
struct Poison {
    key: String,
    expected: Option<u64>,
    actual: Option<String>,
}

#[derive(Default)]
struct AllocatorState {
    initialized: bool,
    /// Next timestamp to hand out.
    next: u64,
    /// Durable bound; everything below it (and at or above `next`) is ours.
    upper_limit: u64,
    poisoned: Option<Poison>,
}

/// Timestamp allocator over a [`BoundStore`].
pub struct TimestampAllocator<B: BoundStore> {
    bound_store: B,
    config: AllocatorConfig,
    state: Mutex<AllocatorState>,
}

impl<B: BoundStore> TimestampAllocator<B> {
    pub fn new(bound_store: B, config: AllocatorConfig) -> Self {
        Self {
            bound_store,
            config,
            state: Mutex::new(AllocatorState::default()),
        }
    }

    /// Allocate `count` consecutive timestamps.
    pub async fn allocate(&self, count: u64) -> Result<TimestampRange, CoordinationError> {
        if count == 0 || count > MAX_TIMESTAMPS_PER_REQUEST {
            return Err(CoordinationError::InvalidRequest {
                reason: format!("timestamp count must be in 1..={MAX_TIMESTAMPS_PER_REQUEST}, got {count}"),
            });
        }

        let mut state = self.state.lock().await;
        self.ensure_ready(&mut state).await?;

        if !can_serve_from_reservation(state.next, state.upper_limit, count) {
            let target = compute_refill_target(state.next, count, self.config.overallocation_multiplier, self.config.min_buffer)
                .ok_or_else(|| CoordinationError::TimestampsExhausted {
                    key: "timestamp bound".to_string(),
                })?;
            self.persist_limit(&mut state, target).await?;
        }

        let lower = state.next;
        state.next = lower + count;
        debug_assert!(state.next <= state.upper_limit, "ALLOCATOR: handed out past the durable bound");
        Ok(TimestampRange::new(lower, state.next))
    }

    /// Move the allocator past `timestamp`, persisting the bound if needed.
    async fn fast_forward_to(&self, timestamp: u64) -> Result<(), CoordinationError> {
        if timestamp == FAST_FORWARD_SENTINEL {
            return Err(CoordinationError::InvalidRequest {
                reason: "no fast-forward timestamp supplied".to_string(),
            });
        }

        let mut state = self.state.lock().await;
        self.ensure_ready(&mut state).await?;

        let Some(next) = timestamp.checked_add(1) else {
            return Err(CoordinationError::TimestampsExhausted {
                key: "timestamp bound".to_string(),
            });
        };
        if next <= state.next {
            debug!(timestamp, next = state.next, "fast-forward target already passed");
            return Ok(());
        }

        if next > state.upper_limit {
            let target = compute_refill_target(next, 0, 0, self.config.min_buffer).unwrap_or(next);
            self.persist_limit(&mut state, target).await?;
        }
        info!(from = state.next, to = next, "fast-forwarded timestamp allocator");
        state.next = next;
        Ok(())
    }

    /// Durable bound as last seen by this allocator, if initialized.
    pub async fn upper_limit(&self) -> Option<u64> {
        let state = self.state.lock().await;
        state.initialized.then_some(state.upper_limit)
    }

    async fn ensure_ready(&self, state: &mut AllocatorState) -> Result<(), CoordinationError> {
        if let Some(poison) = &state.poisoned {
            return Err(CoordinationError::MultipleWriters {
                key: poison.key.clone(),
                expected: poison.expected,
                actual: poison.actual.clone(),
            });
        }
        if !state.initialized {
            let limit = self.bound_store.read().await?;
            state.next = limit;
            state.upper_limit = limit;
            state.initialized = true;
            info!(limit, "timestamp allocator initialized from durable bound");
        }
        Ok(())
    }

    async fn persist_limit(&self, state: &mut AllocatorState, target: u64) -> Result<(), CoordinationError> {
        match self.bound_store.advance(state.upper_limit, target).await {
            Ok(()) => {
                debug!(from = state.upper_limit, to = target, "reserved timestamp range");
                state.upper_limit = target;
                Ok(())
            }
            Err(CoordinationError::MultipleWriters { key, expected, actual }) => {
                error!(%key, "timestamp allocator poisoned by a concurrent writer");
                state.poisoned = Some(Poison {
                    key: key.clone(),
                    expected,
                    actual: actual.clone(),
                });
                Err(CoordinationError::MultipleWriters { key, expected, actual })
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl<B: BoundStore> TimestampService for TimestampAllocator<B> {
    async fn fresh_timestamp(&self) -> Result<u64, CoordinationError> {
        Ok(self.allocate(1).await?.lower())
    }

    async fn fresh_timestamps(&self, count: u64) -> Result<TimestampRange, CoordinationError> {
        self.allocate(count).await
    }

    async fn fast_forward(&self, timestamp: u64) -> Result<(), CoordinationError> {
        self.fast_forward_to(timestamp).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use timelock_constants::timestamp::INITIAL_BOUND;
    use timelock_kv_types::KeyValueStoreError;
    use timelock_testing::DeterministicKeyValueStore;

    use super::*;
    use crate::bound_store::BoundConfig;
    use crate::bound_store::TimestampBoundStore;
    use crate::pure::encode_bound;

    type KvBound = Arc<TimestampBoundStore<DeterministicKeyValueStore>>;

    fn allocator(kv: &Arc<DeterministicKeyValueStore>, config: AllocatorConfig) -> (TimestampAllocator<KvBound>, KvBound) {
        let bound = Arc::new(TimestampBoundStore::new(kv.clone(), &BoundConfig::default()));
        (TimestampAllocator::new(bound.clone(), config), bound)
    }

    fn small_config() -> AllocatorConfig {
        AllocatorConfig {
            overallocation_multiplier: 1,
            min_buffer: 0,
        }
    }

    #[tokio::test]
    async fn test_allocate_from_initial_bound() {
        let kv = DeterministicKeyValueStore::new();
        let (alloc, bound) = allocator(&kv, small_config());

        let range = alloc.allocate(5).await.unwrap();
        assert_eq!(range, TimestampRange::new(10_000, 10_005));
        assert!(bound.current_limit().await.unwrap() >= 10_005);
    }

    #[tokio::test]
    async fn test_ranges_are_disjoint_and_increasing() {
        let kv = DeterministicKeyValueStore::new();
        let (alloc, _) = allocator(&kv, AllocatorConfig {
            overallocation_multiplier: 2,
            min_buffer: 0,
        });

        let mut last_upper = 0;
        for count in [1, 3, 7, 2, 10, 1] {
            let range = alloc.allocate(count).await.unwrap();
            assert_eq!(range.len(), count);
            assert!(range.lower() >= last_upper);
            last_upper = range.upper();
            assert!(range.upper() <= alloc.upper_limit().await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_reservation_avoids_store_writes() {
        let kv = DeterministicKeyValueStore::new();
        let (alloc, _) = allocator(&kv, AllocatorConfig::default());

        alloc.fresh_timestamp().await.unwrap();
        let writes = kv.writes_applied();
        for _ in 0..100 {
            alloc.fresh_timestamp().await.unwrap();
        }
        assert_eq!(kv.writes_applied(), writes);
    }

    #[tokio::test]
    async fn test_rejects_invalid_counts() {
        let kv = DeterministicKeyValueStore::new();
        let (alloc, _) = allocator(&kv, small_config());
        assert!(matches!(alloc.allocate(0).await, Err(CoordinationError::InvalidRequest { .. })));
        assert!(matches!(
            alloc.allocate(MAX_TIMESTAMPS_PER_REQUEST + 1).await,
            Err(CoordinationError::InvalidRequest { .. })
        ));
        assert_eq!(kv.writes_applied(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_writer_poisons_allocator() {
        let kv = DeterministicKeyValueStore::new();
        let (alloc, bound) = allocator(&kv, small_config());
        alloc.allocate(5).await.unwrap();

        // Another process advances the durable bound behind our back
        kv.put(bound.key(), &encode_bound(50_000));

        let err = alloc.allocate(1).await.unwrap_err();
        assert!(err.is_multiple_writers());
        let writes = kv.writes_applied();

        let again = alloc.allocate(1).await.unwrap_err();
        assert!(again.is_multiple_writers());
        assert_eq!(kv.writes_applied(), writes);
    }

    #[tokio::test]
    async fn test_storage_failure_is_retryable() {
        let kv = DeterministicKeyValueStore::new();
        let (alloc, _) = allocator(&kv, small_config());
        alloc.allocate(1).await.unwrap();

        kv.fail_next_write(KeyValueStoreError::Unavailable { reason: "leader moved".into() });
        let err = alloc.allocate(1).await.unwrap_err();
        assert!(err.is_retryable());

        let range = alloc.allocate(1).await.unwrap();
        assert_eq!(range.lower(), INITIAL_BOUND + 1);
    }

    #[tokio::test]
    async fn test_fast_forward_moves_forward_only() {
        let kv = DeterministicKeyValueStore::new();
        let (alloc, bound) = allocator(&kv, small_config());

        alloc.fast_forward(1_000_000).await.unwrap();
        assert!(bound.current_limit().await.unwrap() > 1_000_000);
        assert_eq!(alloc.fresh_timestamp().await.unwrap(), 1_000_001);

        // Backward is a no-op
        alloc.fast_forward(20_000).await.unwrap();
        assert_eq!(alloc.fresh_timestamp().await.unwrap(), 1_000_002);
    }

    #[tokio::test]
    async fn test_fast_forward_sentinel_rejected() {
        let kv = DeterministicKeyValueStore::new();
        let (alloc, _) = allocator(&kv, small_config());
        let err = alloc.fast_forward(FAST_FORWARD_SENTINEL).await.unwrap_err();
        assert!(matches!(err, CoordinationError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn test_fast_forward_survives_restart() {
        let kv = DeterministicKeyValueStore::new();
        {
            let (alloc, _) = allocator(&kv, small_config());
            alloc.fast_forward(500_000).await.unwrap();
        }
        let (restarted, _) = allocator(&kv, small_config());
        assert!(restarted.fresh_timestamp().await.unwrap() > 500_000);
    }

    #[tokio::test]
    async fn test_ping() {
        let kv = DeterministicKeyValueStore::new();
        let (alloc, _) = allocator(&kv, small_config());
        assert_eq!(alloc.ping().await, "pong");
    }
}
