//! Server-side exclusive locks with TTL and fencing tokens.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use timelock_constants::coordination::CAS_RETRY_INITIAL_BACKOFF_MS;
use timelock_constants::coordination::CAS_RETRY_MAX_BACKOFF_MS;
use timelock_constants::coordination::LOCK_KEY_PREFIX;
use timelock_constants::coordination::MAX_CAS_RETRIES;
use timelock_kv_types::KeyValueStoreError;
use timelock_kv_types::ReadRequest;
use timelock_kv_types::WriteRequest;
use timelock_traits::KeyValueStore;
use tracing::debug;
use tracing::info;

use crate::error::CoordinationError;
use crate::pure::compute_backoff_with_jitter;
use crate::pure::compute_lock_deadline;
use crate::pure::compute_next_fencing_token;
use crate::pure::is_lock_expired;
use crate::types::FencingToken;
use crate::types::LockEntry;
use crate::types::LockToken;
use crate::types::now_unix_ms;

/// A granted lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockGrant {
    /// Lock name.
    pub name: String,
    /// Identifier of this grant.
    pub token: LockToken,
    pub holder_id: String,
    pub fencing_token: FencingToken,
    /// Server-side expiry (Unix ms).
    pub deadline_ms: u64,
    pub ttl_ms: u64,
}

/// Exclusive, expiring locks.
#[async_trait]
pub trait LockService: Send + Sync {
    /// Try to take `name` for `ttl_ms`. `None` if someone else holds it.
    async fn acquire(&self, name: &str, holder_id: &str, ttl_ms: u64) -> Result<Option<LockGrant>, CoordinationError>;

    /// Extend `grant` by its TTL. `None` if the grant has expired or been replaced.
    async fn refresh(&self, grant: &LockGrant) -> Result<Option<LockGrant>, CoordinationError>;

    /// Release `grant`. `false` if it was no longer held.
    async fn release(&self, grant: &LockGrant) -> Result<bool, CoordinationError>;

    /// Live record for `name`, if held.
    async fn current_holder(&self, name: &str) -> Result<Option<LockEntry>, CoordinationError>;
}

#[async_trait]
impl<T: LockService + ?Sized> LockService for Arc<T> {
    async fn acquire(&self, name: &str, holder_id: &str, ttl_ms: u64) -> Result<Option<LockGrant>, CoordinationError> {
        (**self).acquire(name, holder_id, ttl_ms).await
    }

    async fn refresh(&self, grant: &LockGrant) -> Result<Option<LockGrant>, CoordinationError> {
        (**self).refresh(grant).await
    }

    async fn release(&self, grant: &LockGrant) -> Result<bool, CoordinationError> {
        (**self).release(grant).await
    }

    async fn current_holder(&self, name: &str) -> Result<Option<LockEntry>, CoordinationError> {
        (**self).current_holder(name).await
    }
}

/// [`LockService`] over a linearizable key-value store.
///
/// Each lock is one JSON [`LockEntry`] updated by CAS. Released and expired
/// entries are kept so the next holder's fencing token continues from the
/// last one issued.
pub struct KvLockService<S: KeyValueStore + ?Sized> {
    store: Arc<S>,
}

enum CasAttempt<T> {
    Done(T),
    Conflict,
}

impl<S: KeyValueStore + ?Sized> KvLockService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    fn key(name: &str) -> String {
        format!("{LOCK_KEY_PREFIX}{name}")
    }

    async fn read_entry(&self, key: &str) -> Result<Option<(String, LockEntry)>, CoordinationError> {
        let result = match self.store.read(ReadRequest::new(key.to_string())).await {
            Ok(result) => result,
            Err(KeyValueStoreError::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(CoordinationError::Storage { source: e }),
        };
        let Some(raw) = result.value() else {
            return Ok(None);
        };
        let entry: LockEntry = serde_json::from_str(raw).map_err(|e| CoordinationError::CorruptedData {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some((raw.to_string(), entry)))
    }

    async fn cas(&self, key: &str, expected: Option<String>, entry: &LockEntry) -> Result<bool, CoordinationError> {
        let new_value = serde_json::to_string(entry)?;
        match self.store.write(WriteRequest::compare_and_swap(key.to_string(), expected, new_value)).await {
            Ok(_) => Ok(true),
            Err(KeyValueStoreError::CompareAndSwapFailed { .. }) => Ok(false),
            Err(e) => Err(CoordinationError::Storage { source: e }),
        }
    }

    /// Run `attempt` until it stops conflicting, with jittered backoff.
    async fn with_cas_retries<T, F, Fut>(&self, operation: &str, mut attempt: F) -> Result<T, CoordinationError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<CasAttempt<T>, CoordinationError>>,
    {
        let mut backoff_ms = CAS_RETRY_INITIAL_BACKOFF_MS;
        for tries in 1..=MAX_CAS_RETRIES {
            match attempt().await? {
                CasAttempt::Done(value) => return Ok(value),
                CasAttempt::Conflict => {
                    let backoff = compute_backoff_with_jitter(backoff_ms, CAS_RETRY_MAX_BACKOFF_MS, now_unix_ms());
                    debug!(operation, tries, sleep_ms = backoff.sleep_ms, "lock CAS conflict; retrying");
                    tokio::time::sleep(Duration::from_millis(backoff.sleep_ms)).await;
                    backoff_ms = backoff.next_backoff_ms;
                }
            }
        }
        Err(CoordinationError::MaxRetriesExceeded {
            operation: operation.to_string(),
            attempts: MAX_CAS_RETRIES,
        })
    }
}

fn grant_from_entry(name: &str, entry: &LockEntry) -> LockGrant {
    LockGrant {
        name: name.to_string(),
        token: entry.lock_id,
        holder_id: entry.holder_id.clone(),
        fencing_token: FencingToken::new(entry.fencing_token),
        deadline_ms: entry.deadline_ms,
        ttl_ms: entry.ttl_ms,
    }
}

#[async_trait]
impl<S: KeyValueStore + ?Sized + 'static> LockService for KvLockService<S> {
    async fn acquire(&self, name: &str, holder_id: &str, ttl_ms: u64) -> Result<Option<LockGrant>, CoordinationError> {
        if ttl_ms == 0 {
            return Err(CoordinationError::InvalidRequest {
                reason: "lock ttl must be positive".to_string(),
            });
        }
        let key_buf = Self::key(name);
        let key = key_buf.as_str();

        self.with_cas_retries("lock acquire", move || async move {
            let current = self.read_entry(key).await?;
            let now = now_unix_ms();
            if let Some((_, entry)) = &current {
                if !is_lock_expired(entry.deadline_ms, now) {
                    debug!(lock = name, holder = %entry.holder_id, "lock held by another holder");
                    return Ok(CasAttempt::Done(None));
                }
            }

            let entry = LockEntry {
                holder_id: holder_id.to_string(),
                lock_id: LockToken::random(),
                fencing_token: compute_next_fencing_token(current.as_ref().map(|(_, e)| e)),
                acquired_at_ms: now,
                ttl_ms,
                deadline_ms: compute_lock_deadline(now, ttl_ms),
            };
            if self.cas(key, current.map(|(raw, _)| raw), &entry).await? {
                info!(lock = name, holder = holder_id, fencing_token = entry.fencing_token, "lock acquired");
                Ok(CasAttempt::Done(Some(grant_from_entry(name, &entry))))
            } else {
                Ok(CasAttempt::Conflict)
            }
        })
        .await
    }

    async fn refresh(&self, grant: &LockGrant) -> Result<Option<LockGrant>, CoordinationError> {
        let key_buf = Self::key(&grant.name);
        let key = key_buf.as_str();

        self.with_cas_retries("lock refresh", move || async move {
            let Some((raw, entry)) = self.read_entry(key).await? else {
                return Ok(CasAttempt::Done(None));
            };
            let now = now_unix_ms();
            if entry.lock_id != grant.token || is_lock_expired(entry.deadline_ms, now) {
                debug!(lock = %grant.name, token = %grant.token, "refresh refused; grant expired or replaced");
                return Ok(CasAttempt::Done(None));
            }

            let renewed = LockEntry {
                deadline_ms: compute_lock_deadline(now, entry.ttl_ms),
                ..entry
            };
            if self.cas(key, Some(raw), &renewed).await? {
                Ok(CasAttempt::Done(Some(grant_from_entry(&grant.name, &renewed))))
            } else {
                Ok(CasAttempt::Conflict)
            }
        })
        .await
    }

    async fn release(&self, grant: &LockGrant) -> Result<bool, CoordinationError> {
        let key_buf = Self::key(&grant.name);
        let key = key_buf.as_str();

        self.with_cas_retries("lock release", move || async move {
            let Some((raw, entry)) = self.read_entry(key).await? else {
                return Ok(CasAttempt::Done(false));
            };
            if entry.lock_id != grant.token || entry.deadline_ms == 0 {
                return Ok(CasAttempt::Done(false));
            }
            if self.cas(key, Some(raw), &entry.released()).await? {
                info!(lock = %grant.name, fencing_token = entry.fencing_token, "lock released");
                Ok(CasAttempt::Done(true))
            } else {
                Ok(CasAttempt::Conflict)
            }
        })
        .await
    }

    async fn current_holder(&self, name: &str) -> Result<Option<LockEntry>, CoordinationError> {
        let entry = self.read_entry(&Self::key(name)).await?;
        Ok(entry.map(|(_, e)| e).filter(|e| !is_lock_expired(e.deadline_ms, now_unix_ms())))
    }
}

#[cfg(test)]
mod tests {
    use timelock_testing::DeterministicKeyValueStore;

    use super::*;

    fn service() -> (KvLockService<DeterministicKeyValueStore>, Arc<DeterministicKeyValueStore>) {
        let kv = DeterministicKeyValueStore::new();
        (KvLockService::new(kv.clone()), kv)
    }

    #[tokio::test]
    async fn test_acquire_is_exclusive() {
        let (locks, _) = service();
        let grant = locks.acquire("sweep", "a", 30_000).await.unwrap().unwrap();
        assert_eq!(grant.fencing_token, FencingToken::new(1));
        assert!(locks.acquire("sweep", "b", 30_000).await.unwrap().is_none());

        let holder = locks.current_holder("sweep").await.unwrap().unwrap();
        assert_eq!(holder.holder_id, "a");
        assert_eq!(holder.lock_id, grant.token);
    }

    #[tokio::test]
    async fn test_release_then_reacquire_increments_fencing_token() {
        let (locks, _) = service();
        let first = locks.acquire("sweep", "a", 30_000).await.unwrap().unwrap();
        assert!(locks.release(&first).await.unwrap());
        assert!(!locks.release(&first).await.unwrap());
        assert!(locks.current_holder("sweep").await.unwrap().is_none());

        let second = locks.acquire("sweep", "b", 30_000).await.unwrap().unwrap();
        assert!(second.fencing_token > first.fencing_token);
        assert_ne!(second.token, first.token);
    }

    #[tokio::test]
    async fn test_expired_lock_can_be_taken_over() {
        let (locks, kv) = service();
        let first = locks.acquire("sweep", "a", 30_000).await.unwrap().unwrap();

        // Age the stored entry past its deadline
        let key = KvLockService::<DeterministicKeyValueStore>::key("sweep");
        let mut entry: LockEntry = serde_json::from_str(&kv.get(&key).unwrap()).unwrap();
        entry.deadline_ms = 1;
        kv.put(&key, &serde_json::to_string(&entry).unwrap());

        let second = locks.acquire("sweep", "b", 30_000).await.unwrap().unwrap();
        assert_eq!(second.fencing_token, FencingToken::new(2));
        assert!(locks.refresh(&first).await.unwrap().is_none());
        assert!(!locks.release(&first).await.unwrap());
    }

    #[tokio::test]
    async fn test_refresh_extends_deadline() {
        let (locks, _) = service();
        let grant = locks.acquire("sweep", "a", 30_000).await.unwrap().unwrap();
        let refreshed = locks.refresh(&grant).await.unwrap().unwrap();
        assert_eq!(refreshed.token, grant.token);
        assert_eq!(refreshed.fencing_token, grant.fencing_token);
        assert!(refreshed.deadline_ms >= grant.deadline_ms);
    }

    #[tokio::test]
    async fn test_corrupted_entry_is_reported() {
        let (locks, kv) = service();
        kv.put(&KvLockService::<DeterministicKeyValueStore>::key("sweep"), "{not json");
        assert!(matches!(
            locks.acquire("sweep", "a", 1_000).await,
            Err(CoordinationError::CorruptedData { .. })
        ));
    }

    #[tokio::test]
    async fn test_storage_failure_propagates() {
        let (locks, kv) = service();
        kv.fail_next_read(KeyValueStoreError::Unavailable { reason: "down".into() });
        assert!(matches!(locks.acquire("sweep", "a", 1_000).await, Err(CoordinationError::Storage { .. })));
    }

    #[tokio::test]
    async fn test_zero_ttl_rejected() {
        let (locks, _) = service();
        assert!(matches!(locks.acquire("sweep", "a", 0).await, Err(CoordinationError::InvalidRequest { .. })));
    }
}
