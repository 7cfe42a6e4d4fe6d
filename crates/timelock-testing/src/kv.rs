//! Deterministic in-memory key-value store.

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use timelock_kv_types::KeyValueStoreError;
use timelock_kv_types::KeyValueWithRevision;
use timelock_kv_types::ReadRequest;
use timelock_kv_types::ReadResult;
use timelock_kv_types::WriteCommand;
use timelock_kv_types::WriteRequest;
use timelock_kv_types::WriteResult;
use timelock_traits::KeyValueStore;
use tracing::debug;

#[derive(Clone)]
struct VersionedValue {
    value: String,
    create_revision: u64,
    mod_revision: u64,
    version: u64,
}

#[derive(Default)]
struct Inner {
    data: BTreeMap<String, VersionedValue>,
    revision: u64,
    write_failures: VecDeque<KeyValueStoreError>,
    read_failures: VecDeque<KeyValueStoreError>,
    writes_applied: u64,
}

/// A deterministic in-memory key-value store for testing.
///
/// All operations on one instance are linearized by a single mutex, which
/// makes it a faithful stand-in for an engine with a linearizable CAS.
/// Failures can be queued with [`fail_next_write`](Self::fail_next_write)
/// and [`fail_next_read`](Self::fail_next_read); each queued error is
/// consumed by exactly one subsequent call.
#[derive(Default)]
pub struct DeterministicKeyValueStore {
    inner: Mutex<Inner>,
}

impl DeterministicKeyValueStore {
    /// Create a new deterministic store wrapped in Arc.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the next write fail with `error` without touching state.
    pub fn fail_next_write(&self, error: KeyValueStoreError) {
        self.inner.lock().write_failures.push_back(error);
    }

    /// Make the next read fail with `error`.
    pub fn fail_next_read(&self, error: KeyValueStoreError) {
        self.inner.lock().read_failures.push_back(error);
    }

    /// Current raw value of `key`, bypassing fault injection.
    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.lock().data.get(key).map(|v| v.value.clone())
    }

    /// Overwrite `key` directly, simulating a foreign writer.
    pub fn put(&self, key: &str, value: &str) {
        let mut inner = self.inner.lock();
        inner.revision += 1;
        let revision = inner.revision;
        upsert(&mut inner.data, key, value, revision);
    }

    /// Number of writes that changed state.
    pub fn writes_applied(&self) -> u64 {
        self.inner.lock().writes_applied
    }
}

fn upsert(data: &mut BTreeMap<String, VersionedValue>, key: &str, value: &str, revision: u64) {
    match data.get_mut(key) {
        Some(existing) => {
            existing.value = value.to_string();
            existing.mod_revision = revision;
            existing.version += 1;
        }
        None => {
            data.insert(key.to_string(), VersionedValue {
                value: value.to_string(),
                create_revision: revision,
                mod_revision: revision,
                version: 1,
            });
        }
    }
}

#[async_trait]
impl KeyValueStore for DeterministicKeyValueStore {
    async fn read(&self, request: ReadRequest) -> Result<ReadResult, KeyValueStoreError> {
        let mut inner = self.inner.lock();
        if let Some(error) = inner.read_failures.pop_front() {
            debug!(key = %request.key, %error, "injected read failure");
            return Err(error);
        }
        let kv = inner.data.get(&request.key).map(|v| KeyValueWithRevision {
            key: request.key.clone(),
            value: v.value.clone(),
            create_revision: v.create_revision,
            mod_revision: v.mod_revision,
            version: v.version,
        });
        Ok(ReadResult { kv })
    }

    async fn write(&self, request: WriteRequest) -> Result<WriteResult, KeyValueStoreError> {
        let mut inner = self.inner.lock();
        if let Some(error) = inner.write_failures.pop_front() {
            debug!(key = %request.command.key(), %error, "injected write failure");
            return Err(error);
        }
        if request.command.key().is_empty() {
            return Err(KeyValueStoreError::EmptyKey);
        }

        let revision = inner.revision + 1;
        let succeeded = match &request.command {
            WriteCommand::CompareAndSwap {
                key,
                expected,
                new_value,
            } => {
                let current = inner.data.get(key).map(|v| v.value.clone());
                if current.as_ref() != expected.as_ref() {
                    return Err(KeyValueStoreError::CompareAndSwapFailed {
                        key: key.clone(),
                        expected: expected.clone(),
                        actual: current,
                    });
                }
                upsert(&mut inner.data, key, new_value, revision);
                true
            }
        };

        if succeeded {
            inner.revision = revision;
            inner.writes_applied += 1;
        }
        Ok(WriteResult {
            header_revision: Some(inner.revision),
            succeeded: Some(succeeded),
        })
    }
}
