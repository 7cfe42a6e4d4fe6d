//! Storage traits consumed by the timelock core.
//!
//! The core never talks to a concrete engine. It is written against
//! [`KeyValueStore`], which any engine offering point reads and a single-key
//! compare-and-swap can implement.

use async_trait::async_trait;
use timelock_kv_types::KeyValueStoreError;
use timelock_kv_types::ReadRequest;
use timelock_kv_types::ReadResult;
use timelock_kv_types::WriteRequest;
use timelock_kv_types::WriteResult;

/// Linearizable key-value store interface.
///
/// A failed `CompareAndSwap` must surface as
/// [`KeyValueStoreError::CompareAndSwapFailed`] carrying the actual value, so
/// callers can tell contention apart from transport failure.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Apply a write command.
    async fn write(&self, request: WriteRequest) -> Result<WriteResult, KeyValueStoreError>;

    /// Read a value by key. An absent key yields `ReadResult { kv: None }`.
    async fn read(&self, request: ReadRequest) -> Result<ReadResult, KeyValueStoreError>;
}

// Blanket implementation for Arc<T>
#[async_trait]
impl<T: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<T> {
    async fn write(&self, request: WriteRequest) -> Result<WriteResult, KeyValueStoreError> {
        (**self).write(request).await
    }

    async fn read(&self, request: ReadRequest) -> Result<ReadResult, KeyValueStoreError> {
        (**self).read(request).await
    }
}
