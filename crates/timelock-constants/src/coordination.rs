//! CAS retry bounds for KV-backed coordination primitives.

/// Maximum CAS attempts before a lock operation gives up on contention.
pub const MAX_CAS_RETRIES: u32 = 16;

/// Initial backoff between CAS retries.
pub const CAS_RETRY_INITIAL_BACKOFF_MS: u64 = 5;

/// Upper bound on the backoff between CAS retries.
pub const CAS_RETRY_MAX_BACKOFF_MS: u64 = 200;

/// Key prefix for lock records in the KV store.
pub const LOCK_KEY_PREFIX: &str = "__timelock/lock/";
