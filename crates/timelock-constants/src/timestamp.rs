//! Timestamp bound and allocation policy.

/// Bound written when a namespace has never allocated a timestamp.
///
/// Creating the record uses the same CAS path as every other update, with
/// "absent" as the expected previous value.
pub const INITIAL_BOUND: u64 = 10_000;

/// Maximum number of timestamps a single request may ask for.
pub const MAX_TIMESTAMPS_PER_REQUEST: u64 = 10_000;

/// Default factor by which a refill over-reserves beyond the requested count.
pub const DEFAULT_OVERALLOCATION_MULTIPLIER: u64 = 1_000;

/// Default minimum headroom kept above the last handed-out timestamp on refill.
pub const DEFAULT_MIN_BUFFER: u64 = 1_000_000;

/// Key prefix for bound records in the KV store.
pub const BOUND_KEY_PREFIX: &str = "__timelock/bound/";

/// Sentinel meaning "no fast-forward target supplied".
pub const FAST_FORWARD_SENTINEL: u64 = i64::MIN as u64;
