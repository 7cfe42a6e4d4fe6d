//! Client-side lock lease policy.

/// Default safety margin subtracted from the server TTL to form the local lease.
///
/// The local lease must end strictly before the server-side expiry.
pub const DEFAULT_LEASE_SAFETY_MARGIN_MS: u64 = 1_000;

/// Default server TTL requested for lock grants.
pub const DEFAULT_LOCK_TTL_MS: u64 = 30_000;

/// Refresh a lease against the server once less than this much of it remains.
pub const DEFAULT_REFRESH_THRESHOLD_MS: u64 = 5_000;
