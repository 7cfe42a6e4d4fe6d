//! Client-side lease arithmetic.

/// Length of the local lease for a server grant of `ttl_ms`.
///
/// The lease ends `safety_margin_ms` before the server expiry so that clock
/// drift and request latency can only make the client believe a lock expired
/// early, never late. Zero when the margin swallows the whole TTL.
#[inline]
pub fn compute_lease_period_ms(ttl_ms: u64, safety_margin_ms: u64) -> u64 {
    ttl_ms.saturating_sub(safety_margin_ms)
}

/// Whether a lease with `remaining_ms` left should be renewed against the server.
#[inline]
pub fn should_refresh_lease(remaining_ms: u64, refresh_threshold_ms: u64) -> bool {
    remaining_ms <= refresh_threshold_ms
}
