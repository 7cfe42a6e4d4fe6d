//! Pure lock computation functions.
//!
//! # Tiger Style
//!
//! - Uses saturating arithmetic for all calculations
//! - Time is passed explicitly (no calls to system time)

use crate::types::LockEntry;

/// Compute the next fencing token based on current lock state.
///
/// When taking over an expired or released lock, the new token must be
/// strictly greater than the previous holder's. Always returns >= 1.
#[inline]
pub fn compute_next_fencing_token(current_entry: Option<&LockEntry>) -> u64 {
    match current_entry {
        Some(entry) => entry.fencing_token.saturating_add(1),
        None => 1,
    }
}

/// Compute lock deadline from acquisition time and TTL.
#[inline]
pub fn compute_lock_deadline(acquired_at_ms: u64, ttl_ms: u64) -> u64 {
    acquired_at_ms.saturating_add(ttl_ms)
}

/// A lock is expired once released (deadline 0) or past its deadline.
#[inline]
pub fn is_lock_expired(deadline_ms: u64, now_ms: u64) -> bool {
    deadline_ms == 0 || now_ms > deadline_ms
}

/// Result of a backoff computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffResult {
    /// How long to sleep now.
    pub sleep_ms: u64,
    /// Backoff to use on the following attempt.
    pub next_backoff_ms: u64,
}

/// Exponential backoff with bounded jitter for CAS contention.
///
/// Jitter is at most half the current backoff plus one; the next backoff
/// doubles, capped at `max_backoff_ms`.
pub fn compute_backoff_with_jitter(current_backoff_ms: u64, max_backoff_ms: u64, jitter_seed: u64) -> BackoffResult {
    let max_jitter = current_backoff_ms.saturating_div(2).saturating_add(1);
    let jitter = jitter_seed % max_jitter;

    BackoffResult {
        sleep_ms: current_backoff_ms.saturating_add(jitter),
        next_backoff_ms: current_backoff_ms.saturating_mul(2).min(max_backoff_ms),
    }
}
