//! Compile-time constant assertions.
//!
//! Each assertion pins a relationship between constants that must hold for
//! correct operation.

use super::coordination::*;
use super::leadership::*;
use super::lease::*;
use super::scheduler::*;
use super::timestamp::*;

// ============================================================================
// Timestamp Policy
// ============================================================================

const _: () = assert!(INITIAL_BOUND > 0);
const _: () = assert!(MAX_TIMESTAMPS_PER_REQUEST > 0);
const _: () = assert!(DEFAULT_OVERALLOCATION_MULTIPLIER >= 1);
// The sentinel must never be a reachable bound.
const _: () = assert!(FAST_FORWARD_SENTINEL > INITIAL_BOUND);

// ============================================================================
// Leadership
// ============================================================================

const _: () = assert!(GAIN_LEADERSHIP_BACKOFF_MS > 0);
const _: () = assert!(ELECTION_POLL_INTERVAL_MS < ELECTION_LOCK_TTL_MS);
const _: () = assert!(ELECTION_RENEWALS_PER_TTL >= 2);
const _: () = assert!(ELECTION_LOCK_TTL_MS / ELECTION_RENEWALS_PER_TTL > 0);

// ============================================================================
// Leases
// ============================================================================

// The local lease has to end before the server grant does.
const _: () = assert!(DEFAULT_LEASE_SAFETY_MARGIN_MS < DEFAULT_LOCK_TTL_MS);
const _: () = assert!(DEFAULT_REFRESH_THRESHOLD_MS < DEFAULT_LOCK_TTL_MS - DEFAULT_LEASE_SAFETY_MARGIN_MS);

// ============================================================================
// Scheduler
// ============================================================================

const _: () = assert!(EXTENDED_BACKOFF_FACTOR > 1);
const _: () = assert!(DEFAULT_CANDIDATE_BATCH_SIZE > 1);

// ============================================================================
// CAS Retry
// ============================================================================

const _: () = assert!(MAX_CAS_RETRIES > 0);
const _: () = assert!(CAS_RETRY_INITIAL_BACKOFF_MS < CAS_RETRY_MAX_BACKOFF_MS);
