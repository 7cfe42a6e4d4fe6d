//! Leadership coordinator timing.

/// Pause between failed attempts to become leader.
pub const GAIN_LEADERSHIP_BACKOFF_MS: u64 = 500;

/// Default poll interval of the lock-backed elector while waiting to win.
pub const ELECTION_POLL_INTERVAL_MS: u64 = 250;

/// Default TTL of the election lock grant.
pub const ELECTION_LOCK_TTL_MS: u64 = 10_000;

/// The leader renews its election lock this many times per TTL.
pub const ELECTION_RENEWALS_PER_TTL: u64 = 3;
