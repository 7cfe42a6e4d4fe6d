//! Retry/backoff scheduler policy.

/// Multiplier applied to `(base + pause)` when an iteration did not run.
pub const EXTENDED_BACKOFF_FACTOR: u64 = 20;

/// Base added to the pause before scaling the extended backoff.
pub const EXTENDED_BACKOFF_BASE_MS: u64 = 1_000;

/// Default steady-state pause between successful iterations.
pub const DEFAULT_PAUSE_MS: u64 = 5_000;

/// Default number of candidates examined per unit of work at multiplier 1.0.
pub const DEFAULT_CANDIDATE_BATCH_SIZE: u64 = 1_000;

/// Growth factor applied to the work-size multiplier after a success.
pub const WORK_MULTIPLIER_GROWTH: f64 = 1.01;

/// Numerator of the multiplier floor; `FLOOR / batch_size` keeps at least one unit.
pub const WORK_MULTIPLIER_FLOOR_NUMERATOR: f64 = 1.5;

/// Default name of the scheduler's mutual-exclusion lock.
pub const DEFAULT_SCHEDULER_LOCK_NAME: &str = "timelock/scheduler";
