//! Scheduler outcome policy.
//!
//! Each iteration of the background scheduler ends in exactly one
//! [`Outcome`]. The outcome alone decides how long to sleep and how the
//! work-size multiplier moves, so the whole adaptive behaviour is the single
//! function [`plan_next_iteration`].

use serde::Deserialize;
use serde::Serialize;
use timelock_constants::scheduler::EXTENDED_BACKOFF_BASE_MS;
use timelock_constants::scheduler::EXTENDED_BACKOFF_FACTOR;
use timelock_constants::scheduler::WORK_MULTIPLIER_FLOOR_NUMERATOR;
use timelock_constants::scheduler::WORK_MULTIPLIER_GROWTH;

/// Result of one scheduler iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// A unit of work completed.
    Success,
    /// There was nothing to do.
    NothingToDo,
    /// The unit failed while its target still exists; shrink and retry.
    RetryWithSmallerBatch,
    /// The scheduler is disabled by settings.
    Disabled,
    /// Another process holds the scheduler lock.
    LockUnavailable,
    /// A dependency the work needs is not available.
    DependencyUnavailable,
    /// The target disappeared while work was in progress.
    TargetDroppedMidway,
    /// The failure could not be classified.
    Error,
}

/// Inputs to the policy that come from settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulePolicy {
    /// Pause after a successful iteration.
    pub pause_ms: u64,
    /// Units examined per iteration at multiplier 1.0.
    pub candidate_batch_size: u64,
}

/// What the scheduler does after an iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationPlan {
    /// How long to sleep before the next iteration.
    pub sleep_ms: u64,
    /// Work-size multiplier for the next iteration, in `(0, 1]`.
    pub work_multiplier: f64,
}

/// Backoff used whenever an iteration did not succeed: `K * (base + pause)`.
#[inline]
pub fn extended_backoff_ms(pause_ms: u64) -> u64 {
    EXTENDED_BACKOFF_FACTOR.saturating_mul(EXTENDED_BACKOFF_BASE_MS.saturating_add(pause_ms))
}

/// Smallest multiplier that still yields at least one unit of work.
#[inline]
fn multiplier_floor(candidate_batch_size: u64) -> f64 {
    (WORK_MULTIPLIER_FLOOR_NUMERATOR / candidate_batch_size.max(1) as f64).min(1.0)
}

/// Next work-size multiplier after `outcome`.
///
/// Success grows it by 1% up to 1.0. Retrying with a smaller batch halves it,
/// never below `1.5 / candidate_batch_size`. Every other outcome leaves it.
pub fn next_work_multiplier(outcome: Outcome, current: f64, candidate_batch_size: u64) -> f64 {
    match outcome {
        Outcome::Success => (current * WORK_MULTIPLIER_GROWTH).min(1.0),
        Outcome::RetryWithSmallerBatch => (current / 2.0).max(multiplier_floor(candidate_batch_size)),
        _ => current,
    }
}

/// Decide the sleep and multiplier following `outcome`.
pub fn plan_next_iteration(outcome: Outcome, current_multiplier: f64, policy: &SchedulePolicy) -> IterationPlan {
    let sleep_ms = match outcome {
        Outcome::Success => policy.pause_ms,
        _ => extended_backoff_ms(policy.pause_ms),
    };
    IterationPlan {
        sleep_ms,
        work_multiplier: next_work_multiplier(outcome, current_multiplier, policy.candidate_batch_size),
    }
}

/// Number of units to attempt this iteration; always at least one.
#[inline]
pub fn effective_batch_size(multiplier: f64, candidate_batch_size: u64) -> u64 {
    let scaled = (multiplier * candidate_batch_size as f64).floor();
    if scaled.is_finite() && scaled >= 1.0 {
        (scaled as u64).min(candidate_batch_size.max(1))
    } else {
        1
    }
}
