//! Pure functions for the consistency core.
//!
//! "Functional core, imperative shell": every decision the async components
//! make about bounds, backoff, leases, and locks is computed here from
//! explicit inputs, so it can be unit and property tested without a runtime.
//!
//! # Module Organization
//!
//! - [`bound`]: Bound encoding and allocator refill arithmetic
//! - [`schedule`]: Scheduler outcome policy (sleep and work-size multiplier)
//! - [`lease`]: Client-side lease period and refresh decisions
//! - [`lock`]: Lock expiry, fencing tokens, CAS retry backoff
//!
//! # Tiger Style
//!
//! - All calculations use saturating or checked arithmetic
//! - Time is passed as an explicit parameter
//! - No panics - all functions are total

pub mod bound;
pub mod lease;
pub mod lock;
pub mod schedule;

pub use bound::ParseBoundResult;
pub use bound::can_serve_from_reservation;
pub use bound::compute_refill_target;
pub use bound::encode_bound;
pub use bound::is_valid_advance;
pub use bound::parse_bound;
pub use lease::compute_lease_period_ms;
pub use lease::should_refresh_lease;
pub use lock::BackoffResult;
pub use lock::compute_backoff_with_jitter;
pub use lock::compute_lock_deadline;
pub use lock::compute_next_fencing_token;
pub use lock::is_lock_expired;
pub use schedule::IterationPlan;
pub use schedule::Outcome;
pub use schedule::SchedulePolicy;
pub use schedule::effective_batch_size;
pub use schedule::extended_backoff_ms;
pub use schedule::next_work_multiplier;
pub use schedule::plan_next_iteration;
