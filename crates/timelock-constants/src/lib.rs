//! Centralized constants for the timelock consistency core.
//!
//! Constants are fixed and immutable, enforced at compile time. Each one has
//! explicit bounds so that no component can be configured into unbounded
//! resource use by accident.
//!
//! # Modules
//!
//! - [`timestamp`]: Bound store and allocator policy (initial bound, batch limits)
//! - [`leadership`]: Leadership coordinator backoff
//! - [`lease`]: Client-side lock lease margins
//! - [`scheduler`]: Retry/backoff scheduler policy
//! - [`coordination`]: CAS retry bounds shared by KV-backed primitives

mod assertions;
pub mod coordination;
pub mod leadership;
pub mod lease;
pub mod scheduler;
pub mod timestamp;

/// Prelude module for commonly used constants.
pub mod prelude {
    pub use crate::coordination::CAS_RETRY_INITIAL_BACKOFF_MS;
    pub use crate::coordination::CAS_RETRY_MAX_BACKOFF_MS;
    pub use crate::coordination::MAX_CAS_RETRIES;
    pub use crate::leadership::GAIN_LEADERSHIP_BACKOFF_MS;
    pub use crate::timestamp::INITIAL_BOUND;
    pub use crate::timestamp::MAX_TIMESTAMPS_PER_REQUEST;
}

pub use leadership::GAIN_LEADERSHIP_BACKOFF_MS;
pub use timestamp::INITIAL_BOUND;
