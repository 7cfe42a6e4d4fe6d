//! Single-writer consistency primitives built on CAS operations.
//!
//! - [`TimestampBoundStore`] - durable upper bound on issued timestamps, advanced only by CAS
//! - [`TimestampAllocator`] - strictly increasing timestamps served from a reserved range
//! - [`LeadershipCoordinator`] - at most one local leadership token over a [`LeaderElector`]
//! - [`LeaderGatedTimestampService`] - timestamps served only while leading
//! - [`KvLockService`] / [`LeasedLockClient`] - expiring locks with fencing tokens and client leases
//! - [`LockLeaderElector`] - leader election on top of a lock service
//! - [`BackgroundScheduler`] - outcome-driven retry/backoff loop for background work
//!
//! All storage access goes through the [`timelock_traits::KeyValueStore`] trait's
//! compare-and-swap, so two processes advancing the same bound cannot both win.
//! A lost race surfaces as [`CoordinationError::MultipleWriters`].
//!
//! ## Serving timestamps
//!
//! ```ignore
//! use timelock_coordination::{AllocatorConfig, BoundConfig, TimestampAllocator, TimestampBoundStore};
//!
//! let bound = TimestampBoundStore::new(store, &BoundConfig::default());
//! let allocator = TimestampAllocator::new(bound, AllocatorConfig::default());
//!
//! let range = allocator.fresh_timestamps(5).await?;
//! assert_eq!(range.len(), 5);
//! ```

mod allocator;
mod bound_store;
mod config;
mod coordinator;
mod elector;
mod error;
mod leader_gated;
mod lease;
mod lock_elector;
mod lock_service;
pub mod pure;
mod scheduler;
mod types;

pub use allocator::AllocatorConfig;
pub use allocator::TimestampAllocator;
pub use allocator::TimestampService;
pub use bound_store::BoundConfig;
pub use bound_store::BoundStore;
pub use bound_store::TimestampBoundStore;
pub use config::TimelockConfig;
pub use coordinator::CoordinatorConfig;
pub use coordinator::CoordinatorState;
pub use coordinator::LeadershipCoordinator;
pub use elector::LeaderElector;
pub use elector::LeadershipToken;
pub use elector::StillLeadingStatus;
pub use error::ConfigError;
pub use error::CoordinationError;
pub use error::TaskError;
pub use leader_gated::DelegateFactory;
pub use leader_gated::LeaderGatedTimestampService;
pub use lease::LeaseConfig;
pub use lease::LeasedLockClient;
pub use lease::LeasedLockToken;
pub use lock_elector::ElectorConfig;
pub use lock_elector::LockLeaderElector;
pub use lock_service::KvLockService;
pub use lock_service::LockGrant;
pub use lock_service::LockService;
pub use pure::Outcome;
pub use scheduler::BackgroundScheduler;
pub use scheduler::ScheduledTask;
pub use scheduler::SchedulerConfig;
pub use scheduler::SchedulerHandle;
pub use scheduler::SchedulerSettings;
pub use scheduler::SchedulerStats;
pub use scheduler::WorkStatus;
pub use types::FencingToken;
pub use types::LeaderAddress;
pub use types::LockEntry;
pub use types::LockToken;
pub use types::TimestampRange;
pub use types::now_unix_ms;
