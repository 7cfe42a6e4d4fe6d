//! Timelock: a single-writer consistency core.
//!
//! Timestamps are issued by exactly one leader at a time and never repeat,
//! even across restarts and leadership changes. The durable upper bound is
//! advanced only by compare-and-swap, so a second writer is detected rather
//! than tolerated.
//!
//! The building blocks live in the member crates and are re-exported here:
//!
//! - [`timelock_coordination`] - bound store, allocator, leadership, locks, scheduler
//! - [`timelock_kv_types`] - KV request/response types and [`KeyValueStoreError`]
//! - [`timelock_traits`] - the [`KeyValueStore`] trait
//! - [`timelock_constants`] - compile-time limits and defaults
//!
//! [`TimelockNode`] wires them together for an embedded deployment.

mod node;
mod telemetry;

pub use node::TimelockNode;
pub use telemetry::init_tracing;
pub use timelock_constants as constants;
pub use timelock_coordination::*;
pub use timelock_kv_types::KeyValueStoreError;
pub use timelock_traits::KeyValueStore;
