//! Testing infrastructure for the timelock core.
//!
//! - [`DeterministicKeyValueStore`]: in-memory linearizable KV store with
//!   injectable failures, standing in for the real storage engine.
//! - [`RefreshCorrectnessChecker`]: validates recorded lock histories, flagging
//!   any two processes that provably held the same lock at overlapping times.

mod history;
mod kv;

pub use history::CheckerResult;
pub use history::EventKind;
pub use history::HistoryEvent;
pub use history::LockOp;
pub use history::RefreshCorrectnessChecker;
pub use kv::DeterministicKeyValueStore;
