//! Lock history checking.
//!
//! A history is a sequence of invoke/complete events recorded from several
//! client processes operating on named locks. A successful `refresh` or
//! `unlock` proves that its process held the lock continuously from the
//! moment its `lock` completed until the moment the refresh or unlock was
//! invoked. Two such proven intervals from different processes on the same
//! lock must not overlap.

use std::collections::HashMap;

/// Lock operation recorded in a history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockOp {
    Lock,
    Refresh,
    Unlock,
}

/// Kind of a history event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A process started `op` on `lock`.
    Invoke { op: LockOp, lock: String },
    /// The process's pending operation completed successfully.
    Ok,
    /// The process's pending operation was refused or failed.
    Fail,
}

/// One recorded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEvent {
    pub time: u64,
    pub process: u32,
    pub kind: EventKind,
}

/// Default lock name used by the convenience constructors.
const DEFAULT_LOCK: &str = "lock";

impl HistoryEvent {
    pub fn invoke(time: u64, process: u32, op: LockOp, lock: impl Into<String>) -> Self {
        Self {
            time,
            process,
            kind: EventKind::Invoke { op, lock: lock.into() },
        }
    }

    pub fn invoke_lock(time: u64, process: u32) -> Self {
        Self::invoke(time, process, LockOp::Lock, DEFAULT_LOCK)
    }

    pub fn invoke_refresh(time: u64, process: u32) -> Self {
        Self::invoke(time, process, LockOp::Refresh, DEFAULT_LOCK)
    }

    pub fn invoke_unlock(time: u64, process: u32) -> Self {
        Self::invoke(time, process, LockOp::Unlock, DEFAULT_LOCK)
    }

    pub fn ok(time: u64, process: u32) -> Self {
        Self {
            time,
            process,
            kind: EventKind::Ok,
        }
    }

    pub fn fail(time: u64, process: u32) -> Self {
        Self {
            time,
            process,
            kind: EventKind::Fail,
        }
    }
}

/// Outcome of checking a history.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CheckerResult {
    /// Offending (invoke, completion) event pairs, in history order.
    pub errors: Vec<HistoryEvent>,
}

impl CheckerResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

struct Pending {
    invoke: HistoryEvent,
    op: LockOp,
    lock: String,
}

#[derive(Debug, Clone, Copy)]
struct ProvenHold {
    process: u32,
    start: u64,
    end: u64,
}

impl ProvenHold {
    fn overlaps(&self, other: &ProvenHold) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Checks that successful refreshes and unlocks never prove overlapping holds.
#[derive(Default)]
pub struct RefreshCorrectnessChecker {
    pending: HashMap<u32, Pending>,
    /// Completion time of the last successful lock, per (lock, process).
    held_since: HashMap<(String, u32), u64>,
    proven: HashMap<String, Vec<ProvenHold>>,
    result: CheckerResult,
}

impl RefreshCorrectnessChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check a complete history.
    pub fn check(events: &[HistoryEvent]) -> CheckerResult {
        let mut checker = Self::new();
        for event in events {
            checker.observe(event);
        }
        checker.result
    }

    fn observe(&mut self, event: &HistoryEvent) {
        match &event.kind {
            EventKind::Invoke { op, lock } => {
                self.pending.insert(event.process, Pending {
                    invoke: event.clone(),
                    op: *op,
                    lock: lock.clone(),
                });
            }
            EventKind::Ok => {
                let Some(pending) = self.pending.remove(&event.process) else {
                    return;
                };
                self.on_success(pending, event);
            }
            EventKind::Fail => {
                if let Some(pending) = self.pending.remove(&event.process) {
                    self.held_since.remove(&(pending.lock, event.process));
                }
            }
        }
    }

    fn on_success(&mut self, pending: Pending, completion: &HistoryEvent) {
        let holder = (pending.lock.clone(), completion.process);
        match pending.op {
            LockOp::Lock => {
                self.held_since.insert(holder, completion.time);
            }
            LockOp::Refresh | LockOp::Unlock => {
                if let Some(&start) = self.held_since.get(&holder) {
                    let hold = ProvenHold {
                        process: completion.process,
                        start,
                        end: pending.invoke.time,
                    };
                    let holds = self.proven.entry(pending.lock.clone()).or_default();
                    let conflict = holds.iter().any(|other| other.process != hold.process && other.overlaps(&hold));
                    if conflict {
                        self.result.errors.push(pending.invoke.clone());
                        self.result.errors.push(completion.clone());
                    } else {
                        holds.push(hold);
                    }
                }
                if pending.op == LockOp::Unlock {
                    self.held_since.remove(&holder);
                }
            }
        }
    }
}
