//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use timelock::CoordinationError;
use timelock::CoordinatorState;
use timelock::LeaderAddress;
use timelock::LeaderElector;
use timelock::LeadershipCoordinator;
use timelock::LeadershipToken;
use timelock::StillLeadingStatus;
use tokio::sync::Notify;
use tokio::time::Instant;

pub fn init_test_tracing() {
    timelock::init_tracing("timelock=debug,timelock_coordination=debug");
}

/// Wait until `coordinator` publishes `state`.
pub async fn wait_for_state<E: LeaderElector + ?Sized>(coordinator: &LeadershipCoordinator<E>, state: CoordinatorState) {
    let mut rx = coordinator.subscribe();
    tokio::time::timeout(Duration::from_secs(30), rx.wait_for(|s| *s == state))
        .await
        .expect("timed out waiting for coordinator state")
        .expect("coordinator state channel closed");
}

/// Elector that fails a fixed number of times before granting leadership.
pub struct FlakyElector {
    failures_left: AtomicU32,
    attempts: Mutex<Vec<Instant>>,
    current: Mutex<Option<LeadershipToken>>,
}

impl FlakyElector {
    pub fn new(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            failures_left: AtomicU32::new(failures),
            attempts: Mutex::new(Vec::new()),
            current: Mutex::new(None),
        })
    }

    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().clone()
    }
}

#[async_trait]
impl LeaderElector for FlakyElector {
    fn current_token_if_leading(&self) -> Option<LeadershipToken> {
        None
    }

    async fn block_on_becoming_leader(&self) -> Result<LeadershipToken, CoordinationError> {
        self.attempts.lock().push(Instant::now());
        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::SeqCst);
            return Err(CoordinationError::ElectorUnavailable {
                reason: format!("{remaining} failures left"),
            });
        }
        let token = LeadershipToken::mint();
        *self.current.lock() = Some(token.clone());
        Ok(token)
    }

    async fn is_still_leading(&self, token: &LeadershipToken) -> Result<StillLeadingStatus, CoordinationError> {
        if self.current.lock().as_ref() == Some(token) {
            Ok(StillLeadingStatus::Leading)
        } else {
            Ok(StillLeadingStatus::NotLeading)
        }
    }

    fn recently_pinged_leader_host(&self) -> Option<LeaderAddress> {
        None
    }
}

/// Elector whose acquisition completes only when the test opens the gate.
pub struct GatedElector {
    gate: Notify,
    entered: Notify,
}

impl GatedElector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            gate: Notify::new(),
            entered: Notify::new(),
        })
    }

    /// Wait until an acquisition is blocked on the gate.
    pub async fn wait_until_blocked(&self) {
        self.entered.notified().await;
    }

    pub fn open(&self) {
        self.gate.notify_waiters();
    }
}

#[async_trait]
impl LeaderElector for GatedElector {
    fn current_token_if_leading(&self) -> Option<LeadershipToken> {
        None
    }

    async fn block_on_becoming_leader(&self) -> Result<LeadershipToken, CoordinationError> {
        let opened = self.gate.notified();
        self.entered.notify_one();
        opened.await;
        Ok(LeadershipToken::mint())
    }

    async fn is_still_leading(&self, _token: &LeadershipToken) -> Result<StillLeadingStatus, CoordinationError> {
        Ok(StillLeadingStatus::Leading)
    }

    fn recently_pinged_leader_host(&self) -> Option<LeaderAddress> {
        None
    }
}
