//! Local leadership lifecycle over a [`LeaderElector`].
//!
//! The coordinator keeps at most one current [`LeadershipToken`]. While it has
//! none it runs a single background task that blocks on the elector, backing
//! off after each failure, until it wins or the coordinator is closed. Callers
//! never block on acquisition: they ask for the current token and get either
//! the token or a redirection error naming the last known leader.
//!
//! # State machine
//!
//! ```text
//! NotLeading -> AcquiringLeadership -> Leading
//!                      ^                  |
//!                      +---- loss --------+
//! any state -> Closed (terminal)
//! ```
//!
//! # Token slot
//!
//! The slot only moves forward: a token is cleared by a compare-and-clear
//! against that exact token, and a new token is only installed into an empty
//! slot. A stale loss notification for an older token is therefore a no-op.
//!
//! # Renewal
//!
//! Electors whose leadership lapses unless confirmed (a lock with a TTL)
//! report a [`renewal_interval`](LeaderElector::renewal_interval). For each
//! installed token the coordinator then runs a renewal task that re-checks the
//! elector at that interval and drops the token as soon as the elector says
//! it no longer leads. The task ends with the token's term or on close.

use std::fmt::Display;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use serde::Serialize;
use timelock_constants::leadership::GAIN_LEADERSHIP_BACKOFF_MS;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::elector::LeaderElector;
use crate::elector::LeadershipToken;
use crate::elector::StillLeadingStatus;
use crate::error::CoordinationError;

/// Coordinator tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Pause after a failed attempt to become leader.
    #[serde(default = "default_gain_leadership_backoff_ms")]
    pub gain_leadership_backoff_ms: u64,
}

fn default_gain_leadership_backoff_ms() -> u64 {
    GAIN_LEADERSHIP_BACKOFF_MS
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            gain_leadership_backoff_ms: default_gain_leadership_backoff_ms(),
        }
    }
}

/// Observable coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// No token and no acquisition running.
    NotLeading,
    /// The background task is waiting on the elector.
    AcquiringLeadership,
    /// A token is installed.
    Leading,
    /// Closed; never leads again.
    Closed,
}

impl CoordinatorState {
    pub fn is_leading(&self) -> bool {
        matches!(self, CoordinatorState::Leading)
    }
}

#[derive(Default)]
struct TokenSlot {
    token: Option<LeadershipToken>,
    /// An acquisition task is running.
    acquiring: bool,
    /// Stops the renewal task of the installed token.
    renewal: Option<CancellationToken>,
    /// Last token reported lost; never reinstalled from the fast path.
    lost: Option<LeadershipToken>,
}

/// Leadership coordinator.
///
/// Must be started from within a Tokio runtime. Call [`close`](Self::close)
/// to stop the background acquisition task.
pub struct LeadershipCoordinator<E: LeaderElector + ?Sized> {
    elector: Arc<E>,
    config: CoordinatorConfig,
    slot: Mutex<TokenSlot>,
    closed: AtomicBool,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    renewal_task: Mutex<Option<JoinHandle<()>>>,
    state_tx: watch::Sender<CoordinatorState>,
}

impl<E: LeaderElector + ?Sized> LeadershipCoordinator<E> {
    /// Build a coordinator without starting acquisition.
    pub fn new(elector: Arc<E>, config: CoordinatorConfig) -> Arc<Self> {
        let (state_tx, _) = watch::channel(CoordinatorState::NotLeading);
        Arc::new(Self {
            elector,
            config,
            slot: Mutex::new(TokenSlot::default()),
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
            renewal_task: Mutex::new(None),
            state_tx,
        })
    }

    /// Build a coordinator and start acquiring leadership in the background.
    pub fn create(elector: Arc<E>, config: CoordinatorConfig) -> Arc<Self> {
        let coordinator = Self::new(elector, config);
        coordinator.start();
        coordinator
    }

    /// Begin acquiring leadership. Returns immediately.
    pub fn start(self: &Arc<Self>) {
        self.try_to_gain_leadership();
    }

    /// The current token, or a redirection error.
    pub fn current_leadership_token(&self) -> Result<LeadershipToken, CoordinationError> {
        if self.is_closed() {
            return Err(CoordinationError::Closed);
        }
        if let Some(token) = self.current_token() {
            return Ok(token);
        }

        let leader = self.elector.recently_pinged_leader_host();
        if leader.is_some() {
            // Acquisition may have completed since the first look.
            if let Some(token) = self.current_token() {
                return Ok(token);
            }
            return Err(CoordinationError::NotCurrentLeader {
                message: "method invoked on a non-leader (leadership lost)".to_string(),
                leader,
            });
        }
        Err(CoordinationError::NotCurrentLeader {
            message: "method invoked on a non-leader".to_string(),
            leader: None,
        })
    }

    /// Installed token, if any.
    pub fn current_token(&self) -> Option<LeadershipToken> {
        self.slot.lock().token.clone()
    }

    /// Whether `token` is the installed token.
    pub fn is_current_token(&self, token: &LeadershipToken) -> bool {
        self.slot.lock().token.as_ref() == Some(token)
    }

    /// Report that `token` no longer represents leadership.
    ///
    /// Clears the slot only if it still holds exactly `token`, then starts
    /// reacquiring. Notifications about any other token are ignored.
    pub fn mark_as_not_leading(self: &Arc<Self>, token: &LeadershipToken, cause: impl Display) {
        let cleared = {
            let mut slot = self.slot.lock();
            if slot.token.as_ref() == Some(token) {
                slot.token = None;
                slot.lost = Some(token.clone());
                if let Some(renewal) = slot.renewal.take() {
                    renewal.cancel();
                }
                true
            } else {
                false
            }
        };
        if !cleared {
            debug!(%token, "ignoring loss notification for a token that is not current");
            return;
        }

        warn!(%token, %cause, "lost leadership");
        self.publish(CoordinatorState::NotLeading);
        self.try_to_gain_leadership();
    }

    /// Ask the elector whether `token` still leads.
    ///
    /// A `NotLeading` answer is applied immediately via
    /// [`mark_as_not_leading`](Self::mark_as_not_leading).
    pub async fn is_still_leading(self: &Arc<Self>, token: &LeadershipToken) -> Result<StillLeadingStatus, CoordinationError> {
        if !self.is_current_token(token) {
            return Ok(StillLeadingStatus::NotLeading);
        }
        let status = self.elector.is_still_leading(token).await?;
        if status == StillLeadingStatus::NotLeading {
            self.mark_as_not_leading(token, "elector reports leadership has ended");
        }
        Ok(status)
    }

    /// Redirection error carrying the last pinged leader.
    pub fn not_current_leader_error(&self, message: impl Into<String>) -> CoordinationError {
        CoordinationError::NotCurrentLeader {
            message: message.into(),
            leader: self.elector.recently_pinged_leader_host(),
        }
    }

    pub fn state(&self) -> CoordinatorState {
        *self.state_tx.borrow()
    }

    /// Subscribe to state transitions.
    pub fn subscribe(&self) -> watch::Receiver<CoordinatorState> {
        self.state_tx.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close without waiting for the background task.
    ///
    /// One-way and idempotent. Interrupts any in-flight wait on the elector
    /// and clears the token; a token acquired concurrently is discarded.
    pub fn request_close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        let previous = {
            let mut slot = self.slot.lock();
            slot.renewal = None;
            slot.token.take()
        };
        self.publish(CoordinatorState::Closed);
        info!(had_token = previous.is_some(), "leadership coordinator closed");
    }

    /// Close and wait for the background tasks to exit.
    pub async fn close(&self) {
        self.request_close();
        let task = self.task.lock().take();
        if let Some(task) = task {
            match task.await {
                Ok(()) => {}
                Err(e) if e.is_panic() => error!(error = %e, "leadership acquisition task panicked"),
                Err(_) => {}
            }
        }
        let renewal = self.renewal_task.lock().take();
        if let Some(renewal) = renewal {
            match renewal.await {
                Ok(()) => {}
                Err(e) if e.is_panic() => error!(error = %e, "leadership renewal task panicked"),
                Err(_) => {}
            }
        }
    }

    fn try_to_gain_leadership(self: &Arc<Self>) {
        if self.is_closed() {
            debug!("coordinator closed; not acquiring leadership");
            return;
        }
        if let Some(token) = self.elector.current_token_if_leading() {
            let mut slot = self.slot.lock();
            if slot.lost.as_ref() == Some(&token) {
                debug!(%token, "elector still reports a lost token; waiting for a new term");
            } else {
                if !self.is_closed() && slot.token.is_none() {
                    info!(%token, "already leading; installed token without waiting");
                    self.install(&mut slot, token);
                }
                return;
            }
        }
        self.spawn_acquisition();
    }

    fn spawn_acquisition(self: &Arc<Self>) {
        let mut slot = self.slot.lock();
        if self.is_closed() {
            debug!("coordinator closed; acquisition not submitted");
            return;
        }
        if slot.acquiring || slot.token.is_some() {
            return;
        }
        slot.acquiring = true;
        self.publish(CoordinatorState::AcquiringLeadership);

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.gain_leadership_with_retry().await });
        // Any previous handle belongs to a task that has already finished.
        *self.task.lock() = Some(handle);
    }

    async fn gain_leadership_with_retry(self: &Arc<Self>) {
        let backoff = Duration::from_millis(self.config.gain_leadership_backoff_ms);
        let mut attempt: u32 = 0;

        loop {
            attempt = attempt.saturating_add(1);
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                result = self.elector.block_on_becoming_leader() => result,
            };

            match result {
                Ok(token) => {
                    self.on_acquired(token, attempt);
                    return;
                }
                Err(e) => {
                    warn!(attempt, error = %e, backoff_ms = self.config.gain_leadership_backoff_ms, "failed to become leader; retrying");
                }
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(backoff) => {}
            }
        }

        debug!(attempt, "leadership acquisition interrupted by close");
        self.slot.lock().acquiring = false;
    }

    fn on_acquired(self: &Arc<Self>, token: LeadershipToken, attempt: u32) {
        let mut slot = self.slot.lock();
        slot.acquiring = false;
        if self.is_closed() {
            debug!(%token, "coordinator closed during acquisition; discarding token");
            return;
        }
        if slot.token.is_some() {
            debug!(%token, "token already installed; discarding duplicate acquisition");
            return;
        }
        info!(%token, attempt, "gained leadership");
        self.install(&mut slot, token);
    }

    /// Put `token` into the empty slot and start renewing it if the elector needs that.
    fn install(self: &Arc<Self>, slot: &mut TokenSlot, token: LeadershipToken) {
        slot.token = Some(token.clone());
        self.publish(CoordinatorState::Leading);

        let Some(interval) = self.elector.renewal_interval() else {
            return;
        };
        let cancel = self.cancel.child_token();
        slot.renewal = Some(cancel.clone());
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.renew_leadership(token, interval, cancel).await });
        // A previous renewal task has already been cancelled with its term.
        *self.renewal_task.lock() = Some(handle);
    }

    async fn renew_leadership(self: Arc<Self>, token: LeadershipToken, interval: Duration, cancel: CancellationToken) {
        debug!(%token, interval_ms = interval.as_millis() as u64, "renewing leadership");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            let status = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                status = self.is_still_leading(&token) => status,
            };
            match status {
                Ok(StillLeadingStatus::Leading) => {}
                // Already marked lost by `is_still_leading`.
                Ok(StillLeadingStatus::NotLeading) => break,
                Ok(StillLeadingStatus::NoQuorum) => debug!(%token, "leadership unconfirmed; retrying at next renewal"),
                Err(e) => warn!(%token, error = %e, "leadership renewal failed"),
            }
        }
        debug!(%token, "leadership renewal stopped");
    }

    fn publish(&self, state: CoordinatorState) {
        if self.is_closed() && state != CoordinatorState::Closed {
            return;
        }
        self.state_tx.send_replace(state);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicU32;

    use tokio::time::Instant;

    use super::*;
    use crate::types::LeaderAddress;

    #[derive(Debug, Clone, Copy)]
    enum Step {
        Fail,
        Succeed,
        Block,
    }

    type Hook = Box<dyn FnOnce() + Send>;

    struct ScriptedElector {
        script: Mutex<VecDeque<Step>>,
        default_step: Step,
        attempts: Mutex<Vec<Instant>>,
        leader: Mutex<Option<LeaderAddress>>,
        fast_path: Mutex<Option<LeadershipToken>>,
        status: Mutex<StillLeadingStatus>,
        checks: AtomicU32,
        renewal: Mutex<Option<Duration>>,
        before_success: Mutex<Option<Hook>>,
    }

    impl ScriptedElector {
        fn new(script: impl IntoIterator<Item = Step>, default_step: Step) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into_iter().collect()),
                default_step,
                attempts: Mutex::new(Vec::new()),
                leader: Mutex::new(None),
                fast_path: Mutex::new(None),
                status: Mutex::new(StillLeadingStatus::Leading),
                checks: AtomicU32::new(0),
                renewal: Mutex::new(None),
                before_success: Mutex::new(None),
            })
        }

        fn attempts(&self) -> usize {
            self.attempts.lock().len()
        }

        fn checks(&self) -> u32 {
            self.checks.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl LeaderElector for ScriptedElector {
        fn current_token_if_leading(&self) -> Option<LeadershipToken> {
            self.fast_path.lock().clone()
        }

        async fn block_on_becoming_leader(&self) -> Result<LeadershipToken, CoordinationError> {
            self.attempts.lock().push(Instant::now());
            let step = self.script.lock().pop_front().unwrap_or(self.default_step);
            match step {
                Step::Fail => Err(CoordinationError::ElectorUnavailable {
                    reason: "no quorum".into(),
                }),
                Step::Succeed => {
                    let hook = self.before_success.lock().take();
                    if let Some(hook) = hook {
                        hook();
                    }
                    Ok(LeadershipToken::mint())
                }
                Step::Block => std::future::pending().await,
            }
        }

        async fn is_still_leading(&self, _token: &LeadershipToken) -> Result<StillLeadingStatus, CoordinationError> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            Ok(*self.status.lock())
        }

        fn recently_pinged_leader_host(&self) -> Option<LeaderAddress> {
            self.leader.lock().clone()
        }

        fn renewal_interval(&self) -> Option<Duration> {
            *self.renewal.lock()
        }
    }

    async fn wait_for_leading(coordinator: &LeadershipCoordinator<ScriptedElector>) -> LeadershipToken {
        let mut rx = coordinator.subscribe();
        rx.wait_for(|state| state.is_leading()).await.unwrap();
        coordinator.current_token().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_fails_twice_then_leads_after_two_backoffs() {
        let elector = ScriptedElector::new([Step::Fail, Step::Fail], Step::Succeed);
        let coordinator = LeadershipCoordinator::create(elector.clone(), CoordinatorConfig::default());

        let token = wait_for_leading(&coordinator).await;
        assert!(coordinator.is_current_token(&token));

        let attempts = elector.attempts.lock().clone();
        assert_eq!(attempts.len(), 3);
        for pair in attempts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(GAIN_LEADERSHIP_BACKOFF_MS));
        }
        coordinator.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_token_before_acquisition_completes() {
        let elector = ScriptedElector::new([Step::Fail], Step::Succeed);
        let coordinator = LeadershipCoordinator::create(elector.clone(), CoordinatorConfig::default());

        assert!(matches!(
            coordinator.current_leadership_token(),
            Err(CoordinationError::NotCurrentLeader { leader: None, .. })
        ));
        wait_for_leading(&coordinator).await;
        assert!(coordinator.current_leadership_token().is_ok());
        coordinator.close().await;
    }

    #[tokio::test]
    async fn test_fast_path_installs_token_without_task() {
        let elector = ScriptedElector::new([], Step::Block);
        let token = LeadershipToken::mint();
        *elector.fast_path.lock() = Some(token.clone());

        let coordinator = LeadershipCoordinator::create(elector.clone(), CoordinatorConfig::default());
        assert_eq!(coordinator.current_leadership_token().unwrap(), token);
        assert_eq!(coordinator.state(), CoordinatorState::Leading);
        assert_eq!(elector.attempts(), 0);
        coordinator.close().await;
    }

    #[tokio::test]
    async fn test_new_does_not_start_acquisition() {
        let elector = ScriptedElector::new([], Step::Succeed);
        let coordinator = LeadershipCoordinator::new(elector.clone(), CoordinatorConfig::default());
        tokio::task::yield_now().await;
        assert_eq!(elector.attempts(), 0);
        assert_eq!(coordinator.state(), CoordinatorState::NotLeading);

        coordinator.start();
        wait_for_leading(&coordinator).await;
        coordinator.close().await;
    }

    #[tokio::test]
    async fn test_stale_mark_is_noop() {
        let elector = ScriptedElector::new([], Step::Succeed);
        let coordinator = LeadershipCoordinator::create(elector.clone(), CoordinatorConfig::default());
        let token = wait_for_leading(&coordinator).await;

        coordinator.mark_as_not_leading(&LeadershipToken::mint(), "stale");
        assert!(coordinator.is_current_token(&token));
        assert_eq!(elector.attempts(), 1);
        coordinator.close().await;
    }

    #[tokio::test]
    async fn test_mark_as_not_leading_reacquires_new_token() {
        let elector = ScriptedElector::new([], Step::Succeed);
        let coordinator = LeadershipCoordinator::create(elector.clone(), CoordinatorConfig::default());
        let first = wait_for_leading(&coordinator).await;

        coordinator.mark_as_not_leading(&first, "lost quorum");
        assert!(!coordinator.is_current_token(&first));

        let second = wait_for_leading(&coordinator).await;
        assert_ne!(first, second);
        assert!(!coordinator.is_current_token(&first));
        assert!(coordinator.is_current_token(&second));

        // Repeating the old notification does not disturb the new token
        coordinator.mark_as_not_leading(&first, "late duplicate");
        assert!(coordinator.is_current_token(&second));
        coordinator.close().await;
    }

    #[tokio::test]
    async fn test_redirects_to_recently_pinged_leader() {
        let elector = ScriptedElector::new([], Step::Block);
        *elector.leader.lock() = Some(LeaderAddress::new("timelock-3", 8421));
        let coordinator = LeadershipCoordinator::create(elector.clone(), CoordinatorConfig::default());

        match coordinator.current_leadership_token() {
            Err(CoordinationError::NotCurrentLeader { leader, .. }) => {
                assert_eq!(leader, Some(LeaderAddress::new("timelock-3", 8421)));
            }
            other => panic!("expected NotCurrentLeader, got {other:?}"),
        }
        let err = coordinator.not_current_leader_error("fresh timestamps");
        assert!(err.to_string().contains("timelock-3:8421"));
        coordinator.close().await;
    }

    #[tokio::test]
    async fn test_single_acquisition_task() {
        let elector = ScriptedElector::new([], Step::Block);
        let coordinator = LeadershipCoordinator::create(elector.clone(), CoordinatorConfig::default());
        coordinator.start();
        coordinator.start();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(elector.attempts(), 1);
        assert_eq!(coordinator.state(), CoordinatorState::AcquiringLeadership);
        coordinator.close().await;
    }

    #[tokio::test]
    async fn test_close_interrupts_blocking_acquisition() {
        let elector = ScriptedElector::new([], Step::Block);
        let coordinator = LeadershipCoordinator::create(elector.clone(), CoordinatorConfig::default());
        tokio::task::yield_now().await;

        coordinator.close().await;
        assert_eq!(coordinator.state(), CoordinatorState::Closed);
        assert!(matches!(coordinator.current_leadership_token(), Err(CoordinationError::Closed)));

        // Submission after close is a no-op
        coordinator.start();
        tokio::task::yield_now().await;
        assert_eq!(elector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_interrupts_backoff() {
        let elector = ScriptedElector::new([], Step::Fail);
        let coordinator = LeadershipCoordinator::create(elector.clone(), CoordinatorConfig {
            gain_leadership_backoff_ms: 60_000,
        });
        tokio::task::yield_now().await;
        let started = Instant::now();
        coordinator.close().await;
        assert!(started.elapsed() < Duration::from_millis(60_000));
        assert_eq!(elector.attempts(), 1);
    }

    #[tokio::test]
    async fn test_close_racing_acquisition_installs_no_token() {
        let elector = ScriptedElector::new([], Step::Succeed);
        let coordinator = LeadershipCoordinator::new(elector.clone(), CoordinatorConfig::default());
        let weak = Arc::downgrade(&coordinator);
        *elector.before_success.lock() = Some(Box::new(move || {
            if let Some(coordinator) = weak.upgrade() {
                coordinator.request_close();
            }
        }));

        let mut rx = coordinator.subscribe();
        coordinator.start();
        rx.wait_for(|state| *state == CoordinatorState::Closed).await.unwrap();
        coordinator.close().await;

        assert_eq!(elector.attempts(), 1);
        assert_eq!(coordinator.current_token(), None);
        assert_eq!(coordinator.state(), CoordinatorState::Closed);
        assert!(coordinator.current_leadership_token().is_err());
    }

    #[tokio::test]
    async fn test_is_still_leading_not_leading_clears_token() {
        let elector = ScriptedElector::new([Step::Succeed], Step::Block);
        let coordinator = LeadershipCoordinator::create(elector.clone(), CoordinatorConfig::default());
        let token = wait_for_leading(&coordinator).await;

        assert_eq!(coordinator.is_still_leading(&token).await.unwrap(), StillLeadingStatus::Leading);

        *elector.status.lock() = StillLeadingStatus::NotLeading;
        assert_eq!(coordinator.is_still_leading(&token).await.unwrap(), StillLeadingStatus::NotLeading);
        assert!(!coordinator.is_current_token(&token));
        assert_eq!(coordinator.state(), CoordinatorState::AcquiringLeadership);

        // Stale token short-circuits without asking the elector
        *elector.status.lock() = StillLeadingStatus::Leading;
        assert_eq!(coordinator.is_still_leading(&token).await.unwrap(), StillLeadingStatus::NotLeading);
        coordinator.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_renewal_drops_token_once_elector_stops_leading() {
        let elector = ScriptedElector::new([Step::Succeed], Step::Block);
        *elector.renewal.lock() = Some(Duration::from_millis(100));
        let coordinator = LeadershipCoordinator::create(elector.clone(), CoordinatorConfig::default());
        let token = wait_for_leading(&coordinator).await;

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(elector.checks(), 3);
        assert!(coordinator.is_current_token(&token));

        *elector.status.lock() = StillLeadingStatus::NotLeading;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!coordinator.is_current_token(&token));
        assert_eq!(coordinator.state(), CoordinatorState::AcquiringLeadership);

        // The renewal task ended with the term
        let checks = elector.checks();
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(elector.checks(), checks);
        coordinator.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_renewal_without_interval() {
        let elector = ScriptedElector::new([], Step::Succeed);
        let coordinator = LeadershipCoordinator::create(elector.clone(), CoordinatorConfig::default());
        wait_for_leading(&coordinator).await;

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(elector.checks(), 0);
        coordinator.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_stops_renewal() {
        let elector = ScriptedElector::new([], Step::Succeed);
        *elector.renewal.lock() = Some(Duration::from_millis(100));
        let coordinator = LeadershipCoordinator::create(elector.clone(), CoordinatorConfig::default());
        wait_for_leading(&coordinator).await;

        coordinator.close().await;
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(elector.checks(), 0);
    }

    #[tokio::test]
    async fn test_lost_token_is_not_reinstalled_from_fast_path() {
        let elector = ScriptedElector::new([], Step::Succeed);
        let stale = LeadershipToken::mint();
        *elector.fast_path.lock() = Some(stale.clone());
        let coordinator = LeadershipCoordinator::create(elector.clone(), CoordinatorConfig::default());
        assert!(coordinator.is_current_token(&stale));

        // The elector keeps reporting the same token after it was marked lost
        coordinator.mark_as_not_leading(&stale, "bound advanced by another writer");
        let fresh = wait_for_leading(&coordinator).await;
        assert_ne!(fresh, stale);
        assert_eq!(elector.attempts(), 1);
        coordinator.close().await;
    }
}
