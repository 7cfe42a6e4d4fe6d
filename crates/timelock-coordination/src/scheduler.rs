//! Background retry/backoff scheduler.
//!
//! Runs one bounded unit of a [`ScheduledTask`] per iteration while holding a
//! cluster-wide scheduler lock. Each iteration is classified into an
//! [`Outcome`] and [`plan_next_iteration`] decides the next sleep and the work
//! multiplier, so a failing task backs off and shrinks its batches while a
//! healthy one runs at the configured pause.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde::Serialize;
use timelock_constants::lease::DEFAULT_LOCK_TTL_MS;
use timelock_constants::scheduler::DEFAULT_CANDIDATE_BATCH_SIZE;
use timelock_constants::scheduler::DEFAULT_PAUSE_MS;
use timelock_constants::scheduler::DEFAULT_SCHEDULER_LOCK_NAME;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::error::CoordinationError;
use crate::error::TaskError;
use crate::lock_service::LockGrant;
use crate::lock_service::LockService;
use crate::pure::Outcome;
use crate::pure::SchedulePolicy;
use crate::pure::effective_batch_size;
use crate::pure::extended_backoff_ms;
use crate::pure::plan_next_iteration;

/// Static scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Name of the mutual-exclusion lock shared by all schedulers of this task.
    #[serde(default = "default_lock_name")]
    pub lock_name: String,
    /// TTL of the scheduler lock grant.
    #[serde(default = "default_lock_ttl_ms")]
    pub lock_ttl_ms: u64,
    /// Initial pause after a successful iteration.
    #[serde(default = "default_pause_ms")]
    pub pause_ms: u64,
    /// Units examined per iteration at multiplier 1.0.
    #[serde(default = "default_candidate_batch_size")]
    pub candidate_batch_size: u64,
    /// Initial enabled flag.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_lock_name() -> String {
    DEFAULT_SCHEDULER_LOCK_NAME.to_string()
}

fn default_lock_ttl_ms() -> u64 {
    DEFAULT_LOCK_TTL_MS
}

fn default_pause_ms() -> u64 {
    DEFAULT_PAUSE_MS
}

fn default_candidate_batch_size() -> u64 {
    DEFAULT_CANDIDATE_BATCH_SIZE
}

fn default_enabled() -> bool {
    true
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            lock_name: default_lock_name(),
            lock_ttl_ms: default_lock_ttl_ms(),
            pause_ms: default_pause_ms(),
            candidate_batch_size: default_candidate_batch_size(),
            enabled: default_enabled(),
        }
    }
}

/// Settings an operator may change while the scheduler runs.
///
/// Read at the start of every iteration.
#[derive(Debug)]
pub struct SchedulerSettings {
    enabled: AtomicBool,
    pause_ms: AtomicU64,
}

impl SchedulerSettings {
    pub fn new(enabled: bool, pause_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            enabled: AtomicBool::new(enabled),
            pause_ms: AtomicU64::new(pause_ms),
        })
    }

    pub fn from_config(config: &SchedulerConfig) -> Arc<Self> {
        Self::new(config.enabled, config.pause_ms)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn pause_ms(&self) -> u64 {
        self.pause_ms.load(Ordering::Acquire)
    }

    pub fn set_pause_ms(&self, pause_ms: u64) {
        self.pause_ms.store(pause_ms, Ordering::Release);
    }
}

/// What one unit of work accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkStatus {
    /// Work was done.
    Completed,
    /// No candidates were found.
    NothingToDo,
}

/// The work driven by a [`BackgroundScheduler`].
#[async_trait]
pub trait ScheduledTask: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Process at most `batch_size` candidates.
    async fn run_once(&self, batch_size: u64) -> Result<WorkStatus, TaskError>;

    /// Whether the target of the work still exists. Asked after a failure.
    async fn target_still_exists(&self) -> Result<bool, TaskError>;

    /// Forget progress recorded for a target that has gone away.
    async fn reset_progress(&self);
}

/// Observable scheduler counters.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerStats {
    /// Completed iterations.
    pub iterations: u64,
    /// Current work multiplier.
    pub work_multiplier: f64,
    /// Outcome of the latest iteration.
    pub last_outcome: Option<Outcome>,
}

impl Default for SchedulerStats {
    fn default() -> Self {
        Self {
            iterations: 0,
            work_multiplier: 1.0,
            last_outcome: None,
        }
    }
}

/// The scheduler's hold on its mutual-exclusion lock.
///
/// Held across iterations and refreshed at the start of each one. Released
/// when the loop exits; if the hold is dropped while still holding a grant
/// (the task panicked or was aborted) the release is spawned instead.
struct SchedulerLock<L: LockService + ?Sized + 'static> {
    service: Arc<L>,
    name: String,
    holder_id: String,
    ttl_ms: u64,
    grant: Option<LockGrant>,
}

impl<L: LockService + ?Sized + 'static> SchedulerLock<L> {
    fn new(service: Arc<L>, name: String, holder_id: String, ttl_ms: u64) -> Self {
        Self {
            service,
            name,
            holder_id,
            ttl_ms,
            grant: None,
        }
    }

    /// Refresh the held grant or try to take the lock. `false` if another
    /// scheduler holds it.
    async fn lock_or_refresh(&mut self) -> Result<bool, CoordinationError> {
        if let Some(grant) = self.grant.clone() {
            match self.service.refresh(&grant).await? {
                Some(renewed) => {
                    self.grant = Some(renewed);
                    return Ok(true);
                }
                None => {
                    debug!(lock = %self.name, "scheduler lock lapsed");
                    self.grant = None;
                }
            }
        }

        match self.service.acquire(&self.name, &self.holder_id, self.ttl_ms).await? {
            Some(grant) => {
                debug!(lock = %self.name, fencing_token = grant.fencing_token.value(), "scheduler lock acquired");
                self.grant = Some(grant);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn release(&mut self) {
        let Some(grant) = self.grant.take() else {
            return;
        };
        if let Err(e) = self.service.release(&grant).await {
            warn!(lock = %self.name, error = %e, "failed to release scheduler lock");
        }
    }
}

impl<L: LockService + ?Sized + 'static> Drop for SchedulerLock<L> {
    fn drop(&mut self) {
        let Some(grant) = self.grant.take() else {
            return;
        };
        // Without a runtime the grant simply expires.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let service = self.service.clone();
            handle.spawn(async move {
                let _ = service.release(&grant).await;
            });
        }
    }
}

/// Drives a [`ScheduledTask`] in the background.
pub struct BackgroundScheduler<T: ScheduledTask, L: LockService + ?Sized + 'static> {
    task: Arc<T>,
    locks: Arc<L>,
    holder_id: String,
    config: SchedulerConfig,
    settings: Arc<SchedulerSettings>,
}

impl<T: ScheduledTask, L: LockService + ?Sized + 'static> BackgroundScheduler<T, L> {
    pub fn new(
        task: Arc<T>,
        locks: Arc<L>,
        holder_id: impl Into<String>,
        config: SchedulerConfig,
        settings: Arc<SchedulerSettings>,
    ) -> Self {
        assert!(config.candidate_batch_size > 0, "BOUND: candidate_batch_size must be positive");
        Self {
            task,
            locks,
            holder_id: holder_id.into(),
            config,
            settings,
        }
    }

    /// Spawn the scheduling loop.
    pub fn start(self) -> SchedulerHandle {
        let cancel = CancellationToken::new();
        let stats = Arc::new(Mutex::new(SchedulerStats::default()));
        let task = tokio::spawn(self.run(cancel.clone(), stats.clone()));
        SchedulerHandle {
            cancel,
            task: Some(task),
            stats,
        }
    }

    async fn run(self, cancel: CancellationToken, stats: Arc<Mutex<SchedulerStats>>) {
        let mut lock = SchedulerLock::new(
            self.locks.clone(),
            self.config.lock_name.clone(),
            self.holder_id.clone(),
            self.config.lock_ttl_ms,
        );
        let mut multiplier = 1.0;

        // Short-lived processes never start work.
        let initial_delay = extended_backoff_ms(self.settings.pause_ms());
        info!(task = self.task.name(), initial_delay_ms = initial_delay, "scheduler started");
        if !sleep_or_cancel(&cancel, initial_delay).await {
            lock.release().await;
            return;
        }

        loop {
            // The lock step is never interrupted, so a grant the store has
            // applied always lands in `lock` and is released below.
            let outcome = match self.check_config_and_lock(&mut lock).await {
                Some(outcome) => outcome,
                None => {
                    if cancel.is_cancelled() {
                        break;
                    }
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        outcome = self.run_work(multiplier) => outcome,
                    }
                }
            };

            let policy = SchedulePolicy {
                pause_ms: self.settings.pause_ms(),
                candidate_batch_size: self.config.candidate_batch_size,
            };
            let plan = plan_next_iteration(outcome, multiplier, &policy);
            multiplier = plan.work_multiplier;
            {
                let mut stats = stats.lock();
                stats.iterations = stats.iterations.saturating_add(1);
                stats.work_multiplier = multiplier;
                stats.last_outcome = Some(outcome);
            }
            debug!(
                task = self.task.name(),
                ?outcome,
                sleep_ms = plan.sleep_ms,
                work_multiplier = multiplier,
                "scheduler iteration finished"
            );

            if !sleep_or_cancel(&cancel, plan.sleep_ms).await {
                break;
            }
        }

        lock.release().await;
        info!(task = self.task.name(), "scheduler stopped");
    }

    /// `None` when the lock is held and work may run.
    async fn check_config_and_lock(&self, lock: &mut SchedulerLock<L>) -> Option<Outcome> {
        if !self.settings.is_enabled() {
            // Let an enabled scheduler elsewhere take over.
            lock.release().await;
            return Some(Outcome::Disabled);
        }

        match lock.lock_or_refresh().await {
            Ok(true) => None,
            Ok(false) => {
                debug!(task = self.task.name(), lock = %self.config.lock_name, "scheduler lock held elsewhere");
                Some(Outcome::LockUnavailable)
            }
            Err(e) => {
                warn!(task = self.task.name(), error = %e, "scheduler lock service unavailable");
                Some(Outcome::DependencyUnavailable)
            }
        }
    }

    async fn run_work(&self, multiplier: f64) -> Outcome {
        let batch_size = effective_batch_size(multiplier, self.config.candidate_batch_size);
        match self.task.run_once(batch_size).await {
            Ok(WorkStatus::Completed) => Outcome::Success,
            Ok(WorkStatus::NothingToDo) => Outcome::NothingToDo,
            Err(TaskError::DependencyUnavailable { reason }) => {
                warn!(task = self.task.name(), %reason, "scheduled work lacks a dependency");
                Outcome::DependencyUnavailable
            }
            Err(e @ TaskError::Failed { .. }) => self.determine_cause(batch_size, e).await,
        }
    }

    async fn determine_cause(&self, batch_size: u64, error: TaskError) -> Outcome {
        match self.task.target_still_exists().await {
            Ok(true) => {
                warn!(task = self.task.name(), batch_size, error = %error, "scheduled work failed; retrying with a smaller batch");
                Outcome::RetryWithSmallerBatch
            }
            Ok(false) => {
                info!(task = self.task.name(), "target dropped while work was in progress");
                self.task.reset_progress().await;
                Outcome::TargetDroppedMidway
            }
            Err(e) => {
                warn!(task = self.task.name(), error = %error, recheck_error = %e, "scheduled work failed");
                Outcome::Error
            }
        }
    }
}

/// `false` if cancelled before the sleep elapsed.
async fn sleep_or_cancel(cancel: &CancellationToken, ms: u64) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(Duration::from_millis(ms)) => true,
    }
}

/// Handle to a running [`BackgroundScheduler`].
pub struct SchedulerHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    stats: Arc<Mutex<SchedulerStats>>,
}

impl SchedulerHandle {
    pub fn stats(&self) -> SchedulerStats {
        self.stats.lock().clone()
    }

    /// Stop the loop and wait for it to release its lock.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if e.is_panic() {
                    warn!(error = %e, "scheduler task panicked");
                }
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
