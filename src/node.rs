//! Embedded timelock node.
//!
//! One KV store backs everything: the timestamp bound, the election lock, and
//! any leased or scheduler locks. The node elects itself through
//! [`LockLeaderElector`] and serves timestamps only while it leads, with a
//! fresh allocator for every leadership term.

use std::sync::Arc;

use timelock_coordination::BackgroundScheduler;
use timelock_coordination::ConfigError;
use timelock_coordination::CoordinatorState;
use timelock_coordination::DelegateFactory;
use timelock_coordination::KvLockService;
use timelock_coordination::LeaderAddress;
use timelock_coordination::LeaderGatedTimestampService;
use timelock_coordination::LeadershipCoordinator;
use timelock_coordination::LeasedLockClient;
use timelock_coordination::LockLeaderElector;
use timelock_coordination::ScheduledTask;
use timelock_coordination::SchedulerSettings;
use timelock_coordination::TimelockConfig;
use timelock_coordination::TimestampAllocator;
use timelock_coordination::TimestampBoundStore;
use timelock_traits::KeyValueStore;
use tracing::info;
use tracing::warn;

type Locks<S> = KvLockService<S>;
type Elector<S> = LockLeaderElector<Locks<S>>;
type Allocator<S> = TimestampAllocator<Arc<TimestampBoundStore<S>>>;

/// A running node.
pub struct TimelockNode<S: KeyValueStore + ?Sized + 'static> {
    address: LeaderAddress,
    config: TimelockConfig,
    locks: Arc<Locks<S>>,
    elector: Arc<Elector<S>>,
    coordinator: Arc<LeadershipCoordinator<Elector<S>>>,
    timestamps: Arc<LeaderGatedTimestampService<Allocator<S>, Elector<S>>>,
}

impl<S: KeyValueStore + ?Sized + 'static> TimelockNode<S> {
    /// Validate `config` and start campaigning for leadership.
    pub fn start(store: Arc<S>, address: LeaderAddress, config: TimelockConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let locks = Arc::new(KvLockService::new(store.clone()));
        let elector = Arc::new(LockLeaderElector::new(locks.clone(), address.clone(), config.elector.clone()));
        let coordinator = LeadershipCoordinator::create(elector.clone(), config.coordinator);

        let bound_store = Arc::new(TimestampBoundStore::new(store, &config.bound));
        let allocator_config = config.allocator;
        let factory: DelegateFactory<Allocator<S>> =
            Arc::new(move || Arc::new(TimestampAllocator::new(bound_store.clone(), allocator_config)));
        let timestamps = Arc::new(LeaderGatedTimestampService::per_term(factory, coordinator.clone()));

        info!(%address, namespace = %config.bound.namespace, "timelock node started");
        Ok(Self {
            address,
            config,
            locks,
            elector,
            coordinator,
            timestamps,
        })
    }

    pub fn address(&self) -> &LeaderAddress {
        &self.address
    }

    pub fn config(&self) -> &TimelockConfig {
        &self.config
    }

    /// Leader-gated timestamp service.
    pub fn timestamps(&self) -> &Arc<LeaderGatedTimestampService<Allocator<S>, Elector<S>>> {
        &self.timestamps
    }

    pub fn coordinator(&self) -> &Arc<LeadershipCoordinator<Elector<S>>> {
        &self.coordinator
    }

    pub fn state(&self) -> CoordinatorState {
        self.coordinator.state()
    }

    /// Lock client whose leases end before the server-side grants.
    pub fn lease_client(&self, holder_id: impl Into<String>) -> LeasedLockClient<Locks<S>> {
        LeasedLockClient::new(self.locks.clone(), holder_id, self.config.lease)
    }

    /// Background scheduler for `task`, sharing the node's lock service.
    pub fn scheduler<T: ScheduledTask>(&self, task: Arc<T>) -> (BackgroundScheduler<T, Locks<S>>, Arc<SchedulerSettings>) {
        let settings = SchedulerSettings::from_config(&self.config.scheduler);
        let scheduler = BackgroundScheduler::new(
            task,
            self.locks.clone(),
            self.address.to_string(),
            self.config.scheduler.clone(),
            settings.clone(),
        );
        (scheduler, settings)
    }

    /// Stop campaigning and hand leadership to the next candidate.
    pub async fn shutdown(&self) {
        self.coordinator.close().await;
        if let Err(e) = self.elector.resign().await {
            warn!(address = %self.address, error = %e, "failed to release election lock; it will expire");
        }
        info!(address = %self.address, "timelock node stopped");
    }
}
