//! Two embedded nodes sharing one store.

mod common;

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use common::wait_for_state;
use timelock::CoordinationError;
use timelock::CoordinatorState;
use timelock::LeaderAddress;
use timelock::ScheduledTask;
use timelock::TaskError;
use timelock::TimelockConfig;
use timelock::TimelockNode;
use timelock::TimestampService;
use timelock::WorkStatus;
use timelock_testing::DeterministicKeyValueStore;

fn address(host: &str) -> LeaderAddress {
    LeaderAddress::new(host, 8421)
}

#[tokio::test(start_paused = true)]
async fn test_follower_redirects_then_takes_over() {
    common::init_test_tracing();
    let kv = DeterministicKeyValueStore::new();
    let a = TimelockNode::start(kv.clone(), address("node-a"), TimelockConfig::default()).unwrap();
    wait_for_state(a.coordinator(), CoordinatorState::Leading).await;

    let b = TimelockNode::start(kv.clone(), address("node-b"), TimelockConfig::default()).unwrap();
    let issued = a.timestamps().fresh_timestamps(10).await.unwrap();
    assert_eq!(issued.lower(), 10_000);

    // Let b lose at least one election round
    tokio::time::sleep(Duration::from_millis(10)).await;
    match b.timestamps().fresh_timestamp().await {
        Err(CoordinationError::NotCurrentLeader { leader, .. }) => assert_eq!(leader, Some(address("node-a"))),
        other => panic!("follower must redirect, got {other:?}"),
    }

    a.shutdown().await;
    assert!(matches!(a.timestamps().fresh_timestamp().await, Err(CoordinationError::Closed)));

    wait_for_state(b.coordinator(), CoordinatorState::Leading).await;
    let next = b.timestamps().fresh_timestamp().await.unwrap();
    assert!(next >= issued.upper(), "{next} repeats a timestamp issued by node-a");
    b.shutdown().await;
}

#[tokio::test]
async fn test_leader_keeps_election_lock_past_its_ttl() {
    common::init_test_tracing();
    let kv = DeterministicKeyValueStore::new();
    let mut config = TimelockConfig::default();
    config.elector.lock_ttl_ms = 300;
    config.elector.poll_interval_ms = 20;

    let a = TimelockNode::start(kv.clone(), address("node-a"), config.clone()).unwrap();
    wait_for_state(a.coordinator(), CoordinatorState::Leading).await;
    let b = TimelockNode::start(kv.clone(), address("node-b"), config).unwrap();
    let first = a.timestamps().fresh_timestamp().await.unwrap();

    // Real time: several election lock TTLs pass
    tokio::time::sleep(Duration::from_millis(1_000)).await;
    assert_eq!(a.state(), CoordinatorState::Leading);
    assert_ne!(b.state(), CoordinatorState::Leading);
    match b.timestamps().fresh_timestamp().await {
        Err(CoordinationError::NotCurrentLeader { leader, .. }) => assert_eq!(leader, Some(address("node-a"))),
        other => panic!("follower must redirect, got {other:?}"),
    }
    assert!(a.timestamps().fresh_timestamp().await.unwrap() > first);

    a.shutdown().await;
    b.shutdown().await;
}

#[derive(Default)]
struct CountingTask {
    runs: AtomicU64,
}

#[async_trait]
impl ScheduledTask for CountingTask {
    fn name(&self) -> &str {
        "counting"
    }

    async fn run_once(&self, _batch_size: u64) -> Result<WorkStatus, TaskError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(WorkStatus::Completed)
    }

    async fn target_still_exists(&self) -> Result<bool, TaskError> {
        Ok(true)
    }

    async fn reset_progress(&self) {}
}

#[tokio::test(start_paused = true)]
async fn test_only_one_node_runs_scheduled_work() {
    common::init_test_tracing();
    let kv = DeterministicKeyValueStore::new();
    let a = TimelockNode::start(kv.clone(), address("node-a"), TimelockConfig::default()).unwrap();
    let b = TimelockNode::start(kv.clone(), address("node-b"), TimelockConfig::default()).unwrap();

    let task_a = Arc::new(CountingTask::default());
    let task_b = Arc::new(CountingTask::default());
    let (scheduler_a, _) = a.scheduler(task_a.clone());
    let (scheduler_b, _) = b.scheduler(task_b.clone());
    let handle_a = scheduler_a.start();
    let handle_b = scheduler_b.start();

    // Initial delay is 120s with the default 5s pause
    tokio::time::sleep(Duration::from_secs(200)).await;
    let runs = (task_a.runs.load(Ordering::SeqCst), task_b.runs.load(Ordering::SeqCst));
    assert!(runs.0 == 0 || runs.1 == 0, "both nodes ran work: {runs:?}");
    assert!(runs.0 + runs.1 > 1);

    handle_a.shutdown().await;
    handle_b.shutdown().await;
    a.shutdown().await;
    b.shutdown().await;
}
