//! Leader election on top of a [`LockService`].
//!
//! Whoever holds the election lock is leader. Candidates poll the lock until
//! they win; the leader proves it still leads by refreshing its grant. Lock
//! holder ids are the holders' addresses, so a losing candidate always knows
//! where to redirect clients.
//!
//! The grant lapses after `lock_ttl_ms` unless refreshed, so the elector asks
//! the coordinator to confirm leadership several times per TTL. When the store
//! cannot be reached the leader steps down once its grant's deadline passes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde::Serialize;
use timelock_constants::leadership::ELECTION_LOCK_TTL_MS;
use timelock_constants::leadership::ELECTION_POLL_INTERVAL_MS;
use timelock_constants::leadership::ELECTION_RENEWALS_PER_TTL;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::elector::LeaderElector;
use crate::elector::LeadershipToken;
use crate::elector::StillLeadingStatus;
use crate::error::CoordinationError;
use crate::lock_service::LockGrant;
use crate::lock_service::LockService;
use crate::pure::is_lock_expired;
use crate::types::LeaderAddress;
use crate::types::now_unix_ms;

/// Lock-backed elector tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectorConfig {
    /// Name of the election lock.
    #[serde(default = "default_election_name")]
    pub election_name: String,
    /// Pause between acquisition attempts while another node leads.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// TTL of the election lock grant.
    #[serde(default = "default_lock_ttl_ms")]
    pub lock_ttl_ms: u64,
}

fn default_election_name() -> String {
    "timelock/leader".to_string()
}

fn default_poll_interval_ms() -> u64 {
    ELECTION_POLL_INTERVAL_MS
}

fn default_lock_ttl_ms() -> u64 {
    ELECTION_LOCK_TTL_MS
}

impl Default for ElectorConfig {
    fn default() -> Self {
        Self {
            election_name: default_election_name(),
            poll_interval_ms: default_poll_interval_ms(),
            lock_ttl_ms: default_lock_ttl_ms(),
        }
    }
}

struct Leadership {
    token: LeadershipToken,
    grant: LockGrant,
}

/// [`LeaderElector`] backed by an exclusive lock.
pub struct LockLeaderElector<L: LockService + ?Sized> {
    service: Arc<L>,
    address: LeaderAddress,
    config: ElectorConfig,
    current: Mutex<Option<Leadership>>,
    last_seen_leader: Mutex<Option<LeaderAddress>>,
}

impl<L: LockService + ?Sized> LockLeaderElector<L> {
    pub fn new(service: Arc<L>, address: LeaderAddress, config: ElectorConfig) -> Self {
        Self {
            service,
            address,
            config,
            current: Mutex::new(None),
            last_seen_leader: Mutex::new(None),
        }
    }

    pub fn address(&self) -> &LeaderAddress {
        &self.address
    }

    /// Give up leadership by releasing the election lock. `false` if this
    /// node did not hold it.
    pub async fn resign(&self) -> Result<bool, CoordinationError> {
        let Some(leadership) = self.current.lock().take() else {
            return Ok(false);
        };
        let released = self.service.release(&leadership.grant).await?;
        info!(address = %self.address, token = %leadership.token, released, "resigned leadership");
        Ok(released)
    }

    fn holder_id(&self) -> String {
        self.address.to_string()
    }

    fn install(&self, grant: LockGrant) -> LeadershipToken {
        let token = LeadershipToken::mint();
        info!(
            address = %self.address,
            %token,
            fencing_token = grant.fencing_token.value(),
            "won leader election"
        );
        *self.current.lock() = Some(Leadership {
            token: token.clone(),
            grant,
        });
        *self.last_seen_leader.lock() = Some(self.address.clone());
        token
    }

    async fn observe_holder(&self) -> Result<(), CoordinationError> {
        let Some(holder) = self.service.current_holder(&self.config.election_name).await? else {
            return Ok(());
        };
        match holder.holder_id.parse::<LeaderAddress>() {
            Ok(address) => {
                debug!(leader = %address, "election lock held by another node");
                *self.last_seen_leader.lock() = Some(address);
            }
            Err(e) => warn!(holder = %holder.holder_id, error = %e, "election lock holder is not an address"),
        }
        Ok(())
    }
}

#[async_trait]
impl<L: LockService + ?Sized + 'static> LeaderElector for LockLeaderElector<L> {
    fn current_token_if_leading(&self) -> Option<LeadershipToken> {
        let current = self.current.lock();
        current
            .as_ref()
            .filter(|leadership| !is_lock_expired(leadership.grant.deadline_ms, now_unix_ms()))
            .map(|leadership| leadership.token.clone())
    }

    async fn block_on_becoming_leader(&self) -> Result<LeadershipToken, CoordinationError> {
        // A grant kept from an earlier term can be renewed instead of re-won.
        let previous = self.current.lock().take();
        if let Some(previous) = previous {
            match self.service.refresh(&previous.grant).await {
                Ok(Some(renewed)) => return Ok(self.install(renewed)),
                Ok(None) => {}
                Err(e) => {
                    // The lock may still be ours on the server; keep the grant for the next try.
                    let mut current = self.current.lock();
                    if current.is_none() {
                        *current = Some(previous);
                    }
                    return Err(e);
                }
            }
        }

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        loop {
            if let Some(grant) =
                self.service.acquire(&self.config.election_name, &self.holder_id(), self.config.lock_ttl_ms).await?
            {
                return Ok(self.install(grant));
            }
            self.observe_holder().await?;
            tokio::time::sleep(poll_interval).await;
        }
    }

    async fn is_still_leading(&self, token: &LeadershipToken) -> Result<StillLeadingStatus, CoordinationError> {
        let grant = {
            let current = self.current.lock();
            match current.as_ref() {
                Some(leadership) if leadership.token == *token => leadership.grant.clone(),
                _ => return Ok(StillLeadingStatus::NotLeading),
            }
        };

        match self.service.refresh(&grant).await {
            Ok(Some(renewed)) => {
                let mut current = self.current.lock();
                if let Some(leadership) = current.as_mut().filter(|l| l.token == *token) {
                    leadership.grant = renewed;
                }
                Ok(StillLeadingStatus::Leading)
            }
            Ok(None) => {
                let mut current = self.current.lock();
                if current.as_ref().is_some_and(|l| l.token == *token) {
                    *current = None;
                }
                info!(address = %self.address, %token, "election lock lost");
                Ok(StillLeadingStatus::NotLeading)
            }
            Err(e) if is_lock_expired(grant.deadline_ms, now_unix_ms()) => {
                let mut current = self.current.lock();
                if current.as_ref().is_some_and(|l| l.token == *token) {
                    *current = None;
                }
                warn!(address = %self.address, %token, error = %e, "election lock expired while the store was unreachable");
                Ok(StillLeadingStatus::NotLeading)
            }
            Err(e) => {
                warn!(address = %self.address, error = %e, "could not confirm leadership");
                Ok(StillLeadingStatus::NoQuorum)
            }
        }
    }

    fn recently_pinged_leader_host(&self) -> Option<LeaderAddress> {
        self.last_seen_leader.lock().clone()
    }

    fn renewal_interval(&self) -> Option<Duration> {
        Some(Duration::from_millis((self.config.lock_ttl_ms / ELECTION_RENEWALS_PER_TTL).max(1)))
    }
}
