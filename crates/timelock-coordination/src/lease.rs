//! Client-side leases over server lock grants.
//!
//! A [`LeasedLockToken`] lets a client answer "do I still hold this lock?"
//! locally. The local expiry is always earlier than the server's, so the
//! answer can be a false "no" but never a false "yes".

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use serde::Serialize;
use timelock_constants::lease::DEFAULT_LEASE_SAFETY_MARGIN_MS;
use timelock_constants::lease::DEFAULT_LOCK_TTL_MS;
use timelock_constants::lease::DEFAULT_REFRESH_THRESHOLD_MS;
use tokio::time::Instant;
use tracing::debug;
use tracing::info;
use uuid::Uuid;

use crate::error::CoordinationError;
use crate::lock_service::LockGrant;
use crate::lock_service::LockService;
use crate::pure::compute_lease_period_ms;
use crate::pure::should_refresh_lease;
use crate::types::LockToken;

struct LeaseState {
    expiry: Instant,
    invalidated: bool,
}

/// A server lock token paired with a local lease.
///
/// Equality and hashing use the server token only.
pub struct LeasedLockToken {
    server_token: LockToken,
    client_token: Uuid,
    lease: Mutex<LeaseState>,
}

impl LeasedLockToken {
    /// Wrap `server_token` with a lease ending at `expiry`.
    pub fn new(server_token: LockToken, expiry: Instant) -> Self {
        Self {
            server_token,
            client_token: Uuid::new_v4(),
            lease: Mutex::new(LeaseState {
                expiry,
                invalidated: false,
            }),
        }
    }

    pub fn server_token(&self) -> LockToken {
        self.server_token
    }

    /// Client-generated identifier, unrelated to the server token.
    pub fn client_token(&self) -> Uuid {
        self.client_token
    }

    /// Valid iff never invalidated and `now` is before the expiry.
    pub fn is_valid(&self, now: Instant) -> bool {
        let lease = self.lease.lock();
        !lease.invalidated && now < lease.expiry
    }

    /// Permanently mark the lease invalid. Idempotent.
    pub fn invalidate(&self) {
        self.lease.lock().invalidated = true;
    }

    pub fn is_invalidated(&self) -> bool {
        self.lease.lock().invalidated
    }

    pub fn expiry(&self) -> Instant {
        self.lease.lock().expiry
    }

    /// Time left on the lease; zero once invalid.
    pub fn remaining(&self, now: Instant) -> Duration {
        let lease = self.lease.lock();
        if lease.invalidated {
            Duration::ZERO
        } else {
            lease.expiry.saturating_duration_since(now)
        }
    }

    /// Extend the lease. Never shortens it and never revives an invalidated lease.
    pub fn update_expiry(&self, new_expiry: Instant) -> bool {
        let mut lease = self.lease.lock();
        if lease.invalidated || new_expiry <= lease.expiry {
            return false;
        }
        lease.expiry = new_expiry;
        true
    }
}

impl PartialEq for LeasedLockToken {
    fn eq(&self, other: &Self) -> bool {
        self.server_token == other.server_token
    }
}

impl Eq for LeasedLockToken {}

impl Hash for LeasedLockToken {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.server_token.hash(state);
    }
}

impl fmt::Debug for LeasedLockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lease = self.lease.lock();
        f.debug_struct("LeasedLockToken")
            .field("server_token", &self.server_token)
            .field("client_token", &self.client_token)
            .field("invalidated", &lease.invalidated)
            .finish()
    }
}

/// Lease tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseConfig {
    /// TTL requested from the lock service.
    #[serde(default = "default_lock_ttl_ms")]
    pub lock_ttl_ms: u64,
    /// Subtracted from the TTL to form the local lease.
    #[serde(default = "default_safety_margin_ms")]
    pub safety_margin_ms: u64,
    /// Renew against the server once less than this much lease remains.
    #[serde(default = "default_refresh_threshold_ms")]
    pub refresh_threshold_ms: u64,
}

fn default_lock_ttl_ms() -> u64 {
    DEFAULT_LOCK_TTL_MS
}

fn default_safety_margin_ms() -> u64 {
    DEFAULT_LEASE_SAFETY_MARGIN_MS
}

fn default_refresh_threshold_ms() -> u64 {
    DEFAULT_REFRESH_THRESHOLD_MS
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            lock_ttl_ms: default_lock_ttl_ms(),
            safety_margin_ms: default_safety_margin_ms(),
            refresh_threshold_ms: default_refresh_threshold_ms(),
        }
    }
}

impl LeaseConfig {
    /// Local lease length: server TTL minus the safety margin.
    pub fn lease_period(&self) -> Duration {
        Duration::from_millis(compute_lease_period_ms(self.lock_ttl_ms, self.safety_margin_ms))
    }
}

/// Lock client that hands out [`LeasedLockToken`]s.
pub struct LeasedLockClient<L: LockService + ?Sized> {
    service: Arc<L>,
    holder_id: String,
    config: LeaseConfig,
    grants: Mutex<HashMap<LockToken, LockGrant>>,
}

impl<L: LockService + ?Sized> LeasedLockClient<L> {
    pub fn new(service: Arc<L>, holder_id: impl Into<String>, config: LeaseConfig) -> Self {
        Self {
            service,
            holder_id: holder_id.into(),
            config,
            grants: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire `name`. `None` if it is held elsewhere.
    ///
    /// The lease is measured from before the request was sent, so it cannot
    /// outlast the server grant however long the request took.
    pub async fn lock(&self, name: &str) -> Result<Option<Arc<LeasedLockToken>>, CoordinationError> {
        let requested_at = Instant::now();
        let Some(grant) = self.service.acquire(name, &self.holder_id, self.config.lock_ttl_ms).await? else {
            return Ok(None);
        };

        let token = Arc::new(LeasedLockToken::new(grant.token, requested_at + self.config.lease_period()));
        debug!(lock = name, server_token = %grant.token, client_token = %token.client_token(), "leased lock acquired");
        self.grants.lock().insert(grant.token, grant);
        Ok(Some(token))
    }

    /// Local validity check; no server round trip.
    pub fn is_valid(&self, token: &LeasedLockToken) -> bool {
        token.is_valid(Instant::now())
    }

    /// Renew `token` if its lease is nearly over.
    ///
    /// Returns whether the token is still held. A refusal from the server
    /// invalidates the token. A transport failure leaves the lease to run out
    /// on its own.
    pub async fn refresh(&self, token: &LeasedLockToken) -> Result<bool, CoordinationError> {
        let now = Instant::now();
        if token.is_invalidated() {
            return Ok(false);
        }
        let remaining_ms = token.remaining(now).as_millis() as u64;
        if token.is_valid(now) && !should_refresh_lease(remaining_ms, self.config.refresh_threshold_ms) {
            return Ok(true);
        }

        let grant = self.grants.lock().get(&token.server_token()).cloned();
        let Some(grant) = grant else {
            token.invalidate();
            return Ok(false);
        };

        let requested_at = Instant::now();
        match self.service.refresh(&grant).await? {
            Some(renewed) => {
                token.update_expiry(requested_at + self.config.lease_period());
                self.grants.lock().insert(renewed.token, renewed);
                Ok(token.is_valid(Instant::now()))
            }
            None => {
                info!(lock = %grant.name, server_token = %grant.token, "lock refresh refused; invalidating lease");
                token.invalidate();
                self.grants.lock().remove(&grant.token);
                Ok(false)
            }
        }
    }

    /// Release `token`. It is invalidated locally before the server is contacted.
    pub async fn unlock(&self, token: &LeasedLockToken) -> Result<bool, CoordinationError> {
        token.invalidate();
        let grant = self.grants.lock().remove(&token.server_token());
        match grant {
            Some(grant) => self.service.release(&grant).await,
            None => Ok(false),
        }
    }
}
