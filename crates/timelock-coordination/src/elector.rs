//! Leader election capability consumed by the coordinator.

use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::CoordinationError;
use crate::types::LeaderAddress;
use crate::types::now_unix_ms;

struct TokenInner {
    id: Uuid,
    minted_at_ms: u64,
}

/// Proof of one successful leadership acquisition.
///
/// Equality is identity: two tokens are equal only if they are clones of the
/// same minted token. There is no way to build a token that compares equal to
/// an existing one, so a token cannot be forged or resurrected after loss.
#[derive(Clone)]
pub struct LeadershipToken(Arc<TokenInner>);

impl LeadershipToken {
    /// Mint a token for a new acquisition.
    pub fn mint() -> Self {
        Self(Arc::new(TokenInner {
            id: Uuid::new_v4(),
            minted_at_ms: now_unix_ms(),
        }))
    }

    /// Random identifier for logs; not used for equality.
    pub fn id(&self) -> Uuid {
        self.0.id
    }

    pub fn minted_at_ms(&self) -> u64 {
        self.0.minted_at_ms
    }
}

impl PartialEq for LeadershipToken {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for LeadershipToken {}

impl Hash for LeadershipToken {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.0), state);
    }
}

impl fmt::Debug for LeadershipToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LeadershipToken").field(&self.0.id).finish()
    }
}

impl fmt::Display for LeadershipToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.id)
    }
}

/// Answer of an elector leadership check for a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StillLeadingStatus {
    /// The token is still the current leadership.
    Leading,
    /// Leadership for this token has ended.
    NotLeading,
    /// The elector could not reach enough peers to tell.
    NoQuorum,
}

/// An external leader-election primitive.
#[async_trait]
pub trait LeaderElector: Send + Sync + 'static {
    /// Token for the current leadership, if this process leads right now.
    fn current_token_if_leading(&self) -> Option<LeadershipToken>;

    /// Wait until this process becomes leader. May fail; may block indefinitely.
    async fn block_on_becoming_leader(&self) -> Result<LeadershipToken, CoordinationError>;

    /// Whether `token` still represents current leadership.
    async fn is_still_leading(&self, token: &LeadershipToken) -> Result<StillLeadingStatus, CoordinationError>;

    /// Address of the most recently observed leader, if known.
    fn recently_pinged_leader_host(&self) -> Option<LeaderAddress>;

    /// How often a leader must confirm its leadership through
    /// [`is_still_leading`](Self::is_still_leading) to keep it. `None` when
    /// leadership does not lapse on its own.
    fn renewal_interval(&self) -> Option<Duration> {
        None
    }
}
