//! Timestamp service that only serves while this process leads.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::allocator::TimestampService;
use crate::coordinator::LeadershipCoordinator;
use crate::elector::LeaderElector;
use crate::elector::LeadershipToken;
use crate::elector::StillLeadingStatus;
use crate::error::CoordinationError;
use crate::types::TimestampRange;

/// Builds the delegate serving one leadership term.
pub type DelegateFactory<T> = Arc<dyn Fn() -> Arc<T> + Send + Sync>;

enum Delegate<T: ?Sized> {
    Fixed(Arc<T>),
    PerTerm {
        factory: DelegateFactory<T>,
        current: Mutex<Option<(LeadershipToken, Arc<T>)>>,
    },
}

/// Wraps a [`TimestampService`] so calls fail with `NotCurrentLeader` unless a
/// leadership token is installed.
///
/// A `MultipleWriters` failure from the inner service means another process
/// has been advancing the bound, so the token is marked lost. Any other
/// failure is checked against the elector: if leadership has ended meanwhile
/// the caller is redirected instead of seeing the inner error.
///
/// Built with [`per_term`](Self::per_term), each leadership term gets a fresh
/// delegate, so state cached by a previous term (an allocator's reservation)
/// is never reused after another leader may have advanced the bound.
pub struct LeaderGatedTimestampService<T: TimestampService + ?Sized, E: LeaderElector + ?Sized> {
    delegate: Delegate<T>,
    coordinator: Arc<LeadershipCoordinator<E>>,
}

impl<T: TimestampService + ?Sized, E: LeaderElector + ?Sized> LeaderGatedTimestampService<T, E> {
    /// Gate a single long-lived delegate.
    pub fn new(inner: Arc<T>, coordinator: Arc<LeadershipCoordinator<E>>) -> Self {
        Self {
            delegate: Delegate::Fixed(inner),
            coordinator,
        }
    }

    /// Gate a delegate rebuilt by `factory` whenever the leadership token changes.
    pub fn per_term(factory: DelegateFactory<T>, coordinator: Arc<LeadershipCoordinator<E>>) -> Self {
        Self {
            delegate: Delegate::PerTerm {
                factory,
                current: Mutex::new(None),
            },
            coordinator,
        }
    }

    pub fn coordinator(&self) -> &Arc<LeadershipCoordinator<E>> {
        &self.coordinator
    }

    fn delegate_for(&self, token: &LeadershipToken) -> Arc<T> {
        match &self.delegate {
            Delegate::Fixed(inner) => inner.clone(),
            Delegate::PerTerm { factory, current } => {
                let mut current = current.lock();
                match current.as_ref() {
                    Some((term, inner)) if term == token => inner.clone(),
                    _ => {
                        debug!(%token, "building delegate for new leadership term");
                        let inner = factory();
                        *current = Some((token.clone(), inner.clone()));
                        inner
                    }
                }
            }
        }
    }

    async fn gated<R, F, Fut>(&self, operation: &'static str, call: F) -> Result<R, CoordinationError>
    where
        F: FnOnce(Arc<T>) -> Fut + Send,
        Fut: Future<Output = Result<R, CoordinationError>> + Send,
        R: Send,
    {
        let token = self.coordinator.current_leadership_token()?;
        let inner = self.delegate_for(&token);
        let error = match call(inner).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if error.is_multiple_writers() {
            self.coordinator.mark_as_not_leading(&token, &error);
            return Err(error);
        }

        match self.coordinator.is_still_leading(&token).await {
            Ok(StillLeadingStatus::Leading) => Err(error),
            Ok(status) => {
                debug!(operation, ?status, error = %error, "call failed after leadership ended");
                Err(self.coordinator.not_current_leader_error(format!("leadership ended during {operation}")))
            }
            Err(e) => {
                debug!(operation, error = %e, "leadership check failed");
                Err(error)
            }
        }
    }
}

#[async_trait]
impl<T, E> TimestampService for LeaderGatedTimestampService<T, E>
where
    T: TimestampService + ?Sized,
    E: LeaderElector + ?Sized,
{
    async fn fresh_timestamp(&self) -> Result<u64, CoordinationError> {
        self.gated("fresh_timestamp", |inner| async move { inner.fresh_timestamp().await }).await
    }

    async fn fresh_timestamps(&self, count: u64) -> Result<TimestampRange, CoordinationError> {
        self.gated("fresh_timestamps", |inner| async move { inner.fresh_timestamps(count).await }).await
    }

    async fn fast_forward(&self, timestamp: u64) -> Result<(), CoordinationError> {
        self.gated("fast_forward", |inner| async move { inner.fast_forward(timestamp).await }).await
    }
}
