//! The coordination-store trait seam.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::StoreError;
use crate::types::ConnectOptions;
use crate::types::GrantedLease;
use crate::types::LeaderUpdate;
use crate::types::LeaseId;

/// Ordered stream of values observed at an election path.
///
/// The stream first yields the current value (if the path has one), then each
/// subsequent change in publication order. It ends when the store handle is
/// closed; an open election with a stable leader keeps the stream open and
/// silent.
pub type LeaderObserver = mpsc::UnboundedReceiver<LeaderUpdate>;

/// Client-side handle to a consistent, lease-capable coordination store.
///
/// Implementations provide linearizable ordering per key path. Blocking
/// operations (`acquire`, `campaign`) suspend the calling task until granted
/// or until they fail; cancellation is caller-driven by dropping the future.
/// There is no implicit timeout.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Grant a lease. `ttl_seconds = None` accepts the store default;
    /// `Some(0)` is rejected with [`StoreError::InvalidTtl`].
    async fn grant_lease(&self, ttl_seconds: Option<u32>) -> Result<GrantedLease, StoreError>;

    /// Refresh a lease, resetting its deadline to TTL from now.
    /// Returns the TTL in effect after the refresh.
    async fn keepalive(&self, lease: LeaseId) -> Result<u32, StoreError>;

    /// Revoke a lease, releasing every mutex and election claim anchored to
    /// it and promoting any waiters.
    async fn revoke_lease(&self, lease: LeaseId) -> Result<(), StoreError>;

    /// Acquire the mutex at `path` on behalf of `lease`.
    ///
    /// Suspends until the mutex is granted or the operation fails (connection
    /// loss, lease expiry while waiting). Waiters are served in arrival
    /// order as the store observes it.
    async fn acquire(&self, path: &str, lease: LeaseId) -> Result<(), StoreError>;

    /// Release the mutex at `path` held by `lease`. Fails with
    /// [`StoreError::NotHeld`] when the lease does not hold it.
    async fn release(&self, path: &str, lease: LeaseId) -> Result<(), StoreError>;

    /// Campaign for leadership at `path`, publishing `value` once won.
    ///
    /// Suspends until this candidate's value is the one stored at the path
    /// or the operation fails. No automatic re-campaign is performed.
    async fn campaign(&self, path: &str, lease: LeaseId, value: &str) -> Result<(), StoreError>;

    /// Clear the value at `path` if it is `value` published under `lease`,
    /// promoting the next candidate. A no-op when leadership is not held.
    async fn resign(&self, path: &str, lease: LeaseId, value: &str) -> Result<(), StoreError>;

    /// Subscribe to the sequence of values published at `path`.
    async fn observe(&self, path: &str) -> Result<LeaderObserver, StoreError>;

    /// Close the handle. Idempotent; pending blocking calls fail with
    /// [`StoreError::ConnectionClosed`].
    async fn close(&self);
}

// Blanket implementation for Arc<T>
#[async_trait]
impl<T: CoordinationStore + ?Sized> CoordinationStore for Arc<T> {
    async fn grant_lease(&self, ttl_seconds: Option<u32>) -> Result<GrantedLease, StoreError> {
        (**self).grant_lease(ttl_seconds).await
    }

    async fn keepalive(&self, lease: LeaseId) -> Result<u32, StoreError> {
        (**self).keepalive(lease).await
    }

    async fn revoke_lease(&self, lease: LeaseId) -> Result<(), StoreError> {
        (**self).revoke_lease(lease).await
    }

    async fn acquire(&self, path: &str, lease: LeaseId) -> Result<(), StoreError> {
        (**self).acquire(path, lease).await
    }

    async fn release(&self, path: &str, lease: LeaseId) -> Result<(), StoreError> {
        (**self).release(path, lease).await
    }

    async fn campaign(&self, path: &str, lease: LeaseId, value: &str) -> Result<(), StoreError> {
        (**self).campaign(path, lease, value).await
    }

    async fn resign(&self, path: &str, lease: LeaseId, value: &str) -> Result<(), StoreError> {
        (**self).resign(path, lease, value).await
    }

    async fn observe(&self, path: &str) -> Result<LeaderObserver, StoreError> {
        (**self).observe(path).await
    }

    async fn close(&self) {
        (**self).close().await
    }
}

/// Factory that turns normalized connection options into a live store handle.
///
/// This is the boundary to the external wire client: dialing, TLS handshakes
/// and credential negotiation happen behind it. Building a handle fails with
/// [`StoreError::Unreachable`] when no endpoint responds.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    /// Establish a connection and return the store handle.
    async fn connect(&self, options: &ConnectOptions) -> Result<Arc<dyn CoordinationStore>, StoreError>;
}
