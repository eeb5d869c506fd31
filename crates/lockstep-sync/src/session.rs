//! Sessions: server-managed leases kept alive by a background refresher.

use std::sync::Arc;
use std::time::Duration;

use lockstep_core::CoordinationStore;
use lockstep_core::LeaseId;
use lockstep_core::StoreError;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

/// Lower bound on the keepalive cadence for very short leases.
const MIN_KEEPALIVE_INTERVAL: Duration = Duration::from_millis(100);

/// A TTL-bound liveness token backing locks and election candidacy.
///
/// While the session is open, a background task refreshes the lease so the
/// store keeps everything anchored to it alive. If this process stops
/// renewing (crash, partition), the store releases the session's mutexes and
/// election claims once the TTL elapses; that expiry is the sole recovery
/// mechanism for crash scenarios.
///
/// Dropping a `Session` without calling [`Session::close`] abandons the
/// lease: renewal stops but the lease is not revoked, so dependents are
/// released only after the TTL runs out.
pub struct Session {
    store: Arc<dyn CoordinationStore>,
    lease: LeaseId,
    ttl_seconds: u32,
    keepalive: CancellationToken,
}

impl Session {
    /// Grant a lease and start its keepalive loop.
    ///
    /// `ttl_seconds = None` accepts the store's default TTL.
    pub async fn open(store: Arc<dyn CoordinationStore>, ttl_seconds: Option<u32>) -> Result<Self, StoreError> {
        let granted = store.grant_lease(ttl_seconds).await?;
        let keepalive = CancellationToken::new();

        // Renew at a third of the TTL so a single missed tick is harmless.
        let interval =
            Duration::from_millis(u64::from(granted.ttl_seconds) * 1000 / 3).max(MIN_KEEPALIVE_INTERVAL);
        tokio::spawn(run_keepalive_loop(store.clone(), granted.id, interval, keepalive.clone()));

        Ok(Self {
            store,
            lease: granted.id,
            ttl_seconds: granted.ttl_seconds,
            keepalive,
        })
    }

    /// The store-assigned lease identifier.
    pub fn lease(&self) -> LeaseId {
        self.lease
    }

    /// The TTL granted by the store, in seconds.
    pub fn ttl_seconds(&self) -> u32 {
        self.ttl_seconds
    }

    /// Stop renewing and revoke the lease, releasing everything anchored to
    /// it server-side. A lease the store already expired counts as closed.
    pub async fn close(self) -> Result<(), StoreError> {
        self.keepalive.cancel();
        match self.store.revoke_lease(self.lease).await {
            Err(err) if err.is_lease_gone() => Ok(()),
            other => other,
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Abandon: the lease is left to expire on its own.
        self.keepalive.cancel();
    }
}

/// Refresh the lease until cancelled or until the lease is gone.
async fn run_keepalive_loop(
    store: Arc<dyn CoordinationStore>,
    lease: LeaseId,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately; skip it, the lease was just granted.
    ticker.tick().await;

    debug!(lease = %lease, interval_ms = interval.as_millis() as u64, "session keepalive started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(lease = %lease, "session keepalive stopped");
                return;
            }
            _ = ticker.tick() => {
                match store.keepalive(lease).await {
                    Ok(ttl_seconds) => {
                        debug!(lease = %lease, ttl_seconds, "lease renewed");
                    }
                    Err(err) if err.is_lease_gone() => {
                        warn!(lease = %lease, error = %err, "lease gone, stopping keepalive");
                        return;
                    }
                    Err(err) => {
                        // Transient failure: keep trying until the lease
                        // either recovers or expires server-side.
                        warn!(lease = %lease, error = %err, "lease renewal failed");
                    }
                }
            }
        }
    }
}
