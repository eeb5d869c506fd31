//! Leader election: campaign, observe, resign.
//!
//! State machine per election path:
//! `Idle -> Campaigning -> Leader -> {Resigned | Superseded}`.
//! Campaigning blocks until the store publishes this candidate's value at
//! the path; Superseded is reached asynchronously when an observer sees a
//! different value there (session expiry or external intervention — under
//! correct single-writer usage a live leader is never overwritten).

use std::sync::Arc;
use std::time::Duration;

use lockstep_core::CoordinationStore;
use lockstep_core::LeaderObserver;
use snafu::ResultExt;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::error::AcquisitionSnafu;
use crate::error::SyncError;
use crate::path::election_path;
use crate::Session;

/// Per-call options for [`ElectionCoordinator::campaign`].
#[derive(Debug, Clone, Default)]
pub struct ElectionOptions {
    /// TTL requested for the backing session. `None` (or zero) accepts the
    /// configured or store default.
    pub ttl: Option<Duration>,
    /// Value published at the election path once leadership is won. Defaults
    /// to the election id itself, which matches deployments where one
    /// process per role campaigns; set a per-process value when several
    /// candidates share an election and need loss detection to distinguish
    /// them.
    pub candidate: Option<String>,
}

impl ElectionOptions {
    /// Options publishing a distinct candidate value.
    pub fn with_candidate(candidate: impl Into<String>) -> Self {
        Self {
            ttl: None,
            candidate: Some(candidate.into()),
        }
    }

    fn ttl_seconds(&self) -> Option<u32> {
        match self.ttl {
            Some(ttl) if !ttl.is_zero() => Some(u32::try_from(ttl.as_secs()).unwrap_or(u32::MAX).max(1)),
            _ => None,
        }
    }
}

/// Runs the campaign protocol for named elections under a key prefix.
pub struct ElectionCoordinator {
    store: Arc<dyn CoordinationStore>,
    prefix: String,
    default_ttl_seconds: Option<u32>,
}

impl ElectionCoordinator {
    /// Create a coordinator over a connected store handle.
    pub fn new(store: Arc<dyn CoordinationStore>, prefix: impl Into<String>, default_ttl_seconds: Option<u32>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            default_ttl_seconds,
        }
    }

    /// Campaign for leadership of the election named `id`, blocking until
    /// this candidate's value is the one stored at the election path.
    ///
    /// No automatic re-campaign happens on failure or loss; connection loss
    /// mid-campaign surfaces as an error. A call with no external
    /// cancellation can block indefinitely while another leader exists.
    pub async fn campaign(&self, id: &str, options: ElectionOptions) -> Result<LeaderHandle, SyncError> {
        let path = election_path(&self.prefix, id);
        let value = options.candidate.clone().unwrap_or_else(|| id.to_string());
        let ttl_seconds = options.ttl_seconds().or(self.default_ttl_seconds);

        let session =
            Session::open(self.store.clone(), ttl_seconds).await.context(AcquisitionSnafu { path: path.clone() })?;

        if let Err(source) = self.store.campaign(&path, session.lease(), &value).await {
            // Do not leak the lease behind a failed campaign.
            if let Err(close_err) = session.close().await {
                warn!(id, path, error = %close_err, "failed to close session after campaign error");
            }
            return Err(SyncError::Acquisition { path, source });
        }

        info!(id, candidate = %value, path, "leadership acquired");
        Ok(LeaderHandle {
            store: self.store.clone(),
            path,
            candidate: value,
            session: Mutex::new(Some(session)),
        })
    }
}

/// Held leadership of one election.
///
/// Valid until [`LeaderHandle::resign`] or until the backing session
/// expires, at which point the store hands leadership to the next candidate.
pub struct LeaderHandle {
    store: Arc<dyn CoordinationStore>,
    path: String,
    candidate: String,
    session: Mutex<Option<Session>>,
}

// Manual impl: the store is a trait object without a Debug bound.
impl std::fmt::Debug for LeaderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaderHandle")
            .field("path", &self.path)
            .field("candidate", &self.candidate)
            .finish_non_exhaustive()
    }
}

impl LeaderHandle {
    /// The value this candidate published at the election path.
    pub fn candidate(&self) -> &str {
        &self.candidate
    }

    /// The election path this handle campaigned on.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Subscribe to leadership loss.
    ///
    /// Spawns a watcher over the election path that ignores echoes of this
    /// candidate's own value and signals once, on the first differing value,
    /// then stops. The subscription owns the watcher: dropping it cancels
    /// the task, so an abandoned subscription cannot leak.
    pub async fn status(&self) -> Result<StatusSubscription, SyncError> {
        let updates = self.store.observe(&self.path).await.map_err(|source| SyncError::Connection { source })?;
        let (tx, rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        tokio::spawn(watch_for_loss(updates, self.candidate.clone(), tx, cancel.clone()));
        Ok(StatusSubscription { rx, cancel })
    }

    /// Voluntarily release leadership.
    ///
    /// Clears the election value only if it is still this candidate's, then
    /// revokes the backing session. Idempotent: resigning again (or after
    /// the session already expired) is an Ok no-op.
    pub async fn resign(&self) -> Result<(), SyncError> {
        let Some(session) = self.session.lock().await.take() else {
            return Ok(());
        };

        let resigned = self.store.resign(&self.path, session.lease(), &self.candidate).await;
        let closed = session.close().await;

        let result = resigned.and(closed).map_err(|source| SyncError::Release {
            path: self.path.clone(),
            source,
        });
        if result.is_ok() {
            info!(candidate = %self.candidate, path = %self.path, "leadership resigned");
        }
        result
    }

    /// True when this handle has already resigned.
    pub async fn has_resigned(&self) -> bool {
        self.session.lock().await.is_none()
    }
}

/// One-shot leadership-loss subscription.
///
/// Yields at most one `true` over its lifetime, after which the channel is
/// closed. While leadership holds, the channel stays open and silent.
pub struct StatusSubscription {
    rx: mpsc::Receiver<bool>,
    cancel: CancellationToken,
}

impl StatusSubscription {
    /// Wait for the loss signal.
    ///
    /// Returns `Some(true)` when leadership was lost, or `None` once the
    /// subscription is finished (signal already delivered, watcher cancelled,
    /// or the observation stream ended).
    pub async fn recv(&mut self) -> Option<bool> {
        self.rx.recv().await
    }

    /// Stop watching without waiting for a signal.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for StatusSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Watch observed values until one differs from our own, then signal once.
async fn watch_for_loss(
    mut updates: LeaderObserver,
    candidate: String,
    tx: mpsc::Sender<bool>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            update = updates.recv() => match update {
                Some(update) if update.value != candidate => {
                    debug!(candidate = %candidate, observed = %update.value, "leadership lost");
                    let _ = tx.send(true).await;
                    return;
                }
                // An echo of our own campaign write; keep watching.
                Some(_) => {}
                None => return,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use lockstep_testing::DeterministicCoordinationStore;

    use super::*;

    fn coordinator(hub: &Arc<DeterministicCoordinationStore>) -> ElectionCoordinator {
        ElectionCoordinator::new(hub.handle(), "/lockstep/sync", None)
    }

    #[test]
    fn ttl_conversion_clamps_at_both_ends() {
        let tiny = ElectionOptions {
            ttl: Some(Duration::from_millis(10)),
            candidate: None,
        };
        assert_eq!(tiny.ttl_seconds(), Some(1));

        let huge = ElectionOptions {
            ttl: Some(Duration::from_secs(u64::MAX)),
            candidate: None,
        };
        assert_eq!(huge.ttl_seconds(), Some(u32::MAX));
    }

    #[tokio::test]
    async fn uncontested_campaign_wins_immediately() {
        let hub = DeterministicCoordinationStore::new();
        let elections = coordinator(&hub);

        let leader = tokio::time::timeout(Duration::from_secs(1), elections.campaign("group-1", ElectionOptions::default()))
            .await
            .expect("uncontested campaign must not block")
            .unwrap();
        assert_eq!(leader.candidate(), "group-1");
        leader.resign().await.unwrap();
    }

    #[tokio::test]
    async fn leader_handle_is_debuggable_without_a_debug_store() {
        let hub = DeterministicCoordinationStore::new();
        let elections = coordinator(&hub);

        let leader = elections.campaign("group-1", ElectionOptions::default()).await.unwrap();
        let text = format!("{leader:?}");
        assert!(text.contains("LeaderHandle"));
        assert!(text.contains("group-1"));
        leader.resign().await.unwrap();
    }

    #[tokio::test]
    async fn resign_is_idempotent() {
        let hub = DeterministicCoordinationStore::new();
        let elections = coordinator(&hub);

        let leader = elections.campaign("group-1", ElectionOptions::default()).await.unwrap();
        leader.resign().await.unwrap();
        leader.resign().await.unwrap();
        assert!(leader.has_resigned().await);
    }

    #[tokio::test]
    async fn status_stays_silent_while_leadership_holds() {
        let hub = DeterministicCoordinationStore::new();
        let elections = coordinator(&hub);

        let leader = elections.campaign("group-1", ElectionOptions::default()).await.unwrap();
        let mut status = leader.status().await.unwrap();

        let outcome = tokio::time::timeout(Duration::from_millis(300), status.recv()).await;
        assert!(outcome.is_err(), "no loss signal expected while leading");

        leader.resign().await.unwrap();
    }

    #[tokio::test]
    async fn status_signals_once_when_superseded() {
        let hub = DeterministicCoordinationStore::new();
        let elections = coordinator(&hub);

        let leader = elections.campaign("group-1", ElectionOptions::with_candidate("x")).await.unwrap();
        let mut status = leader.status().await.unwrap();

        // A rival campaigns and takes over once we resign.
        let rival_elections = coordinator(&hub);
        let rival = tokio::spawn(async move {
            rival_elections.campaign("group-1", ElectionOptions::with_candidate("y")).await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        leader.resign().await.unwrap();

        assert_eq!(status.recv().await, Some(true));
        // One-shot: the channel is closed after the signal.
        assert_eq!(status.recv().await, None);

        let rival = rival.await.unwrap().unwrap();
        rival.resign().await.unwrap();
    }

    #[tokio::test]
    async fn abandoned_subscription_cancels_its_watcher() {
        let hub = DeterministicCoordinationStore::new();
        let elections = coordinator(&hub);

        let leader = elections.campaign("group-1", ElectionOptions::default()).await.unwrap();
        let status = leader.status().await.unwrap();
        let cancel = status.cancel.clone();
        drop(status);
        assert!(cancel.is_cancelled());

        leader.resign().await.unwrap();
    }

    #[tokio::test]
    async fn campaign_failure_surfaces_as_acquisition_error() {
        let hub = DeterministicCoordinationStore::new();
        let elections = coordinator(&hub);

        let holder = elections.campaign("group-1", ElectionOptions::with_candidate("x")).await.unwrap();

        let contender = coordinator(&hub);
        let pending = tokio::spawn(async move {
            contender.campaign("group-1", ElectionOptions::with_candidate("y")).await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        hub.shut_down().await;

        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, SyncError::Acquisition { .. }));
        drop(holder);
    }
}
