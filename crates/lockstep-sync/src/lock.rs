//! Named distributed mutexes tied to session liveness.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use lockstep_core::CoordinationStore;
use snafu::ResultExt;
use tokio::sync::Mutex;
use tracing::info;
use tracing::warn;

use crate::error::AcquisitionSnafu;
use crate::error::SyncError;
use crate::path::lock_path;
use crate::Session;

/// Per-call options for [`LockManager::lock`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LockOptions {
    /// TTL requested for the backing session. `None` (or a zero duration)
    /// accepts the configured or store default.
    pub ttl: Option<Duration>,
}

impl LockOptions {
    /// Options requesting a specific session TTL.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self { ttl: Some(ttl) }
    }

    fn ttl_seconds(&self) -> Option<u32> {
        match self.ttl {
            Some(ttl) if !ttl.is_zero() => Some(u32::try_from(ttl.as_secs()).unwrap_or(u32::MAX).max(1)),
            _ => None,
        }
    }
}

/// A lock this process currently believes it holds.
struct HeldLock {
    session: Session,
    path: String,
}

/// Maps caller-supplied lock ids to the (session, mutex) pairs held by this
/// process.
///
/// The table is not a cache of global lock state: it holds exactly the locks
/// this process acquired and has not released. All table reads and writes
/// happen under a single guard; the blocking store-side acquisition happens
/// outside it, so callers locking different ids never serialize on each
/// other's waits. If the process dies, the table dies with it and the store
/// releases each lock once its session TTL elapses.
pub struct LockManager {
    store: Arc<dyn CoordinationStore>,
    prefix: String,
    default_ttl_seconds: Option<u32>,
    held: Mutex<HashMap<String, HeldLock>>,
}

impl LockManager {
    /// Create a manager over a connected store handle.
    pub fn new(store: Arc<dyn CoordinationStore>, prefix: impl Into<String>, default_ttl_seconds: Option<u32>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            default_ttl_seconds,
            held: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the distributed mutex for `id`, blocking until granted.
    ///
    /// A fresh session backs each lock; if the caller supplies a TTL it is
    /// requested from the store, otherwise the configured or store default
    /// applies. There is no implicit timeout: a call with no external
    /// cancellation can block indefinitely while another holder exists.
    ///
    /// Success is reported only after the lock is recorded in the local
    /// table. Locking an id this process already holds fails with
    /// [`SyncError::LockHeldLocally`] instead of silently replacing the
    /// tracked entry.
    pub async fn lock(&self, id: &str, options: LockOptions) -> Result<(), SyncError> {
        let path = lock_path(&self.prefix, id);
        if self.held.lock().await.contains_key(id) {
            return Err(SyncError::LockHeldLocally { id: id.to_string() });
        }

        let ttl_seconds = options.ttl_seconds().or(self.default_ttl_seconds);
        let session =
            Session::open(self.store.clone(), ttl_seconds).await.context(AcquisitionSnafu { path: path.clone() })?;

        if let Err(source) = self.store.acquire(&path, session.lease()).await {
            // Do not leak the lease behind a failed acquisition.
            if let Err(close_err) = session.close().await {
                warn!(id, path, error = %close_err, "failed to close session after acquisition error");
            }
            return Err(SyncError::Acquisition { path, source });
        }

        let duplicate = {
            let mut held = self.held.lock().await;
            match held.entry(id.to_string()) {
                Entry::Vacant(slot) => {
                    slot.insert(HeldLock {
                        session,
                        path: path.clone(),
                    });
                    None
                }
                // Lost a race with another local lock(id); undo our acquisition.
                Entry::Occupied(_) => Some(session),
            }
        };

        if let Some(session) = duplicate {
            if let Err(err) = self.store.release(&path, session.lease()).await {
                warn!(id, path, error = %err, "failed to release duplicate acquisition");
            }
            if let Err(err) = session.close().await {
                warn!(id, path, error = %err, "failed to close duplicate session");
            }
            return Err(SyncError::LockHeldLocally { id: id.to_string() });
        }

        info!(id, path, "lock acquired");
        Ok(())
    }

    /// Release the lock for `id`.
    ///
    /// The local entry is removed even when the store-side release fails, so
    /// a broken connection cannot wedge the table; the error is still
    /// surfaced because global state only reconciles once the lease expires.
    /// An id with no tracked lock fails with [`SyncError::LockNotFound`]
    /// without contacting the store.
    pub async fn unlock(&self, id: &str) -> Result<(), SyncError> {
        // Lookup and removal are one atomic step, so concurrent unlocks of
        // the same id cannot double-release.
        let entry = self.held.lock().await.remove(id);
        let Some(entry) = entry else {
            return Err(SyncError::LockNotFound { id: id.to_string() });
        };

        let released = self.store.release(&entry.path, entry.session.lease()).await;
        let closed = entry.session.close().await;

        let result = released.and(closed).map_err(|source| SyncError::Release {
            path: entry.path.clone(),
            source,
        });
        if result.is_ok() {
            info!(id, path = %entry.path, "lock released");
        }
        result
    }

    /// True when this process currently tracks a lock for `id`.
    pub async fn is_held(&self, id: &str) -> bool {
        self.held.lock().await.contains_key(id)
    }

    /// Ids of all locks this process currently tracks.
    pub async fn held_ids(&self) -> Vec<String> {
        self.held.lock().await.keys().cloned().collect()
    }
}
