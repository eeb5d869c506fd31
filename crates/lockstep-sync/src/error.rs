//! Error types for the coordination facade.

use lockstep_core::StoreError;
use snafu::Snafu;

/// Errors surfaced by locks, elections and the coordination client.
///
/// Store-level failures pass through with enough context to distinguish the
/// failing phase; nothing is swallowed or silently retried. The only
/// condition handled internally is lease renewal, whose permanent failure
/// shows up on the next operation against the session.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SyncError {
    /// The coordination store could not be reached or the handle is closed.
    /// Fatal to subsequent calls until a reconnect succeeds.
    #[snafu(display("coordination store connection failed: {source}"))]
    Connection {
        /// The underlying store error.
        source: StoreError,
    },

    /// The configured endpoint list contained no usable entry.
    #[snafu(display("no usable endpoints in configuration"))]
    InvalidEndpoints,

    /// Unlock was called for an id with no locally-tracked lock.
    /// Recoverable; the store is not contacted and no state changes.
    #[snafu(display("no lock held locally for id '{id}'"))]
    LockNotFound {
        /// The caller-supplied lock id.
        id: String,
    },

    /// Lock was called for an id this process already holds.
    #[snafu(display("lock '{id}' is already held by this process"))]
    LockHeldLocally {
        /// The caller-supplied lock id.
        id: String,
    },

    /// Lock or Campaign failed before or during the blocking wait. Any
    /// transiently-created session has been closed; no lease is leaked and
    /// nothing is held.
    #[snafu(display("acquisition failed for '{path}': {source}"))]
    Acquisition {
        /// The mutex or election path.
        path: String,
        /// The underlying store error.
        source: StoreError,
    },

    /// The store-side release or resign failed. Local bookkeeping is already
    /// cleaned up; global state reconciles once the lease expires.
    #[snafu(display("release failed for '{path}': {source}"))]
    Release {
        /// The mutex or election path.
        path: String,
        /// The underlying store error.
        source: StoreError,
    },
}
