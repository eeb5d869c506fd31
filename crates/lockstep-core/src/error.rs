//! Error types crossing the coordination-store boundary.

use snafu::Snafu;

use crate::types::LeaseId;

/// Errors surfaced by [`crate::CoordinationStore`] implementations.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    /// No endpoint could be reached or authenticated against.
    #[snafu(display("coordination store unreachable: {reason}"))]
    Unreachable {
        /// Why the connection attempt failed.
        reason: String,
    },

    /// The store handle was closed; in-flight and subsequent calls fail.
    #[snafu(display("coordination store connection closed"))]
    ConnectionClosed,

    /// The lease does not exist (never granted, revoked, or expired and
    /// garbage-collected).
    #[snafu(display("{lease} not found"))]
    LeaseNotFound {
        /// The lease that was referenced.
        lease: LeaseId,
    },

    /// The lease expired while an operation anchored to it was in flight.
    #[snafu(display("{lease} expired"))]
    LeaseExpired {
        /// The lease that expired.
        lease: LeaseId,
    },

    /// A requested TTL was outside the store's accepted range.
    #[snafu(display("invalid lease ttl: {ttl_seconds}s"))]
    InvalidTtl {
        /// The rejected TTL value.
        ttl_seconds: u32,
    },

    /// Release or resign was attempted on a path the lease does not hold.
    #[snafu(display("path '{path}' not held by {lease}"))]
    NotHeld {
        /// The mutex or election path.
        path: String,
        /// The lease that attempted the release.
        lease: LeaseId,
    },
}

impl StoreError {
    /// True when the error indicates the lease is gone (expired or revoked),
    /// so releasing resources anchored to it is already moot.
    pub fn is_lease_gone(&self) -> bool {
        matches!(self, StoreError::LeaseNotFound { .. } | StoreError::LeaseExpired { .. })
    }
}
