//! Shared types crossing the coordination-store boundary.

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

/// Default port of the coordination store when an endpoint omits one.
pub const DEFAULT_STORE_PORT: u16 = 2379;

/// Default per-request timeout applied when configuration leaves it unset.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Lease TTL granted when a session does not request one explicitly.
pub const DEFAULT_SESSION_TTL_SECONDS: u32 = 60;

/// Opaque identifier of a server-managed lease.
///
/// Assigned by the coordination store on grant. Everything anchored to the
/// lease (mutex ownership, election candidacy) is released by the store once
/// the lease expires without renewal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LeaseId(pub u64);

impl LeaseId {
    /// Get the raw lease identifier.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for LeaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "lease-{}", self.0)
    }
}

/// Result of a successful lease grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrantedLease {
    /// The store-assigned lease identifier.
    pub id: LeaseId,
    /// The TTL the store actually granted, in seconds.
    pub ttl_seconds: u32,
}

/// A value observed at an election path.
///
/// Observers see a consistent, non-reordered sequence of these for a given
/// path: the current value first (if any), then each subsequent change in
/// publication order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderUpdate {
    /// The candidate value currently published at the path.
    pub value: String,
}

/// Username/password credential pair forwarded to the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    /// Account name registered with the coordination store.
    pub username: String,
    /// Plain-text password; transport security is the caller's concern.
    pub password: String,
}

/// Transport security settings forwarded to the store connector.
///
/// `accept_invalid_certs` exists for lab deployments only and must be enabled
/// explicitly; the default verifies the server certificate chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TlsSettings {
    /// Skip server certificate verification.
    pub accept_invalid_certs: bool,
    /// Path to a PEM bundle with the CA certificates to trust.
    pub ca_certificate: Option<String>,
    /// Path to the client certificate presented to the store.
    pub client_certificate: Option<String>,
    /// Path to the private key matching `client_certificate`.
    pub client_key: Option<String>,
}

/// Fully-normalized connection options handed to a [`crate::StoreConnector`].
///
/// Endpoints here are already normalized (default port applied, secure scheme
/// rewritten); the connector performs no further endpoint parsing.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Normalized endpoints, non-empty: `host:port`, rewritten to
    /// `https://host:port` when `tls` is set.
    pub endpoints: Vec<String>,
    /// Transport security settings, `None` for plaintext.
    pub tls: Option<TlsSettings>,
    /// Optional store credentials.
    pub credentials: Option<Credentials>,
    /// Per-request timeout for store calls.
    pub request_timeout: Duration,
}
