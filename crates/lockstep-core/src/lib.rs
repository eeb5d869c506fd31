//! Store-boundary traits and types for the lockstep coordination layer.
//!
//! The coordination store itself (an etcd-like service with linearizable key
//! ordering, watchable keys, and server-managed leases) is an external
//! collaborator. This crate pins down the seam the rest of the workspace
//! programs against:
//!
//! - [`CoordinationStore`] - leases, blocking mutex acquisition, leader
//!   campaign/observe/resign over named key paths
//! - [`StoreConnector`] - factory that turns connection options into a live
//!   store handle
//! - [`StoreError`] - typed failures crossing the seam
//!
//! The wire client (TLS handshakes, endpoint dialing, reconnection) lives
//! behind [`StoreConnector`] implementations and is deliberately out of scope
//! here.

mod error;
mod store;
mod types;

pub use error::StoreError;
pub use store::CoordinationStore;
pub use store::LeaderObserver;
pub use store::StoreConnector;
pub use types::ConnectOptions;
pub use types::Credentials;
pub use types::GrantedLease;
pub use types::LeaderUpdate;
pub use types::LeaseId;
pub use types::TlsSettings;
pub use types::DEFAULT_REQUEST_TIMEOUT;
pub use types::DEFAULT_SESSION_TTL_SECONDS;
pub use types::DEFAULT_STORE_PORT;
