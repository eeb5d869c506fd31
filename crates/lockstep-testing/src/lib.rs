//! Deterministic in-memory coordination store for testing.
//!
//! Provides a complete [`lockstep_core::CoordinationStore`] implementation
//! with predictable behavior and no network I/O:
//!
//! - `DeterministicCoordinationStore`: shared in-memory hub with leases,
//!   FIFO mutex wait queues, election campaign queues and ordered observers
//! - `DeterministicConnector`: hands out per-connection handles to a shared
//!   hub, so several simulated processes coordinate through one store
//! - `UnreachableConnector`: always fails, for connection-error paths
//!
//! Lease expiry is enforced by a background sweeper, so locks held by a
//! session that stops renewing become acquirable after the TTL elapses, the
//! same way a server-side store reclaims them.

mod connector;
mod store;

pub use connector::DeterministicConnector;
pub use connector::UnreachableConnector;
pub use store::DeterministicCoordinationStore;
pub use store::StoreHandle;
