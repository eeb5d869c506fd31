//! Named distributed mutexes and leader election over a lease-capable
//! coordination store.
//!
//! Safety rests on server-managed leases: every lock hold and every
//! leadership is anchored to a lease whose TTL the store enforces. A
//! keepalive task renews the lease while the holder is alive; when the
//! holder crashes, renewal stops and the store releases everything anchored
//! to the lease, so no resource stays locked forever.
//!
//! Entry point is [`CoordinationClient`], which bundles a store connection
//! with a [`LockManager`] and an [`ElectionCoordinator`] sharing one key
//! prefix. The store itself is abstracted behind
//! [`lockstep_core::CoordinationStore`], with a deterministic in-memory
//! implementation in `lockstep-testing` for simulation tests.

pub mod client;
pub mod election;
pub mod error;
pub mod lock;
pub mod session;

pub(crate) mod path;

pub use client::ClientConfig;
pub use client::CoordinationClient;
pub use election::ElectionCoordinator;
pub use election::ElectionOptions;
pub use election::LeaderHandle;
pub use election::StatusSubscription;
pub use error::SyncError;
pub use lock::LockManager;
pub use lock::LockOptions;
pub use session::Session;
