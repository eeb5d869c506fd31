//! Connectors backed by the deterministic store.

use std::sync::Arc;

use async_trait::async_trait;
use lockstep_core::ConnectOptions;
use lockstep_core::CoordinationStore;
use lockstep_core::StoreConnector;
use lockstep_core::StoreError;

use crate::store::DeterministicCoordinationStore;

/// Connector that hands out fresh handles to a shared in-memory hub.
///
/// Each `connect` call models one process establishing its own connection to
/// the same store cluster, so independently "connected" clients contend for
/// the same mutexes and elections.
pub struct DeterministicConnector {
    hub: Arc<DeterministicCoordinationStore>,
}

impl DeterministicConnector {
    /// Create a connector over an existing hub.
    pub fn new(hub: Arc<DeterministicCoordinationStore>) -> Self {
        Self { hub }
    }

    /// The hub this connector hands out handles to.
    pub fn hub(&self) -> &Arc<DeterministicCoordinationStore> {
        &self.hub
    }
}

#[async_trait]
impl StoreConnector for DeterministicConnector {
    async fn connect(&self, options: &ConnectOptions) -> Result<Arc<dyn CoordinationStore>, StoreError> {
        if options.endpoints.is_empty() {
            return Err(StoreError::Unreachable {
                reason: "no endpoints configured".to_string(),
            });
        }
        Ok(self.hub.handle())
    }
}

/// Connector that never connects, for exercising connection-failure paths.
pub struct UnreachableConnector;

#[async_trait]
impl StoreConnector for UnreachableConnector {
    async fn connect(&self, options: &ConnectOptions) -> Result<Arc<dyn CoordinationStore>, StoreError> {
        Err(StoreError::Unreachable {
            reason: format!("no route to {:?}", options.endpoints),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn options(endpoints: &[&str]) -> ConnectOptions {
        ConnectOptions {
            endpoints: endpoints.iter().map(|e| e.to_string()).collect(),
            tls: None,
            credentials: None,
            request_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn connect_yields_working_handle() {
        let hub = DeterministicCoordinationStore::new();
        let connector = DeterministicConnector::new(hub);

        let store = connector.connect(&options(&["127.0.0.1:2379"])).await.unwrap();
        store.grant_lease(None).await.unwrap();
    }

    #[tokio::test]
    async fn connect_rejects_empty_endpoints() {
        let hub = DeterministicCoordinationStore::new();
        let connector = DeterministicConnector::new(hub);

        // The Ok side is a trait object, so destructure instead of unwrapping.
        match connector.connect(&options(&[])).await {
            Err(err) => assert!(matches!(err, StoreError::Unreachable { .. })),
            Ok(_) => panic!("connect must fail with no endpoints"),
        }
    }

    #[tokio::test]
    async fn unreachable_connector_always_fails() {
        match UnreachableConnector.connect(&options(&["10.0.0.1:2379"])).await {
            Err(err) => assert!(matches!(err, StoreError::Unreachable { .. })),
            Ok(_) => panic!("unreachable connector must never connect"),
        }
    }
}
