//! Client configuration and the top-level coordination client.

use std::sync::Arc;
use std::time::Duration;

use lockstep_core::ConnectOptions;
use lockstep_core::CoordinationStore;
use lockstep_core::Credentials;
use lockstep_core::StoreConnector;
use lockstep_core::TlsSettings;
use lockstep_core::DEFAULT_REQUEST_TIMEOUT;
use lockstep_core::DEFAULT_STORE_PORT;
use serde::Deserialize;
use serde::Serialize;
use tracing::info;

use crate::election::ElectionCoordinator;
use crate::election::ElectionOptions;
use crate::election::LeaderHandle;
use crate::error::SyncError;
use crate::lock::LockManager;
use crate::lock::LockOptions;
use crate::Session;

/// Configuration for [`CoordinationClient::connect`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Store endpoints, as `host`, `host:port`, or a `http(s)://` URL whose
    /// scheme is stripped during normalization. Empty entries are skipped.
    pub endpoints: Vec<String>,
    /// Force TLS even when no explicit TLS settings are given.
    pub secure: bool,
    /// TLS settings. Presence implies a secure connection.
    pub tls: Option<TlsSettings>,
    /// Optional username/password authentication.
    pub credentials: Option<Credentials>,
    /// Per-request deadline applied by the store transport.
    pub request_timeout: Duration,
    /// Key prefix under which locks and elections are namespaced.
    pub prefix: String,
    /// Default session TTL, in seconds. `None` accepts the store default.
    pub session_ttl_seconds: Option<u32>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![format!("127.0.0.1:{DEFAULT_STORE_PORT}")],
            secure: false,
            tls: None,
            credentials: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            prefix: "/lockstep/sync".to_string(),
            session_ttl_seconds: None,
        }
    }
}

impl ClientConfig {
    /// Whether the connection should use TLS. Explicit TLS settings imply
    /// secure even when the flag is unset.
    pub fn is_secure(&self) -> bool {
        self.secure || self.tls.is_some()
    }

    /// Normalize the configured endpoints.
    ///
    /// Scheme prefixes are stripped, the default store port is appended to
    /// bare hosts, and blank or malformed entries are dropped. When the
    /// connection is secure, every endpoint is rewritten to the `https://`
    /// scheme. Errors when nothing usable remains.
    pub fn normalized_endpoints(&self) -> Result<Vec<String>, SyncError> {
        let secure = self.is_secure();
        let endpoints: Vec<String> = self
            .endpoints
            .iter()
            .filter_map(|endpoint| normalize_endpoint(endpoint))
            .map(|endpoint| if secure { format!("https://{endpoint}") } else { endpoint })
            .collect();
        if endpoints.is_empty() {
            return Err(SyncError::InvalidEndpoints);
        }
        Ok(endpoints)
    }

    fn connect_options(&self) -> Result<ConnectOptions, SyncError> {
        let tls = if self.is_secure() { Some(self.tls.clone().unwrap_or_default()) } else { None };
        Ok(ConnectOptions {
            endpoints: self.normalized_endpoints()?,
            tls,
            credentials: self.credentials.clone(),
            request_timeout: self.request_timeout,
        })
    }
}

fn normalize_endpoint(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let without_scheme = trimmed.strip_prefix("https://").or_else(|| trimmed.strip_prefix("http://")).unwrap_or(trimmed);
    if without_scheme.is_empty() {
        return None;
    }
    match explicit_port(without_scheme)? {
        true => Some(without_scheme.to_string()),
        false => Some(format!("{without_scheme}:{DEFAULT_STORE_PORT}")),
    }
}

/// Whether `authority` already carries an explicit port, or `None` when the
/// authority is malformed. An IPv6 literal must be bracketed: appending a
/// port to a bare `::1` would produce an unparseable `::1:2379`.
fn explicit_port(authority: &str) -> Option<bool> {
    if let Some(rest) = authority.strip_prefix('[') {
        return match rest.split_once(']') {
            Some((_, "")) => Some(false),
            Some((_, suffix)) => suffix.starts_with(':').then_some(true),
            None => None,
        };
    }
    match authority.matches(':').count() {
        0 => Some(false),
        1 => Some(true),
        _ => None,
    }
}

/// Coordination client bundling a store connection with lock and election
/// facades that share its key prefix and default TTL.
pub struct CoordinationClient {
    store: Arc<dyn CoordinationStore>,
    config: ClientConfig,
    locks: LockManager,
    elections: ElectionCoordinator,
}

// Manual impl: the store is a trait object without a Debug bound.
impl std::fmt::Debug for CoordinationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinationClient").field("config", &self.config).finish_non_exhaustive()
    }
}

impl CoordinationClient {
    /// Connect to the store described by `config`.
    pub async fn connect(config: ClientConfig, connector: &dyn StoreConnector) -> Result<Self, SyncError> {
        let options = config.connect_options()?;
        let store = connector.connect(&options).await.map_err(|source| SyncError::Connection { source })?;
        info!(endpoints = ?options.endpoints, prefix = %config.prefix, "connected to coordination store");
        Ok(Self::from_store(store, config))
    }

    fn from_store(store: Arc<dyn CoordinationStore>, config: ClientConfig) -> Self {
        let locks = LockManager::new(store.clone(), config.prefix.clone(), config.session_ttl_seconds);
        let elections = ElectionCoordinator::new(store.clone(), config.prefix.clone(), config.session_ttl_seconds);
        Self {
            store,
            config,
            locks,
            elections,
        }
    }

    /// Tear down the current connection and establish a fresh one with the
    /// same configuration. Held locks and leaderships are lost: their
    /// sessions die with the old connection.
    pub async fn reconnect(&mut self, connector: &dyn StoreConnector) -> Result<(), SyncError> {
        self.store.close().await;
        let options = self.config.connect_options()?;
        let store = connector.connect(&options).await.map_err(|source| SyncError::Connection { source })?;
        info!(endpoints = ?options.endpoints, "reconnected to coordination store");
        *self = Self::from_store(store, self.config.clone());
        Ok(())
    }

    /// Close the underlying store connection. Further operations fail until
    /// [`CoordinationClient::reconnect`] succeeds.
    pub async fn close(&self) {
        self.store.close().await;
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Open a standalone session on this client's connection.
    pub async fn new_session(&self, ttl: Option<Duration>) -> Result<Session, SyncError> {
        let ttl_seconds = match ttl {
            Some(ttl) if !ttl.is_zero() => Some(u32::try_from(ttl.as_secs()).unwrap_or(u32::MAX).max(1)),
            _ => self.config.session_ttl_seconds,
        };
        Session::open(self.store.clone(), ttl_seconds).await.map_err(|source| SyncError::Connection { source })
    }

    /// The lock facade sharing this client's prefix.
    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    /// The election facade sharing this client's prefix.
    pub fn elections(&self) -> &ElectionCoordinator {
        &self.elections
    }

    /// Acquire the named distributed mutex. See [`LockManager::lock`].
    pub async fn lock(&self, id: &str, options: LockOptions) -> Result<(), SyncError> {
        self.locks.lock(id, options).await
    }

    /// Release the named distributed mutex. See [`LockManager::unlock`].
    pub async fn unlock(&self, id: &str) -> Result<(), SyncError> {
        self.locks.unlock(id).await
    }

    /// Campaign for the named election. See [`ElectionCoordinator::campaign`].
    pub async fn campaign(&self, id: &str, options: ElectionOptions) -> Result<LeaderHandle, SyncError> {
        self.elections.campaign(id, options).await
    }
}
