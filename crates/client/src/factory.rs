//! One client per principal and endpoint
//!
//! [`ClientFactory`] is the scope within which clients are shared. It is
//! constructed explicitly and passed down; there is no process-wide
//! instance. Two factories never share clients.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use stratus_credential::{CredentialSource, Profile};
use tracing::debug;

use crate::cache::CacheEntry;
use crate::client::Client;
use crate::config::ClientConfig;
use crate::error::{ClientResult, ConfigError};

/// Identity of a shared client
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    /// Login principal
    pub principal: String,
    /// API endpoint without trailing slash
    pub endpoint: String,
}

impl ClientKey {
    /// Key for `principal` on `endpoint`
    pub fn new(principal: impl Into<String>, endpoint: impl Into<String>) -> Self {
        let endpoint: String = endpoint.into();
        Self {
            principal: principal.into(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }
}

impl From<&Profile> for ClientKey {
    fn from(profile: &Profile) -> Self {
        Self::new(profile.principal.clone(), profile.endpoint.clone())
    }
}

type Slot = Arc<CacheEntry<Arc<Client>>>;

/// Shares clients by [`ClientKey`]
///
/// Concurrent requests for the same key receive the same `Arc<Client>`.
#[derive(Debug)]
pub struct ClientFactory {
    config: ClientConfig,
    slots: RwLock<HashMap<ClientKey, Slot>>,
}

impl ClientFactory {
    /// Factory handing out clients built with `config`
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            slots: RwLock::new(HashMap::new()),
        })
    }

    /// Configuration applied to new clients
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn slot(&self, key: &ClientKey) -> Slot {
        if let Some(slot) = self.slots.read().get(key) {
            return Arc::clone(slot);
        }

        let mut slots = self.slots.write();
        // Re-check: another caller may have inserted while we waited
        Arc::clone(
            slots
                .entry(key.clone())
                .or_insert_with(|| Arc::new(CacheEntry::unbounded("client"))),
        )
    }

    /// Shared client for the profile's principal and endpoint
    ///
    /// The first call per key builds the client; no network traffic happens
    /// until the client's first request.
    pub async fn get_client(&self, profile: &Profile) -> ClientResult<Arc<Client>> {
        let key = ClientKey::from(profile);
        self.client_for(&key, || Client::new(profile, &self.config))
            .await
    }

    /// Shared client that logs in through `credentials`
    ///
    /// `credentials` is only used if no client exists for `key` yet.
    pub async fn get_client_with(
        &self,
        key: ClientKey,
        credentials: Arc<dyn CredentialSource>,
    ) -> ClientResult<Arc<Client>> {
        self.client_for(&key, || {
            Client::with_credentials(key.clone(), credentials, &self.config)
        })
        .await
    }

    /// Build or reuse the client in `key`'s slot
    ///
    /// A slot whose client failed to build is removed again so that `len`
    /// only counts usable keys.
    async fn client_for<F>(&self, key: &ClientKey, build: F) -> ClientResult<Arc<Client>>
    where
        F: FnOnce() -> ClientResult<Client>,
    {
        let slot = self.slot(key);
        let built = slot
            .get_or_fetch(|| async move {
                debug!(principal = %key.principal, endpoint = %key.endpoint, "creating client");
                build().map(Arc::new)
            })
            .await;

        if built.is_err() && slot.peek().await.is_none() {
            let mut slots = self.slots.write();
            if slots.get(key).is_some_and(|live| Arc::ptr_eq(live, &slot)) {
                slots.remove(key);
                debug!(principal = %key.principal, endpoint = %key.endpoint, "dropped slot of failed client");
            }
        }
        built
    }

    /// Forget the client for `key`; returns whether one existed
    ///
    /// Holders of the old `Arc<Client>` keep using it.
    pub fn evict(&self, key: &ClientKey) -> bool {
        self.slots.write().remove(key).is_some()
    }

    /// Number of keys with a slot
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// No clients yet
    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }
}
