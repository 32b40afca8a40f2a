//! The storefront client facade.
//!
//! One `StorefrontClient` is constructed per process via
//! [`StorefrontClient::init`] and passed by reference to consumers; it owns
//! the token store, the transport chain, both cache layers, and the
//! mutation executor. The operation surface (auth, catalog, cart, orders,
//! reviews, wishlist, addresses, store console) is implemented in
//! [`crate::operations`].

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use clementine_core::StoreId;

use crate::auth::TokenStore;
use crate::cache::{CacheUpdate, NormalizedCache};
use crate::catalog_cache::CatalogCache;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::mutation::MutationExecutor;
use crate::realtime::{self, RealtimeHandle};
use crate::reconcile::ReconciliationEngine;
use crate::transport::Transport;

/// Client for the Clementine GraphQL API.
///
/// Cheaply cloneable via `Arc`; all clones share one token store, one
/// normalized cache, and one HTTP connection pool.
#[derive(Clone)]
pub struct StorefrontClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    tokens: Arc<TokenStore>,
    transport: Transport,
    cache: NormalizedCache,
    catalog: CatalogCache,
    executor: MutationExecutor,
}

impl StorefrontClient {
    /// Construct the client and load any persisted credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP transport cannot be constructed.
    pub fn init(config: ClientConfig) -> Result<Self, ClientError> {
        let tokens = Arc::new(TokenStore::open(config.token_path.clone()));
        let transport = Transport::new(&config, Arc::clone(&tokens))?;
        let cache = NormalizedCache::new();
        let executor = MutationExecutor::new(transport.clone(), cache.clone());

        debug!(environment = ?config.environment, api_url = %config.api_url, "client initialized");

        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                tokens,
                transport,
                cache,
                catalog: CatalogCache::new(),
                executor,
            }),
        })
    }

    /// Release in-memory state at end of life.
    ///
    /// Persisted credentials survive; realtime handles are shut down by
    /// their owners via [`RealtimeHandle::shutdown`].
    pub async fn teardown(&self) {
        self.inner.cache.clear();
        self.inner.catalog.invalidate_all().await;
    }

    /// Get a reference to the configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Get a reference to the normalized cache.
    #[must_use]
    pub fn cache(&self) -> &NormalizedCache {
        &self.inner.cache
    }

    /// Subscribe to cache change notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CacheUpdate> {
        self.inner.cache.subscribe()
    }

    /// Whether a credential is currently held.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.tokens.get().is_some()
    }

    /// Open the realtime order channel for a store scope and pump its
    /// events through the reconciliation engine into the shared cache.
    ///
    /// UI state observes the resulting updates through [`Self::subscribe`];
    /// the returned handle only carries channel status and teardown. The
    /// pump task ends when the channel does.
    #[must_use]
    pub fn connect_store_realtime(&self, store_id: &StoreId) -> RealtimeHandle {
        let url = self.inner.config.store_ws_url(store_id.as_str());
        let (handle, mut events) = realtime::connect(url, self.inner.config.realtime.clone());

        let engine = ReconciliationEngine::new(self.inner.cache.clone(), store_id);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let Err(e) = engine.apply(&event) {
                    warn!(error = %e, "skipping unreconcilable realtime event");
                }
            }
        });

        handle
    }

    /// Get a reference to the transport link chain, for callers issuing
    /// raw operations outside the typed surface.
    #[must_use]
    pub fn transport(&self) -> &Transport {
        &self.inner.transport
    }

    /// Get a reference to the mutation executor, for callers supplying
    /// their own merge rules.
    #[must_use]
    pub fn executor(&self) -> &MutationExecutor {
        &self.inner.executor
    }

    pub(crate) fn tokens(&self) -> &Arc<TokenStore> {
        &self.inner.tokens
    }

    pub(crate) fn catalog(&self) -> &CatalogCache {
        &self.inner.catalog
    }
}
