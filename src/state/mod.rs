pub mod registry;
pub mod room;

use std::sync::Arc;

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, watch};

use crate::{
    catalog::{CatalogRouter, TokenVerifier, VideoSearch},
    config::AppConfig,
    dao::store::Store,
    error::ServiceError,
    playback::{PlaybackResolver, SearchBreaker},
};

pub use self::registry::{RoomRegistry, RoomSlot};

pub type SharedState = Arc<AppState>;

#[derive(Clone)]
/// Handle used to push messages to a connected client.
pub struct ConnectionHandle {
    pub id: String,
    pub tx: mpsc::UnboundedSender<Message>,
}

/// Central application state storing live rooms, connections, and the
/// collaborator handles.
pub struct AppState {
    config: AppConfig,
    store: RwLock<Option<Arc<dyn Store>>>,
    degraded: watch::Sender<bool>,
    registry: RoomRegistry,
    connections: DashMap<String, ConnectionHandle>,
    catalog: Arc<CatalogRouter>,
    resolver: PlaybackResolver,
    verifier: Arc<dyn TokenVerifier>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned
    /// cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is
    /// installed.
    pub fn new(
        config: AppConfig,
        catalog: Arc<CatalogRouter>,
        search: Arc<dyn VideoSearch>,
        verifier: Arc<dyn TokenVerifier>,
    ) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let breaker = Arc::new(SearchBreaker::new(config.search_cooldown));
        Arc::new(Self {
            config,
            store: RwLock::new(None),
            degraded: degraded_tx,
            registry: RoomRegistry::new(),
            connections: DashMap::new(),
            catalog,
            resolver: PlaybackResolver::new(search, breaker),
            verifier,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Registry of live rooms.
    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    /// Registry of active client sockets keyed by connection handle.
    pub fn connections(&self) -> &DashMap<String, ConnectionHandle> {
        &self.connections
    }

    pub fn catalog(&self) -> &CatalogRouter {
        &self.catalog
    }

    pub fn resolver(&self) -> &PlaybackResolver {
        &self.resolver
    }

    pub fn verifier(&self) -> &Arc<dyn TokenVerifier> {
        &self.verifier
    }

    /// Obtain a handle to the current snapshot store, if one is installed.
    pub async fn store(&self) -> Option<Arc<dyn Store>> {
        let guard = self.store.read().await;
        guard.as_ref().cloned()
    }

    /// The snapshot store or a degraded-mode error, for operations that
    /// cannot proceed without one.
    pub async fn require_store(&self) -> Result<Arc<dyn Store>, ServiceError> {
        self.store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new store implementation and leave degraded mode.
    pub async fn install_store(&self, store: Arc<dyn Store>) {
        {
            let mut guard = self.store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Remove the current store and enter degraded mode.
    pub async fn clear_store(&self) {
        {
            let mut guard = self.store.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.store.read().await;
        guard.is_none()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current != value {
                *current = value;
                true
            } else {
                false
            }
        });
    }
}
