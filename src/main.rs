//! SongClash Back binary entrypoint wiring REST, WebSocket, and storage layers.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{Router, http::HeaderValue};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use songclash_back::{
    catalog::{
        CatalogRouter, deezer::DeezerCatalog, spotify::SpotifyCatalog, verifier::HttpTokenVerifier,
        youtube::YoutubeSearch,
    },
    config::AppConfig,
    dao::store::{
        Store,
        couchdb::{CouchConfig, CouchRoomStore},
        memory::MemoryStore,
    },
    routes,
    services::storage_supervisor,
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let port = config.port;
    let origins = config.allowed_origins.clone();

    let catalog = build_catalog(&config);
    let search = Arc::new(YoutubeSearch::new(config.youtube_api_key.clone()));
    let verifier = Arc::new(HttpTokenVerifier::new(config.token_verify_url.clone()));

    let app_state = AppState::new(config, catalog, search, verifier);

    spawn_store_supervisor(app_state.clone()).await;

    let app = build_router(app_state, origins);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Wire the playlist providers the catalog router dispatches on.
fn build_catalog(config: &AppConfig) -> Arc<CatalogRouter> {
    let mut router = CatalogRouter::new();
    router.register(Arc::new(DeezerCatalog::new()));
    if let Some(credentials) = config.spotify_credentials.clone() {
        router.register(Arc::new(SpotifyCatalog::new(credentials)));
    }
    Arc::new(router)
}

/// Launch the storage supervisor keeping the snapshot store connected.
///
/// Without CouchDB coordinates the service runs on the in-memory store, which
/// survives for the process lifetime only.
async fn spawn_store_supervisor(state: SharedState) {
    match CouchConfig::from_env() {
        Ok(config) => {
            let config = Arc::new(config);
            tokio::spawn(storage_supervisor::run(state, move || {
                let cfg = config.clone();
                async move {
                    let store = CouchRoomStore::connect((*cfg).clone()).await?;
                    Ok::<Arc<dyn Store>, _>(Arc::new(store))
                }
            }));
        }
        Err(err) => {
            info!(reason = %err, "no snapshot store configured; using in-memory store");
            state.install_store(Arc::new(MemoryStore::new())).await;
        }
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState, origins: Vec<String>) -> Router<()> {
    routes::router(state)
        .layer(cors_layer(origins))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origins: Vec<String>) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(parsed))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
