//! External-collaborator capabilities consumed by the core: playlist
//! enumeration, video search, and identity verification. Each adapter is a
//! thin reqwest client; the engine only ever sees the traits.

pub mod deezer;
pub mod spotify;
pub mod verifier;
pub mod youtube;

use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::StatusCode;
use thiserror::Error;

use crate::dto::room::TrackInfo;

pub use verifier::{TokenVerifier, VerifiedUser, VerifyError};

/// Result alias for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Failures raised by catalog and search adapters.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// No registered provider recognizes the playlist URL.
    #[error("unrecognized playlist url `{0}`")]
    UnrecognizedUrl(String),
    /// The provider needs credentials that are not configured.
    #[error("missing credentials for {0}")]
    MissingCredentials(&'static str),
    /// The official search API reported quota exhaustion.
    #[error("search quota exceeded")]
    QuotaExceeded,
    /// An outbound request could not be sent.
    #[error("failed to send request to `{path}`")]
    RequestSend {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// The upstream returned an unexpected status.
    #[error("unexpected status {status} for `{path}`")]
    RequestStatus { path: String, status: StatusCode },
    /// The upstream response could not be decoded.
    #[error("failed to decode response from `{path}`")]
    Decode {
        path: String,
        #[source]
        source: reqwest::Error,
    },
}

/// A resolved playlist as returned by a provider.
#[derive(Debug, Clone)]
pub struct PlaylistPayload {
    pub source: &'static str,
    pub playlist_id: String,
    pub playlist_name: String,
    /// Track count before any limiting or playability filtering.
    pub total: usize,
    pub tracks: Vec<TrackInfo>,
}

/// Capability: turn a playlist URL into an enumerated track list.
pub trait PlaylistProvider: Send + Sync {
    /// Origin tag recorded on tracks (`deezer`, `spotify`, …).
    fn source(&self) -> &'static str;
    /// Whether this provider understands the URL.
    fn recognizes(&self, url: &str) -> bool;
    fn resolve_playlist(
        &self,
        url: &str,
        limit: Option<usize>,
    ) -> BoxFuture<'static, CatalogResult<PlaylistPayload>>;
}

/// Capability: find a playable video id for a free-form query.
///
/// `scrape_search` is the quota-free path and is always tried first;
/// `api_search` is the official API fallback whose quota failures trip the
/// process-wide breaker.
pub trait VideoSearch: Send + Sync {
    fn scrape_search(&self, query: &str) -> BoxFuture<'static, CatalogResult<Option<String>>>;
    fn api_search(&self, query: &str) -> BoxFuture<'static, CatalogResult<Option<String>>>;
}

/// Dispatches playlist URLs to the first provider that recognizes them.
#[derive(Default)]
pub struct CatalogRouter {
    providers: Vec<Arc<dyn PlaylistProvider>>,
}

impl CatalogRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn PlaylistProvider>) {
        self.providers.push(provider);
    }

    pub async fn resolve(
        &self,
        url: &str,
        limit: Option<usize>,
    ) -> CatalogResult<PlaylistPayload> {
        let Some(provider) = self.providers.iter().find(|p| p.recognizes(url)) else {
            return Err(CatalogError::UnrecognizedUrl(url.to_string()));
        };
        provider.resolve_playlist(url, limit).await
    }
}
