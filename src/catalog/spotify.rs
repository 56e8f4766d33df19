//! Spotify playlist adapter using the client-credentials flow.
//!
//! The bearer token is cached process-wide and refreshed under a lock so
//! concurrent playlist loads never stampede the token endpoint.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use futures::future::BoxFuture;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use super::{CatalogError, CatalogResult, PlaylistPayload, PlaylistProvider};
use crate::{config::SpotifyCredentials, dto::room::TrackInfo};

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
/// Tokens are considered expired this long before their actual deadline.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);
/// Spotify serves at most this many playlist items per page.
const PAGE_SIZE: usize = 100;

struct CachedToken {
    value: String,
    expires_at: Instant,
}

struct Inner {
    client: Client,
    credentials: SpotifyCredentials,
    token: Mutex<Option<CachedToken>>,
}

pub struct SpotifyCatalog {
    inner: Arc<Inner>,
}

impl SpotifyCatalog {
    pub fn new(credentials: SpotifyCredentials) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("default reqwest client");
        Self {
            inner: Arc::new(Inner {
                client,
                credentials,
                token: Mutex::new(None),
            }),
        }
    }

    fn playlist_id(url: &str) -> Option<String> {
        let (_, tail) = url.split_once("/playlist/")?;
        let id: String = tail
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect();
        (!id.is_empty()).then_some(id)
    }
}

impl Inner {
    /// Return a valid bearer token, refreshing it if needed. The cache lock
    /// is held across the refresh so only one request is in flight.
    async fn bearer_token(&self) -> CatalogResult<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        debug!("refreshing catalog access token");
        let response = self
            .client
            .post(TOKEN_URL)
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|source| CatalogError::RequestSend {
                path: TOKEN_URL.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CatalogError::RequestStatus {
                path: TOKEN_URL.to_string(),
                status: response.status(),
            });
        }

        let body: TokenBody = response
            .json()
            .await
            .map_err(|source| CatalogError::Decode {
                path: TOKEN_URL.to_string(),
                source,
            })?;

        let lifetime = Duration::from_secs(body.expires_in).saturating_sub(EXPIRY_MARGIN);
        let value = body.access_token.clone();
        *cached = Some(CachedToken {
            value: body.access_token,
            expires_at: Instant::now() + lifetime,
        });
        Ok(value)
    }

    async fn fetch_playlist(&self, id: &str, limit: Option<usize>) -> CatalogResult<PlaylistPayload> {
        let token = self.bearer_token().await?;
        let path = format!(
            "{API_BASE}/playlists/{id}?fields=id,name,tracks(total,items(track(id,name,preview_url,artists(name),album(images))))&limit={PAGE_SIZE}"
        );

        let response = self
            .client
            .get(&path)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|source| CatalogError::RequestSend {
                path: path.clone(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CatalogError::RequestStatus {
                path,
                status: response.status(),
            });
        }

        let body: PlaylistResponse =
            response
                .json()
                .await
                .map_err(|source| CatalogError::Decode {
                    path: path.clone(),
                    source,
                })?;

        let mut tracks: Vec<TrackInfo> = body
            .tracks
            .items
            .into_iter()
            .filter_map(|item| item.track)
            .map(|track| TrackInfo {
                id: track.id.unwrap_or_default(),
                title: track.name,
                artist: track
                    .artists
                    .into_iter()
                    .next()
                    .map(|artist| artist.name)
                    .unwrap_or_default(),
                preview_url: track.preview_url.filter(|p| !p.is_empty()),
                video_id: None,
                cover: track
                    .album
                    .and_then(|album| album.images.into_iter().next())
                    .map(|image| image.url),
                source: "spotify".to_string(),
            })
            .collect();
        if let Some(limit) = limit {
            tracks.truncate(limit);
        }

        Ok(PlaylistPayload {
            source: "spotify",
            playlist_id: body.id,
            playlist_name: body.name,
            total: body.tracks.total,
            tracks,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct PlaylistResponse {
    id: String,
    name: String,
    tracks: PlaylistTracks,
}

#[derive(Debug, Deserialize)]
struct PlaylistTracks {
    total: usize,
    items: Vec<PlaylistItem>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    #[serde(default)]
    track: Option<TrackBody>,
}

#[derive(Debug, Deserialize)]
struct TrackBody {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    preview_url: Option<String>,
    #[serde(default)]
    artists: Vec<ArtistBody>,
    #[serde(default)]
    album: Option<AlbumBody>,
}

#[derive(Debug, Deserialize)]
struct ArtistBody {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AlbumBody {
    #[serde(default)]
    images: Vec<ImageBody>,
}

#[derive(Debug, Deserialize)]
struct ImageBody {
    url: String,
}

impl PlaylistProvider for SpotifyCatalog {
    fn source(&self) -> &'static str {
        "spotify"
    }

    fn recognizes(&self, url: &str) -> bool {
        url.contains("spotify.com") && url.contains("/playlist/")
    }

    fn resolve_playlist(
        &self,
        url: &str,
        limit: Option<usize>,
    ) -> BoxFuture<'static, CatalogResult<PlaylistPayload>> {
        let inner = self.inner.clone();
        let url = url.to_string();
        Box::pin(async move {
            let Some(id) = Self::playlist_id(&url) else {
                return Err(CatalogError::UnrecognizedUrl(url));
            };
            inner.fetch_playlist(&id, limit).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playlist_id_extraction() {
        assert_eq!(
            SpotifyCatalog::playlist_id(
                "https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M?si=x"
            ),
            Some("37i9dQZF1DXcBWIGoYBM5M".to_string())
        );
        assert_eq!(
            SpotifyCatalog::playlist_id("https://open.spotify.com/track/1"),
            None
        );
    }

    #[test]
    fn recognizes_playlist_urls_only() {
        let catalog = SpotifyCatalog::new(SpotifyCredentials {
            client_id: "id".into(),
            client_secret: "secret".into(),
        });
        assert!(catalog.recognizes("https://open.spotify.com/playlist/abc123"));
        assert!(!catalog.recognizes("https://www.deezer.com/en/playlist/1"));
    }
}
