//! Deezer playlist adapter. The public API needs no credentials.

use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Client;
use serde::Deserialize;

use super::{CatalogError, CatalogResult, PlaylistPayload, PlaylistProvider};
use crate::dto::room::TrackInfo;

const API_BASE: &str = "https://api.deezer.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub struct DeezerCatalog {
    client: Client,
}

impl DeezerCatalog {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("default reqwest client");
        Self { client }
    }

    /// Extract the numeric playlist id from any deezer.com playlist URL.
    fn playlist_id(url: &str) -> Option<String> {
        let (_, tail) = url.split_once("/playlist/")?;
        let id: String = tail.chars().take_while(|c| c.is_ascii_digit()).collect();
        (!id.is_empty()).then_some(id)
    }
}

impl Default for DeezerCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct PlaylistBody {
    id: u64,
    title: String,
    tracks: TracksBody,
}

#[derive(Debug, Deserialize)]
struct TracksBody {
    data: Vec<TrackBody>,
}

#[derive(Debug, Deserialize)]
struct TrackBody {
    id: u64,
    title: String,
    #[serde(default)]
    preview: Option<String>,
    artist: ArtistBody,
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
    cover_medium: Option<String>,
}

impl PlaylistProvider for DeezerCatalog {
    fn source(&self) -> &'static str {
        "deezer"
    }

    fn recognizes(&self, url: &str) -> bool {
        url.contains("deezer.com") && url.contains("/playlist/")
    }

    fn resolve_playlist(
        &self,
        url: &str,
        limit: Option<usize>,
    ) -> BoxFuture<'static, CatalogResult<PlaylistPayload>> {
        let client = self.client.clone();
        let source = self.source();
        let url = url.to_string();
        Box::pin(async move {
            let Some(id) = Self::playlist_id(&url) else {
                return Err(CatalogError::UnrecognizedUrl(url));
            };
            let path = format!("{API_BASE}/playlist/{id}");

            let response = client
                .get(&path)
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

            let body: PlaylistBody =
                response
                    .json()
                    .await
                    .map_err(|source| CatalogError::Decode {
                        path: path.clone(),
                        source,
                    })?;

            let total = body.tracks.data.len();
            let mut tracks: Vec<TrackInfo> = body
                .tracks
                .data
                .into_iter()
                .map(|track| TrackInfo {
                    id: track.id.to_string(),
                    title: track.title,
                    artist: track.artist.name,
                    preview_url: track.preview.filter(|p| !p.is_empty()),
                    video_id: None,
                    cover: track.album.and_then(|album| album.cover_medium),
                    source: source.to_string(),
                })
                .collect();
            if let Some(limit) = limit {
                tracks.truncate(limit);
            }

            Ok(PlaylistPayload {
                source,
                playlist_id: body.id.to_string(),
                playlist_name: body.title,
                total,
                tracks,
            })
        })
    }
}
