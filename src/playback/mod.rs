//! Resolution of a track into a playable handle.
//!
//! The resolver never fails: every upstream error is logged and collapses to
//! `None`, which the room engine treats as "skip this track".

pub mod breaker;

use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    catalog::{CatalogError, VideoSearch},
    dto::room::{PlayMode, Playback, TrackInfo},
};

pub use breaker::SearchBreaker;

/// Source tag marking a track as native to the video site.
const VIDEO_SITE_SOURCE: &str = "youtube";

pub struct PlaybackResolver {
    search: Arc<dyn VideoSearch>,
    breaker: Arc<SearchBreaker>,
}

impl PlaybackResolver {
    pub fn new(search: Arc<dyn VideoSearch>, breaker: Arc<SearchBreaker>) -> Self {
        Self { search, breaker }
    }

    pub fn breaker(&self) -> &SearchBreaker {
        &self.breaker
    }

    /// Resolve a playable handle for `track` under the room's mode.
    pub async fn resolve(&self, track: &TrackInfo, mode: PlayMode) -> Option<Playback> {
        match mode {
            PlayMode::CatalogPreview => {
                if let Some(video_id) = track.video_id.clone() {
                    return Some(Playback::Video { video_id });
                }
                if let Some(preview_url) = track.preview_url.clone() {
                    return Some(Playback::Audio {
                        preview_url,
                        cover: track.cover.clone(),
                    });
                }
                self.search_video(track).await
            }
            PlayMode::VideoSite => {
                if track.source == VIDEO_SITE_SOURCE {
                    if let Some(video_id) = track.video_id.clone() {
                        return Some(Playback::Video { video_id });
                    }
                }
                self.search_video(track).await
            }
        }
    }

    /// Scraper first, official API second, quota failures trip the breaker.
    async fn search_video(&self, track: &TrackInfo) -> Option<Playback> {
        let query = format!("{} {}", track.title, track.artist);

        match self.search.scrape_search(&query).await {
            Ok(Some(video_id)) => return Some(Playback::Video { video_id }),
            Ok(None) => debug!(track = %track.id, "scraper search returned nothing"),
            Err(err) => warn!(track = %track.id, error = %err, "scraper search failed"),
        }

        if self.breaker.is_search_down() {
            debug!(track = %track.id, "official search suppressed by breaker");
            return None;
        }

        match self.search.api_search(&query).await {
            Ok(Some(video_id)) => Some(Playback::Video { video_id }),
            Ok(None) => None,
            Err(CatalogError::QuotaExceeded) => {
                self.breaker.trip();
                None
            }
            Err(err) => {
                warn!(track = %track.id, error = %err, "official search failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use futures::future::BoxFuture;

    use super::*;
    use crate::catalog::CatalogResult;

    /// Scripted search stub: counts calls and replays fixed outcomes.
    struct StubSearch {
        scrape: Option<String>,
        api: CatalogResult<Option<String>>,
        api_calls: AtomicUsize,
    }

    impl StubSearch {
        fn new(scrape: Option<&str>, api: CatalogResult<Option<String>>) -> Self {
            Self {
                scrape: scrape.map(str::to_string),
                api,
                api_calls: AtomicUsize::new(0),
            }
        }
    }

    impl VideoSearch for StubSearch {
        fn scrape_search(&self, _query: &str) -> BoxFuture<'static, CatalogResult<Option<String>>> {
            let result = self.scrape.clone();
            Box::pin(async move { Ok(result) })
        }

        fn api_search(&self, _query: &str) -> BoxFuture<'static, CatalogResult<Option<String>>> {
            self.api_calls.fetch_add(1, Ordering::SeqCst);
            let result = match &self.api {
                Ok(value) => Ok(value.clone()),
                Err(CatalogError::QuotaExceeded) => Err(CatalogError::QuotaExceeded),
                Err(_) => Err(CatalogError::MissingCredentials("youtube")),
            };
            Box::pin(async move { result })
        }
    }

    fn resolver(search: Arc<StubSearch>) -> PlaybackResolver {
        PlaybackResolver::new(search, Arc::new(SearchBreaker::new(Duration::from_secs(60))))
    }

    fn track(preview: Option<&str>, video_id: Option<&str>, source: &str) -> TrackInfo {
        TrackInfo {
            id: "t1".into(),
            title: "Deszcz na betonie".into(),
            artist: "Taco Hemingway".into(),
            preview_url: preview.map(str::to_string),
            video_id: video_id.map(str::to_string),
            cover: None,
            source: source.into(),
        }
    }

    #[tokio::test]
    async fn preview_mode_prefers_preresolved_video() {
        let search = Arc::new(StubSearch::new(None, Ok(None)));
        let resolved = resolver(search)
            .resolve(&track(Some("p1"), Some("v1"), "deezer"), PlayMode::CatalogPreview)
            .await;
        assert_eq!(resolved, Some(Playback::Video { video_id: "v1".into() }));
    }

    #[tokio::test]
    async fn preview_mode_falls_back_to_preview_url() {
        let search = Arc::new(StubSearch::new(None, Ok(None)));
        let resolved = resolver(search)
            .resolve(&track(Some("p1"), None, "deezer"), PlayMode::CatalogPreview)
            .await;
        assert_eq!(
            resolved,
            Some(Playback::Audio {
                preview_url: "p1".into(),
                cover: None
            })
        );
    }

    #[tokio::test]
    async fn empty_scrape_falls_back_to_official_api() {
        let search = Arc::new(StubSearch::new(None, Ok(Some("v9".into()))));
        let resolved = resolver(search.clone())
            .resolve(&track(None, None, "deezer"), PlayMode::VideoSite)
            .await;
        assert_eq!(resolved, Some(Playback::Video { video_id: "v9".into() }));
        assert_eq!(search.api_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn quota_failure_trips_breaker_and_suppresses_further_calls() {
        let search = Arc::new(StubSearch::new(None, Err(CatalogError::QuotaExceeded)));
        let resolver = resolver(search.clone());

        let first = resolver
            .resolve(&track(None, None, "deezer"), PlayMode::VideoSite)
            .await;
        assert_eq!(first, None);
        assert!(resolver.breaker().is_search_down());

        let second = resolver
            .resolve(&track(None, None, "deezer"), PlayMode::VideoSite)
            .await;
        assert_eq!(second, None);
        // Only the first attempt reached the official API.
        assert_eq!(search.api_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn video_site_source_uses_id_directly() {
        let search = Arc::new(StubSearch::new(None, Ok(None)));
        let resolved = resolver(search.clone())
            .resolve(&track(None, Some("vx"), "youtube"), PlayMode::VideoSite)
            .await;
        assert_eq!(resolved, Some(Playback::Video { video_id: "vx".into() }));
        assert_eq!(search.api_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn everything_failing_resolves_to_none() {
        let search = Arc::new(StubSearch::new(None, Ok(None)));
        let resolved = resolver(search)
            .resolve(&track(None, None, "deezer"), PlayMode::CatalogPreview)
            .await;
        assert_eq!(resolved, None);
    }
}
