//! Video-site search adapter: results-page scraping first, Data API second.

use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::{CatalogError, CatalogResult, VideoSearch};

const RESULTS_URL: &str = "https://www.youtube.com/results";
const API_URL: &str = "https://www.googleapis.com/youtube/v3/search";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub struct YoutubeSearch {
    client: Client,
    api_key: Option<Arc<str>>,
}

impl YoutubeSearch {
    pub fn new(api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("default reqwest client");
        Self {
            client,
            api_key: api_key.map(Arc::from),
        }
    }

    /// First video id embedded in a results page, if any.
    fn extract_video_id(html: &str) -> Option<String> {
        const MARKER: &str = "\"videoId\":\"";
        let start = html.find(MARKER)? + MARKER.len();
        let rest = &html[start..];
        let end = rest.find('"')?;
        let id = &rest[..end];
        (!id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'))
            .then(|| id.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
}

#[derive(Debug, Deserialize)]
struct SearchItemId {
    #[serde(rename = "videoId", default)]
    video_id: Option<String>,
}

impl VideoSearch for YoutubeSearch {
    fn scrape_search(&self, query: &str) -> BoxFuture<'static, CatalogResult<Option<String>>> {
        let client = self.client.clone();
        let query = query.to_string();
        Box::pin(async move {
            let response = client
                .get(RESULTS_URL)
                .query(&[("search_query", query.as_str())])
                .send()
                .await
                .map_err(|source| CatalogError::RequestSend {
                    path: RESULTS_URL.to_string(),
                    source,
                })?;

            if !response.status().is_success() {
                return Err(CatalogError::RequestStatus {
                    path: RESULTS_URL.to_string(),
                    status: response.status(),
                });
            }

            let html = response
                .text()
                .await
                .map_err(|source| CatalogError::Decode {
                    path: RESULTS_URL.to_string(),
                    source,
                })?;

            Ok(Self::extract_video_id(&html))
        })
    }

    fn api_search(&self, query: &str) -> BoxFuture<'static, CatalogResult<Option<String>>> {
        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let query = query.to_string();
        Box::pin(async move {
            let Some(key) = api_key else {
                return Err(CatalogError::MissingCredentials("youtube"));
            };

            let response = client
                .get(API_URL)
                .query(&[
                    ("part", "snippet"),
                    ("type", "video"),
                    ("maxResults", "1"),
                    ("q", query.as_str()),
                    ("key", key.as_ref()),
                ])
                .send()
                .await
                .map_err(|source| CatalogError::RequestSend {
                    path: API_URL.to_string(),
                    source,
                })?;

            // The Data API signals quota exhaustion with 403.
            if response.status() == StatusCode::FORBIDDEN {
                return Err(CatalogError::QuotaExceeded);
            }
            if !response.status().is_success() {
                return Err(CatalogError::RequestStatus {
                    path: API_URL.to_string(),
                    status: response.status(),
                });
            }

            let body: SearchResponse =
                response
                    .json()
                    .await
                    .map_err(|source| CatalogError::Decode {
                        path: API_URL.to_string(),
                        source,
                    })?;

            Ok(body.items.into_iter().find_map(|item| item.id.video_id))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_video_id_from_results_html() {
        let html = r#"...{"videoId":"dQw4w9WgXcQ","thumbnail":...{"videoId":"other"}..."#;
        assert_eq!(
            YoutubeSearch::extract_video_id(html),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn rejects_markup_without_ids() {
        assert_eq!(YoutubeSearch::extract_video_id("<html></html>"), None);
        assert_eq!(YoutubeSearch::extract_video_id(r#"{"videoId":""}"#), None);
    }
}
