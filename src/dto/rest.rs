//! Request/response payloads of the REST surface.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::dao::models::{LeaderboardRowEntity, RecentPlaylistEntity};
use crate::dto::room::TrackInfo;

/// Body of `POST /api/parse-playlist`.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ParsePlaylistRequest {
    /// Playlist URL in any supported provider's format.
    #[validate(url)]
    pub url: String,
    /// Optional cap on the number of tracks returned.
    #[serde(default)]
    pub song_count: Option<usize>,
    /// Optional bearer credential; when verified the playlist is recorded in
    /// the user's history.
    #[serde(default)]
    pub token: Option<String>,
}

/// Response of `POST /api/parse-playlist`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParsePlaylistResponse {
    pub source: String,
    pub playlist_id: String,
    pub playlist_name: String,
    /// Tracks in the playlist before filtering.
    pub total: usize,
    /// Tracks that carry enough material to be playable.
    pub playable: usize,
    pub tracks: Vec<TrackInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_history: Option<Vec<RecentPlaylistDto>>,
}

/// One recent-playlist history entry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RecentPlaylistDto {
    pub url: String,
    pub name: String,
    pub source: String,
}

impl From<RecentPlaylistEntity> for RecentPlaylistDto {
    fn from(entity: RecentPlaylistEntity) -> Self {
        Self {
            url: entity.url,
            name: entity.name,
            source: entity.source,
        }
    }
}

/// One row of `GET /api/leaderboard`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntryDto {
    pub uid: String,
    pub name: String,
    pub score: i64,
    pub last_updated: u64,
}

impl From<LeaderboardRowEntity> for LeaderboardEntryDto {
    fn from(row: LeaderboardRowEntity) -> Self {
        Self {
            uid: row.uid,
            name: row.name,
            score: row.score,
            last_updated: row.last_updated,
        }
    }
}
