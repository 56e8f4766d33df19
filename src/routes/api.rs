//! REST surface: playlist resolution, leaderboard, and playlist history.

use axum::{
    Json, Router,
    extract::State,
    http::HeaderMap,
    routing::{get, post},
};
use validator::Validate;

use crate::{
    dto::rest::{
        LeaderboardEntryDto, ParsePlaylistRequest, ParsePlaylistResponse, RecentPlaylistDto,
    },
    error::AppError,
    services::playlist_service,
    state::SharedState,
};

/// Configure the `/api` routes subtree.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/api/parse-playlist", post(parse_playlist))
        .route("/api/leaderboard", get(leaderboard))
        .route("/api/playlist-history", get(playlist_history))
}

#[utoipa::path(
    post,
    path = "/api/parse-playlist",
    tag = "playlist",
    request_body = ParsePlaylistRequest,
    responses(
        (status = 200, description = "Playlist resolved", body = ParsePlaylistResponse),
        (status = 400, description = "Unrecognized URL or missing credentials"),
        (status = 500, description = "Upstream catalog failure")
    )
)]
/// Resolve a playlist URL into its track list.
pub async fn parse_playlist(
    State(state): State<SharedState>,
    Json(payload): Json<ParsePlaylistRequest>,
) -> Result<Json<ParsePlaylistResponse>, AppError> {
    payload
        .validate()
        .map_err(|err| AppError::BadRequest(err.to_string()))?;
    let response = playlist_service::parse_playlist(&state, payload).await?;
    Ok(Json(response))
}

#[utoipa::path(
    get,
    path = "/api/leaderboard",
    tag = "leaderboard",
    responses((status = 200, description = "Top players", body = [LeaderboardEntryDto]))
)]
/// Return the top-10 leaderboard rows.
pub async fn leaderboard(
    State(state): State<SharedState>,
) -> Result<Json<Vec<LeaderboardEntryDto>>, AppError> {
    let rows = playlist_service::leaderboard(&state).await?;
    Ok(Json(rows))
}

#[utoipa::path(
    get,
    path = "/api/playlist-history",
    tag = "playlist",
    responses(
        (status = 200, description = "Recent playlists", body = [RecentPlaylistDto]),
        (status = 401, description = "Missing or invalid bearer token")
    )
)]
/// Return the caller's recent-playlist history.
pub async fn playlist_history(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<Vec<RecentPlaylistDto>>, AppError> {
    let token = bearer_token(&headers)
        .ok_or_else(|| AppError::Unauthorized("missing bearer token".into()))?;
    let entries = playlist_service::playlist_history(&state, token).await?;
    Ok(Json(entries))
}

/// Extract the token from an `Authorization: Bearer …` header.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
