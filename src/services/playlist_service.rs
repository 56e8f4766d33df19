//! Business logic behind the REST surface: playlist resolution, leaderboard
//! reads, and per-user playlist history.

use tracing::warn;

use crate::{
    catalog::CatalogError,
    dao::models::RecentPlaylistEntity,
    dto::rest::{
        LeaderboardEntryDto, ParsePlaylistRequest, ParsePlaylistResponse, RecentPlaylistDto,
    },
    error::ServiceError,
    state::SharedState,
};

/// Rows returned by the leaderboard endpoint.
const LEADERBOARD_LIMIT: usize = 10;

/// Resolve a playlist URL into its track list; when the caller is
/// authenticated the playlist is recorded in their history.
pub async fn parse_playlist(
    state: &SharedState,
    request: ParsePlaylistRequest,
) -> Result<ParsePlaylistResponse, ServiceError> {
    let payload = state
        .catalog()
        .resolve(&request.url, request.song_count)
        .await
        .map_err(map_catalog_error)?;

    let playable = payload
        .tracks
        .iter()
        .filter(|track| track.preview_url.is_some() || track.video_id.is_some())
        .count();

    let updated_history = match request.token.as_deref() {
        Some(token) => match state.verifier().verify(token).await {
            Ok(user) => {
                append_history(
                    state,
                    &user.user_id,
                    RecentPlaylistEntity {
                        url: request.url.clone(),
                        name: payload.playlist_name.clone(),
                        source: payload.source.to_string(),
                    },
                )
                .await
            }
            Err(err) => {
                warn!(error = %err, "token verification failed; skipping history update");
                None
            }
        },
        None => None,
    };

    Ok(ParsePlaylistResponse {
        source: payload.source.to_string(),
        playlist_id: payload.playlist_id,
        playlist_name: payload.playlist_name,
        total: payload.total,
        playable,
        tracks: payload.tracks,
        updated_history,
    })
}

/// Top-10 leaderboard, score descending.
pub async fn leaderboard(state: &SharedState) -> Result<Vec<LeaderboardEntryDto>, ServiceError> {
    let store = state.require_store().await?;
    let rows = store.get_leaderboard(LEADERBOARD_LIMIT).await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

/// Recent-playlist history of the bearer-token owner.
pub async fn playlist_history(
    state: &SharedState,
    token: &str,
) -> Result<Vec<RecentPlaylistDto>, ServiceError> {
    let user = state
        .verifier()
        .verify(token)
        .await
        .map_err(|err| ServiceError::Unauthorized(err.to_string()))?;

    let store = state.require_store().await?;
    let entries = store.get_recent_playlists(&user.user_id).await?;
    Ok(entries.into_iter().map(Into::into).collect())
}

/// Best-effort history append; failures are logged, never surfaced.
async fn append_history(
    state: &SharedState,
    user_id: &str,
    entry: RecentPlaylistEntity,
) -> Option<Vec<RecentPlaylistDto>> {
    let store = state.store().await?;
    match store.append_recent_playlist(user_id, entry).await {
        Ok(updated) => Some(updated.into_iter().map(Into::into).collect()),
        Err(err) => {
            warn!(user = %user_id, error = %err, "failed to update playlist history");
            None
        }
    }
}

fn map_catalog_error(err: CatalogError) -> ServiceError {
    match err {
        CatalogError::UnrecognizedUrl(url) => {
            ServiceError::InvalidInput(format!("unrecognized playlist url `{url}`"))
        }
        CatalogError::MissingCredentials(provider) => {
            ServiceError::InvalidInput(format!("missing credentials for {provider}"))
        }
        other => ServiceError::Upstream(other.to_string()),
    }
}
