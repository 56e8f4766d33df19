use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for SongClash Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::websocket::ws_handler,
        crate::routes::api::parse_playlist,
        crate::routes::api::leaderboard,
        crate::routes::api::playlist_history,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::rest::ParsePlaylistRequest,
            crate::dto::rest::ParsePlaylistResponse,
            crate::dto::rest::RecentPlaylistDto,
            crate::dto::rest::LeaderboardEntryDto,
            crate::dto::room::TrackInfo,
            crate::dto::room::Playback,
            crate::dto::room::PlayMode,
            crate::dto::room::GameType,
            crate::dto::room::RoomStateDto,
            crate::dto::ws::AckReply,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "playlist", description = "Playlist resolution and history"),
        (name = "leaderboard", description = "Global leaderboard"),
        (name = "rooms", description = "WebSocket game protocol"),
    )
)]
pub struct ApiDoc;
