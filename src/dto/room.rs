//! Room-related payloads shared by the event protocol and persistence.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Where round playback material comes from, fixed for the life of a game.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum PlayMode {
    /// Provider audio previews, falling back to resolved videos.
    #[default]
    #[serde(rename = "catalog-preview")]
    CatalogPreview,
    /// Video-site playback only.
    #[serde(rename = "video-site")]
    VideoSite,
}

/// How answers are arbitrated, fixed for the life of a game.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum GameType {
    /// Free-form typed guesses with fuzzy matching.
    #[default]
    Text,
    /// Buzzer queue with host adjudication.
    Buzzer,
}

/// A track of the round pool, as delivered by a playlist provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    /// Provider-assigned identifier.
    pub id: String,
    pub title: String,
    pub artist: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    /// Pre-resolved video id, when the provider already knows one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
    /// Origin catalog tag (`deezer`, `spotify`, `youtube`, …).
    pub source: String,
}

/// Opaque handle clients use to start local media playback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Playback {
    #[serde(rename_all = "camelCase")]
    Audio {
        preview_url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cover: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Video { video_id: String },
}

/// Character counts of the target strings, the only per-round leakage
/// permitted to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub title_len: usize,
    pub artist_len: usize,
}

/// Revealed answer carried by `roundEnd`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Answer {
    pub title: String,
    pub artist: String,
}

/// One member as rendered in room snapshots and scoreboards.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerDto {
    /// Transient connection handle (kick target, buzzer identity).
    pub id: String,
    pub name: String,
    pub score: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// One waiting buzzer in FIFO order.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntryDto {
    pub id: String,
    pub name: String,
    pub at: u64,
}

/// Buzzer sub-state rendered inside the room snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BuzzerDto {
    pub current_holder: String,
    pub current_holder_name: String,
    pub queue: Vec<QueueEntryDto>,
}

/// Client-visible view of the active round. The answer never appears here.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CurrentRoundDto {
    pub started_at: u64,
    pub hint: Hint,
    pub playback: Playback,
    pub solved: bool,
    pub paused: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buzzer: Option<BuzzerDto>,
}

/// Full authoritative room snapshot broadcast after every mutation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomStateDto {
    pub code: String,
    pub host_conn: String,
    pub players: Vec<PlayerDto>,
    pub skip_votes: usize,
    pub has_tracks: bool,
    pub game_started: bool,
    pub game_type: GameType,
    pub round_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_round: Option<CurrentRoundDto>,
    /// Monotonic per-room sequence; clients drop snapshots with a lower seq.
    pub seq: u64,
}

/// Payload of `gameStarted`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GameStartedDto {
    pub mode: PlayMode,
    pub game_type: GameType,
}

/// Payload of `roundStart`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoundStartDto {
    pub mode: PlayMode,
    pub game_type: GameType,
    pub started_at: u64,
    pub hint: Hint,
    pub playback: Playback,
}

/// One scoreboard line.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ScoreDto {
    pub name: String,
    pub score: u32,
}

/// Payload of `roundEnd`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoundEndDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,
    pub answer: Answer,
    pub elapsed_ms: u64,
    pub scores: Vec<ScoreDto>,
    #[serde(default)]
    pub skipped: bool,
}

/// Payload of `gameOver`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GameOverDto {
    pub scores: Vec<ScoreDto>,
}

/// Chat line, either from a member or generated by the room.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub text: String,
    #[serde(default)]
    pub system: bool,
    pub at: u64,
}

/// Payload of `buzzed`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BuzzedDto {
    pub id: String,
    pub name: String,
    pub at: u64,
}

/// Payload of `queueUpdated`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QueueUpdatedDto {
    pub queue: Vec<QueueEntryDto>,
}

/// Private notification delivered to a kicked member.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct KickedDto {
    pub message: String,
}

/// Advisory verdict returned by `hostVerifyGuess`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResultDto {
    pub artist_correct: bool,
    pub title_correct: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn play_mode_uses_wire_names() {
        assert_eq!(
            serde_json::to_string(&PlayMode::CatalogPreview).unwrap(),
            "\"catalog-preview\""
        );
        assert_eq!(
            serde_json::to_string(&PlayMode::VideoSite).unwrap(),
            "\"video-site\""
        );
    }

    #[test]
    fn playback_variants_serialize_tagged() {
        let audio = Playback::Audio {
            preview_url: "https://cdn/p1".into(),
            cover: None,
        };
        let json = serde_json::to_value(&audio).unwrap();
        assert_eq!(json["type"], "audio");
        assert_eq!(json["previewUrl"], "https://cdn/p1");

        let video = Playback::Video {
            video_id: "dQw4w9WgXcQ".into(),
        };
        let json = serde_json::to_value(&video).unwrap();
        assert_eq!(json["type"], "video");
        assert_eq!(json["videoId"], "dQw4w9WgXcQ");
    }
}
