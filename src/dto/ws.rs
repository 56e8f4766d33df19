//! Bidirectional WebSocket protocol: one JSON text frame per message.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::dto::room::{
    BuzzedDto, ChatDto, GameOverDto, GameStartedDto, GameType, KickedDto, PlayMode,
    QueueUpdatedDto, RoomStateDto, RoundEndDto, RoundStartDto, TrackInfo,
};

/// Inbound frame: a command plus an optional client-chosen ack id echoed in
/// the reply.
#[derive(Debug, Deserialize)]
pub struct ClientEnvelope {
    #[serde(default)]
    pub ack: Option<u64>,
    #[serde(flatten)]
    pub command: ClientCommand,
}

impl ClientEnvelope {
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Commands accepted from clients.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(tag = "type")]
pub enum ClientCommand {
    #[serde(rename = "createRoom")]
    CreateRoom {},
    #[serde(rename = "joinRoom", rename_all = "camelCase")]
    JoinRoom {
        code: String,
        name: String,
        #[serde(default)]
        token: Option<String>,
    },
    #[serde(rename = "setName", rename_all = "camelCase")]
    SetName { code: String, name: String },
    #[serde(rename = "startGame", rename_all = "camelCase")]
    StartGame {
        code: String,
        mode: PlayMode,
        tracks: Vec<TrackInfo>,
        game_type: GameType,
    },
    #[serde(rename = "nextRound", rename_all = "camelCase")]
    NextRound { code: String },
    #[serde(rename = "guess", rename_all = "camelCase")]
    Guess { code: String, guess_text: String },
    #[serde(rename = "chat", rename_all = "camelCase")]
    Chat {
        code: String,
        name: String,
        text: String,
    },
    #[serde(rename = "voteSkip", rename_all = "camelCase")]
    VoteSkip { code: String },
    #[serde(rename = "buzz", rename_all = "camelCase")]
    Buzz { code: String },
    #[serde(rename = "passBuzzer", rename_all = "camelCase")]
    PassBuzzer { code: String },
    #[serde(rename = "awardPoints", rename_all = "camelCase")]
    AwardPoints {
        code: String,
        player_name: String,
        #[serde(default)]
        points: Option<u32>,
    },
    #[serde(rename = "deductPoints", rename_all = "camelCase")]
    DeductPoints {
        code: String,
        player_name: String,
        #[serde(default)]
        points: Option<u32>,
    },
    #[serde(rename = "endRoundManual", rename_all = "camelCase")]
    EndRoundManual { code: String },
    #[serde(rename = "hostVerifyGuess", rename_all = "camelCase")]
    HostVerifyGuess {
        code: String,
        artist: String,
        title: String,
    },
    #[serde(rename = "pauseRound", rename_all = "camelCase")]
    PauseRound { code: String },
    #[serde(rename = "resumeRound", rename_all = "camelCase")]
    ResumeRound { code: String },
    #[serde(rename = "kickPlayer", rename_all = "camelCase")]
    KickPlayer {
        code: String,
        target_conn_handle: String,
    },
    #[serde(other)]
    Unknown,
}

/// Messages pushed to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "ack")]
    Ack(AckReply),
    #[serde(rename = "roomState")]
    RoomState(RoomStateDto),
    #[serde(rename = "gameStarted")]
    GameStarted(GameStartedDto),
    #[serde(rename = "roundStart")]
    RoundStart(RoundStartDto),
    #[serde(rename = "roundEnd")]
    RoundEnd(RoundEndDto),
    #[serde(rename = "gameOver")]
    GameOver(GameOverDto),
    #[serde(rename = "chat")]
    Chat(ChatDto),
    #[serde(rename = "buzzed")]
    Buzzed(BuzzedDto),
    #[serde(rename = "queueUpdated")]
    QueueUpdated(QueueUpdatedDto),
    #[serde(rename = "buzzCleared")]
    BuzzCleared {},
    #[serde(rename = "pausePlayback")]
    PausePlayback {},
    #[serde(rename = "resumePlayback")]
    ResumePlayback {},
    #[serde(rename = "kicked")]
    Kicked(KickedDto),
}

/// Reply to a command that carried an ack id.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AckReply {
    pub ack: u64,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AckReply {
    pub fn ok(ack: u64, data: Option<Value>) -> Self {
        Self {
            ack,
            ok: true,
            data,
            error: None,
        }
    }

    pub fn err(ack: u64, tag: &str) -> Self {
        Self {
            ack,
            ok: false,
            data: None,
            error: Some(tag.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_room_parses_with_ack() {
        let envelope = ClientEnvelope::from_json_str(
            r#"{"type":"joinRoom","ack":4,"code":"ABC123","name":"Bob","token":"t0"}"#,
        )
        .unwrap();
        assert_eq!(envelope.ack, Some(4));
        match envelope.command {
            ClientCommand::JoinRoom { code, name, token } => {
                assert_eq!(code, "ABC123");
                assert_eq!(name, "Bob");
                assert_eq!(token.as_deref(), Some("t0"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn unknown_type_is_tolerated() {
        let envelope =
            ClientEnvelope::from_json_str(r#"{"type":"interpretiveDance","code":"X"}"#).unwrap();
        assert!(matches!(envelope.command, ClientCommand::Unknown));
    }

    #[test]
    fn start_game_parses_tracks() {
        let envelope = ClientEnvelope::from_json_str(
            r#"{"type":"startGame","code":"ABC123","mode":"catalog-preview","gameType":"buzzer",
                "tracks":[{"id":"1","title":"T","artist":"A","previewUrl":"p","source":"deezer"}]}"#,
        )
        .unwrap();
        match envelope.command {
            ClientCommand::StartGame {
                mode,
                tracks,
                game_type,
                ..
            } => {
                assert_eq!(mode, PlayMode::CatalogPreview);
                assert_eq!(game_type, GameType::Buzzer);
                assert_eq!(tracks.len(), 1);
                assert_eq!(tracks[0].preview_url.as_deref(), Some("p"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn ack_reply_serializes_error_tag() {
        let message = ServerMessage::Ack(AckReply::err(7, "permission"));
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "ack");
        assert_eq!(json["ack"], 7);
        assert_eq!(json["ok"], false);
        assert_eq!(json["error"], "permission");
    }
}
