use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dao::models::{LeaderboardRowEntity, RecentPlaylistEntity, RoomEntity};

pub const ROOM_PREFIX: &str = "room::";
pub const LEADERBOARD_PREFIX: &str = "leaderboard::";
pub const RECENT_PREFIX: &str = "recent::";
pub const END_SUFFIX: &str = "\u{ffff}";

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    #[serde(default)]
    pub doc: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchRoomDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub room: RoomEntity,
}

impl CouchRoomDocument {
    pub fn from_entity(room: RoomEntity) -> Self {
        Self {
            id: room_doc_id(&room.code),
            rev: None,
            room,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchLeaderboardDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub row: LeaderboardRowEntity,
}

impl CouchLeaderboardDocument {
    pub fn from_row(row: LeaderboardRowEntity) -> Self {
        Self {
            id: leaderboard_doc_id(&row.uid),
            rev: None,
            row,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchRecentDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    pub entries: Vec<RecentPlaylistEntity>,
}

impl CouchRecentDocument {
    pub fn new(user_id: &str, entries: Vec<RecentPlaylistEntity>) -> Self {
        Self {
            id: recent_doc_id(user_id),
            rev: None,
            entries,
        }
    }
}

pub fn room_doc_id(code: &str) -> String {
    format!("{ROOM_PREFIX}{code}")
}

pub fn leaderboard_doc_id(uid: &str) -> String {
    format!("{LEADERBOARD_PREFIX}{uid}")
}

pub fn recent_doc_id(uid: &str) -> String {
    format!("{RECENT_PREFIX}{uid}")
}
