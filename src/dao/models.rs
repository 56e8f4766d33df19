//! Persisted projections of the in-memory room state.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::dto::room::{GameType, PlayMode, Playback, TrackInfo};

/// Durable snapshot of a room, written through on every mutation.
///
/// Connection handles are transient and deliberately absent: members are
/// flattened to their stable user identity. Unauthenticated members are not
/// recoverable across a restart and are dropped from the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomEntity {
    pub code: String,
    pub host_user: Option<String>,
    pub mode: PlayMode,
    pub game_type: GameType,
    pub round_index: usize,
    #[serde(default)]
    pub round_limit: Option<usize>,
    pub tracks: Vec<TrackInfo>,
    pub answers_known: bool,
    pub current_round: Option<RoundEntity>,
    /// Stable user id → persisted player state.
    pub players: HashMap<String, PlayerEntity>,
    /// Mutation counter; snapshots with a lower version never overwrite
    /// fresher ones.
    pub version: u64,
}

/// Persisted per-player state, keyed by stable user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerEntity {
    pub name: String,
    pub score: u32,
}

/// Serializable subset of an active round. The buzzer queue is connection
/// bound and intentionally not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundEntity {
    pub started_at_ms: u64,
    pub track: TrackInfo,
    pub playback: Playback,
    pub solved: bool,
    pub paused: bool,
}

/// One leaderboard row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardRowEntity {
    pub uid: String,
    pub name: String,
    pub score: i64,
    pub last_updated: u64,
}

/// One entry of a user's recent-playlist history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentPlaylistEntity {
    pub url: String,
    pub name: String,
    pub source: String,
}
