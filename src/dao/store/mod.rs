pub mod couchdb;
pub mod memory;

use futures::future::BoxFuture;

use crate::dao::{
    models::{LeaderboardRowEntity, RecentPlaylistEntity, RoomEntity},
    storage::StorageResult,
};

/// Maximum number of entries kept in a user's recent-playlist history.
pub const RECENT_PLAYLIST_CAP: usize = 10;

/// Abstraction over the persistence layer for room snapshots, the
/// leaderboard, and per-user playlist history.
pub trait Store: Send + Sync {
    fn save_room(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn load_room(&self, code: &str) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>>;
    fn delete_room(&self, code: &str) -> BoxFuture<'static, StorageResult<()>>;
    /// Transactional read-modify-write on a leaderboard row; creates the row
    /// on first increment.
    fn increment_leaderboard(
        &self,
        user_id: &str,
        name: &str,
        delta: i64,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Top-N leaderboard rows by score descending.
    fn get_leaderboard(
        &self,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<LeaderboardRowEntity>>>;
    /// Prepend an entry to a user's history, deduplicating by URL and capping
    /// at [`RECENT_PLAYLIST_CAP`]. Returns the updated history.
    fn append_recent_playlist(
        &self,
        user_id: &str,
        entry: RecentPlaylistEntity,
    ) -> BoxFuture<'static, StorageResult<Vec<RecentPlaylistEntity>>>;
    fn get_recent_playlists(
        &self,
        user_id: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<RecentPlaylistEntity>>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Merge an entry into an existing history per the dedup-and-cap rule.
pub(crate) fn merge_recent(
    mut history: Vec<RecentPlaylistEntity>,
    entry: RecentPlaylistEntity,
) -> Vec<RecentPlaylistEntity> {
    history.retain(|existing| existing.url != entry.url);
    history.insert(0, entry);
    history.truncate(RECENT_PLAYLIST_CAP);
    history
}
