//! In-process store used when no database is configured and by tests.

use std::{
    sync::Mutex,
    time::{SystemTime, UNIX_EPOCH},
};

use dashmap::DashMap;
use futures::future::BoxFuture;

use crate::dao::{
    models::{LeaderboardRowEntity, RecentPlaylistEntity, RoomEntity},
    storage::StorageResult,
    store::{Store, merge_recent},
};

/// Stores everything behind process-local maps. Durability matches the
/// process lifetime, which is the documented behavior for deployments
/// without a snapshot store.
#[derive(Default)]
pub struct MemoryStore {
    rooms: DashMap<String, RoomEntity>,
    leaderboard: Mutex<Vec<LeaderboardRowEntity>>,
    recent: DashMap<String, Vec<RecentPlaylistEntity>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

impl Store for MemoryStore {
    fn save_room(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<()>> {
        match self.rooms.get(&room.code) {
            Some(existing) if existing.version > room.version => {}
            _ => {
                self.rooms.insert(room.code.clone(), room);
            }
        }
        Box::pin(async { Ok(()) })
    }

    fn load_room(&self, code: &str) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let found = self.rooms.get(code).map(|entry| entry.value().clone());
        Box::pin(async move { Ok(found) })
    }

    fn delete_room(&self, code: &str) -> BoxFuture<'static, StorageResult<()>> {
        self.rooms.remove(code);
        Box::pin(async { Ok(()) })
    }

    fn increment_leaderboard(
        &self,
        user_id: &str,
        name: &str,
        delta: i64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let mut rows = self.leaderboard.lock().expect("leaderboard lock poisoned");
        match rows.iter_mut().find(|row| row.uid == user_id) {
            Some(row) => {
                row.score += delta;
                row.name = name.to_string();
                row.last_updated = now_ms();
            }
            None => rows.push(LeaderboardRowEntity {
                uid: user_id.to_string(),
                name: name.to_string(),
                score: delta,
                last_updated: now_ms(),
            }),
        }
        Box::pin(async { Ok(()) })
    }

    fn get_leaderboard(
        &self,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<LeaderboardRowEntity>>> {
        let mut rows = self
            .leaderboard
            .lock()
            .expect("leaderboard lock poisoned")
            .clone();
        rows.sort_by(|a, b| b.score.cmp(&a.score));
        rows.truncate(limit);
        Box::pin(async move { Ok(rows) })
    }

    fn append_recent_playlist(
        &self,
        user_id: &str,
        entry: RecentPlaylistEntity,
    ) -> BoxFuture<'static, StorageResult<Vec<RecentPlaylistEntity>>> {
        let history = self
            .recent
            .get(user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        let updated = merge_recent(history, entry);
        self.recent.insert(user_id.to_string(), updated.clone());
        Box::pin(async move { Ok(updated) })
    }

    fn get_recent_playlists(
        &self,
        user_id: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<RecentPlaylistEntity>>> {
        let history = self
            .recent
            .get(user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        Box::pin(async move { Ok(history) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::store::RECENT_PLAYLIST_CAP;
    use crate::dto::room::{GameType, PlayMode};

    fn room(code: &str, version: u64) -> RoomEntity {
        RoomEntity {
            code: code.to_string(),
            host_user: None,
            mode: PlayMode::CatalogPreview,
            game_type: GameType::Text,
            round_index: 0,
            round_limit: None,
            tracks: Vec::new(),
            answers_known: false,
            current_round: None,
            players: Default::default(),
            version,
        }
    }

    fn entry(url: &str) -> RecentPlaylistEntity {
        RecentPlaylistEntity {
            url: url.to_string(),
            name: "list".to_string(),
            source: "deezer".to_string(),
        }
    }

    #[tokio::test]
    async fn save_load_delete_roundtrip() {
        let store = MemoryStore::new();
        store.save_room(room("ABC123", 1)).await.unwrap();
        let loaded = store.load_room("ABC123").await.unwrap().unwrap();
        assert_eq!(loaded.code, "ABC123");

        store.delete_room("ABC123").await.unwrap();
        assert!(store.load_room("ABC123").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stale_snapshot_does_not_overwrite_fresh_one() {
        let store = MemoryStore::new();
        store.save_room(room("ABC123", 5)).await.unwrap();
        store.save_room(room("ABC123", 3)).await.unwrap();
        let loaded = store.load_room("ABC123").await.unwrap().unwrap();
        assert_eq!(loaded.version, 5);
    }

    #[tokio::test]
    async fn leaderboard_increments_and_sorts() {
        let store = MemoryStore::new();
        store.increment_leaderboard("u1", "Alice", 10).await.unwrap();
        store.increment_leaderboard("u2", "Bob", 25).await.unwrap();
        store.increment_leaderboard("u1", "Alice", 10).await.unwrap();

        let top = store.get_leaderboard(10).await.unwrap();
        assert_eq!(top[0].uid, "u2");
        assert_eq!(top[1].score, 20);
    }

    #[tokio::test]
    async fn recent_playlists_dedup_and_cap() {
        let store = MemoryStore::new();
        for i in 0..12 {
            store
                .append_recent_playlist("u1", entry(&format!("https://x/{i}")))
                .await
                .unwrap();
        }
        // Re-append an existing URL: moves to head, no duplicate.
        let history = store
            .append_recent_playlist("u1", entry("https://x/5"))
            .await
            .unwrap();

        assert_eq!(history.len(), RECENT_PLAYLIST_CAP);
        assert_eq!(history[0].url, "https://x/5");
        assert_eq!(
            history.iter().filter(|e| e.url == "https://x/5").count(),
            1
        );
    }
}
