//! Process-wide mapping from room code to live room state.

use std::sync::Arc;

use dashmap::DashMap;
use rand::Rng;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{
    dao::store::Store,
    error::ServiceError,
    state::room::Room,
};

/// Room codes are this many characters long.
const CODE_LEN: usize = 6;
/// Alphabet used for room codes.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
/// Collision-check retries before giving up on code allocation.
const CODE_ATTEMPTS: usize = 32;

/// One live room behind its serialization lock. All engine operations on a
/// room go through `room`, which makes them atomic from the clients' view.
#[derive(Debug)]
pub struct RoomSlot {
    pub code: String,
    pub room: Mutex<Room>,
}

/// Registry of live rooms with load-through from the snapshot store.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: DashMap<String, Arc<RoomSlot>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh room owned by `creator_conn` under a collision-free
    /// code.
    pub async fn create(
        &self,
        creator_conn: &str,
        store: Option<Arc<dyn Store>>,
    ) -> Result<Arc<RoomSlot>, ServiceError> {
        for _ in 0..CODE_ATTEMPTS {
            let code = generate_code();
            if self.rooms.contains_key(&code) {
                continue;
            }
            if let Some(store) = store.as_ref() {
                match store.load_room(&code).await {
                    Ok(Some(_)) => continue,
                    Ok(None) => {}
                    Err(err) => {
                        // Store down: in-memory uniqueness still holds.
                        warn!(error = %err, "collision check against store failed");
                    }
                }
            }

            let slot = Arc::new(RoomSlot {
                code: code.clone(),
                room: Mutex::new(Room::new(code.clone(), creator_conn.to_string())),
            });
            self.rooms.insert(code.clone(), slot.clone());
            info!(code = %code, "room created");
            return Ok(slot);
        }
        Err(ServiceError::Upstream(
            "could not allocate a unique room code".into(),
        ))
    }

    /// Find a live room, loading a snapshot from the store on a memory miss.
    pub async fn get(
        &self,
        code: &str,
        store: Option<Arc<dyn Store>>,
    ) -> Result<Arc<RoomSlot>, ServiceError> {
        if let Some(slot) = self.rooms.get(code) {
            return Ok(slot.clone());
        }

        let Some(store) = store else {
            return Err(ServiceError::NotFound(format!("room `{code}` not found")));
        };

        let Some(entity) = store.load_room(code).await? else {
            return Err(ServiceError::NotFound(format!("room `{code}` not found")));
        };

        info!(code = %code, "room restored from snapshot");
        let slot = match self.rooms.entry(code.to_string()) {
            dashmap::Entry::Occupied(existing) => existing.get().clone(),
            dashmap::Entry::Vacant(vacant) => {
                let slot = Arc::new(RoomSlot {
                    code: code.to_string(),
                    room: Mutex::new(Room::from_entity(entity)),
                });
                vacant.insert(slot.clone());
                slot
            }
        };
        Ok(slot)
    }

    /// Drop an empty room from memory. The snapshot store keeps its copy.
    pub fn remove(&self, code: &str) {
        if self.rooms.remove(code).is_some() {
            info!(code = %code, "room removed from registry");
        }
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

fn generate_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LEN)
        .map(|_| {
            let index = rng.random_range(0..CODE_ALPHABET.len());
            CODE_ALPHABET[index] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::store::memory::MemoryStore;

    #[test]
    fn codes_are_six_uppercase_alphanumerics() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), CODE_LEN);
            assert!(code
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn create_then_get_returns_same_slot() {
        let registry = RoomRegistry::new();
        let slot = registry.create("conn-1", None).await.unwrap();
        let fetched = registry.get(&slot.code, None).await.unwrap();
        assert!(Arc::ptr_eq(&slot, &fetched));
    }

    #[tokio::test]
    async fn unknown_room_is_not_found() {
        let registry = RoomRegistry::new();
        let err = registry.get("NOPE42", None).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn load_through_restores_snapshot() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let registry = RoomRegistry::new();

        // Build a room, persist it, then drop it from memory.
        let slot = registry.create("conn-1", Some(store.clone())).await.unwrap();
        let code = slot.code.clone();
        {
            let mut room = slot.room.lock().await;
            room.join("conn-1", "Alice", Some("uid-alice".into()), None, 0)
                .unwrap();
            store.save_room(room.to_entity()).await.unwrap();
        }
        registry.remove(&code);
        assert!(registry.is_empty());

        let restored = registry.get(&code, Some(store)).await.unwrap();
        let room = restored.room.lock().await;
        assert!(room.members.contains_key("pending-uid-alice"));
        assert!(room.host_conn.is_empty());
    }
}
