//! Orchestration of room engine operations.
//!
//! Each entry point follows the same shape: do collaborator work (token
//! verification, playback resolution) outside the room lock, take the lock,
//! run the pure engine mutation, deliver the produced events plus a fresh
//! `roomState` snapshot while still holding the lock (so delivery order is
//! commit order), persist the snapshot, then release.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::ws::Message;
use serde_json::{Value, json};
use tracing::warn;

use crate::{
    dto::{
        room::{GameType, PlayMode, TrackInfo},
        ws::ServerMessage,
    },
    error::ServiceError,
    state::{
        SharedState,
        room::{
            Audience, DEFAULT_ADJUST_POINTS, LeaderboardDelta, NextRoundPlan, Room, RoomEvent,
        },
    },
};

/// Milliseconds since the Unix epoch; the round/chat timestamp base.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// Create a room on behalf of `conn`, which becomes the host connection.
pub async fn create_room(state: &SharedState, conn: &str) -> Result<Value, ServiceError> {
    let store = state.store().await;
    let slot = state.registry().create(conn, store).await?;

    let room = slot.room.lock().await;
    persist(state, &room).await;
    Ok(json!({ "code": slot.code }))
}

/// Join a room, verifying the optional bearer token first.
pub async fn join_room(
    state: &SharedState,
    conn: &str,
    code: &str,
    name: &str,
    token: Option<&str>,
) -> Result<Value, ServiceError> {
    // Token verification happens before the room lock; a slow verifier must
    // not stall the room. Verification failure downgrades to unauthenticated.
    let verified = match token {
        Some(token) => match state.verifier().verify(token).await {
            Ok(user) => Some(user),
            Err(err) => {
                warn!(error = %err, "token verification failed; joining unauthenticated");
                None
            }
        },
        None => None,
    };

    let store = state.store().await;
    let slot = state.registry().get(code, store).await?;

    let mut room = slot.room.lock().await;
    let (user_id, avatar) = match verified {
        Some(user) => (Some(user.user_id), user.photo_url),
        None => (None, None),
    };
    let events = room.join(conn, name, user_id, avatar, now_ms())?;
    deliver(state, &room, &events);
    broadcast_state(state, &room);
    persist(state, &room).await;
    Ok(serde_json::to_value(room.state_dto()).unwrap_or(Value::Null))
}

/// Rename the calling member.
pub async fn set_name(
    state: &SharedState,
    conn: &str,
    code: &str,
    name: &str,
) -> Result<Value, ServiceError> {
    mutate(state, code, |room| {
        room.set_name(conn, name)?;
        Ok((Vec::new(), Value::Null))
    })
    .await
}

/// Install the round pool and arm the game (host only).
pub async fn start_game(
    state: &SharedState,
    conn: &str,
    code: &str,
    mode: PlayMode,
    game_type: GameType,
    tracks: Vec<TrackInfo>,
) -> Result<Value, ServiceError> {
    let min_tracks = state.config().min_tracks;
    let round_limit = state.config().round_limit;
    mutate(state, code, |room| {
        let events = room.start_game(conn, mode, game_type, tracks, min_tracks, round_limit)?;
        Ok((events, Value::Null))
    })
    .await
}

/// Advance to the next playable track, or end the game when the pool is
/// exhausted.
pub async fn next_round(
    state: &SharedState,
    conn: &str,
    code: &str,
) -> Result<Value, ServiceError> {
    let store = state.store().await;
    let slot = state.registry().get(code, store).await?;

    // Plan under the lock, resolve playback outside it, commit under it.
    let plan = {
        let room = slot.room.lock().await;
        room.plan_next_round(conn)?
    };

    let resolved = match plan {
        NextRoundPlan::Exhausted => None,
        NextRoundPlan::Resolve {
            start_index,
            tracks,
            mode,
        } => {
            let mut found = None;
            for (offset, track) in tracks.iter().enumerate() {
                if let Some(playback) = state.resolver().resolve(track, mode).await {
                    found = Some((start_index, start_index + offset, playback));
                    break;
                }
                warn!(track = %track.id, "track unplayable; skipping");
            }
            found
        }
    };

    let mut room = slot.room.lock().await;
    let events = match resolved {
        Some((planned_index, track_index, playback)) => {
            room.commit_round(conn, planned_index, track_index, playback, now_ms())?
        }
        None => room.game_over(conn)?,
    };
    deliver(state, &room, &events);
    broadcast_state(state, &room);
    persist(state, &room).await;
    Ok(Value::Null)
}

/// Evaluate a free-form guess (text mode).
pub async fn guess(
    state: &SharedState,
    conn: &str,
    code: &str,
    guess_text: &str,
) -> Result<Value, ServiceError> {
    mutate_with_delta(state, code, |room| {
        let (events, delta) = room.guess(conn, guess_text, now_ms())?;
        let solved = !events.is_empty();
        Ok((events, json!({ "correct": solved }), delta))
    })
    .await
}

/// Broadcast a chat line from a member.
pub async fn chat(
    state: &SharedState,
    conn: &str,
    code: &str,
    text: &str,
) -> Result<Value, ServiceError> {
    let store = state.store().await;
    let slot = state.registry().get(code, store).await?;
    let room = slot.room.lock().await;
    // Chat does not mutate room state: no snapshot, no persistence.
    let events = room.chat(conn, text, now_ms())?;
    deliver(state, &room, &events);
    Ok(Value::Null)
}

/// Register a skip vote.
pub async fn vote_skip(
    state: &SharedState,
    conn: &str,
    code: &str,
) -> Result<Value, ServiceError> {
    mutate(state, code, |room| {
        let events = room.vote_skip(conn, now_ms())?;
        Ok((events, Value::Null))
    })
    .await
}

/// Handle a buzz (buzzer mode).
pub async fn buzz(state: &SharedState, conn: &str, code: &str) -> Result<Value, ServiceError> {
    mutate(state, code, |room| {
        let events = room.buzz(conn, now_ms())?;
        Ok((events, Value::Null))
    })
    .await
}

/// Rotate or clear the buzzer (host only).
pub async fn pass_buzzer(
    state: &SharedState,
    conn: &str,
    code: &str,
) -> Result<Value, ServiceError> {
    mutate(state, code, |room| {
        let events = room.pass_buzzer(conn)?;
        Ok((events, Value::Null))
    })
    .await
}

/// Host-driven score adjustment; `award` selects the sign.
pub async fn adjust_points(
    state: &SharedState,
    conn: &str,
    code: &str,
    player_name: &str,
    points: Option<u32>,
    award: bool,
) -> Result<Value, ServiceError> {
    let points = points.unwrap_or(DEFAULT_ADJUST_POINTS);
    mutate_with_delta(state, code, |room| {
        let delta = room.adjust_points(conn, player_name, points, award)?;
        Ok((Vec::new(), Value::Null, delta))
    })
    .await
}

/// Close the round by host decision.
pub async fn end_round_manual(
    state: &SharedState,
    conn: &str,
    code: &str,
) -> Result<Value, ServiceError> {
    mutate(state, code, |room| {
        let events = room.end_round_manual(conn, now_ms())?;
        Ok((events, Value::Null))
    })
    .await
}

/// Advisory detailed-match check (host only); no state change.
pub async fn host_verify(
    state: &SharedState,
    conn: &str,
    code: &str,
    artist: &str,
    title: &str,
) -> Result<Value, ServiceError> {
    let store = state.store().await;
    let slot = state.registry().get(code, store).await?;
    let room = slot.room.lock().await;
    let verdict = room.host_verify(conn, artist, title)?;
    Ok(serde_json::to_value(verdict).unwrap_or(Value::Null))
}

/// Pause or resume the round (host only).
pub async fn set_paused(
    state: &SharedState,
    conn: &str,
    code: &str,
    paused: bool,
) -> Result<Value, ServiceError> {
    mutate(state, code, |room| {
        let events = room.set_paused(conn, paused)?;
        Ok((events, Value::Null))
    })
    .await
}

/// Kick a member (host only).
pub async fn kick_player(
    state: &SharedState,
    conn: &str,
    code: &str,
    target_conn: &str,
) -> Result<Value, ServiceError> {
    let store = state.store().await;
    let slot = state.registry().get(code, store).await?;

    let mut room = slot.room.lock().await;
    let events = room.kick(conn, target_conn, now_ms())?;
    // The kicked member is gone from the room; deliver their private
    // notification by connection id before the member-wide fanout.
    deliver(state, &room, &events);
    broadcast_state(state, &room);
    persist(state, &room).await;

    if room.members.is_empty() {
        drop(room);
        state.registry().remove(code);
    }
    Ok(Value::Null)
}

/// Remove a disconnecting member and tidy the room.
pub async fn handle_disconnect(state: &SharedState, conn: &str, code: &str) {
    let store = state.store().await;
    let Ok(slot) = state.registry().get(code, store).await else {
        return;
    };

    let mut room = slot.room.lock().await;
    let (events, empty) = room.disconnect(conn, now_ms());
    deliver(state, &room, &events);

    if empty {
        // Keep the last populated snapshot in the store so the room can be
        // resumed; only the live entry goes away.
        drop(room);
        state.registry().remove(code);
        return;
    }

    broadcast_state(state, &room);
    persist(state, &room).await;
}

// ---------------------------------------------------------------------------
// Shared plumbing
// ---------------------------------------------------------------------------

/// Lock the room, run a mutation, fan out its events plus a snapshot, and
/// persist.
async fn mutate<F>(state: &SharedState, code: &str, op: F) -> Result<Value, ServiceError>
where
    F: FnOnce(&mut Room) -> Result<(Vec<RoomEvent>, Value), ServiceError>,
{
    mutate_with_delta(state, code, |room| {
        let (events, data) = op(room)?;
        Ok((events, data, None))
    })
    .await
}

/// Like [`mutate`], additionally mirroring a leaderboard delta to the store.
async fn mutate_with_delta<F>(state: &SharedState, code: &str, op: F) -> Result<Value, ServiceError>
where
    F: FnOnce(&mut Room) -> Result<(Vec<RoomEvent>, Value, Option<LeaderboardDelta>), ServiceError>,
{
    let store = state.store().await;
    let slot = state.registry().get(code, store).await?;

    let mut room = slot.room.lock().await;
    let (events, data, delta) = op(&mut room)?;
    deliver(state, &room, &events);
    broadcast_state(state, &room);
    persist(state, &room).await;
    drop(room);

    if let Some(delta) = delta {
        mirror_leaderboard(state, delta).await;
    }
    Ok(data)
}

/// Fan engine events out to their audiences in order.
fn deliver(state: &SharedState, room: &Room, events: &[RoomEvent]) {
    for event in events {
        match &event.to {
            Audience::All => send_to_members(state, room, &event.message),
            Audience::One(conn) => send_to_conn(state, conn, &event.message),
        }
    }
}

/// Push a fresh `roomState` snapshot to every member.
fn broadcast_state(state: &SharedState, room: &Room) {
    send_to_members(state, room, &ServerMessage::RoomState(room.state_dto()));
}

fn send_to_members(state: &SharedState, room: &Room, message: &ServerMessage) {
    let Ok(payload) = serde_json::to_string(message) else {
        warn!("failed to serialize outbound event");
        return;
    };
    for conn in room.members.keys() {
        if let Some(handle) = state.connections().get(conn) {
            let _ = handle.tx.send(Message::Text(payload.clone().into()));
        }
    }
}

fn send_to_conn(state: &SharedState, conn: &str, message: &ServerMessage) {
    let Ok(payload) = serde_json::to_string(message) else {
        warn!("failed to serialize outbound event");
        return;
    };
    if let Some(handle) = state.connections().get(conn) {
        let _ = handle.tx.send(Message::Text(payload.into()));
    }
}

/// Write the room snapshot through to the store. Failures are logged and
/// never surface: availability beats durability here.
async fn persist(state: &SharedState, room: &Room) {
    let Some(store) = state.store().await else {
        return;
    };
    if let Err(err) = store.save_room(room.to_entity()).await {
        warn!(code = %room.code, error = %err, "failed to persist room snapshot");
    }
}

/// Best-effort leaderboard mirror of an in-room score change.
async fn mirror_leaderboard(state: &SharedState, delta: LeaderboardDelta) {
    let Some(store) = state.store().await else {
        return;
    };
    if let Err(err) = store
        .increment_leaderboard(&delta.user_id, &delta.name, delta.delta)
        .await
    {
        warn!(user = %delta.user_id, error = %err, "failed to mirror score to leaderboard");
    }
}
