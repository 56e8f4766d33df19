//! End-to-end game scenarios driven through the service layer, with the
//! in-memory store and stubbed collaborators standing in for the outside
//! world.

use std::sync::Arc;

use axum::extract::ws::Message;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::mpsc;

use songclash_back::{
    catalog::{
        CatalogResult, CatalogRouter, TokenVerifier, VerifiedUser, VerifyError, VideoSearch,
    },
    config::AppConfig,
    dao::store::memory::MemoryStore,
    dto::room::{GameType, PlayMode, TrackInfo},
    services::room_service,
    state::{AppState, ConnectionHandle, SharedState},
};

/// Scripted video search: fixed scraper and official-API answers.
struct StubSearch {
    scrape: Option<&'static str>,
    api: Option<&'static str>,
}

impl VideoSearch for StubSearch {
    fn scrape_search(&self, _query: &str) -> BoxFuture<'static, CatalogResult<Option<String>>> {
        let result = self.scrape.map(str::to_string);
        Box::pin(async move { Ok(result) })
    }

    fn api_search(&self, _query: &str) -> BoxFuture<'static, CatalogResult<Option<String>>> {
        let result = self.api.map(str::to_string);
        Box::pin(async move { Ok(result) })
    }
}

/// Accepts tokens of the form `tok-<uid>`.
struct StubVerifier;

impl TokenVerifier for StubVerifier {
    fn verify(&self, token: &str) -> BoxFuture<'static, Result<VerifiedUser, VerifyError>> {
        let result = token
            .strip_prefix("tok-")
            .map(|uid| VerifiedUser {
                user_id: uid.to_string(),
                photo_url: None,
            })
            .ok_or(VerifyError::Rejected);
        Box::pin(async move { result })
    }
}

async fn test_state(scrape: Option<&'static str>, api: Option<&'static str>) -> SharedState {
    let state = AppState::new(
        AppConfig::default(),
        Arc::new(CatalogRouter::new()),
        Arc::new(StubSearch { scrape, api }),
        Arc::new(StubVerifier),
    );
    state.install_store(Arc::new(MemoryStore::new())).await;
    state
}

/// Register a fake client connection and return its message stream.
fn connect(state: &SharedState, conn: &str) -> mpsc::UnboundedReceiver<Message> {
    let (tx, rx) = mpsc::unbounded_channel();
    state.connections().insert(
        conn.to_string(),
        ConnectionHandle {
            id: conn.to_string(),
            tx,
        },
    );
    rx
}

/// Drain everything currently queued for a connection into JSON values.
fn drain(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<Value> {
    let mut out = Vec::new();
    while let Ok(message) = rx.try_recv() {
        if let Message::Text(text) = message {
            out.push(serde_json::from_str(text.as_str()).expect("server sent invalid JSON"));
        }
    }
    out
}

fn events_of_type<'a>(events: &'a [Value], kind: &str) -> Vec<&'a Value> {
    events
        .iter()
        .filter(|event| event["type"] == kind)
        .collect()
}

fn track(title: &str, artist: &str, preview: Option<&str>) -> TrackInfo {
    TrackInfo {
        id: format!("{title}-{artist}"),
        title: title.to_string(),
        artist: artist.to_string(),
        preview_url: preview.map(str::to_string),
        video_id: None,
        cover: None,
        source: "deezer".to_string(),
    }
}

/// Create a room hosted by Alice (authenticated) and return its code.
async fn alice_room(state: &SharedState) -> String {
    let data = room_service::create_room(state, "conn-alice").await.unwrap();
    let code = data["code"].as_str().unwrap().to_string();
    room_service::join_room(state, "conn-alice", &code, "Alice", Some("tok-alice"))
        .await
        .unwrap();
    code
}

async fn member_score(state: &SharedState, code: &str, conn: &str) -> u32 {
    let slot = state.registry().get(code, None).await.unwrap();
    let room = slot.room.lock().await;
    room.members[conn].score
}

#[tokio::test]
async fn text_solve_awards_full_points() {
    let state = test_state(None, None).await;
    let _alice_rx = connect(&state, "conn-alice");
    let mut bob_rx = connect(&state, "conn-bob");

    let code = alice_room(&state).await;
    room_service::join_room(&state, "conn-bob", &code, "Bob", None)
        .await
        .unwrap();

    room_service::start_game(
        &state,
        "conn-alice",
        &code,
        PlayMode::CatalogPreview,
        GameType::Text,
        vec![track("Deszcz na betonie", "Taco Hemingway", Some("p1"))],
    )
    .await
    .unwrap();
    room_service::next_round(&state, "conn-alice", &code)
        .await
        .unwrap();

    drain(&mut bob_rx);
    room_service::guess(
        &state,
        "conn-bob",
        &code,
        "Taco Hemingway Deszcz na betonie",
    )
    .await
    .unwrap();

    let events = drain(&mut bob_rx);
    let ends = events_of_type(&events, "roundEnd");
    assert_eq!(ends.len(), 1);
    assert_eq!(ends[0]["winner"], "Bob");
    assert_eq!(ends[0]["answer"]["title"], "Deszcz na betonie");
    assert_eq!(ends[0]["answer"]["artist"], "Taco Hemingway");
    assert_eq!(member_score(&state, &code, "conn-bob").await, 10);
}

#[tokio::test]
async fn title_only_guess_awards_five_points() {
    let state = test_state(None, None).await;
    let _alice_rx = connect(&state, "conn-alice");
    let _bob_rx = connect(&state, "conn-bob");

    let code = alice_room(&state).await;
    room_service::join_room(&state, "conn-bob", &code, "Bob", None)
        .await
        .unwrap();
    room_service::start_game(
        &state,
        "conn-alice",
        &code,
        PlayMode::CatalogPreview,
        GameType::Text,
        vec![track("Deszcz na betonie", "Taco Hemingway", Some("p1"))],
    )
    .await
    .unwrap();
    room_service::next_round(&state, "conn-alice", &code)
        .await
        .unwrap();

    room_service::guess(&state, "conn-bob", &code, "deszcz na betonie")
        .await
        .unwrap();
    assert_eq!(member_score(&state, &code, "conn-bob").await, 5);
}

#[tokio::test]
async fn buzzer_queue_orders_by_arrival_and_rotates() {
    let state = test_state(None, None).await;
    let _alice_rx = connect(&state, "conn-alice");
    let mut bob_rx = connect(&state, "conn-bob");
    let _carol_rx = connect(&state, "conn-carol");

    let code = alice_room(&state).await;
    for (conn, name) in [("conn-bob", "Bob"), ("conn-carol", "Carol")] {
        room_service::join_room(&state, conn, &code, name, None)
            .await
            .unwrap();
    }
    room_service::start_game(
        &state,
        "conn-alice",
        &code,
        PlayMode::CatalogPreview,
        GameType::Buzzer,
        vec![track("Deszcz na betonie", "Taco Hemingway", Some("p1"))],
    )
    .await
    .unwrap();
    room_service::next_round(&state, "conn-alice", &code)
        .await
        .unwrap();
    drain(&mut bob_rx);

    room_service::buzz(&state, "conn-bob", &code).await.unwrap();
    room_service::buzz(&state, "conn-carol", &code).await.unwrap();
    // Duplicate buzz from the holder is a silent no-op.
    room_service::buzz(&state, "conn-bob", &code).await.unwrap();

    let events = drain(&mut bob_rx);
    let buzzed = events_of_type(&events, "buzzed");
    assert_eq!(buzzed.len(), 1);
    assert_eq!(buzzed[0]["name"], "Bob");
    assert!(events_of_type(&events, "pausePlayback").len() >= 1);

    {
        let slot = state.registry().get(&code, None).await.unwrap();
        let room = slot.room.lock().await;
        let snapshot = room.state_dto();
        let buzzer = snapshot.current_round.unwrap().buzzer.unwrap();
        assert_eq!(buzzer.current_holder, "conn-bob");
        assert_eq!(buzzer.queue.len(), 1);
        assert_eq!(buzzer.queue[0].name, "Carol");
    }

    room_service::pass_buzzer(&state, "conn-alice", &code)
        .await
        .unwrap();
    let events = drain(&mut bob_rx);
    let buzzed = events_of_type(&events, "buzzed");
    assert_eq!(buzzed[0]["name"], "Carol");

    room_service::end_round_manual(&state, "conn-alice", &code)
        .await
        .unwrap();
    let events = drain(&mut bob_rx);
    let ends = events_of_type(&events, "roundEnd");
    assert_eq!(ends[0]["winner"], "Carol");
    // Elapsed is measured to the first buzz, which happened moments ago.
    assert!(ends[0]["elapsedMs"].as_u64().unwrap() < 5_000);
}

#[tokio::test]
async fn skip_vote_majority_ends_round_without_winner() {
    let state = test_state(None, None).await;
    let _alice_rx = connect(&state, "conn-alice");
    let mut bob_rx = connect(&state, "conn-bob");
    let _carol_rx = connect(&state, "conn-carol");

    let code = alice_room(&state).await;
    for (conn, name) in [("conn-bob", "Bob"), ("conn-carol", "Carol")] {
        room_service::join_room(&state, conn, &code, name, None)
            .await
            .unwrap();
    }
    room_service::start_game(
        &state,
        "conn-alice",
        &code,
        PlayMode::CatalogPreview,
        GameType::Text,
        vec![track("Deszcz na betonie", "Taco Hemingway", Some("p1"))],
    )
    .await
    .unwrap();
    room_service::next_round(&state, "conn-alice", &code)
        .await
        .unwrap();
    drain(&mut bob_rx);

    room_service::vote_skip(&state, "conn-bob", &code).await.unwrap();
    let events = drain(&mut bob_rx);
    assert!(events_of_type(&events, "roundEnd").is_empty());

    room_service::vote_skip(&state, "conn-carol", &code)
        .await
        .unwrap();
    let events = drain(&mut bob_rx);
    let ends = events_of_type(&events, "roundEnd");
    assert_eq!(ends.len(), 1);
    assert_eq!(ends[0]["skipped"], true);
    assert!(ends[0]["winner"].is_null() || ends[0].get("winner").is_none());
}

#[tokio::test]
async fn host_reattach_restores_host_rights_mid_round() {
    let state = test_state(None, None).await;
    let _alice_rx = connect(&state, "conn-alice");
    let _bob_rx = connect(&state, "conn-bob");

    let code = alice_room(&state).await;
    room_service::join_room(&state, "conn-bob", &code, "Bob", None)
        .await
        .unwrap();
    room_service::start_game(
        &state,
        "conn-alice",
        &code,
        PlayMode::CatalogPreview,
        GameType::Text,
        vec![
            track("Deszcz na betonie", "Taco Hemingway", Some("p1")),
            track("Następna stacja", "Taco Hemingway", Some("p2")),
        ],
    )
    .await
    .unwrap();
    room_service::next_round(&state, "conn-alice", &code)
        .await
        .unwrap();

    // Host drops; Bob inherits the host connection.
    state.connections().remove("conn-alice");
    room_service::handle_disconnect(&state, "conn-alice", &code).await;
    {
        let slot = state.registry().get(&code, None).await.unwrap();
        let room = slot.room.lock().await;
        assert_eq!(room.host_conn, "conn-bob");
        assert!(room.current_round.is_some());
    }

    // The original host returns under a new connection with the same
    // identity and takes the host handle back.
    let _alice2_rx = connect(&state, "conn-alice-2");
    room_service::join_room(&state, "conn-alice-2", &code, "Alice", Some("tok-alice"))
        .await
        .unwrap();
    {
        let slot = state.registry().get(&code, None).await.unwrap();
        let room = slot.room.lock().await;
        assert_eq!(room.host_conn, "conn-alice-2");
        assert!(room.current_round.is_some(), "round survives the handover");
    }

    // Host-only operations work again for the returned host.
    room_service::set_paused(&state, "conn-alice-2", &code, true)
        .await
        .unwrap();
}

#[tokio::test]
async fn playback_falls_back_to_official_search_api() {
    // Scraper finds nothing; the official API has the video.
    let state = test_state(None, Some("vid42")).await;
    let _alice_rx = connect(&state, "conn-alice");
    let mut bob_rx = connect(&state, "conn-bob");

    let code = alice_room(&state).await;
    room_service::join_room(&state, "conn-bob", &code, "Bob", None)
        .await
        .unwrap();
    room_service::start_game(
        &state,
        "conn-alice",
        &code,
        PlayMode::CatalogPreview,
        GameType::Text,
        vec![track("Deszcz na betonie", "Taco Hemingway", None)],
    )
    .await
    .unwrap();
    drain(&mut bob_rx);

    room_service::next_round(&state, "conn-alice", &code)
        .await
        .unwrap();
    let events = drain(&mut bob_rx);
    let starts = events_of_type(&events, "roundStart");
    assert_eq!(starts.len(), 1);
    assert_eq!(starts[0]["playback"]["type"], "video");
    assert_eq!(starts[0]["playback"]["videoId"], "vid42");
}

#[tokio::test]
async fn unplayable_pool_ends_the_game() {
    // No preview, no scraper result, no API result: nothing to play.
    let state = test_state(None, None).await;
    let mut alice_rx = connect(&state, "conn-alice");
    let code = alice_room(&state).await;

    room_service::start_game(
        &state,
        "conn-alice",
        &code,
        PlayMode::CatalogPreview,
        GameType::Text,
        vec![track("Deszcz na betonie", "Taco Hemingway", None)],
    )
    .await
    .unwrap();
    drain(&mut alice_rx);

    room_service::next_round(&state, "conn-alice", &code)
        .await
        .unwrap();
    let events = drain(&mut alice_rx);
    assert_eq!(events_of_type(&events, "gameOver").len(), 1);
}

#[tokio::test]
async fn kicked_member_gets_private_notice_and_is_removed() {
    let state = test_state(None, None).await;
    let _alice_rx = connect(&state, "conn-alice");
    let mut bob_rx = connect(&state, "conn-bob");

    let code = alice_room(&state).await;
    room_service::join_room(&state, "conn-bob", &code, "Bob", None)
        .await
        .unwrap();
    drain(&mut bob_rx);

    room_service::kick_player(&state, "conn-alice", &code, "conn-bob")
        .await
        .unwrap();
    let events = drain(&mut bob_rx);
    assert_eq!(events_of_type(&events, "kicked").len(), 1);

    let slot = state.registry().get(&code, None).await.unwrap();
    let room = slot.room.lock().await;
    assert!(!room.members.contains_key("conn-bob"));
}

#[tokio::test]
async fn room_snapshot_survives_registry_eviction() {
    let state = test_state(None, None).await;
    let _alice_rx = connect(&state, "conn-alice");

    let code = alice_room(&state).await;
    room_service::start_game(
        &state,
        "conn-alice",
        &code,
        PlayMode::CatalogPreview,
        GameType::Text,
        vec![track("Deszcz na betonie", "Taco Hemingway", Some("p1"))],
    )
    .await
    .unwrap();

    // Last member leaves: the live room is dropped, the snapshot is not.
    state.connections().remove("conn-alice");
    room_service::handle_disconnect(&state, "conn-alice", &code).await;
    assert!(state.registry().is_empty());

    // The owner comes back: the room is reloaded from the snapshot and the
    // pending sentinel resolves to the new connection.
    let _alice2_rx = connect(&state, "conn-alice-2");
    room_service::join_room(&state, "conn-alice-2", &code, "Alice", Some("tok-alice"))
        .await
        .unwrap();

    let slot = state.registry().get(&code, None).await.unwrap();
    let room = slot.room.lock().await;
    assert_eq!(room.host_conn, "conn-alice-2");
    assert!(room.answers_known);
    assert_eq!(room.tracks.len(), 1);
}
