//! Client WebSocket lifecycle: one socket per connection, a dedicated writer
//! task, JSON command dispatch with ack replies, and disconnect cleanup.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{AckReply, ClientCommand, ClientEnvelope, ServerMessage},
    error::ServiceError,
    services::room_service,
    state::{ConnectionHandle, SharedState},
};

/// Handle the full lifecycle of an individual client connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we
    // await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let conn_id = Uuid::new_v4().simple().to_string();
    state.connections().insert(
        conn_id.clone(),
        ConnectionHandle {
            id: conn_id.clone(),
            tx: outbound_tx.clone(),
        },
    );
    info!(conn = %conn_id, "client connected");

    // The room this connection created or joined, for disconnect cleanup.
    let mut room_code: Option<String> = None;

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                let envelope = match ClientEnvelope::from_json_str(&text) {
                    Ok(envelope) => envelope,
                    Err(err) => {
                        warn!(conn = %conn_id, error = %err, "failed to parse client message");
                        continue;
                    }
                };

                let ack = envelope.ack;
                let result = dispatch(&state, &conn_id, &mut room_code, envelope.command).await;
                if let Some(ack) = ack {
                    let reply = match result {
                        Ok(data) => {
                            let data = (data != Value::Null).then_some(data);
                            AckReply::ok(ack, data)
                        }
                        Err(err) => AckReply::err(ack, err.tag()),
                    };
                    send_message(&outbound_tx, &ServerMessage::Ack(reply));
                } else if let Err(err) = result {
                    warn!(conn = %conn_id, error = %err, "command failed without ack");
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(conn = %conn_id, error = %err, "websocket error");
                break;
            }
        }
    }

    state.connections().remove(&conn_id);
    if let Some(code) = room_code {
        room_service::handle_disconnect(&state, &conn_id, &code).await;
    }
    info!(conn = %conn_id, "client disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Route one parsed command to the matching room-service operation.
async fn dispatch(
    state: &SharedState,
    conn: &str,
    room_code: &mut Option<String>,
    command: ClientCommand,
) -> Result<Value, ServiceError> {
    match command {
        ClientCommand::CreateRoom {} => {
            let data = room_service::create_room(state, conn).await?;
            if let Some(code) = data.get("code").and_then(Value::as_str) {
                *room_code = Some(code.to_string());
            }
            Ok(data)
        }
        ClientCommand::JoinRoom { code, name, token } => {
            let data =
                room_service::join_room(state, conn, &code, &name, token.as_deref()).await?;
            *room_code = Some(code);
            Ok(data)
        }
        ClientCommand::SetName { code, name } => {
            room_service::set_name(state, conn, &code, &name).await
        }
        ClientCommand::StartGame {
            code,
            mode,
            tracks,
            game_type,
        } => room_service::start_game(state, conn, &code, mode, game_type, tracks).await,
        ClientCommand::NextRound { code } => room_service::next_round(state, conn, &code).await,
        ClientCommand::Guess { code, guess_text } => {
            room_service::guess(state, conn, &code, &guess_text).await
        }
        ClientCommand::Chat { code, text, .. } => {
            room_service::chat(state, conn, &code, &text).await
        }
        ClientCommand::VoteSkip { code } => room_service::vote_skip(state, conn, &code).await,
        ClientCommand::Buzz { code } => room_service::buzz(state, conn, &code).await,
        ClientCommand::PassBuzzer { code } => room_service::pass_buzzer(state, conn, &code).await,
        ClientCommand::AwardPoints {
            code,
            player_name,
            points,
        } => room_service::adjust_points(state, conn, &code, &player_name, points, true).await,
        ClientCommand::DeductPoints {
            code,
            player_name,
            points,
        } => room_service::adjust_points(state, conn, &code, &player_name, points, false).await,
        ClientCommand::EndRoundManual { code } => {
            room_service::end_round_manual(state, conn, &code).await
        }
        ClientCommand::HostVerifyGuess {
            code,
            artist,
            title,
        } => room_service::host_verify(state, conn, &code, &artist, &title).await,
        ClientCommand::PauseRound { code } => {
            room_service::set_paused(state, conn, &code, true).await
        }
        ClientCommand::ResumeRound { code } => {
            room_service::set_paused(state, conn, &code, false).await
        }
        ClientCommand::KickPlayer {
            code,
            target_conn_handle,
        } => room_service::kick_player(state, conn, &code, &target_conn_handle).await,
        ClientCommand::Unknown => {
            warn!(conn = %conn, "ignoring unknown command type");
            Ok(Value::Null)
        }
    }
}

/// Serialize a payload and push it onto the writer channel.
fn send_message(tx: &mpsc::UnboundedSender<Message>, message: &ServerMessage) {
    match serde_json::to_string(message) {
        Ok(payload) => {
            let _ = tx.send(Message::Text(payload.into()));
        }
        Err(err) => warn!(error = %err, "failed to serialize server message"),
    }
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
