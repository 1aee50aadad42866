// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Headless WebSocket transport: one socket per browser client, attached
//! to a single container. The first client message resolves or creates
//! the headless session; afterwards the socket carries prompts,
//! cancellation, history paging, and live turn events.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use platform_core::headless_session::{HeadlessClientEvent, HeadlessSession};
use platform_core::model::{ContainerId, ConversationId, DockerId, HeadlessEvent, HeadlessTurn, PromptSource, TurnId};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

type WsTx = SplitSink<WebSocket, Message>;
type WsRx = SplitStream<WebSocket>;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// Client -> server frames.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    HeadlessStart { conversation_id: Option<u64>, docker_id: String, workdir: String },
    HeadlessPrompt { prompt: String, #[serde(default)] source: Option<PromptSource>, #[serde(default)] model: Option<String> },
    HeadlessCancel,
    LoadMore { before_turn_id: u64, limit: u32 },
    ModeSwitch,
    Ping,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnView {
    #[serde(flatten)]
    pub turn: HeadlessTurn,
    pub events: Vec<HeadlessEvent>,
}

/// `GET /ws/headless/{container_id}` — WebSocket upgrade.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Path(container_id): Path<u64>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    if !crate::transport::auth::validate_ws_query(query.token.as_deref(), state.config.auth_token.as_deref()) {
        return (axum::http::StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state, ContainerId(container_id))).into_response()
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, container_id: ContainerId) {
    let client_id = NEXT_CLIENT_ID.fetch_add(1, Ordering::SeqCst);
    let (mut tx, mut rx) = socket.split();

    let Some(session) = await_start(&mut tx, &mut rx, &state, container_id).await else {
        return;
    };

    let mut events = session.subscribe(client_id).await;
    send_json(&mut tx, &session_info_frame(&session)).await;
    send_history(&mut tx, &state, session.conversation_id(), None).await;

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(event) => send_json(&mut tx, &client_event_frame(event)).await,
                    None => break,
                }
            }
            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if !handle_client_frame(&text, &mut tx, &session, &state, client_id).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    session.unsubscribe(client_id).await;
}

/// Blocks until the client sends `headless_start` (or disconnects). Any
/// other frame received first yields an `invalid_request` error; the
/// client is expected to retry with `headless_start`.
async fn await_start(tx: &mut WsTx, rx: &mut WsRx, state: &Arc<AppState>, container_id: ContainerId) -> Option<Arc<HeadlessSession>> {
    loop {
        let Some(Ok(Message::Text(text))) = rx.next().await else { return None };
        match serde_json::from_str::<ClientFrame>(&text) {
            Ok(ClientFrame::HeadlessStart { conversation_id, docker_id, workdir }) => {
                let docker_id = DockerId(docker_id);
                let result = match conversation_id {
                    Some(id) => state.headless.create_session_for_conversation(ConversationId(id), container_id, docker_id, workdir).await,
                    None => state.headless.create_session(container_id, docker_id, workdir).await,
                };
                match result {
                    Ok(session) => return Some(session),
                    Err(e) => {
                        send_json(tx, &ApiError::internal(e.to_string()).to_ws_event()).await;
                        return None;
                    }
                }
            }
            Ok(ClientFrame::Ping) => send_json(tx, &serde_json::json!({ "type": "pong" })).await,
            Ok(_) => send_json(tx, &ApiError::invalid("expected headless_start as the first message").to_ws_event()).await,
            Err(e) => send_json(tx, &ApiError::invalid(format!("malformed frame: {e}")).to_ws_event()).await,
        }
    }
}

/// Handles one client frame on an already-started socket. Returns `false`
/// when the socket should close (mode switch, or the session was reaped
/// out from under it).
async fn handle_client_frame(text: &str, tx: &mut WsTx, session: &Arc<HeadlessSession>, state: &Arc<AppState>, client_id: u64) -> bool {
    match serde_json::from_str::<ClientFrame>(text) {
        Ok(ClientFrame::HeadlessPrompt { prompt, source, model }) => {
            let source = source.unwrap_or(PromptSource::User);
            if let Err(e) = state.headless.send_prompt(session.session_id(), prompt, source, model).await {
                send_json(tx, &e.to_ws_event()).await;
            }
        }
        Ok(ClientFrame::HeadlessCancel) => {
            if let Err(e) = state.headless.cancel_execution(session.session_id()).await {
                send_json(tx, &ApiError::internal(e.to_string()).to_ws_event()).await;
            }
        }
        Ok(ClientFrame::LoadMore { before_turn_id, limit }) => {
            send_history(tx, state, session.conversation_id(), Some((TurnId(before_turn_id), limit))).await;
        }
        Ok(ClientFrame::ModeSwitch) => {
            session.unsubscribe(client_id).await;
            state.headless.close_session(session.session_id()).await;
            send_json(tx, &serde_json::json!({ "type": "mode_switched", "mode": "pty", "closed_sessions": 1 })).await;
            send_json(tx, &serde_json::json!({ "type": "pty_closed", "reason": "mode_switch" })).await;
            return false;
        }
        Ok(ClientFrame::Ping) => send_json(tx, &serde_json::json!({ "type": "pong" })).await,
        Ok(ClientFrame::HeadlessStart { .. }) => {
            send_json(tx, &ApiError::invalid("session already started on this socket").to_ws_event()).await;
        }
        Err(e) => send_json(tx, &ApiError::invalid(format!("malformed frame: {e}")).to_ws_event()).await,
    }

    if session.state().await == platform_core::model::ConversationState::Closed {
        send_json(tx, &serde_json::json!({ "type": "no_session" })).await;
        return false;
    }
    true
}

fn session_info_frame(session: &HeadlessSession) -> serde_json::Value {
    serde_json::json!({
        "type": "session_info",
        "session_id": session.session_id().0,
        "conversation_id": session.conversation_id().0,
    })
}

fn client_event_frame(event: HeadlessClientEvent) -> serde_json::Value {
    match event {
        HeadlessClientEvent::Event { stream_event } => serde_json::json!({ "type": "event", "event": stream_event }),
        other => serde_json::to_value(other).unwrap_or(serde_json::Value::Null),
    }
}

/// Sends a `history` (no cursor) or `history_more` (paged, `before`) frame
/// built from persisted turns, each carrying its events for rendering.
async fn send_history(tx: &mut WsTx, state: &Arc<AppState>, conversation_id: ConversationId, before: Option<(TurnId, u32)>) {
    let (turns, has_more, frame_type) = match before {
        None => match state.db.get_recent_turns(conversation_id, 50).await {
            Ok((turns, has_more)) => (turns, has_more, "history"),
            Err(e) => return send_json(tx, &ApiError::internal(e.to_string()).to_ws_event()).await,
        },
        Some((before_turn_id, limit)) => match state.db.get_turns_before(conversation_id, before_turn_id, limit).await {
            Ok((turns, has_more)) => (turns, has_more, "history_more"),
            Err(e) => return send_json(tx, &ApiError::internal(e.to_string()).to_ws_event()).await,
        },
    };

    let mut views = Vec::with_capacity(turns.len());
    for turn in turns {
        let events = state.db.get_turn_events(turn.id).await.unwrap_or_default();
        views.push(TurnView { turn, events });
    }

    send_json(tx, &serde_json::json!({ "type": frame_type, "turns": views, "has_more": has_more })).await;
}

async fn send_json(tx: &mut WsTx, value: &serde_json::Value) {
    let Ok(text) = serde_json::to_string(value) else { return };
    let _ = tx.send(Message::Text(text.into())).await;
}
