// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Monitoring status WebSocket transport: fans out `StatusEvent`s for a
//! single container (enable/disable, config updates, strategy triggers,
//! task changes) to every subscribed client. Never carries raw output —
//! that is a separate, transparent data plane outside this crate's scope.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use platform_core::model::ContainerId;
use serde::Deserialize;

use crate::state::AppState;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// `GET /ws/monitoring/{container_id}` — WebSocket upgrade. The session
/// must already exist (created via `PUT /api/containers/{id}/monitoring`);
/// otherwise the upgrade is rejected with 404.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Path(container_id): Path<u64>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    if !crate::transport::auth::validate_ws_query(query.token.as_deref(), state.config.auth_token.as_deref()) {
        return (axum::http::StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }

    let Some(session) = state.monitoring.get(ContainerId(container_id)).await else {
        return (axum::http::StatusCode::NOT_FOUND, "no monitoring session for this container").into_response();
    };

    ws.on_upgrade(move |socket| handle_socket(socket, session)).into_response()
}

async fn handle_socket(socket: WebSocket, session: Arc<platform_core::monitoring_session::MonitoringSession>) {
    let client_id = NEXT_CLIENT_ID.fetch_add(1, Ordering::SeqCst);
    let (mut tx, mut rx) = socket.split();

    let mut events = session.subscribe(client_id).await;
    if let Ok(text) = serde_json::to_string(&serde_json::json!({ "type": "monitoring_status", "status": session.status().await })) {
        let _ = tx.send(Message::Text(text.into())).await;
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(event) => {
                        if let Ok(text) = serde_json::to_string(&event) {
                            if tx.send(Message::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    None => break,
                }
            }
            // The status plane is read-only from the client's perspective;
            // any inbound frame is just a liveness probe (e.g. a ping).
            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    session.unsubscribe(client_id).await;
}
