// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport for the platform server.

pub mod auth;
pub mod http;
pub mod ws_headless;
pub mod ws_monitoring;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Builds the axum `Router` with every route the core touches.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(http::health))
        .route("/api/containers/{id}/conversations", get(http::list_conversations))
        .route("/api/containers/{id}/conversations/{conv_id}", delete(http::delete_conversation))
        .route("/api/containers/{id}/monitoring", put(http::upsert_monitoring).get(http::get_monitoring_status).delete(http::remove_monitoring))
        .route("/api/containers/{id}/monitoring/enable", post(http::enable_monitoring))
        .route("/api/containers/{id}/monitoring/disable", post(http::disable_monitoring))
        .route("/api/containers/{id}/automation-log", get(http::list_automation_log))
        .route("/api/containers/{id}/tasks", get(http::list_tasks).post(http::add_task))
        .route("/api/containers/{id}/tasks/reorder", put(http::reorder_tasks))
        .route("/api/containers/{id}/tasks/{task_id}", delete(http::remove_task))
        .route("/api/containers/{id}/tasks/{task_id}/status", put(http::set_task_status))
        .route("/ws/headless/{container_id}", get(ws_headless::ws_handler))
        .route("/ws/monitoring/{container_id}", get(ws_monitoring::ws_handler))
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
