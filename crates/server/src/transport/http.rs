// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! REST handlers: conversation listing/deletion, monitoring configuration,
//! and the task queue. The headless turn-taking itself only happens over
//! the `/ws/headless/{container_id}` socket.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use platform_core::error::ErrorCode;
use platform_core::model::{ContainerId, ConversationId, DockerId, MonitoringConfig, TaskId, TaskStatus};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub headless_sessions: usize,
    pub monitoring_sessions: usize,
}

/// `GET /api/health`
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "running",
        headless_sessions: state.headless.session_count().await,
        monitoring_sessions: state.monitoring.session_count().await,
    })
}

#[derive(Debug, Serialize)]
pub struct ConversationView {
    #[serde(flatten)]
    pub conversation: platform_core::model::HeadlessConversation,
    pub is_running: bool,
}

/// `GET /api/containers/{id}/conversations` — sorted by `updated_at` desc
/// (the store's query already orders them that way); each entry carries
/// `is_running` computed live from the headless registry.
pub async fn list_conversations(State(state): State<Arc<AppState>>, Path(container_id): Path<u64>) -> Result<impl IntoResponse, ApiError> {
    let container_id = ContainerId(container_id);
    let conversations = state.db.list_conversations_for_container(container_id).await?;

    let mut views = Vec::with_capacity(conversations.len());
    for conversation in conversations {
        let is_running = state.headless.is_conversation_running(conversation.id).await;
        views.push(ConversationView { conversation, is_running });
    }
    Ok(Json(views))
}

/// `DELETE /api/containers/{id}/conversations/{conv_id}` — rejects with
/// 409/423 if a live session still holds the conversation.
pub async fn delete_conversation(
    State(state): State<Arc<AppState>>,
    Path((_container_id, conversation_id)): Path<(u64, u64)>,
) -> Result<impl IntoResponse, ApiError> {
    let conversation_id = ConversationId(conversation_id);
    if state.headless.is_conversation_running(conversation_id).await {
        return Err(ApiError::new(ErrorCode::ConversationRunning, "a session is running against this conversation"));
    }
    state.db.delete_conversation(conversation_id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

// --- monitoring ----------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct MonitoringUpsertRequest {
    pub docker_id: String,
    #[serde(flatten)]
    pub config: MonitoringConfig,
}

/// `PUT /api/containers/{id}/monitoring` — creates the monitoring session
/// on first call, or atomically swaps its config on subsequent calls.
pub async fn upsert_monitoring(
    State(state): State<Arc<AppState>>,
    Path(container_id): Path<u64>,
    Json(req): Json<MonitoringUpsertRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.config.validate().map_err(|e| ApiError::new(ErrorCode::InvalidRequest, e.to_string()))?;
    let container_id = ContainerId(container_id);
    let docker_id = DockerId(req.docker_id);

    let session = match state.monitoring.get(container_id).await {
        Some(existing) => {
            existing.update_config(req.config).await.map_err(|e| ApiError::new(ErrorCode::InvalidRequest, e.to_string()))?;
            existing
        }
        None => state.monitoring.get_or_create(container_id, docker_id, req.config).await,
    };
    Ok(Json(session.status().await))
}

/// `GET /api/containers/{id}/monitoring`
pub async fn get_monitoring_status(State(state): State<Arc<AppState>>, Path(container_id): Path<u64>) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .monitoring
        .get(ContainerId(container_id))
        .await
        .ok_or_else(|| ApiError::not_found("no monitoring session for this container"))?;
    Ok(Json(session.status().await))
}

/// `POST /api/containers/{id}/monitoring/enable`
pub async fn enable_monitoring(State(state): State<Arc<AppState>>, Path(container_id): Path<u64>) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .monitoring
        .get(ContainerId(container_id))
        .await
        .ok_or_else(|| ApiError::not_found("no monitoring session for this container"))?;
    session.enable();
    Ok(Json(session.status().await))
}

/// `POST /api/containers/{id}/monitoring/disable`
pub async fn disable_monitoring(State(state): State<Arc<AppState>>, Path(container_id): Path<u64>) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .monitoring
        .get(ContainerId(container_id))
        .await
        .ok_or_else(|| ApiError::not_found("no monitoring session for this container"))?;
    session.disable();
    Ok(Json(session.status().await))
}

/// `DELETE /api/containers/{id}/monitoring` — stops and tears down the
/// session entirely (not just disables it).
pub async fn remove_monitoring(State(state): State<Arc<AppState>>, Path(container_id): Path<u64>) -> impl IntoResponse {
    state.monitoring.remove(ContainerId(container_id)).await;
    axum::http::StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
pub struct AddTaskRequest {
    pub text: String,
}

/// `GET /api/containers/{id}/tasks`
pub async fn list_tasks(State(state): State<Arc<AppState>>, Path(container_id): Path<u64>) -> Result<impl IntoResponse, ApiError> {
    let tasks = state.db.list_tasks(ContainerId(container_id)).await?;
    Ok(Json(tasks))
}

/// `POST /api/containers/{id}/tasks`
pub async fn add_task(
    State(state): State<Arc<AppState>>,
    Path(container_id): Path<u64>,
    Json(req): Json<AddTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let queue = task_queue_for(&state, ContainerId(container_id)).await?;
    let task = queue.add(&req.text).await?;
    Ok(Json(task))
}

/// `DELETE /api/containers/{id}/tasks/{task_id}`
pub async fn remove_task(
    State(state): State<Arc<AppState>>,
    Path((container_id, task_id)): Path<(u64, u64)>,
) -> Result<impl IntoResponse, ApiError> {
    let queue = task_queue_for(&state, ContainerId(container_id)).await?;
    queue.remove(TaskId(task_id)).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ReorderTasksRequest {
    pub ids: Vec<u64>,
}

/// `PUT /api/containers/{id}/tasks/reorder`
pub async fn reorder_tasks(
    State(state): State<Arc<AppState>>,
    Path(container_id): Path<u64>,
    Json(req): Json<ReorderTasksRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let queue = task_queue_for(&state, ContainerId(container_id)).await?;
    let ids: Vec<TaskId> = req.ids.into_iter().map(TaskId).collect();
    queue.reorder(&ids).await.map_err(|e| ApiError::new(ErrorCode::InvalidRequest, e.to_string()))?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct SetTaskStatusRequest {
    pub status: TaskStatus,
}

/// `PUT /api/containers/{id}/tasks/{task_id}/status`
pub async fn set_task_status(
    State(state): State<Arc<AppState>>,
    Path((container_id, task_id)): Path<(u64, u64)>,
    Json(req): Json<SetTaskStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let queue = task_queue_for(&state, ContainerId(container_id)).await?;
    queue.set_status(TaskId(task_id), req.status).await.map_err(|e| ApiError::new(ErrorCode::InvalidRequest, e.to_string()))?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

async fn task_queue_for(state: &Arc<AppState>, container_id: ContainerId) -> Result<Arc<crate::task_queue::TaskQueue>, ApiError> {
    state
        .monitoring
        .get_task_queue(container_id)
        .await
        .ok_or_else(|| ApiError::not_found("monitoring must be enabled for this container before its task queue exists"))
}

#[derive(Debug, Deserialize)]
pub struct AutomationLogQuery {
    #[serde(default)]
    pub limit: Option<u32>,
}

/// `GET /api/containers/{id}/automation-log`
pub async fn list_automation_log(
    State(state): State<Arc<AppState>>,
    Path(container_id): Path<u64>,
    Query(query): Query<AutomationLogQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let entries = state.db.list_automation_log(ContainerId(container_id), query.limit.unwrap_or(50)).await?;
    Ok(Json(entries))
}
