// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Maps `session_id -> HeadlessSession` and `conversation_id -> session_id`,
//! and runs the idle reaper that closes sessions nobody is watching.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use platform_core::headless_session::{HeadlessSession, HeadlessSessionConfig, HistoryHandle};
use platform_core::model::{ContainerId, ConversationState, DockerId, PromptSource, SessionId, TurnId};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::container::ContainerResolver;
use crate::error::ApiError;

struct Entry {
    session: Arc<HeadlessSession>,
    container_id: ContainerId,
}

pub struct HeadlessRegistry {
    sessions: RwLock<HashMap<SessionId, Entry>>,
    by_conversation: RwLock<HashMap<platform_core::model::ConversationId, SessionId>>,
    db: Arc<dyn HistoryHandle>,
    conversations: Arc<crate::db::HistoryStore>,
    resolver: Arc<dyn ContainerResolver>,
    assistant_cli_name: String,
    cost_per_input_token: f64,
    cost_per_output_token: f64,
    idle_timeout: Duration,
    next_session_id: AtomicU64,
    shutdown: CancellationToken,
}

impl HeadlessRegistry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        conversations: Arc<crate::db::HistoryStore>,
        resolver: Arc<dyn ContainerResolver>,
        assistant_cli_name: String,
        cost_per_input_token: f64,
        cost_per_output_token: f64,
        idle_timeout: Duration,
        reaper_interval: Duration,
    ) -> Arc<Self> {
        let registry = Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            by_conversation: RwLock::new(HashMap::new()),
            db: conversations.clone(),
            conversations,
            resolver,
            assistant_cli_name,
            cost_per_input_token,
            cost_per_output_token,
            idle_timeout,
            next_session_id: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
        });
        spawn_idle_reaper(registry.clone(), reaper_interval);
        registry
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn session_config(&self) -> HeadlessSessionConfig {
        HeadlessSessionConfig {
            assistant_cli_name: self.assistant_cli_name.clone(),
            cost_per_input_token: self.cost_per_input_token,
            cost_per_output_token: self.cost_per_output_token,
        }
    }

    /// Creates a brand new conversation and session for `container_id`.
    pub async fn create_session(&self, container_id: ContainerId, docker_id: DockerId, workdir: String) -> anyhow::Result<Arc<HeadlessSession>> {
        let conversation = self.conversations.create_conversation(container_id, None).await?;
        self.spawn_session(conversation.id, container_id, docker_id, workdir).await
    }

    /// Reuses the live session for `conversation_id` if one exists, else
    /// creates a new one.
    pub async fn create_session_for_conversation(
        &self,
        conversation_id: platform_core::model::ConversationId,
        container_id: ContainerId,
        docker_id: DockerId,
        workdir: String,
    ) -> anyhow::Result<Arc<HeadlessSession>> {
        if let Some(session) = self.get_session_by_conversation_id(conversation_id).await {
            return Ok(session);
        }
        self.spawn_session(conversation_id, container_id, docker_id, workdir).await
    }

    async fn spawn_session(
        &self,
        conversation_id: platform_core::model::ConversationId,
        container_id: ContainerId,
        docker_id: DockerId,
        workdir: String,
    ) -> anyhow::Result<Arc<HeadlessSession>> {
        let session_id = SessionId(self.next_session_id.fetch_add(1, Ordering::SeqCst));
        self.conversations.update_conversation_session_id(conversation_id, session_id).await?;

        let container = self.resolver.resolve(container_id, docker_id);
        let session = HeadlessSession::new(session_id, conversation_id, container, workdir, self.db.clone(), self.session_config());

        self.sessions.write().await.insert(session_id, Entry { session: session.clone(), container_id });
        self.by_conversation.write().await.insert(conversation_id, session_id);
        Ok(session)
    }

    pub async fn get_session(&self, session_id: SessionId) -> Option<Arc<HeadlessSession>> {
        self.sessions.read().await.get(&session_id).map(|e| e.session.clone())
    }

    pub async fn get_session_by_conversation_id(&self, conversation_id: platform_core::model::ConversationId) -> Option<Arc<HeadlessSession>> {
        let session_id = *self.by_conversation.read().await.get(&conversation_id)?;
        self.get_session(session_id).await
    }

    pub async fn is_conversation_running(&self, conversation_id: platform_core::model::ConversationId) -> bool {
        match self.get_session_by_conversation_id(conversation_id).await {
            Some(session) => session.state().await == ConversationState::Running,
            None => false,
        }
    }

    /// `send_prompt` contract: reject if busy or closed; allocate a turn;
    /// bind it to the session; start the process. On start failure, mark
    /// the allocated turn failed and surface the error.
    pub async fn send_prompt(&self, session_id: SessionId, prompt: String, source: PromptSource, model: Option<String>) -> Result<TurnId, ApiError> {
        let session = self.get_session(session_id).await.ok_or_else(|| ApiError::not_found("no such headless session"))?;

        let state = session.state().await;
        if state == ConversationState::Running {
            return Err(ApiError::new(platform_core::error::ErrorCode::SessionBusy, "a turn is already running"));
        }
        if state == ConversationState::Closed {
            return Err(ApiError::not_found("session is closed"));
        }

        let turn_id = self.db.start_turn(session.conversation_id(), &prompt, source).await.map_err(ApiError::from)?;
        let turn_index = self
            .conversations
            .get_turn_by_id(turn_id)
            .await
            .map_err(ApiError::from)?
            .map(|t| t.turn_index)
            .unwrap_or(0);
        session.bind_turn(turn_id, turn_index).await;

        if let Err(e) = session.start_process(prompt, source, model, None).await {
            let _ = self.db.fail_turn(turn_id, &e.to_string()).await;
            return Err(ApiError::internal(e.to_string()));
        }

        Ok(turn_id)
    }

    pub async fn cancel_execution(&self, session_id: SessionId) -> anyhow::Result<()> {
        if let Some(session) = self.get_session(session_id).await {
            session.cancel_execution().await?;
        }
        Ok(())
    }

    /// Closes the process and removes the session from both maps. History
    /// is never deleted.
    pub async fn close_session(&self, session_id: SessionId) {
        let entry = self.sessions.write().await.remove(&session_id);
        let Some(entry) = entry else { return };
        entry.session.close().await;
        self.by_conversation.write().await.retain(|_, sid| *sid != session_id);
    }

    pub async fn close_session_by_conversation_id(&self, conversation_id: platform_core::model::ConversationId) {
        let session_id = self.by_conversation.read().await.get(&conversation_id).copied();
        if let Some(session_id) = session_id {
            self.close_session(session_id).await;
        }
    }

    pub async fn close_sessions_for_container(&self, container_id: ContainerId) {
        let session_ids: Vec<SessionId> = self
            .sessions
            .read()
            .await
            .iter()
            .filter(|(_, e)| e.container_id == container_id)
            .map(|(id, _)| *id)
            .collect();
        for session_id in session_ids {
            self.close_session(session_id).await;
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Wakes every `interval`, closes any session that is idle, has zero
/// subscribers, and has been inactive past `registry.idle_timeout`.
fn spawn_idle_reaper(registry: Arc<HeadlessRegistry>, interval: Duration) {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = registry.shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }

            let entries: Vec<(SessionId, Arc<HeadlessSession>)> = {
                let sessions = registry.sessions.read().await;
                sessions.iter().map(|(id, e)| (*id, e.session.clone())).collect()
            };

            let now = platform_core::model::now_ms() as u64;
            for (session_id, session) in entries {
                if session.state().await != ConversationState::Idle {
                    continue;
                }
                if session.subscriber_count().await != 0 {
                    continue;
                }
                let idle_for = Duration::from_millis(now.saturating_sub(session.last_activity_ms()));
                if idle_for < registry.idle_timeout {
                    continue;
                }

                tracing::info!(session_id = session_id.0, idle_secs = idle_for.as_secs(), "reaping idle headless session");
                registry.close_session(session_id).await;
            }
        }
    });
}

#[cfg(test)]
#[path = "headless_registry_tests.rs"]
mod tests;
