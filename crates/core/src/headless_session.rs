// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-conversation state machine that runs an external assistant CLI
//! inside a container, parses its event stream, aggregates responses into
//! turns, and fans events out to multiple subscribers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::aggregator::TurnAggregator;
use crate::container::{ContainerHandle, ProcessHandle, ProcessSpec};
use crate::model::{
    ConversationId, ConversationState, PromptSource, SessionId, TerminalOutcome, TurnId,
};
use crate::stream_event::{self, StreamEvent};

pub type ClientId = u64;

/// History-store facade the session calls into; kept separate from the
/// concrete `server::db` type so `core` never depends on `server`.
pub trait HistoryHandle: Send + Sync {
    fn start_turn<'a>(
        &'a self,
        conversation_id: ConversationId,
        prompt: &'a str,
        source: PromptSource,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<TurnId>> + Send + 'a>>;

    fn append_event<'a>(
        &'a self,
        turn_id: TurnId,
        event_type: &'a str,
        event_subtype: Option<&'a str>,
        raw_json: serde_json::Value,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send + 'a>>;

    fn update_claude_session_id<'a>(
        &'a self,
        conversation_id: ConversationId,
        remote_id: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send + 'a>>;

    #[allow(clippy::too_many_arguments)]
    fn complete_turn<'a>(
        &'a self,
        turn_id: TurnId,
        response: &'a str,
        model: Option<&'a str>,
        input_tokens: u64,
        output_tokens: u64,
        cost_usd: f64,
        duration_ms: u64,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send + 'a>>;

    fn fail_turn<'a>(
        &'a self,
        turn_id: TurnId,
        error_message: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send + 'a>>;
}

/// Events delivered to headless websocket subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HeadlessClientEvent {
    Event { stream_event: serde_json::Value },
    TurnComplete {
        turn_id: u64,
        turn_index: u32,
        model: Option<String>,
        input_tokens: u64,
        output_tokens: u64,
        cost_usd: f64,
        duration_ms: u64,
        state: ConversationState,
        error_message: Option<String>,
    },
}

struct Subscriber {
    tx: mpsc::Sender<HeadlessClientEvent>,
}

pub struct HeadlessSessionConfig {
    pub assistant_cli_name: String,
    pub cost_per_input_token: f64,
    pub cost_per_output_token: f64,
}

pub struct HeadlessSession {
    session_id: SessionId,
    conversation_id: ConversationId,
    container: Arc<dyn ContainerHandle>,
    workdir: String,
    history: Arc<dyn HistoryHandle>,
    config: HeadlessSessionConfig,

    state: RwLock<ConversationState>,
    current_turn_id: RwLock<Option<TurnId>>,
    current_turn_index: RwLock<u32>,
    claude_session_id: RwLock<Option<String>>,
    aggregator: TurnAggregator,
    subscribers: RwLock<HashMap<ClientId, Subscriber>>,
    last_activity_ms: AtomicU64,

    completion_latch: Arc<AtomicBool>,
    cancel: Mutex<Option<CancellationToken>>,
    process: Mutex<Option<Box<dyn ProcessHandle>>>,
}

impl HeadlessSession {
    pub fn new(
        session_id: SessionId,
        conversation_id: ConversationId,
        container: Arc<dyn ContainerHandle>,
        workdir: String,
        history: Arc<dyn HistoryHandle>,
        config: HeadlessSessionConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            session_id,
            conversation_id,
            container,
            workdir,
            history,
            config,
            state: RwLock::new(ConversationState::Idle),
            current_turn_id: RwLock::new(None),
            current_turn_index: RwLock::new(0),
            claude_session_id: RwLock::new(None),
            aggregator: TurnAggregator::new(),
            subscribers: RwLock::new(HashMap::new()),
            last_activity_ms: AtomicU64::new(crate::model::now_ms() as u64),
            completion_latch: Arc::new(AtomicBool::new(true)),
            cancel: Mutex::new(None),
            process: Mutex::new(None),
        })
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn conversation_id(&self) -> ConversationId {
        self.conversation_id
    }

    pub async fn state(&self) -> ConversationState {
        *self.state.read().await
    }

    pub fn last_activity_ms(&self) -> u64 {
        self.last_activity_ms.load(Ordering::SeqCst)
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    pub async fn subscribe(&self, client_id: ClientId) -> mpsc::Receiver<HeadlessClientEvent> {
        let (tx, rx) = mpsc::channel(32);
        self.subscribers.write().await.insert(client_id, Subscriber { tx });
        rx
    }

    pub async fn unsubscribe(&self, client_id: ClientId) {
        self.subscribers.write().await.remove(&client_id);
    }

    /// Responsibility 1: start a child process in the target container.
    /// `idle -> running` on success.
    pub async fn start_process(
        self: &Arc<Self>,
        prompt: String,
        _source: PromptSource,
        model: Option<String>,
        resume_id: Option<String>,
    ) -> anyhow::Result<()> {
        self.container.ensure_workdir(&self.workdir).await?;

        let mut argv = vec![self.config.assistant_cli_name.clone(), "--output-format".into(), "stream-json".into(), "--verbose".into()];
        if let Some(model) = &model {
            argv.push("--model".into());
            argv.push(model.clone());
        }
        if let Some(resume) = &resume_id {
            argv.push("--resume".into());
            argv.push(resume.clone());
        }
        argv.push(prompt);

        let spec = ProcessSpec { argv, workdir: self.workdir.clone() };
        let mut process = self.container.spawn_process(spec).await?;

        let cancel = CancellationToken::new();
        *self.cancel.lock().await = Some(cancel.clone());
        self.completion_latch.store(false, Ordering::SeqCst);
        *self.state.write().await = ConversationState::Running;

        let stdout_rx = process.take_stdout();
        self.spawn_reader(stdout_rx, cancel.clone());

        *self.process.lock().await = Some(process);
        self.spawn_waiter(cancel);

        Ok(())
    }

    fn spawn_reader(self: &Arc<Self>, mut stdout_rx: mpsc::Receiver<Vec<u8>>, cancel: CancellationToken) {
        let session = self.clone();
        tokio::spawn(async move {
            let mut buf = Vec::new();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    chunk = stdout_rx.recv() => {
                        let Some(chunk) = chunk else { break };
                        buf.extend_from_slice(&chunk);
                        while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                            let line: Vec<u8> = buf.drain(..=pos).collect();
                            let line = String::from_utf8_lossy(&line);
                            session.handle_line(line.trim_end_matches('\n')).await;
                        }
                    }
                }
            }
        });
    }

    async fn handle_line(self: &Arc<Self>, line: &str) {
        let Some((event, _valid)) = stream_event::parse_line(line) else { return };

        self.last_activity_ms.store(crate::model::now_ms() as u64, Ordering::SeqCst);

        if let Some(remote_id) = stream_event::extract_session_id(&event) {
            let mut claude_session_id = self.claude_session_id.write().await;
            if claude_session_id.is_none() {
                *claude_session_id = Some(remote_id.to_string());
                let _ = self.history.update_claude_session_id(self.conversation_id, remote_id).await;
            }
        }

        if let Some(model) = &event.model {
            self.aggregator.update_model(model.clone());
        }
        if let Some(usage) = stream_event::extract_usage(&event) {
            self.aggregator.update_usage(usage);
        }
        if matches!(event.event_type, crate::stream_event::StreamEventType::Assistant) {
            if let Some(text) = stream_event::extract_text(&event) {
                self.aggregator.append_text(text);
            }
        }

        if let Some(turn_id) = *self.current_turn_id.read().await {
            let raw_json = serde_json::to_value(&event).unwrap_or(serde_json::Value::Null);
            let _ = self
                .history
                .append_event(turn_id, event_type_str(&event), event_subtype_str(&event), raw_json.clone())
                .await;
            self.broadcast(HeadlessClientEvent::Event { stream_event: raw_json }).await;
        }

        if stream_event::is_result(&event) {
            let outcome = if event.is_error {
                TerminalOutcome::Error { message: event.error.clone().or(event.result.clone()).unwrap_or_default() }
            } else {
                TerminalOutcome::Success
            };
            self.on_turn_complete(outcome).await;
        }
    }

    fn spawn_waiter(self: &Arc<Self>, cancel: CancellationToken) {
        let session = self.clone();
        tokio::spawn(async move {
            let exit = {
                let mut guard = session.process.lock().await;
                match guard.as_mut() {
                    Some(process) => process.wait().await,
                    None => return,
                }
            };

            if cancel.is_cancelled() {
                return;
            }
            if session.state().await != ConversationState::Running {
                return;
            }

            let outcome = match exit {
                Ok(status) if status.success() => TerminalOutcome::Success,
                Ok(status) => TerminalOutcome::Error { message: format!("process exited with code {:?}", status.code) },
                Err(e) => TerminalOutcome::Error { message: e.to_string() },
            };
            session.on_turn_complete(outcome).await;
        });
    }

    /// Responsibility 5: the single completion routine, gated by the
    /// completion latch so the first of {reader, waiter, cancel} wins.
    async fn on_turn_complete(self: &Arc<Self>, outcome: TerminalOutcome) {
        if self
            .completion_latch
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let Some(turn_id) = self.current_turn_id.write().await.take() else { return };
        let turn_index = *self.current_turn_index.read().await;

        let built = self.aggregator.build();
        let cost_usd = built.input_tokens as f64 * self.config.cost_per_input_token
            + built.output_tokens as f64 * self.config.cost_per_output_token;

        let (new_state, error_message) = match &outcome {
            TerminalOutcome::Success => {
                let _ = self
                    .history
                    .complete_turn(turn_id, &built.text, built.model.as_deref(), built.input_tokens, built.output_tokens, cost_usd, built.duration_ms)
                    .await;
                (ConversationState::Idle, None)
            }
            TerminalOutcome::Error { message } => {
                let _ = self.history.fail_turn(turn_id, message).await;
                (ConversationState::Error, Some(message.clone()))
            }
            TerminalOutcome::Cancelled => {
                let message = "cancelled by user".to_string();
                let _ = self.history.fail_turn(turn_id, &message).await;
                (ConversationState::Error, Some(message))
            }
        };

        self.aggregator.reset();
        *self.state.write().await = new_state;

        self.broadcast(HeadlessClientEvent::TurnComplete {
            turn_id: turn_id.0,
            turn_index,
            model: built.model,
            input_tokens: built.input_tokens,
            output_tokens: built.output_tokens,
            cost_usd,
            duration_ms: built.duration_ms,
            state: new_state,
            error_message,
        })
        .await;
    }

    /// Responsibility 6: cooperative cancellation, only from `running`.
    pub async fn cancel_execution(self: &Arc<Self>) -> anyhow::Result<()> {
        if self.state().await != ConversationState::Running {
            return Ok(());
        }
        if let Some(cancel) = self.cancel.lock().await.take() {
            cancel.cancel();
        }
        if let Some(process) = self.process.lock().await.as_mut() {
            let _ = process.kill().await;
        }
        self.on_turn_complete(TerminalOutcome::Cancelled).await;
        Ok(())
    }

    pub async fn close(self: &Arc<Self>) {
        if let Some(cancel) = self.cancel.lock().await.take() {
            cancel.cancel();
        }
        if let Some(process) = self.process.lock().await.as_mut() {
            let _ = process.kill().await;
        }
        *self.state.write().await = ConversationState::Closed;
    }

    /// Called by the registry's `send_prompt` after `start_turn` has
    /// allocated the turn id.
    pub async fn bind_turn(&self, turn_id: TurnId, turn_index: u32) {
        *self.current_turn_id.write().await = Some(turn_id);
        *self.current_turn_index.write().await = turn_index;
        self.completion_latch.store(false, Ordering::SeqCst);
    }

    async fn broadcast(&self, event: HeadlessClientEvent) {
        let subscribers = self.subscribers.read().await;
        for (client_id, sub) in subscribers.iter() {
            if let Err(mpsc::error::TrySendError::Full(_)) = sub.tx.try_send(event.clone()) {
                tracing::debug!(client_id, "headless event dropped: subscriber channel full");
            }
        }
    }
}

fn event_type_str(event: &StreamEvent) -> &'static str {
    use crate::stream_event::StreamEventType::*;
    match event.event_type {
        System => "system",
        Assistant => "assistant",
        User => "user",
        Result => "result",
        TurnComplete => "turn_complete",
        Unknown => "unknown",
    }
}

fn event_subtype_str(_event: &StreamEvent) -> Option<&'static str> {
    None
}

#[cfg(test)]
#[path = "headless_session_tests.rs"]
mod tests;
