// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared data model: opaque identifiers, configuration, and the
//! persisted/transient record shapes used across monitoring and headless
//! sessions.

use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($name:ident, $inner:ty) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl From<$inner> for $name {
            fn from(v: $inner) -> Self {
                Self(v)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(ContainerId, u64);
id_type!(ConversationId, u64);
id_type!(SessionId, u64);
id_type!(TurnId, u64);
id_type!(EventId, u64);
id_type!(TaskId, u64);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DockerId(pub String);

impl std::fmt::Display for DockerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validation failure for configuration or state-transition inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError(pub String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveStrategy {
    Webhook,
    Injection,
    Queue,
    Ai,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    Idle,
    Running,
    Error,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Pending,
    Running,
    Completed,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptSource {
    User,
    Strategy,
    Monitoring,
}

/// Per-container monitoring configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub silence_threshold_secs: u32,
    pub active_strategy: ActiveStrategy,
    pub context_buffer_size: usize,
    pub webhook_url: Option<String>,
    pub webhook_headers: serde_json::Value,
    pub injection_command: Option<String>,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            silence_threshold_secs: 30,
            active_strategy: ActiveStrategy::None,
            context_buffer_size: 64 * 1024,
            webhook_url: None,
            webhook_headers: serde_json::json!({}),
            injection_command: None,
        }
    }
}

impl MonitoringConfig {
    /// Validate the invariants from the data model: threshold range,
    /// webhook URL well-formedness, header shape, non-empty injection
    /// command when required.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(5..=300).contains(&self.silence_threshold_secs) {
            return Err(ValidationError(format!(
                "silence_threshold_secs must be in [5, 300], got {}",
                self.silence_threshold_secs
            )));
        }

        if matches!(self.active_strategy, ActiveStrategy::Webhook) {
            let url = self
                .webhook_url
                .as_deref()
                .ok_or_else(|| ValidationError("webhook_url required for webhook strategy".into()))?;
            let parsed = reqwest::Url::parse(url)
                .map_err(|e| ValidationError(format!("invalid webhook_url: {e}")))?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(ValidationError("webhook_url must use http or https".into()));
            }
        }

        if !self.webhook_headers.is_null() {
            match &self.webhook_headers {
                serde_json::Value::Object(map) => {
                    if !map.values().all(|v| v.is_string()) {
                        return Err(ValidationError("webhook_headers values must be strings".into()));
                    }
                }
                other if other == &serde_json::json!({}) => {}
                _ => return Err(ValidationError("webhook_headers must be a JSON object".into())),
            }
        }

        if matches!(self.active_strategy, ActiveStrategy::Injection) {
            let cmd = self.injection_command.as_deref().unwrap_or("");
            if cmd.is_empty() {
                return Err(ValidationError("injection_command must be non-empty for injection strategy".into()));
            }
        }

        Ok(())
    }
}

/// A task in a container's automation queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub container_id: ContainerId,
    pub order_index: u32,
    pub text: String,
    pub status: TaskStatus,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadlessConversation {
    pub id: ConversationId,
    pub session_id: Option<SessionId>,
    pub container_id: ContainerId,
    pub claude_session_id: Option<String>,
    pub title: Option<String>,
    pub state: ConversationState,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadlessTurn {
    pub id: TurnId,
    pub conversation_id: ConversationId,
    pub turn_index: u32,
    pub user_prompt: String,
    pub prompt_source: PromptSource,
    pub state: TurnState,
    pub assistant_response: Option<String>,
    pub model: Option<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub duration_ms: u64,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadlessEvent {
    pub id: EventId,
    pub turn_id: TurnId,
    pub event_index: u32,
    pub event_type: String,
    pub event_subtype: Option<String>,
    pub raw_json: serde_json::Value,
    pub created_at: i64,
}

/// One row of the automation log: a record of a single strategy invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationLogEntry {
    pub container_id: ContainerId,
    pub session_id: SessionId,
    pub strategy: String,
    pub action: String,
    pub command: Option<String>,
    pub reason: Option<String>,
    pub success: bool,
    pub created_at: i64,
}

/// Outcome of a child process's run, feeding the single completion routine.
#[derive(Debug, Clone)]
pub enum TerminalOutcome {
    Success,
    Error { message: String },
    Cancelled,
}

/// Current epoch milliseconds. Centralised so only one place in the crate
/// calls into wall-clock time.
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
