// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite-backed persistence for headless conversations/turns/events, the
//! per-container task queue, and the automation log. A single writer
//! connection behind a `tokio::sync::Mutex` serializes access; reads and
//! writes alike go through it since this is a small, local, low-concurrency
//! store rather than a high-throughput index.

use std::path::Path;
use std::pin::Pin;

use anyhow::{Context, Result};
use platform_core::headless_session::HistoryHandle;
use platform_core::model::{
    AutomationLogEntry, ConversationId, ConversationState, ContainerId, HeadlessConversation,
    HeadlessEvent, HeadlessTurn, PromptSource, SessionId, Task, TaskId, TaskStatus, TurnId, TurnState,
};
use platform_core::monitoring_session::AutomationLogSink;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;

pub const SCHEMA_VERSION: i32 = 1;

/// Number of times a turn/event insert retries after losing a race on the
/// unique `(conversation_id, turn_index)` / `(turn_id, event_index)` index.
const MAX_INDEX_RETRIES: u32 = 3;

pub struct HistoryStore {
    conn: Mutex<Connection>,
}

impl HistoryStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).with_context(|| format!("opening database at {}", path.display()))?;
        init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory database")?;
        init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    // --- conversations -----------------------------------------------------

    pub async fn create_conversation(&self, container_id: ContainerId, session_id: Option<SessionId>) -> Result<HeadlessConversation> {
        let conn = self.conn.lock().await;
        let now = platform_core::model::now_ms();
        conn.execute(
            "INSERT INTO headless_conversations (session_id, container_id, claude_session_id, title, state, created_at, updated_at)
             VALUES (?1, ?2, NULL, NULL, ?3, ?4, ?4)",
            params![session_id.map(|s| s.0 as i64), container_id.0 as i64, state_str(ConversationState::Idle), now],
        )
        .context("inserting conversation")?;
        let id = conn.last_insert_rowid();
        Ok(HeadlessConversation {
            id: ConversationId(id as u64),
            session_id,
            container_id,
            claude_session_id: None,
            title: None,
            state: ConversationState::Idle,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn update_conversation_state(&self, id: ConversationId, state: ConversationState) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE headless_conversations SET state = ?1, updated_at = ?2 WHERE id = ?3",
            params![state_str(state), platform_core::model::now_ms(), id.0 as i64],
        )
        .context("updating conversation state")?;
        Ok(())
    }

    pub async fn update_conversation_session_id(&self, id: ConversationId, session_id: SessionId) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE headless_conversations SET session_id = ?1, updated_at = ?2 WHERE id = ?3",
            params![session_id.0 as i64, platform_core::model::now_ms(), id.0 as i64],
        )
        .context("updating conversation session id")?;
        Ok(())
    }

    pub async fn update_title(&self, id: ConversationId, title: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE headless_conversations SET title = ?1, updated_at = ?2 WHERE id = ?3",
            params![title, platform_core::model::now_ms(), id.0 as i64],
        )
        .context("updating conversation title")?;
        Ok(())
    }

    pub async fn close_conversation(&self, id: ConversationId) -> Result<()> {
        self.update_conversation_state(id, ConversationState::Closed).await
    }

    /// Deletes a conversation and all of its turns and events in one
    /// transaction.
    pub async fn delete_conversation(&self, id: ConversationId) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().context("starting delete transaction")?;
        tx.execute(
            "DELETE FROM headless_events WHERE turn_id IN (SELECT id FROM headless_turns WHERE conversation_id = ?1)",
            params![id.0 as i64],
        )
        .context("deleting events")?;
        tx.execute("DELETE FROM headless_turns WHERE conversation_id = ?1", params![id.0 as i64])
            .context("deleting turns")?;
        tx.execute("DELETE FROM headless_conversations WHERE id = ?1", params![id.0 as i64])
            .context("deleting conversation")?;
        tx.commit().context("committing delete transaction")?;
        Ok(())
    }

    pub async fn get_conversation_by_id(&self, id: ConversationId) -> Result<Option<HeadlessConversation>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT id, session_id, container_id, claude_session_id, title, state, created_at, updated_at
             FROM headless_conversations WHERE id = ?1",
            params![id.0 as i64],
            row_to_conversation,
        )
        .optional()
        .context("querying conversation by id")
    }

    pub async fn get_conversation_by_session_id(&self, session_id: SessionId) -> Result<Option<HeadlessConversation>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT id, session_id, container_id, claude_session_id, title, state, created_at, updated_at
             FROM headless_conversations WHERE session_id = ?1",
            params![session_id.0 as i64],
            row_to_conversation,
        )
        .optional()
        .context("querying conversation by session id")
    }

    /// All conversations for a container, most recently updated first.
    pub async fn list_conversations_for_container(&self, container_id: ContainerId) -> Result<Vec<HeadlessConversation>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT id, session_id, container_id, claude_session_id, title, state, created_at, updated_at
                 FROM headless_conversations WHERE container_id = ?1 ORDER BY updated_at DESC",
            )
            .context("preparing conversation list query")?;
        let rows = stmt
            .query_map(params![container_id.0 as i64], row_to_conversation)
            .context("querying conversations for container")?;
        rows.collect::<rusqlite::Result<Vec<_>>>().context("collecting conversation rows")
    }

    // --- turns ---------------------------------------------------------

    pub async fn get_turn_by_id(&self, id: TurnId) -> Result<Option<HeadlessTurn>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT id, conversation_id, turn_index, user_prompt, prompt_source, state, assistant_response,
                    model, input_tokens, output_tokens, cost_usd, duration_ms, error_message, created_at, completed_at
             FROM headless_turns WHERE id = ?1",
            params![id.0 as i64],
            row_to_turn,
        )
        .optional()
        .context("querying turn by id")
    }

    pub async fn get_latest_turn(&self, conversation_id: ConversationId) -> Result<Option<HeadlessTurn>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT id, conversation_id, turn_index, user_prompt, prompt_source, state, assistant_response,
                    model, input_tokens, output_tokens, cost_usd, duration_ms, error_message, created_at, completed_at
             FROM headless_turns WHERE conversation_id = ?1 ORDER BY turn_index DESC LIMIT 1",
            params![conversation_id.0 as i64],
            row_to_turn,
        )
        .optional()
        .context("querying latest turn")
    }

    /// Most recent `limit` turns, oldest first, plus whether older turns
    /// exist beyond the page.
    pub async fn get_recent_turns(&self, conversation_id: ConversationId, limit: u32) -> Result<(Vec<HeadlessTurn>, bool)> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT id, conversation_id, turn_index, user_prompt, prompt_source, state, assistant_response,
                        model, input_tokens, output_tokens, cost_usd, duration_ms, error_message, created_at, completed_at
                 FROM headless_turns WHERE conversation_id = ?1 ORDER BY turn_index DESC LIMIT ?2",
            )
            .context("preparing recent-turns query")?;
        let mut turns = stmt
            .query_map(params![conversation_id.0 as i64, (limit + 1) as i64], row_to_turn)
            .context("querying recent turns")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("collecting recent turns")?;
        let has_more = turns.len() as u32 > limit;
        turns.truncate(limit as usize);
        turns.reverse();
        Ok((turns, has_more))
    }

    /// `limit` turns older than `before_turn_id`, oldest first, plus whether
    /// further older turns remain.
    pub async fn get_turns_before(&self, conversation_id: ConversationId, before_turn_id: TurnId, limit: u32) -> Result<(Vec<HeadlessTurn>, bool)> {
        let conn = self.conn.lock().await;
        let before_index: Option<u32> = conn
            .query_row("SELECT turn_index FROM headless_turns WHERE id = ?1", params![before_turn_id.0 as i64], |row| row.get(0))
            .optional()
            .context("resolving before_turn_id")?;
        let Some(before_index) = before_index else {
            return Ok((Vec::new(), false));
        };

        let mut stmt = conn
            .prepare(
                "SELECT id, conversation_id, turn_index, user_prompt, prompt_source, state, assistant_response,
                        model, input_tokens, output_tokens, cost_usd, duration_ms, error_message, created_at, completed_at
                 FROM headless_turns WHERE conversation_id = ?1 AND turn_index < ?2 ORDER BY turn_index DESC LIMIT ?3",
            )
            .context("preparing turns-before query")?;
        let mut turns = stmt
            .query_map(params![conversation_id.0 as i64, before_index as i64, (limit + 1) as i64], row_to_turn)
            .context("querying turns before")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("collecting turns before")?;
        let has_more = turns.len() as u32 > limit;
        turns.truncate(limit as usize);
        turns.reverse();
        Ok((turns, has_more))
    }

    pub async fn get_turn_events(&self, turn_id: TurnId) -> Result<Vec<HeadlessEvent>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT id, turn_id, event_index, event_type, event_subtype, raw_json, created_at
                 FROM headless_events WHERE turn_id = ?1 ORDER BY event_index ASC",
            )
            .context("preparing turn-events query")?;
        let rows = stmt.query_map(params![turn_id.0 as i64], row_to_event).context("querying turn events")?;
        rows.collect::<rusqlite::Result<Vec<_>>>().context("collecting turn events")
    }

    // --- tasks -----------------------------------------------------------

    pub async fn add_task(&self, container_id: ContainerId, text: &str) -> Result<Task> {
        let conn = self.conn.lock().await;
        let next_index: i64 = conn
            .query_row(
                "SELECT COALESCE(MAX(order_index), -1) + 1 FROM tasks WHERE container_id = ?1",
                params![container_id.0 as i64],
                |row| row.get(0),
            )
            .context("computing next task order index")?;
        conn.execute(
            "INSERT INTO tasks (container_id, order_index, text, status, started_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, NULL, NULL)",
            params![container_id.0 as i64, next_index, text, task_status_str(TaskStatus::Pending)],
        )
        .context("inserting task")?;
        let id = conn.last_insert_rowid();
        Ok(Task {
            id: TaskId(id as u64),
            container_id,
            order_index: next_index as u32,
            text: text.to_string(),
            status: TaskStatus::Pending,
            started_at: None,
            completed_at: None,
        })
    }

    pub async fn remove_task(&self, id: TaskId) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM tasks WHERE id = ?1", params![id.0 as i64]).context("deleting task")?;
        Ok(())
    }

    /// Atomically rewrites the order index for every task in `ordered_ids`.
    pub async fn reorder_tasks(&self, container_id: ContainerId, ordered_ids: &[TaskId]) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().context("starting reorder transaction")?;
        for (index, id) in ordered_ids.iter().enumerate() {
            tx.execute(
                "UPDATE tasks SET order_index = ?1 WHERE id = ?2 AND container_id = ?3",
                params![index as i64, id.0 as i64, container_id.0 as i64],
            )
            .context("updating task order index")?;
        }
        tx.commit().context("committing reorder transaction")?;
        Ok(())
    }

    pub async fn set_task_status(&self, id: TaskId, status: TaskStatus) -> Result<()> {
        let conn = self.conn.lock().await;
        let now = platform_core::model::now_ms();
        match status {
            TaskStatus::InProgress => {
                conn.execute(
                    "UPDATE tasks SET status = ?1, started_at = ?2 WHERE id = ?3",
                    params![task_status_str(status), now, id.0 as i64],
                )
            }
            TaskStatus::Completed | TaskStatus::Skipped => conn.execute(
                "UPDATE tasks SET status = ?1, completed_at = ?2 WHERE id = ?3",
                params![task_status_str(status), now, id.0 as i64],
            ),
            TaskStatus::Pending => {
                conn.execute("UPDATE tasks SET status = ?1 WHERE id = ?2", params![task_status_str(status), id.0 as i64])
            }
        }
        .context("updating task status")?;
        Ok(())
    }

    pub async fn list_tasks(&self, container_id: ContainerId) -> Result<Vec<Task>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT id, container_id, order_index, text, status, started_at, completed_at
                 FROM tasks WHERE container_id = ?1 ORDER BY order_index ASC",
            )
            .context("preparing task list query")?;
        let rows = stmt.query_map(params![container_id.0 as i64], row_to_task).context("querying tasks")?;
        rows.collect::<rusqlite::Result<Vec<_>>>().context("collecting tasks")
    }

    pub async fn peek_pending_task(&self, container_id: ContainerId) -> Result<Option<Task>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT id, container_id, order_index, text, status, started_at, completed_at
             FROM tasks WHERE container_id = ?1 AND status = 'pending' ORDER BY order_index ASC LIMIT 1",
            params![container_id.0 as i64],
            row_to_task,
        )
        .optional()
        .context("querying pending task")
    }

    // --- automation log --------------------------------------------------

    pub async fn insert_automation_log(&self, entry: &AutomationLogEntry) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO automation_log (container_id, session_id, strategy, action, command, reason, success, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.container_id.0 as i64,
                entry.session_id.0 as i64,
                entry.strategy,
                entry.action,
                entry.command,
                entry.reason,
                entry.success,
                entry.created_at,
            ],
        )
        .context("inserting automation log entry")?;
        Ok(())
    }

    /// Most recent `limit` automation-log rows for a container, newest first.
    pub async fn list_automation_log(&self, container_id: ContainerId, limit: u32) -> Result<Vec<AutomationLogEntry>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT container_id, session_id, strategy, action, command, reason, success, created_at
                 FROM automation_log WHERE container_id = ?1 ORDER BY created_at DESC LIMIT ?2",
            )
            .context("preparing automation log query")?;
        let rows = stmt
            .query_map(params![container_id.0 as i64, limit as i64], |row| {
                Ok(AutomationLogEntry {
                    container_id: ContainerId(row.get::<_, i64>(0)? as u64),
                    session_id: SessionId(row.get::<_, i64>(1)? as u64),
                    strategy: row.get(2)?,
                    action: row.get(3)?,
                    command: row.get(4)?,
                    reason: row.get(5)?,
                    success: row.get(6)?,
                    created_at: row.get(7)?,
                })
            })
            .context("querying automation log")?;
        rows.collect::<rusqlite::Result<Vec<_>>>().context("collecting automation log rows")
    }
}

// --- HistoryHandle / AutomationLogSink facades ---------------------------

impl HistoryHandle for HistoryStore {
    fn start_turn<'a>(
        &'a self,
        conversation_id: ConversationId,
        prompt: &'a str,
        source: PromptSource,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<TurnId>> + Send + 'a>> {
        Box::pin(async move {
            let conn = self.conn.lock().await;
            let now = platform_core::model::now_ms();

            for attempt in 0..=MAX_INDEX_RETRIES {
                let next_index: i64 = conn
                    .query_row(
                        "SELECT COALESCE(MAX(turn_index), -1) + 1 FROM headless_turns WHERE conversation_id = ?1",
                        params![conversation_id.0 as i64],
                        |row| row.get(0),
                    )
                    .context("computing next turn index")?;

                let result = conn.execute(
                    "INSERT INTO headless_turns
                        (conversation_id, turn_index, user_prompt, prompt_source, state, assistant_response,
                         model, input_tokens, output_tokens, cost_usd, duration_ms, error_message, created_at, completed_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, NULL, NULL, 0, 0, 0, 0, NULL, ?6, NULL)",
                    params![conversation_id.0 as i64, next_index, prompt, prompt_source_str(source), turn_state_str(TurnState::Running), now],
                );

                match result {
                    Ok(_) => {
                        let id = conn.last_insert_rowid();
                        return Ok(TurnId(id as u64));
                    }
                    Err(e) if is_constraint_violation(&e) && attempt < MAX_INDEX_RETRIES => continue,
                    Err(e) => return Err(e).context("inserting turn"),
                }
            }
            anyhow::bail!("exhausted retries allocating turn index for conversation {}", conversation_id.0)
        })
    }

    fn append_event<'a>(
        &'a self,
        turn_id: TurnId,
        event_type: &'a str,
        event_subtype: Option<&'a str>,
        raw_json: serde_json::Value,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let conn = self.conn.lock().await;
            let now = platform_core::model::now_ms();
            let raw_text = raw_json.to_string();

            for attempt in 0..=MAX_INDEX_RETRIES {
                let next_index: i64 = conn
                    .query_row(
                        "SELECT COALESCE(MAX(event_index), -1) + 1 FROM headless_events WHERE turn_id = ?1",
                        params![turn_id.0 as i64],
                        |row| row.get(0),
                    )
                    .context("computing next event index")?;

                let result = conn.execute(
                    "INSERT INTO headless_events (turn_id, event_index, event_type, event_subtype, raw_json, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![turn_id.0 as i64, next_index, event_type, event_subtype, raw_text, now],
                );

                match result {
                    Ok(_) => return Ok(()),
                    Err(e) if is_constraint_violation(&e) && attempt < MAX_INDEX_RETRIES => continue,
                    Err(e) => return Err(e).context("inserting event"),
                }
            }
            anyhow::bail!("exhausted retries allocating event index for turn {}", turn_id.0)
        })
    }

    fn update_claude_session_id<'a>(
        &'a self,
        conversation_id: ConversationId,
        remote_id: &'a str,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let conn = self.conn.lock().await;
            conn.execute(
                "UPDATE headless_conversations SET claude_session_id = ?1, updated_at = ?2 WHERE id = ?3",
                params![remote_id, platform_core::model::now_ms(), conversation_id.0 as i64],
            )
            .context("updating claude session id")?;
            Ok(())
        })
    }

    fn complete_turn<'a>(
        &'a self,
        turn_id: TurnId,
        response: &'a str,
        model: Option<&'a str>,
        input_tokens: u64,
        output_tokens: u64,
        cost_usd: f64,
        duration_ms: u64,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let conn = self.conn.lock().await;
            let now = platform_core::model::now_ms();
            conn.execute(
                "UPDATE headless_turns
                 SET state = ?1, assistant_response = ?2, model = ?3, input_tokens = ?4, output_tokens = ?5,
                     cost_usd = ?6, duration_ms = ?7, completed_at = ?8
                 WHERE id = ?9",
                params![
                    turn_state_str(TurnState::Completed),
                    response,
                    model,
                    input_tokens as i64,
                    output_tokens as i64,
                    cost_usd,
                    duration_ms as i64,
                    now,
                    turn_id.0 as i64,
                ],
            )
            .context("completing turn")?;
            Ok(())
        })
    }

    fn fail_turn<'a>(
        &'a self,
        turn_id: TurnId,
        error_message: &'a str,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let conn = self.conn.lock().await;
            let now = platform_core::model::now_ms();
            conn.execute(
                "UPDATE headless_turns SET state = ?1, error_message = ?2, completed_at = ?3 WHERE id = ?4",
                params![turn_state_str(TurnState::Error), error_message, now, turn_id.0 as i64],
            )
            .context("failing turn")?;
            Ok(())
        })
    }
}

impl AutomationLogSink for HistoryStore {
    fn record<'a>(&'a self, entry: AutomationLogEntry) -> Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            if let Err(e) = self.insert_automation_log(&entry).await {
                tracing::warn!(error = %e, "failed to persist automation log entry");
            }
        })
    }
}

// --- schema ---------------------------------------------------------------

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS headless_conversations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id INTEGER UNIQUE,
            container_id INTEGER NOT NULL,
            claude_session_id TEXT,
            title TEXT,
            state TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS headless_turns (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id INTEGER NOT NULL,
            turn_index INTEGER NOT NULL,
            user_prompt TEXT NOT NULL,
            prompt_source TEXT NOT NULL,
            state TEXT NOT NULL,
            assistant_response TEXT,
            model TEXT,
            input_tokens INTEGER NOT NULL DEFAULT 0,
            output_tokens INTEGER NOT NULL DEFAULT 0,
            cost_usd REAL NOT NULL DEFAULT 0,
            duration_ms INTEGER NOT NULL DEFAULT 0,
            error_message TEXT,
            created_at INTEGER NOT NULL,
            completed_at INTEGER,
            UNIQUE (conversation_id, turn_index),
            FOREIGN KEY (conversation_id) REFERENCES headless_conversations(id)
        );

        CREATE TABLE IF NOT EXISTS headless_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            turn_id INTEGER NOT NULL,
            event_index INTEGER NOT NULL,
            event_type TEXT NOT NULL,
            event_subtype TEXT,
            raw_json TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE (turn_id, event_index),
            FOREIGN KEY (turn_id) REFERENCES headless_turns(id)
        );

        CREATE TABLE IF NOT EXISTS tasks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            container_id INTEGER NOT NULL,
            order_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            status TEXT NOT NULL,
            started_at INTEGER,
            completed_at INTEGER
        );

        CREATE TABLE IF NOT EXISTS automation_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            container_id INTEGER NOT NULL,
            session_id INTEGER NOT NULL,
            strategy TEXT NOT NULL,
            action TEXT NOT NULL,
            command TEXT,
            reason TEXT,
            success INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_turns_conversation ON headless_turns(conversation_id, turn_index);
        CREATE INDEX IF NOT EXISTS idx_events_turn ON headless_events(turn_id, event_index);
        CREATE INDEX IF NOT EXISTS idx_tasks_container ON tasks(container_id, order_index);
        CREATE INDEX IF NOT EXISTS idx_automation_log_container ON automation_log(container_id, created_at);
        "#,
    )
    .context("initializing schema")?;
    conn.execute(&format!("PRAGMA user_version = {SCHEMA_VERSION}"), []).context("setting schema version")?;
    Ok(())
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation)
}

fn state_str(state: ConversationState) -> &'static str {
    match state {
        ConversationState::Idle => "idle",
        ConversationState::Running => "running",
        ConversationState::Error => "error",
        ConversationState::Closed => "closed",
    }
}

fn parse_state(s: &str) -> ConversationState {
    match s {
        "running" => ConversationState::Running,
        "error" => ConversationState::Error,
        "closed" => ConversationState::Closed,
        _ => ConversationState::Idle,
    }
}

fn turn_state_str(state: TurnState) -> &'static str {
    match state {
        TurnState::Pending => "pending",
        TurnState::Running => "running",
        TurnState::Completed => "completed",
        TurnState::Error => "error",
    }
}

fn parse_turn_state(s: &str) -> TurnState {
    match s {
        "pending" => TurnState::Pending,
        "completed" => TurnState::Completed,
        "error" => TurnState::Error,
        _ => TurnState::Running,
    }
}

fn prompt_source_str(source: PromptSource) -> &'static str {
    match source {
        PromptSource::User => "user",
        PromptSource::Strategy => "strategy",
        PromptSource::Monitoring => "monitoring",
    }
}

fn parse_prompt_source(s: &str) -> PromptSource {
    match s {
        "strategy" => PromptSource::Strategy,
        "monitoring" => PromptSource::Monitoring,
        _ => PromptSource::User,
    }
}

fn task_status_str(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::InProgress => "in_progress",
        TaskStatus::Completed => "completed",
        TaskStatus::Skipped => "skipped",
    }
}

fn parse_task_status(s: &str) -> TaskStatus {
    match s {
        "in_progress" => TaskStatus::InProgress,
        "completed" => TaskStatus::Completed,
        "skipped" => TaskStatus::Skipped,
        _ => TaskStatus::Pending,
    }
}

fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<HeadlessConversation> {
    let session_id: Option<i64> = row.get(1)?;
    let state_str: String = row.get(5)?;
    Ok(HeadlessConversation {
        id: ConversationId(row.get::<_, i64>(0)? as u64),
        session_id: session_id.map(|v| SessionId(v as u64)),
        container_id: ContainerId(row.get::<_, i64>(2)? as u64),
        claude_session_id: row.get(3)?,
        title: row.get(4)?,
        state: parse_state(&state_str),
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn row_to_turn(row: &rusqlite::Row<'_>) -> rusqlite::Result<HeadlessTurn> {
    let source_str: String = row.get(4)?;
    let state_str: String = row.get(5)?;
    Ok(HeadlessTurn {
        id: TurnId(row.get::<_, i64>(0)? as u64),
        conversation_id: ConversationId(row.get::<_, i64>(1)? as u64),
        turn_index: row.get::<_, i64>(2)? as u32,
        user_prompt: row.get(3)?,
        prompt_source: parse_prompt_source(&source_str),
        state: parse_turn_state(&state_str),
        assistant_response: row.get(6)?,
        model: row.get(7)?,
        input_tokens: row.get::<_, i64>(8)? as u64,
        output_tokens: row.get::<_, i64>(9)? as u64,
        cost_usd: row.get(10)?,
        duration_ms: row.get::<_, i64>(11)? as u64,
        error_message: row.get(12)?,
        created_at: row.get(13)?,
        completed_at: row.get(14)?,
    })
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<HeadlessEvent> {
    let raw_text: String = row.get(5)?;
    Ok(HeadlessEvent {
        id: platform_core::model::EventId(row.get::<_, i64>(0)? as u64),
        turn_id: TurnId(row.get::<_, i64>(1)? as u64),
        event_index: row.get::<_, i64>(2)? as u32,
        event_type: row.get(3)?,
        event_subtype: row.get(4)?,
        raw_json: serde_json::from_str(&raw_text).unwrap_or(serde_json::Value::Null),
        created_at: row.get(6)?,
    })
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let status_str: String = row.get(4)?;
    Ok(Task {
        id: TaskId(row.get::<_, i64>(0)? as u64),
        container_id: ContainerId(row.get::<_, i64>(1)? as u64),
        order_index: row.get::<_, i64>(2)? as u32,
        text: row.get(3)?,
        status: parse_task_status(&status_str),
        started_at: row.get(5)?,
        completed_at: row.get(6)?,
    })
}

#[cfg(test)]
#[path = "db_tests.rs"]
mod tests;
