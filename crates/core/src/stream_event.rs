// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parses line-delimited JSON events emitted by the external assistant CLI.

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEventType {
    System,
    Assistant,
    User,
    Result,
    TurnComplete,
    /// Catch-all for any `type` value outside the known set, per the
    /// tolerant-typing design: unknown types still parse, they just
    /// don't get specialized field extraction.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentItemType {
    Text,
    Thinking,
    ToolUse,
    ToolResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub item_type: ContentItemType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub content: Vec<ContentItem>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

/// One parsed line of the event-stream protocol, tolerant of unknown
/// shapes via the `Unknown` catch-all variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEvent {
    #[serde(rename = "type")]
    pub event_type: StreamEventType,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub is_meta: bool,
    #[serde(skip)]
    pub raw: String,
}

impl StreamEvent {
    fn fallback(event_type: StreamEventType, raw: String) -> Self {
        Self {
            event_type,
            session_id: None,
            model: None,
            message: None,
            usage: None,
            is_error: false,
            error: None,
            result: None,
            is_meta: false,
            raw,
        }
    }

    fn text_content(text: impl Into<String>) -> Message {
        Message {
            content: vec![ContentItem {
                item_type: ContentItemType::Text,
                text: Some(text.into()),
                name: None,
                input: None,
                extra: serde_json::Map::new(),
            }],
        }
    }
}

fn csi_osc_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r#"(\x1b\[[0-9;?]*[ -/]*[@-~])|(\x1b\][^\x07\x1b]*(\x07|\x1b\\))"#)
            .expect("ansi regex is a valid pattern")
    })
}

fn is_pure_ansi(line: &str) -> bool {
    !line.is_empty() && csi_osc_regex().replace_all(line, "").is_empty()
}

/// Parse one textual stdout line into a `StreamEvent`.
///
/// Returns `(event, valid_json)`. `valid_json` is true only when the line
/// decoded as a well-formed `StreamEvent` with a non-empty `type`; callers
/// may use it to distinguish genuine protocol events from fallbacks.
pub fn parse_line(line: &str) -> Option<(StreamEvent, bool)> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    if is_pure_ansi(trimmed) {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        let type_is_nonempty = value.get("type").and_then(|t| t.as_str()).is_some_and(|s| !s.is_empty());
        if type_is_nonempty {
            if let Ok(mut event) = serde_json::from_value::<StreamEvent>(value) {
                event.raw = line.to_string();
                return Some((event, true));
            }
        }
    }

    let event = if let Some(rest) = trimmed.strip_prefix("[stderr] ") {
        let mut e = StreamEvent::fallback(StreamEventType::Result, line.to_string());
        e.is_error = true;
        e.result = Some(rest.to_string());
        e
    } else if trimmed.starts_with("Error:") || trimmed.starts_with("error:") {
        let mut e = StreamEvent::fallback(StreamEventType::Result, line.to_string());
        e.is_error = true;
        e.result = Some(trimmed.to_string());
        e
    } else {
        let mut e = StreamEvent::fallback(StreamEventType::Assistant, line.to_string());
        e.message = Some(StreamEvent::text_content(trimmed));
        e
    };

    Some((event, false))
}

pub fn is_result(event: &StreamEvent) -> bool {
    matches!(event.event_type, StreamEventType::Result)
}

pub fn extract_session_id(event: &StreamEvent) -> Option<&str> {
    event.session_id.as_deref().filter(|s| !s.is_empty())
}

pub fn extract_usage(event: &StreamEvent) -> Option<&Usage> {
    event.usage.as_ref()
}

/// Joins all `text` content items (in order) from an `assistant` event.
pub fn extract_text(event: &StreamEvent) -> Option<String> {
    let message = event.message.as_ref()?;
    let mut parts = Vec::new();
    for item in &message.content {
        if item.item_type == ContentItemType::Text {
            if let Some(t) = &item.text {
                parts.push(t.clone());
            }
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(""))
    }
}

pub fn has_tool_use(event: &StreamEvent) -> bool {
    event
        .message
        .as_ref()
        .map(|m| m.content.iter().any(|c| c.item_type == ContentItemType::ToolUse))
        .unwrap_or(false)
}

pub fn get_tool_uses(event: &StreamEvent) -> Vec<&ContentItem> {
    event
        .message
        .as_ref()
        .map(|m| m.content.iter().filter(|c| c.item_type == ContentItemType::ToolUse).collect())
        .unwrap_or_default()
}

#[cfg(test)]
#[path = "stream_event_tests.rs"]
mod tests;
