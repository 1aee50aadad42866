// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::ValidationError;

/// Unified error codes surfaced across HTTP and WebSocket transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    SessionNotFound,
    SessionBusy,
    ProcessFailed,
    ModeConflict,
    InternalError,
    ConversationRunning,
}

impl ErrorCode {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidRequest => 400,
            Self::SessionNotFound => 404,
            Self::SessionBusy => 409,
            Self::ProcessFailed => 502,
            Self::ModeConflict => 409,
            Self::InternalError => 500,
            Self::ConversationRunning => 423,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::SessionNotFound => "session_not_found",
            Self::SessionBusy => "session_busy",
            Self::ProcessFailed => "process_failed",
            Self::ModeConflict => "mode_conflict",
            Self::InternalError => "internal_error",
            Self::ConversationRunning => "conversation_running",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Internal error taxonomy per the error-handling design: validation,
/// I/O, persistence, and fatal-session classes.
#[derive(Debug)]
pub enum CoreError {
    Validation(ValidationError),
    Io(String),
    Persistence(String),
    Fatal(String),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(e) => write!(f, "validation error: {e}"),
            Self::Io(msg) => write!(f, "io error: {msg}"),
            Self::Persistence(msg) => write!(f, "persistence error: {msg}"),
            Self::Fatal(msg) => write!(f, "fatal session error: {msg}"),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<ValidationError> for CoreError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl CoreError {
    /// Map this internal error onto the transport-facing error code.
    pub fn as_error_code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::InvalidRequest,
            Self::Io(_) => ErrorCode::ProcessFailed,
            Self::Persistence(_) => ErrorCode::InternalError,
            Self::Fatal(_) => ErrorCode::ProcessFailed,
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
