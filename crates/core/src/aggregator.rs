// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Accumulates streamed text and usage from one running turn into a single
//! persisted result.

use std::sync::Mutex;
use std::time::Instant;

use crate::stream_event::Usage;

#[derive(Debug, Clone, Default)]
pub struct AggregatedTurn {
    pub text: String,
    pub model: Option<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub duration_ms: u64,
}

#[derive(Debug)]
struct Inner {
    chunks: Vec<String>,
    model: Option<String>,
    input_tokens: u64,
    output_tokens: u64,
    start: Instant,
}

impl Default for Inner {
    fn default() -> Self {
        Self { chunks: Vec::new(), model: None, input_tokens: 0, output_tokens: 0, start: Instant::now() }
    }
}

/// Safe under concurrent append/update calls from the reader task; guarded
/// by a single mutex since all mutation happens off one logical stream.
pub struct TurnAggregator {
    inner: Mutex<Inner>,
}

impl Default for TurnAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnAggregator {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner::default()) }
    }

    pub fn append_text(&self, chunk: impl Into<String>) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.chunks.push(chunk.into());
    }

    pub fn update_model(&self, model: impl Into<String>) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.model = Some(model.into());
    }

    pub fn update_usage(&self, usage: &Usage) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.input_tokens = usage.input_tokens;
        inner.output_tokens = usage.output_tokens;
    }

    /// Join accumulated chunks in append order and compute elapsed duration.
    pub fn build(&self) -> AggregatedTurn {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        AggregatedTurn {
            text: inner.chunks.join("\n"),
            model: inner.model.clone(),
            input_tokens: inner.input_tokens,
            output_tokens: inner.output_tokens,
            duration_ms: inner.start.elapsed().as_millis() as u64,
        }
    }

    /// Clear all fields for reuse on the next turn.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        *inner = Inner::default();
    }
}

#[cfg(test)]
#[path = "aggregator_tests.rs"]
mod tests;
