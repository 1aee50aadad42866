// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Expands placeholders in `injection_command` and writes the result to
//! the container's interactive input.

use std::sync::Arc;

use crate::model::ValidationError;

use super::{InputWriter, Strategy, StrategyContext, StrategyFuture, StrategyOutcome};

/// Expand the five known placeholders and normalize trailing newlines to
/// exactly one `\n`. Unknown `{...}` tokens are left untouched.
pub fn expand(template: &str, ctx: &StrategyContext) -> String {
    let expanded = template
        .replace("{container_id}", &ctx.container_id.to_string())
        .replace("{session_id}", &ctx.session_id.to_string())
        .replace("{docker_id}", &ctx.docker_id.to_string())
        .replace("{timestamp}", &crate::model::now_ms().to_string())
        .replace("{silence_duration}", &ctx.silence_duration.as_secs().to_string());

    normalize_newline(&expanded)
}

/// Normalize trailing newlines to exactly one `\n`, without touching
/// placeholders. Used by the queue strategy, where task text is injected
/// as a literal command rather than a placeholder template.
pub fn normalize_newline(command: &str) -> String {
    let mut normalized = command.trim_end_matches(['\n', '\r']).to_string();
    normalized.push('\n');
    normalized
}

pub struct InjectionStrategy {
    writer: Arc<dyn InputWriter>,
}

impl InjectionStrategy {
    pub fn new(writer: Arc<dyn InputWriter>) -> Self {
        Self { writer }
    }
}

impl Strategy for InjectionStrategy {
    fn name(&self) -> &'static str {
        "injection"
    }

    fn validate(&self, config: &crate::model::MonitoringConfig) -> Result<(), ValidationError> {
        let cmd = config.injection_command.as_deref().unwrap_or("");
        if cmd.is_empty() {
            return Err(ValidationError("injection_command must be non-empty".into()));
        }
        Ok(())
    }

    fn execute<'a>(&'a self, ctx: &'a StrategyContext) -> StrategyFuture<'a> {
        Box::pin(async move {
            let Some(template) = ctx.config.injection_command.as_deref() else {
                return StrategyOutcome::Failed { error: "no injection_command configured".into() };
            };
            let command = expand(template, ctx);
            match self.writer.write_input(command.as_bytes()).await {
                Ok(()) => StrategyOutcome::Injected { command },
                Err(e) => StrategyOutcome::Failed { error: e.to_string() },
            }
        })
    }
}

#[cfg(test)]
#[path = "injection_tests.rs"]
mod tests;
