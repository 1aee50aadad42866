// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Calls an external model endpoint for a free-form decision on how to
//! react to silence, with tolerant JSON extraction and a deterministic
//! fallback on any failure.

use std::sync::Arc;

use serde::Deserialize;

use crate::model::ValidationError;

use super::{InputWriter, Strategy, StrategyContext, StrategyFuture, StrategyOutcome};

#[derive(Debug, Deserialize)]
struct AiDecision {
    action: String,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

/// Find the first `{` and the last `}` and attempt to parse that slice.
/// Tolerates surrounding prose from a chatty model.
fn extract_json(body: &str) -> Option<AiDecision> {
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&body[start..=end]).ok()
}

pub struct AiStrategy {
    client: reqwest::Client,
    endpoint: String,
    writer: Arc<dyn InputWriter>,
}

impl AiStrategy {
    pub fn new(endpoint: impl Into<String>, writer: Arc<dyn InputWriter>) -> Self {
        Self { client: reqwest::Client::new(), endpoint: endpoint.into(), writer }
    }

    fn build_prompt(ctx: &StrategyContext) -> String {
        let tail = String::from_utf8_lossy(&ctx.last_output);
        format!(
            "The assistant process in container {} has been silent for {}s. Recent output:\n{}\n\nRespond with a JSON object: {{\"action\": \"inject\"|\"skip\"|\"notify\"|\"complete\", \"command\"?: string, \"message\"?: string, \"reason\"?: string}}",
            ctx.container_id, ctx.silence_duration.as_secs(), tail
        )
    }

    async fn call_model(&self, prompt: &str) -> anyhow::Result<String> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "prompt": prompt }))
            .send()
            .await?;
        if !resp.status().is_success() {
            anyhow::bail!("model endpoint returned status {}", resp.status());
        }
        Ok(resp.text().await?)
    }
}

impl Strategy for AiStrategy {
    fn name(&self) -> &'static str {
        "ai"
    }

    fn validate(&self, _config: &crate::model::MonitoringConfig) -> Result<(), ValidationError> {
        Ok(())
    }

    fn execute<'a>(&'a self, ctx: &'a StrategyContext) -> StrategyFuture<'a> {
        Box::pin(async move {
            let prompt = Self::build_prompt(ctx);
            let body = match self.call_model(&prompt).await {
                Ok(b) => b,
                Err(e) => return StrategyOutcome::Skipped { reason: format!("model call failed: {e}") },
            };

            let Some(decision) = extract_json(&body) else {
                return StrategyOutcome::Skipped { reason: "unparseable model response".into() };
            };

            match decision.action.as_str() {
                "inject" => {
                    let Some(raw_command) = decision.command else {
                        return StrategyOutcome::Skipped { reason: "inject action missing command".into() };
                    };
                    let command = super::injection::expand(&raw_command, ctx);
                    match self.writer.write_input(command.as_bytes()).await {
                        Ok(()) => StrategyOutcome::Injected { command },
                        Err(e) => StrategyOutcome::Failed { error: e.to_string() },
                    }
                }
                "notify" => StrategyOutcome::Notified {
                    message: decision.message.unwrap_or_else(|| "assistant needs attention".into()),
                },
                "complete" => {
                    StrategyOutcome::Completed { reason: decision.reason.unwrap_or_else(|| "ai marked complete".into()) }
                }
                "skip" => StrategyOutcome::Skipped { reason: decision.reason.unwrap_or_else(|| "ai chose to skip".into()) },
                other => StrategyOutcome::Skipped { reason: format!("unknown ai action: {other}") },
            }
        })
    }
}

#[cfg(test)]
#[path = "ai_tests.rs"]
mod tests;
