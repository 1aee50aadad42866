// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! POSTs a JSON payload to a configured webhook URL on crossing, retrying
//! with a fixed 1s/2s/4s backoff.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;

use crate::model::ValidationError;

use super::{Strategy, StrategyContext, StrategyFuture, StrategyOutcome};

#[derive(Debug, Serialize)]
struct WebhookPayload {
    container_id: u64,
    session_id: u64,
    silence_duration: u64,
    last_output: String,
    timestamp: i64,
}

pub struct WebhookStrategy {
    client: Client,
    request_timeout: Duration,
}

impl Default for WebhookStrategy {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl WebhookStrategy {
    pub fn new(request_timeout: Duration) -> Self {
        Self { client: Client::new(), request_timeout }
    }

    fn headers(config: &crate::model::MonitoringConfig) -> Result<reqwest::header::HeaderMap, ValidationError> {
        let mut map = reqwest::header::HeaderMap::new();
        if let serde_json::Value::Object(obj) = &config.webhook_headers {
            for (k, v) in obj {
                let value = v.as_str().ok_or_else(|| ValidationError("webhook_headers values must be strings".into()))?;
                let name = reqwest::header::HeaderName::from_bytes(k.as_bytes())
                    .map_err(|e| ValidationError(format!("invalid header name {k}: {e}")))?;
                let val = reqwest::header::HeaderValue::from_str(value)
                    .map_err(|e| ValidationError(format!("invalid header value for {k}: {e}")))?;
                map.insert(name, val);
            }
        }
        Ok(map)
    }

    async fn post_once(&self, url: &str, headers: reqwest::header::HeaderMap, payload: &WebhookPayload) -> anyhow::Result<()> {
        let resp = self
            .client
            .post(url)
            .headers(headers)
            .timeout(self.request_timeout)
            .json(payload)
            .send()
            .await?;
        if !resp.status().is_success() {
            anyhow::bail!("webhook returned status {}", resp.status());
        }
        Ok(())
    }
}

impl Strategy for WebhookStrategy {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn validate(&self, config: &crate::model::MonitoringConfig) -> Result<(), ValidationError> {
        let url = config
            .webhook_url
            .as_deref()
            .ok_or_else(|| ValidationError("webhook_url required".into()))?;
        let parsed = reqwest::Url::parse(url).map_err(|e| ValidationError(format!("invalid webhook_url: {e}")))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ValidationError("webhook_url must use http or https".into()));
        }
        Self::headers(config)?;
        Ok(())
    }

    fn execute<'a>(&'a self, ctx: &'a StrategyContext) -> StrategyFuture<'a> {
        Box::pin(async move {
            let Some(url) = ctx.config.webhook_url.as_deref() else {
                return StrategyOutcome::Failed { error: "no webhook_url configured".into() };
            };
            let headers = match Self::headers(&ctx.config) {
                Ok(h) => h,
                Err(e) => return StrategyOutcome::Failed { error: e.to_string() },
            };
            let payload = WebhookPayload {
                container_id: ctx.container_id.0,
                session_id: ctx.session_id.0,
                silence_duration: ctx.silence_duration.as_secs(),
                last_output: String::from_utf8_lossy(&ctx.last_output).into_owned(),
                timestamp: crate::model::now_ms(),
            };

            let mut backoff = Duration::from_secs(1);
            let max_retries = 3u32;
            let mut last_err = None;
            for attempt in 0..=max_retries {
                match self.post_once(url, headers.clone(), &payload).await {
                    Ok(()) => return StrategyOutcome::WebhookSent,
                    Err(e) => {
                        last_err = Some(e);
                        if attempt == max_retries {
                            break;
                        }
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
            }

            StrategyOutcome::Failed {
                error: last_err.map(|e| e.to_string()).unwrap_or_else(|| "webhook failed".into()),
            }
        })
    }
}

#[cfg(test)]
#[path = "webhook_tests.rs"]
mod tests;
