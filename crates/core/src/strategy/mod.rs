// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pluggable reaction strategies invoked when a monitoring session's
//! silence timer crosses threshold.

pub mod ai;
pub mod injection;
pub mod queue;
pub mod webhook;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::model::{ContainerId, DockerId, MonitoringConfig, SessionId, ValidationError};

/// Snapshot of a monitoring session passed to a strategy at crossing time.
/// Strategy execution runs outside the session lock, so this is a plain
/// owned copy rather than a reference into session state.
#[derive(Debug, Clone)]
pub struct StrategyContext {
    pub container_id: ContainerId,
    pub session_id: SessionId,
    pub docker_id: DockerId,
    pub silence_duration: Duration,
    pub last_output: Vec<u8>,
    pub config: MonitoringConfig,
}

/// Result of one strategy invocation. Strategies never return `Result` —
/// failures are folded into `Failed` so the timer can always re-arm.
#[derive(Debug, Clone)]
pub enum StrategyOutcome {
    Injected { command: String },
    Skipped { reason: String },
    Notified { message: String },
    Completed { reason: String },
    WebhookSent,
    QueueEmpty,
    Failed { error: String },
}

impl StrategyOutcome {
    /// The `action_taken` value recorded in the automation log.
    pub fn action_taken(&self) -> &'static str {
        match self {
            Self::Injected { .. } => "inject",
            Self::Skipped { .. } => "skip",
            Self::Notified { .. } => "notify",
            Self::Completed { .. } => "complete",
            Self::WebhookSent => "webhook_sent",
            Self::QueueEmpty => "queue_empty",
            Self::Failed { .. } => "error",
        }
    }

    /// The `result` value recorded in the automation log.
    pub fn result(&self) -> &'static str {
        match self {
            Self::Failed { .. } => "failed",
            Self::Skipped { .. } | Self::QueueEmpty => "skipped",
            _ => "success",
        }
    }

    pub fn command(&self) -> Option<&str> {
        match self {
            Self::Injected { command } => Some(command),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Failed { error } => Some(error),
            _ => None,
        }
    }
}

pub type StrategyFuture<'a> = Pin<Box<dyn Future<Output = StrategyOutcome> + Send + 'a>>;

/// A pluggable named reaction. Object-safe so strategies are selected at
/// runtime from a small registry keyed by `ActiveStrategy`.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn validate(&self, config: &MonitoringConfig) -> Result<(), ValidationError>;

    fn execute<'a>(&'a self, ctx: &'a StrategyContext) -> StrategyFuture<'a>;
}

/// Handle a strategy uses to consume the container's task queue without
/// `core` depending on `server::task_queue` directly.
pub trait TaskQueueHandle: Send + Sync {
    fn peek_pending<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Option<crate::model::Task>> + Send + 'a>>;

    fn mark_in_progress<'a>(
        &'a self,
        id: crate::model::TaskId,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

/// A handle a strategy uses to write expanded commands into the
/// container's single interactive input stream.
pub trait InputWriter: Send + Sync {
    fn write_input<'a>(
        &'a self,
        bytes: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;
}

/// Maps `ActiveStrategy` to the boxed implementation a monitoring session
/// invokes on crossing. Built once at session construction from whichever
/// collaborators (queue handle, input writer, AI endpoint) are available.
#[derive(Default)]
pub struct StrategyRegistry {
    strategies: std::collections::HashMap<&'static str, std::sync::Arc<dyn Strategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, strategy: std::sync::Arc<dyn Strategy>) {
        self.strategies.insert(strategy.name(), strategy);
    }

    pub fn get(&self, active: crate::model::ActiveStrategy) -> Option<std::sync::Arc<dyn Strategy>> {
        let key = match active {
            crate::model::ActiveStrategy::Webhook => "webhook",
            crate::model::ActiveStrategy::Injection => "injection",
            crate::model::ActiveStrategy::Queue => "queue",
            crate::model::ActiveStrategy::Ai => "ai",
            crate::model::ActiveStrategy::None => return None,
        };
        self.strategies.get(key).cloned()
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
