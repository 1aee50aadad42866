// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Consumes the next pending task in the container's task queue and
//! injects its text.

use std::sync::Arc;

use crate::model::ValidationError;

use super::{InputWriter, Strategy, StrategyContext, StrategyFuture, StrategyOutcome, TaskQueueHandle};

pub struct QueueStrategy {
    queue: Arc<dyn TaskQueueHandle>,
    writer: Arc<dyn InputWriter>,
}

impl QueueStrategy {
    pub fn new(queue: Arc<dyn TaskQueueHandle>, writer: Arc<dyn InputWriter>) -> Self {
        Self { queue, writer }
    }
}

impl Strategy for QueueStrategy {
    fn name(&self) -> &'static str {
        "queue"
    }

    fn validate(&self, _config: &crate::model::MonitoringConfig) -> Result<(), ValidationError> {
        Ok(())
    }

    fn execute<'a>(&'a self, _ctx: &'a StrategyContext) -> StrategyFuture<'a> {
        Box::pin(async move {
            let Some(task) = self.queue.peek_pending().await else {
                return StrategyOutcome::QueueEmpty;
            };
            self.queue.mark_in_progress(task.id).await;

            let command = super::injection::normalize_newline(&task.text);
            match self.writer.write_input(command.as_bytes()).await {
                Ok(()) => StrategyOutcome::Injected { command },
                Err(e) => StrategyOutcome::Failed { error: e.to_string() },
            }
        })
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
