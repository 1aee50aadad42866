// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-container task queue: ordered automation tasks, persisted through
//! [`HistoryStore`] and fanned out to monitoring subscribers as
//! [`StatusEvent`]s.

use std::pin::Pin;
use std::sync::{Arc, Weak};

use anyhow::{bail, Result};
use platform_core::model::{ContainerId, Task, TaskId, TaskStatus};
use platform_core::monitoring_session::{MonitoringSession, StatusEvent};
use platform_core::strategy::TaskQueueHandle;

use crate::db::HistoryStore;

/// Whether `status` may legally follow `current`. Terminal states
/// (`Completed`, `Skipped`) never transition further; a task only moves
/// forward through the pipeline, never backward.
fn transition_allowed(current: TaskStatus, next: TaskStatus) -> bool {
    use TaskStatus::*;
    matches!(
        (current, next),
        (Pending, InProgress) | (Pending, Skipped) | (InProgress, Completed) | (InProgress, Skipped)
    )
}

pub struct TaskQueue {
    container_id: ContainerId,
    db: Arc<HistoryStore>,
    /// Weak, not strong: the session's strategy registry can hold a `queue`
    /// strategy backed by this same `TaskQueue`, so a strong reference here
    /// would keep the session alive forever.
    session: Weak<MonitoringSession>,
}

impl TaskQueue {
    pub fn new(container_id: ContainerId, db: Arc<HistoryStore>, session: Weak<MonitoringSession>) -> Self {
        Self { container_id, db, session }
    }

    async fn notify(&self, event: StatusEvent) {
        if let Some(session) = self.session.upgrade() {
            session.broadcast_task_event(event).await;
        }
    }

    /// Recomputes the pending-task count and pushes it into the owning
    /// session's status snapshot. Called after every mutation so
    /// `MonitoringSession::status().queue_size` stays live.
    async fn sync_queue_size(&self) {
        let Some(session) = self.session.upgrade() else { return };
        if let Ok(tasks) = self.db.list_tasks(self.container_id).await {
            let pending = tasks.iter().filter(|t| matches!(t.status, TaskStatus::Pending)).count();
            session.set_queue_size(pending);
        }
    }

    pub async fn add(&self, text: &str) -> Result<Task> {
        let task = self.db.add_task(self.container_id, text).await?;
        self.notify(StatusEvent::TaskAdd).await;
        self.sync_queue_size().await;
        Ok(task)
    }

    pub async fn remove(&self, id: TaskId) -> Result<()> {
        self.db.remove_task(id).await?;
        self.notify(StatusEvent::TaskRemove).await;
        self.sync_queue_size().await;
        Ok(())
    }

    /// Replaces the queue's order with `ordered_ids`. Rejects anything but
    /// a dense permutation of the container's current task ids.
    pub async fn reorder(&self, ordered_ids: &[TaskId]) -> Result<()> {
        let current = self.db.list_tasks(self.container_id).await?;
        let mut current_ids: Vec<TaskId> = current.iter().map(|t| t.id).collect();
        current_ids.sort_by_key(|id| id.0);
        let mut requested_ids = ordered_ids.to_vec();
        requested_ids.sort_by_key(|id| id.0);
        if current_ids != requested_ids {
            bail!("reorder must supply a permutation of this container's existing task ids");
        }

        self.db.reorder_tasks(self.container_id, ordered_ids).await?;
        self.notify(StatusEvent::TaskReorder).await;
        self.sync_queue_size().await;
        Ok(())
    }

    pub async fn set_status(&self, id: TaskId, new_status: TaskStatus) -> Result<()> {
        let tasks = self.db.list_tasks(self.container_id).await?;
        let Some(task) = tasks.into_iter().find(|t| t.id == id) else {
            bail!("no such task {}", id.0);
        };
        if !transition_allowed(task.status, new_status) {
            bail!("cannot move task {} from {:?} to {:?}", id.0, task.status, new_status);
        }

        self.db.set_task_status(id, new_status).await?;
        self.notify(StatusEvent::TaskUpdate).await;
        self.sync_queue_size().await;
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<Task>> {
        self.db.list_tasks(self.container_id).await
    }
}

impl TaskQueueHandle for TaskQueue {
    fn peek_pending<'a>(&'a self) -> Pin<Box<dyn std::future::Future<Output = Option<Task>> + Send + 'a>> {
        Box::pin(async move { self.db.peek_pending_task(self.container_id).await.ok().flatten() })
    }

    fn mark_in_progress<'a>(&'a self, id: TaskId) -> Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            if let Err(e) = self.set_status(id, TaskStatus::InProgress).await {
                tracing::warn!(error = %e, task_id = id.0, "failed to mark task in progress");
            }
        })
    }
}

#[cfg(test)]
#[path = "task_queue_tests.rs"]
mod tests;
