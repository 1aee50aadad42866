// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry of active [`MonitoringSession`]s, one per monitored container.
//!
//! Each session's strategy registry is built from collaborators specific
//! to that container (its docker input stream, its task queue), so this
//! is also where those collaborators get constructed and wired together.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use platform_core::container::ContainerHandle;
use platform_core::model::{ContainerId, DockerId, MonitoringConfig, SessionId};
use platform_core::monitoring_session::{AutomationLogSink, MonitoringSession};
use platform_core::strategy::ai::AiStrategy;
use platform_core::strategy::injection::InjectionStrategy;
use platform_core::strategy::queue::QueueStrategy;
use platform_core::strategy::webhook::WebhookStrategy;
use platform_core::strategy::{InputWriter, StrategyRegistry};
use tokio::sync::RwLock;

use crate::container::ContainerResolver;
use crate::db::HistoryStore;
use crate::task_queue::TaskQueue;

/// Adapts a resolved [`ContainerHandle`] to the narrower [`InputWriter`]
/// seam the `injection`/`queue`/`ai` strategies depend on.
struct ContainerInputWriter(Arc<dyn ContainerHandle>);

impl InputWriter for ContainerInputWriter {
    fn write_input<'a>(
        &'a self,
        bytes: &'a [u8],
    ) -> Pin<Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send + 'a>> {
        self.0.write_input(bytes)
    }
}

pub struct MonitoringRegistry {
    sessions: RwLock<HashMap<ContainerId, Arc<MonitoringSession>>>,
    task_queues: RwLock<HashMap<ContainerId, Arc<TaskQueue>>>,
    containers: Arc<dyn ContainerResolver>,
    db: Arc<HistoryStore>,
    automation_log: Arc<dyn AutomationLogSink>,
    ai_strategy_endpoint: Option<String>,
    next_session_id: std::sync::atomic::AtomicU64,
}

impl MonitoringRegistry {
    pub fn new(
        containers: Arc<dyn ContainerResolver>,
        db: Arc<HistoryStore>,
        automation_log: Arc<dyn AutomationLogSink>,
        ai_strategy_endpoint: Option<String>,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            task_queues: RwLock::new(HashMap::new()),
            containers,
            db,
            automation_log,
            ai_strategy_endpoint,
            next_session_id: std::sync::atomic::AtomicU64::new(1),
        }
    }

    /// Returns the existing session for `container_id`, or creates one with
    /// `config` if none exists yet.
    pub async fn get_or_create(&self, container_id: ContainerId, docker_id: DockerId, config: MonitoringConfig) -> Arc<MonitoringSession> {
        if let Some(session) = self.sessions.read().await.get(&container_id) {
            return session.clone();
        }

        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get(&container_id) {
            return session.clone();
        }

        let session_id = SessionId(self.next_session_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst));

        // A session needs a strategy registry before it is constructed,
        // but the `queue` strategy's task queue needs a (weak) reference
        // back to the session it belongs to. Start it with an empty
        // registry, then replace it once the session (and its task queue)
        // exist.
        let session = MonitoringSession::new_with_log_sink(
            container_id,
            docker_id.clone(),
            session_id,
            config,
            Arc::new(StrategyRegistry::new()),
            Some(self.automation_log.clone()),
        );

        let container = self.containers.resolve(container_id, docker_id).await;
        let task_queue = Arc::new(TaskQueue::new(container_id, self.db.clone(), Arc::downgrade(&session)));
        session.set_strategies(Arc::new(self.build_strategies(container, task_queue.clone()))).await;

        sessions.insert(container_id, session.clone());
        self.task_queues.write().await.insert(container_id, task_queue);
        session
    }

    fn build_strategies(&self, container: Arc<dyn ContainerHandle>, task_queue: Arc<TaskQueue>) -> StrategyRegistry {
        let writer: Arc<dyn InputWriter> = Arc::new(ContainerInputWriter(container));

        let mut registry = StrategyRegistry::new();
        registry.register(Arc::new(WebhookStrategy::default()));
        registry.register(Arc::new(InjectionStrategy::new(writer.clone())));
        registry.register(Arc::new(QueueStrategy::new(task_queue, writer.clone())));
        if let Some(endpoint) = &self.ai_strategy_endpoint {
            registry.register(Arc::new(AiStrategy::new(endpoint.clone(), writer)));
        }
        registry
    }

    pub async fn get(&self, container_id: ContainerId) -> Option<Arc<MonitoringSession>> {
        self.sessions.read().await.get(&container_id).cloned()
    }

    pub async fn get_task_queue(&self, container_id: ContainerId) -> Option<Arc<TaskQueue>> {
        self.task_queues.read().await.get(&container_id).cloned()
    }

    /// Stops monitoring for `container_id`. Idempotent: a container with no
    /// active session is a no-op. Tears the session down fully (timer,
    /// subscribers, buffer) even if another caller still holds an `Arc` to
    /// it from before removal.
    pub async fn remove(&self, container_id: ContainerId) {
        let session = self.sessions.write().await.remove(&container_id);
        if let Some(session) = session {
            session.teardown().await;
        }
        self.task_queues.write().await.remove(&container_id);
    }

    pub async fn remove_all(&self) {
        let mut sessions = self.sessions.write().await;
        for (_, session) in sessions.drain() {
            session.teardown().await;
        }
        self.task_queues.write().await.clear();
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
#[path = "monitoring_registry_tests.rs"]
mod tests;
