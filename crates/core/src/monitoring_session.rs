// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Composes the ring buffer, silence timer, and reaction strategy into a
//! per-container monitoring session with status-event subscriber fan-out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};

use crate::model::{
    ActiveStrategy, AutomationLogEntry, ContainerId, DockerId, MonitoringConfig, SessionId, ValidationError,
};
use crate::ring::RingBuffer;
use crate::silence::SilenceTimer;
use crate::strategy::{StrategyContext, StrategyOutcome, StrategyRegistry};

pub type ClientId = u64;

/// Persistence sink for automation-log rows; kept as a thin trait so `core`
/// never depends on `server::db` directly, matching the `HistoryHandle`
/// facade in `headless_session`.
pub trait AutomationLogSink: Send + Sync {
    fn record<'a>(
        &'a self,
        entry: AutomationLogEntry,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>>;
}

/// Status-plane events delivered to subscribers. Distinct from the raw
/// byte stream — this channel never carries container output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusEvent {
    MonitoringEnable,
    MonitoringDisable,
    MonitoringConfigUpdate,
    MonitoringError { message: String },
    StrategyTriggered { strategy: String, action: String, command: Option<String>, reason: Option<String>, success: bool },
    TaskAdd,
    TaskRemove,
    TaskUpdate,
    TaskReorder,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitoringStatus {
    pub enabled: bool,
    pub silence_duration_secs: u64,
    pub threshold_secs: u64,
    pub strategy: ActiveStrategy,
    pub queue_size: usize,
}

struct Subscriber {
    tx: mpsc::Sender<StatusEvent>,
}

pub struct MonitoringSession {
    container_id: ContainerId,
    docker_id: DockerId,
    session_id: SessionId,
    config: RwLock<MonitoringConfig>,
    ring: RwLock<RingBuffer>,
    timer: SilenceTimer,
    enabled: Arc<AtomicBool>,
    subscribers: RwLock<HashMap<ClientId, Subscriber>>,
    strategies: RwLock<Arc<StrategyRegistry>>,
    queue_size: AtomicU64,
    automation_log: Option<Arc<dyn AutomationLogSink>>,
}

impl MonitoringSession {
    pub fn new(
        container_id: ContainerId,
        docker_id: DockerId,
        session_id: SessionId,
        config: MonitoringConfig,
        strategies: Arc<StrategyRegistry>,
    ) -> Arc<Self> {
        Self::new_with_log_sink(container_id, docker_id, session_id, config, strategies, None)
    }

    pub fn new_with_log_sink(
        container_id: ContainerId,
        docker_id: DockerId,
        session_id: SessionId,
        config: MonitoringConfig,
        strategies: Arc<StrategyRegistry>,
        automation_log: Option<Arc<dyn AutomationLogSink>>,
    ) -> Arc<Self> {
        let ring = RingBuffer::new(config.context_buffer_size.max(1));
        let enabled = Arc::new(AtomicBool::new(false));

        Arc::new_cyclic(|weak: &std::sync::Weak<Self>| {
            let weak = weak.clone();
            let threshold = Duration::from_secs(config.silence_threshold_secs as u64);
            let on_threshold: Arc<dyn Fn(Duration) + Send + Sync> = Arc::new(move |silence_duration| {
                if let Some(session) = weak.upgrade() {
                    tokio::spawn(async move {
                        session.handle_crossing(silence_duration).await;
                    });
                }
            });
            let timer = SilenceTimer::spawn(threshold, on_threshold);

            Self {
                container_id,
                docker_id,
                session_id,
                config: RwLock::new(config),
                ring: RwLock::new(ring),
                timer,
                enabled,
                subscribers: RwLock::new(HashMap::new()),
                strategies: RwLock::new(strategies),
                queue_size: AtomicU64::new(0),
                automation_log,
            }
        })
    }

    /// Appends to the ring buffer unmodified and, if enabled, resets the
    /// silence timer. Empty input still resets the timer.
    pub async fn on_output(&self, bytes: &[u8]) {
        {
            let mut ring = self.ring.write().await;
            ring.write(bytes);
        }
        if self.enabled.load(Ordering::SeqCst) {
            self.timer.on_activity();
        }
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
        self.timer.enable();
        self.broadcast(StatusEvent::MonitoringEnable);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
        self.timer.disable();
        self.broadcast(StatusEvent::MonitoringDisable);
    }

    pub async fn update_config(&self, new_config: MonitoringConfig) -> Result<(), ValidationError> {
        new_config.validate()?;
        let threshold = Duration::from_secs(new_config.silence_threshold_secs as u64);
        {
            let mut cfg = self.config.write().await;
            *cfg = new_config;
        }
        self.timer.update_config(threshold);
        self.broadcast(StatusEvent::MonitoringConfigUpdate);
        Ok(())
    }

    pub async fn subscribe(&self, client_id: ClientId) -> mpsc::Receiver<StatusEvent> {
        let (tx, rx) = mpsc::channel(32);
        self.subscribers.write().await.insert(client_id, Subscriber { tx });
        rx
    }

    pub async fn unsubscribe(&self, client_id: ClientId) {
        self.subscribers.write().await.remove(&client_id);
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    pub async fn status(&self) -> MonitoringStatus {
        let config = self.config.read().await;
        MonitoringStatus {
            enabled: self.enabled.load(Ordering::SeqCst),
            silence_duration_secs: self.timer.silence_duration().as_secs(),
            threshold_secs: self.timer.threshold().as_secs(),
            strategy: config.active_strategy,
            queue_size: self.queue_size.load(Ordering::SeqCst) as usize,
        }
    }

    pub fn set_queue_size(&self, size: usize) {
        self.queue_size.store(size as u64, Ordering::SeqCst);
    }

    /// Tears the session down per spec.md §4.E's removal invariant: stops
    /// the timer, drops every subscriber sender (closing their channels so
    /// a pending `recv()` observes end-of-stream), and clears the ring
    /// buffer. Idempotent — safe to call on an already-disabled session.
    pub async fn teardown(&self) {
        self.disable();
        self.subscribers.write().await.clear();
        self.ring.write().await.clear();
    }

    /// Replaces the strategy registry in place. Used to wire up strategies
    /// that need a reference back to this session (the `queue` strategy's
    /// task queue) once construction has produced a handle to it.
    pub async fn set_strategies(&self, strategies: Arc<StrategyRegistry>) {
        *self.strategies.write().await = strategies;
    }

    pub fn container_id(&self) -> ContainerId {
        self.container_id
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub async fn broadcast_task_event(&self, event: StatusEvent) {
        self.broadcast(event);
    }

    /// Drop-oldest-or-skip semantics: a full subscriber channel means the
    /// event is lost for that client; they reconcile via a snapshot query.
    fn broadcast(&self, event: StatusEvent) {
        let subscribers = self.subscribers.try_read();
        let Ok(subscribers) = subscribers else { return };
        for (client_id, sub) in subscribers.iter() {
            if let Err(mpsc::error::TrySendError::Full(_)) = sub.tx.try_send(event.clone()) {
                tracing::debug!(client_id, "status event dropped: subscriber channel full");
            }
        }
    }

    /// The five-step crossing handler: snapshot config+strategy, run the
    /// strategy outside any lock, log, broadcast, and the timer re-arms
    /// regardless of outcome (it already has, since this runs after the
    /// timer fired).
    async fn handle_crossing(self: Arc<Self>, silence_duration: Duration) {
        let config = self.config.read().await.clone();
        let strategies = self.strategies.read().await.clone();
        let Some(strategy) = strategies.get(config.active_strategy) else {
            return;
        };

        let last_output = self.ring.read().await.read_all();
        let ctx = StrategyContext {
            container_id: self.container_id,
            session_id: self.session_id,
            docker_id: self.docker_id.clone(),
            silence_duration,
            last_output,
            config,
        };

        let outcome = strategy.execute(&ctx).await;
        self.log_and_broadcast(strategy.name(), &outcome).await;
    }

    async fn log_and_broadcast(&self, strategy_name: &str, outcome: &StrategyOutcome) {
        tracing::info!(
            strategy = strategy_name,
            action = outcome.action_taken(),
            result = outcome.result(),
            "strategy triggered"
        );

        let command = outcome.command().map(str::to_string);
        let reason = match outcome {
            StrategyOutcome::Skipped { reason } | StrategyOutcome::Completed { reason } => Some(reason.clone()),
            StrategyOutcome::Failed { error } => Some(error.clone()),
            _ => None,
        };
        let success = !matches!(outcome, StrategyOutcome::Failed { .. });

        if let Some(sink) = &self.automation_log {
            sink.record(crate::model::AutomationLogEntry {
                container_id: self.container_id,
                session_id: self.session_id,
                strategy: strategy_name.to_string(),
                action: outcome.action_taken().to_string(),
                command: command.clone(),
                reason: reason.clone(),
                success,
                created_at: crate::model::now_ms(),
            })
            .await;
        }

        self.broadcast(StatusEvent::StrategyTriggered {
            strategy: strategy_name.to_string(),
            action: outcome.action_taken().to_string(),
            command,
            reason,
            success,
        });
    }
}

#[cfg(test)]
#[path = "monitoring_session_tests.rs"]
mod tests;
