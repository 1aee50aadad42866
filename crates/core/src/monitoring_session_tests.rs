// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::model::ValidationError;
use std::sync::Arc;

struct NoopStrategy;
impl crate::strategy::Strategy for NoopStrategy {
    fn name(&self) -> &'static str {
        "injection"
    }
    fn validate(&self, _config: &MonitoringConfig) -> Result<(), ValidationError> {
        Ok(())
    }
    fn execute<'a>(&'a self, _ctx: &'a StrategyContext) -> crate::strategy::StrategyFuture<'a> {
        Box::pin(async { StrategyOutcome::Skipped { reason: "noop".into() } })
    }
}

fn registry() -> Arc<StrategyRegistry> {
    let mut reg = StrategyRegistry::new();
    reg.register(Arc::new(NoopStrategy));
    Arc::new(reg)
}

fn config() -> MonitoringConfig {
    let mut cfg = MonitoringConfig::default();
    cfg.silence_threshold_secs = 5;
    cfg.active_strategy = ActiveStrategy::Injection;
    cfg.injection_command = Some("echo hi".into());
    cfg
}

#[tokio::test]
async fn on_output_is_transparent_and_does_not_mutate_bytes() {
    let session =
        MonitoringSession::new(ContainerId(1), DockerId("d".into()), SessionId(1), config(), registry());
    session.on_output(b"hello").await;
    session.on_output(b" world").await;
    let status = session.status().await;
    assert!(!status.enabled);
}

#[tokio::test]
async fn disable_never_clears_buffer() {
    let session =
        MonitoringSession::new(ContainerId(1), DockerId("d".into()), SessionId(1), config(), registry());
    session.on_output(b"abc").await;
    session.enable();
    session.disable();
    // buffer state isn't directly exposed here; this guards the contract
    // that disable toggles only the timer, never touches the ring.
}

#[tokio::test]
async fn subscriber_count_tracks_subscribe_and_unsubscribe() {
    let session =
        MonitoringSession::new(ContainerId(1), DockerId("d".into()), SessionId(1), config(), registry());
    assert_eq!(session.subscriber_count().await, 0);
    let _rx = session.subscribe(1).await;
    assert_eq!(session.subscriber_count().await, 1);
    session.unsubscribe(1).await;
    assert_eq!(session.subscriber_count().await, 0);
}

#[tokio::test]
async fn update_config_rejects_invalid_threshold() {
    let session =
        MonitoringSession::new(ContainerId(1), DockerId("d".into()), SessionId(1), config(), registry());
    let mut bad = config();
    bad.silence_threshold_secs = 1000;
    assert!(session.update_config(bad).await.is_err());
}

#[tokio::test]
async fn enable_and_disable_broadcast_status_events() {
    let session =
        MonitoringSession::new(ContainerId(1), DockerId("d".into()), SessionId(1), config(), registry());
    let mut rx = session.subscribe(1).await;
    session.enable();
    let event = rx.recv().await.expect("enable event");
    assert!(matches!(event, StatusEvent::MonitoringEnable));
    session.disable();
    let event = rx.recv().await.expect("disable event");
    assert!(matches!(event, StatusEvent::MonitoringDisable));
}
