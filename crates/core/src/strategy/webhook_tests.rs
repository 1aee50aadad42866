// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::model::{ActiveStrategy, ContainerId, DockerId, MonitoringConfig, SessionId};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn ctx(url: &str) -> StrategyContext {
    let mut config = MonitoringConfig::default();
    config.active_strategy = ActiveStrategy::Webhook;
    config.webhook_url = Some(url.to_string());
    StrategyContext {
        container_id: ContainerId(1),
        session_id: SessionId(2),
        docker_id: DockerId("d1".into()),
        silence_duration: std::time::Duration::from_secs(6),
        last_output: b"hello".to_vec(),
        config,
    }
}

async fn spawn_mock_server(status: u16) -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_clone = hits.clone();
    let app = axum::Router::new().route(
        "/hook",
        axum::routing::post(move || {
            let hits = hits_clone.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                axum::http::StatusCode::from_u16(status).unwrap()
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    (format!("http://{addr}/hook"), hits)
}

#[tokio::test]
async fn validate_rejects_non_http_scheme() {
    let strategy = WebhookStrategy::new(std::time::Duration::from_secs(1));
    let mut config = MonitoringConfig::default();
    config.webhook_url = Some("ftp://example.com".into());
    assert!(strategy.validate(&config).is_err());
}

#[tokio::test]
async fn succeeds_on_first_attempt() {
    let (url, hits) = spawn_mock_server(200).await;
    let strategy = WebhookStrategy::new(std::time::Duration::from_secs(1));
    let outcome = strategy.execute(&ctx(&url)).await;
    assert!(matches!(outcome, StrategyOutcome::WebhookSent));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn retries_three_times_then_fails() {
    let (url, hits) = spawn_mock_server(500).await;
    let strategy = WebhookStrategy::new(std::time::Duration::from_secs(1));
    let outcome = strategy.execute(&ctx(&url)).await;
    assert!(matches!(outcome, StrategyOutcome::Failed { .. }));
    // initial attempt + 3 retries = 4 total requests
    assert_eq!(hits.load(Ordering::SeqCst), 4);
}
