// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests that spawn the real `platform-server` binary and
//! exercise its HTTP and WebSocket surface. These stick to the parts of the
//! API that don't require a Docker daemon (monitoring config, task queue,
//! automation log, conversation listing) — headless session execution
//! itself reaches a real container and is out of reach for a black-box
//! smoke test.

use std::time::Duration;

use futures_util::StreamExt;
use platform_specs::ServerProcess;
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::test]
async fn http_health() -> anyhow::Result<()> {
    let server = ServerProcess::start()?;
    server.wait_healthy(TIMEOUT).await?;

    let resp: serde_json::Value = reqwest::get(format!("{}/api/health", server.base_url())).await?.json().await?;
    assert_eq!(resp["status"], "running");
    assert_eq!(resp["headless_sessions"], 0);
    assert_eq!(resp["monitoring_sessions"], 0);

    Ok(())
}

#[tokio::test]
async fn conversations_list_starts_empty() -> anyhow::Result<()> {
    let server = ServerProcess::start()?;
    server.wait_healthy(TIMEOUT).await?;

    let client = server.client()?;
    let resp: serde_json::Value =
        client.get(format!("{}/api/containers/1/conversations", server.base_url())).send().await?.json().await?;
    assert_eq!(resp.as_array().map(|a| a.len()), Some(0));

    Ok(())
}

#[tokio::test]
async fn monitoring_upsert_enable_disable_remove() -> anyhow::Result<()> {
    let server = ServerProcess::start()?;
    server.wait_healthy(TIMEOUT).await?;
    let client = server.client()?;
    let url = format!("{}/api/containers/7/monitoring", server.base_url());

    let status: serde_json::Value = client
        .put(&url)
        .json(&serde_json::json!({
            "docker_id": "dev-container-7",
            "silence_threshold_secs": 30,
            "active_strategy": "none",
            "context_buffer_size": 65536,
            "webhook_url": null,
            "webhook_headers": {},
            "injection_command": null,
        }))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(status["enabled"], false);
    assert_eq!(status["threshold_secs"], 30);

    let status: serde_json::Value = client.post(format!("{url}/enable")).send().await?.json().await?;
    assert_eq!(status["enabled"], true);

    let status: serde_json::Value = client.get(&url).send().await?.json().await?;
    assert_eq!(status["enabled"], true);

    let status: serde_json::Value = client.post(format!("{url}/disable")).send().await?.json().await?;
    assert_eq!(status["enabled"], false);

    let resp = client.delete(&url).send().await?;
    assert_eq!(resp.status().as_u16(), 204);

    let resp = client.get(&url).send().await?;
    assert_eq!(resp.status().as_u16(), 404);

    Ok(())
}

#[tokio::test]
async fn monitoring_upsert_rejects_invalid_threshold() -> anyhow::Result<()> {
    let server = ServerProcess::start()?;
    server.wait_healthy(TIMEOUT).await?;
    let client = server.client()?;

    let resp = client
        .put(format!("{}/api/containers/2/monitoring", server.base_url()))
        .json(&serde_json::json!({
            "docker_id": "dev-container-2",
            "silence_threshold_secs": 1,
            "active_strategy": "none",
            "context_buffer_size": 65536,
            "webhook_url": null,
            "webhook_headers": {},
            "injection_command": null,
        }))
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 400);
    let body: serde_json::Value = resp.json().await?;
    assert_eq!(body["error"]["code"], "invalid_request");

    Ok(())
}

#[tokio::test]
async fn task_queue_crud_and_reorder() -> anyhow::Result<()> {
    let server = ServerProcess::start()?;
    server.wait_healthy(TIMEOUT).await?;
    let client = server.client()?;
    let base = format!("{}/api/containers/3", server.base_url());

    // the task queue only exists once monitoring has been configured.
    client
        .put(format!("{base}/monitoring"))
        .json(&serde_json::json!({
            "docker_id": "dev-container-3",
            "silence_threshold_secs": 30,
            "active_strategy": "queue",
            "context_buffer_size": 65536,
            "webhook_url": null,
            "webhook_headers": {},
            "injection_command": null,
        }))
        .send()
        .await?;

    let first: serde_json::Value =
        client.post(format!("{base}/tasks")).json(&serde_json::json!({ "text": "write tests" })).send().await?.json().await?;
    let second: serde_json::Value =
        client.post(format!("{base}/tasks")).json(&serde_json::json!({ "text": "ship it" })).send().await?.json().await?;

    let tasks: Vec<serde_json::Value> = client.get(format!("{base}/tasks")).send().await?.json().await?;
    assert_eq!(tasks.len(), 2);

    let reordered_ids = vec![second["id"].clone(), first["id"].clone()];
    let resp = client.put(format!("{base}/tasks/reorder")).json(&serde_json::json!({ "ids": reordered_ids })).send().await?;
    assert_eq!(resp.status().as_u16(), 204);

    let tasks: Vec<serde_json::Value> = client.get(format!("{base}/tasks")).send().await?.json().await?;
    assert_eq!(tasks[0]["id"], second["id"]);

    let resp = client
        .put(format!("{}/tasks/{}/status", base, first["id"].as_u64().unwrap()))
        .json(&serde_json::json!({ "status": "in_progress" }))
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 204);

    let resp = client
        .put(format!("{}/tasks/{}/status", base, first["id"].as_u64().unwrap()))
        .json(&serde_json::json!({ "status": "completed" }))
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 204);

    let resp = client.delete(format!("{}/tasks/{}", base, second["id"].as_u64().unwrap())).send().await?;
    assert_eq!(resp.status().as_u16(), 204);

    let tasks: Vec<serde_json::Value> = client.get(format!("{base}/tasks")).send().await?.json().await?;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["status"], "completed");

    Ok(())
}

#[tokio::test]
async fn automation_log_starts_empty() -> anyhow::Result<()> {
    let server = ServerProcess::start()?;
    server.wait_healthy(TIMEOUT).await?;
    let client = server.client()?;

    let entries: Vec<serde_json::Value> =
        client.get(format!("{}/api/containers/4/automation-log", server.base_url())).send().await?.json().await?;
    assert!(entries.is_empty());

    Ok(())
}

#[tokio::test]
async fn auth_rejects_missing_token_and_accepts_correct_one() -> anyhow::Result<()> {
    let server = ServerProcess::build().auth_token("s3cret").spawn()?;
    server.wait_healthy(TIMEOUT).await?;

    // health never requires auth.
    let resp = reqwest::get(format!("{}/api/health", server.base_url())).await?;
    assert_eq!(resp.status().as_u16(), 200);

    // everything else does.
    let resp = reqwest::get(format!("{}/api/containers/1/conversations", server.base_url())).await?;
    assert_eq!(resp.status().as_u16(), 400);

    let authed = server.client()?;
    let resp = authed.get(format!("{}/api/containers/1/conversations", server.base_url())).send().await?;
    assert_eq!(resp.status().as_u16(), 200);

    Ok(())
}

#[tokio::test]
async fn ws_monitoring_rejects_unconfigured_container() -> anyhow::Result<()> {
    let server = ServerProcess::start()?;
    server.wait_healthy(TIMEOUT).await?;

    let result = tokio_tungstenite::connect_async(server.ws_monitoring_url(99)).await;
    assert!(result.is_err());

    Ok(())
}

#[tokio::test]
async fn ws_monitoring_streams_status_snapshot_and_enable_event() -> anyhow::Result<()> {
    let server = ServerProcess::start()?;
    server.wait_healthy(TIMEOUT).await?;
    let client = server.client()?;
    let base = format!("{}/api/containers/5", server.base_url());

    client
        .put(format!("{base}/monitoring"))
        .json(&serde_json::json!({
            "docker_id": "dev-container-5",
            "silence_threshold_secs": 30,
            "active_strategy": "none",
            "context_buffer_size": 65536,
            "webhook_url": null,
            "webhook_headers": {},
            "injection_command": null,
        }))
        .send()
        .await?;

    let (mut ws, _) = tokio_tungstenite::connect_async(server.ws_monitoring_url(5)).await?;

    let first = tokio::time::timeout(TIMEOUT, ws.next()).await?.ok_or_else(|| anyhow::anyhow!("ws stream ended"))??;
    let Message::Text(text) = first else { anyhow::bail!("expected a text frame") };
    let snapshot: serde_json::Value = serde_json::from_str(&text)?;
    assert_eq!(snapshot["type"], "monitoring_status");
    assert_eq!(snapshot["status"]["enabled"], false);

    client.post(format!("{base}/monitoring/enable")).send().await?;

    let second = tokio::time::timeout(TIMEOUT, ws.next()).await?.ok_or_else(|| anyhow::anyhow!("ws stream ended"))??;
    let Message::Text(text) = second else { anyhow::bail!("expected a text frame") };
    let event: serde_json::Value = serde_json::from_str(&text)?;
    assert_eq!(event["type"], "monitoring_enable");

    Ok(())
}
