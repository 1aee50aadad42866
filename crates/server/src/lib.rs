// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Platform server: wires the monitoring and headless-session cores from
//! `platform-core` to persistence, container access, and the HTTP/WS
//! transport.

pub mod config;
pub mod container;
pub mod db;
pub mod error;
pub mod headless_registry;
pub mod monitoring_registry;
pub mod state;
pub mod task_queue;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::db::HistoryStore;
use crate::state::AppState;

/// Runs the server until shutdown is requested (Ctrl-C or an internal
/// failure). Returns once the listener and background tasks have stopped.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let db = Arc::new(HistoryStore::open(&config.db_path)?);
    let shutdown = CancellationToken::new();
    let addr = format!("{}:{}", config.host, config.port);

    let state = AppState::build(config, db, shutdown.clone());
    let router = transport::build_router(state.clone());

    tracing::info!(%addr, "platform server listening");
    let listener = TcpListener::bind(&addr).await?;

    let serve_shutdown = shutdown.clone();
    let server = tokio::spawn(async move { axum::serve(listener, router).with_graceful_shutdown(serve_shutdown.cancelled_owned()).await });

    tokio::select! {
        result = server => result??,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested");
            shutdown.cancel();
        }
    }

    state.shutdown();
    Ok(())
}
