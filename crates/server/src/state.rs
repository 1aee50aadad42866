// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared application state threaded through every HTTP/WebSocket handler.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::container::ContainerDirectory;
use crate::db::HistoryStore;
use crate::headless_registry::HeadlessRegistry;
use crate::monitoring_registry::MonitoringRegistry;

pub struct AppState {
    pub config: ServerConfig,
    pub db: Arc<HistoryStore>,
    pub containers: Arc<ContainerDirectory>,
    pub headless: Arc<HeadlessRegistry>,
    pub monitoring: Arc<MonitoringRegistry>,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn build(config: ServerConfig, db: Arc<HistoryStore>, shutdown: CancellationToken) -> Arc<Self> {
        let containers = Arc::new(ContainerDirectory::new());
        let headless = HeadlessRegistry::new(
            db.clone(),
            containers.clone(),
            config.assistant_cli_name.clone(),
            config.cost_per_input_token,
            config.cost_per_output_token,
            config.idle_timeout(),
            config.reaper_interval(),
        );
        let monitoring = Arc::new(MonitoringRegistry::new(containers.clone(), db.clone(), db.clone(), config.ai_strategy_endpoint.clone()));

        Arc::new(Self { config, db, containers, headless, monitoring, shutdown })
    }

    pub fn shutdown(&self) {
        self.headless.shutdown();
        self.shutdown.cancel();
    }
}
