// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Configuration for the platform server.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "platform-server", version, about)]
pub struct ServerConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "PLATFORM_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8900, env = "PLATFORM_PORT")]
    pub port: u16,

    /// Path to the SQLite database file.
    #[arg(long, default_value = "platform.db", env = "PLATFORM_DB_PATH")]
    pub db_path: std::path::PathBuf,

    /// Bearer token for API auth. If unset, auth is disabled.
    #[arg(long, env = "PLATFORM_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Binary name of the headless assistant CLI invoked inside containers.
    #[arg(long, default_value = "claude", env = "PLATFORM_ASSISTANT_CLI_NAME")]
    pub assistant_cli_name: String,

    /// Seconds of inactivity after which an idle headless session is closed.
    #[arg(long, default_value_t = 1800, env = "PLATFORM_IDLE_TIMEOUT_SECS")]
    pub idle_timeout_secs: u64,

    /// How often the idle reaper sweeps for timed-out headless sessions.
    #[arg(long, default_value_t = 300, env = "PLATFORM_REAPER_INTERVAL_SECS")]
    pub reaper_interval_secs: u64,

    /// Default cost in USD per input token, used when a monitoring config
    /// does not override it.
    #[arg(long, default_value_t = 3e-6, env = "PLATFORM_COST_PER_INPUT_TOKEN")]
    pub cost_per_input_token: f64,

    /// Default cost in USD per output token.
    #[arg(long, default_value_t = 1.5e-5, env = "PLATFORM_COST_PER_OUTPUT_TOKEN")]
    pub cost_per_output_token: f64,

    /// HTTP endpoint the `ai` strategy posts its decision prompt to. If
    /// unset, the `ai` strategy is not registered and selecting it behaves
    /// like `none`.
    #[arg(long, env = "PLATFORM_AI_STRATEGY_ENDPOINT")]
    pub ai_strategy_endpoint: Option<String>,
}

impl ServerConfig {
    pub fn idle_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn reaper_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.reaper_interval_secs)
    }
}
