// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests.
//!
//! Spawns the real `platform-server` binary as a subprocess and exercises
//! it over HTTP and WebSocket.

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Once;
use std::time::Duration;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Safe to call multiple times — only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Resolve the path to the compiled `platform-server` binary.
pub fn server_binary() -> PathBuf {
    let manifest = std::path::Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("platform-server")
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// A running `platform-server` process that is killed on drop.
pub struct ServerProcess {
    child: Child,
    port: u16,
    auth_token: Option<String>,
    _db_dir: tempfile::TempDir,
}

/// Builder for configuring a [`ServerProcess`] before spawning it.
pub struct ServerBuilder {
    auth_token: Option<String>,
    idle_timeout_secs: Option<u64>,
    reaper_interval_secs: Option<u64>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self { auth_token: None, idle_timeout_secs: None, reaper_interval_secs: None }
    }
}

impl ServerBuilder {
    /// Require bearer-token auth on every non-health, non-WS route.
    pub fn auth_token(mut self, token: &str) -> Self {
        self.auth_token = Some(token.to_owned());
        self
    }

    pub fn idle_timeout_secs(mut self, secs: u64) -> Self {
        self.idle_timeout_secs = Some(secs);
        self
    }

    pub fn reaper_interval_secs(mut self, secs: u64) -> Self {
        self.reaper_interval_secs = Some(secs);
        self
    }

    pub fn spawn(self) -> anyhow::Result<ServerProcess> {
        ensure_crypto();
        let binary = server_binary();
        anyhow::ensure!(binary.exists(), "platform-server binary not found at {}", binary.display());

        let port = free_port()?;
        let db_dir = tempfile::tempdir()?;
        let db_path = db_dir.path().join("platform.db");

        let mut args: Vec<String> = vec![
            "--host".into(),
            "127.0.0.1".into(),
            "--port".into(),
            port.to_string(),
            "--db-path".into(),
            db_path.to_string_lossy().into_owned(),
        ];
        if let Some(ref token) = self.auth_token {
            args.extend(["--auth-token".into(), token.clone()]);
        }
        if let Some(secs) = self.idle_timeout_secs {
            args.extend(["--idle-timeout-secs".into(), secs.to_string()]);
        }
        if let Some(secs) = self.reaper_interval_secs {
            args.extend(["--reaper-interval-secs".into(), secs.to_string()]);
        }

        let child = Command::new(&binary)
            .args(&args)
            .env("RUST_LOG", "warn")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        Ok(ServerProcess { child, port, auth_token: self.auth_token, _db_dir: db_dir })
    }
}

impl ServerProcess {
    pub fn build() -> ServerBuilder {
        ServerBuilder::default()
    }

    /// Spawn with no auth token and default idle/reaper timing.
    pub fn start() -> anyhow::Result<Self> {
        Self::build().spawn()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn ws_monitoring_url(&self, container_id: u64) -> String {
        let mut url = format!("ws://127.0.0.1:{}/ws/monitoring/{container_id}", self.port);
        if let Some(token) = &self.auth_token {
            url.push_str("?token=");
            url.push_str(token);
        }
        url
    }

    /// An authenticated `reqwest::Client` — carries the bearer token (if
    /// any) on every request via a default header.
    pub fn client(&self) -> anyhow::Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder();
        if let Some(token) = &self.auth_token {
            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert(reqwest::header::AUTHORIZATION, format!("Bearer {token}").parse()?);
            builder = builder.default_headers(headers);
        }
        Ok(builder.build()?)
    }

    /// Poll `/api/health` until it responds successfully.
    pub async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<()> {
        let client = reqwest::Client::new();
        let url = format!("{}/api/health", self.base_url());
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("platform-server did not become healthy within {timeout:?}");
            }
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
