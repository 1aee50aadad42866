// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Concrete [`ContainerHandle`]/[`ProcessHandle`] pair that reaches a
//! running developer container through `docker exec`. Container lifecycle
//! (create/start/stop/remove) stays external; this module only ever execs
//! into a container that is already running, by its docker id.

use std::collections::HashMap;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use platform_core::container::{ContainerHandle, ExitStatus, ProcessHandle, ProcessSpec, StdoutChunk};
use platform_core::model::{ContainerId, DockerId};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, Mutex, RwLock};

/// Resolves a container id to a live handle. Both the monitoring registry
/// (injection/ai strategies) and the headless registry (spawned turns)
/// need the *same* handle instance per container, since its single
/// interactive stdin is shared serially between them.
pub trait ContainerResolver: Send + Sync {
    fn resolve<'a>(
        &'a self,
        container_id: ContainerId,
        docker_id: DockerId,
    ) -> Pin<Box<dyn std::future::Future<Output = Arc<dyn ContainerHandle>> + Send + 'a>>;
}

/// Caches one [`DockerContainerHandle`] per container id so every caller
/// sees the same handle (and thus the same interactive stdin).
#[derive(Default)]
pub struct ContainerDirectory {
    handles: RwLock<HashMap<ContainerId, Arc<DockerContainerHandle>>>,
}

impl ContainerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_create(&self, container_id: ContainerId, docker_id: DockerId) -> Arc<DockerContainerHandle> {
        if let Some(existing) = self.handles.read().await.get(&container_id) {
            if existing.docker_id == docker_id {
                return existing.clone();
            }
        }

        let mut handles = self.handles.write().await;
        if let Some(existing) = handles.get(&container_id) {
            if existing.docker_id == docker_id {
                return existing.clone();
            }
        }
        let handle = DockerContainerHandle::new(container_id, docker_id);
        handles.insert(container_id, handle.clone());
        handle
    }
}

impl ContainerResolver for ContainerDirectory {
    fn resolve<'a>(
        &'a self,
        container_id: ContainerId,
        docker_id: DockerId,
    ) -> Pin<Box<dyn std::future::Future<Output = Arc<dyn ContainerHandle>> + Send + 'a>> {
        Box::pin(async move {
            let concrete = self.get_or_create(container_id, docker_id).await;
            concrete as Arc<dyn ContainerHandle>
        })
    }
}

/// A container reached via `docker exec`. The single interactive input
/// stream tracked here is whichever process was spawned most recently,
/// matching the serial-write contract `ContainerHandle::write_input`
/// documents.
pub struct DockerContainerHandle {
    id: ContainerId,
    docker_id: DockerId,
    current_stdin: Mutex<Option<ChildStdin>>,
}

impl DockerContainerHandle {
    pub fn new(id: ContainerId, docker_id: DockerId) -> Arc<Self> {
        Arc::new(Self { id, docker_id, current_stdin: Mutex::new(None) })
    }
}

impl ContainerHandle for DockerContainerHandle {
    fn id(&self) -> ContainerId {
        self.id
    }

    fn docker_id(&self) -> DockerId {
        self.docker_id.clone()
    }

    fn write_input<'a>(&'a self, bytes: &'a [u8]) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut guard = self.current_stdin.lock().await;
            match guard.as_mut() {
                Some(stdin) => {
                    stdin.write_all(bytes).await.context("writing to container stdin")?;
                    stdin.flush().await.context("flushing container stdin")?;
                    Ok(())
                }
                None => bail!("container {} has no active process to write input to", self.docker_id),
            }
        })
    }

    fn ensure_workdir<'a>(&'a self, path: &'a str) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let status = Command::new("docker")
                .args(["exec", self.docker_id.0.as_str(), "mkdir", "-p", path])
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
                .context("spawning docker exec mkdir -p")?;
            if !status.success() {
                bail!("mkdir -p {path} failed in container {} (exit {:?})", self.docker_id, status.code());
            }
            Ok(())
        })
    }

    fn spawn_process<'a>(
        &'a self,
        spec: ProcessSpec,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<Box<dyn ProcessHandle>>> + Send + 'a>> {
        Box::pin(async move {
            let mut cmd = Command::new("docker");
            cmd.args(["exec", "-i", "-w", &spec.workdir, self.docker_id.0.as_str()]);
            cmd.args(&spec.argv);
            cmd.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped());

            let mut child = cmd.spawn().context("spawning docker exec")?;
            let stdin = child.stdin.take();
            *self.current_stdin.lock().await = stdin;

            // Drain stderr so a chatty assistant CLI never blocks on a full pipe.
            if let Some(mut stderr) = child.stderr.take() {
                tokio::spawn(async move {
                    let mut sink = [0u8; 4096];
                    loop {
                        match stderr.read(&mut sink).await {
                            Ok(0) | Err(_) => break,
                            Ok(_) => {}
                        }
                    }
                });
            }

            Ok(Box::new(DockerProcessHandle { child: Some(child) }) as Box<dyn ProcessHandle>)
        })
    }
}

/// A single `docker exec` child process.
pub struct DockerProcessHandle {
    child: Option<Child>,
}

impl ProcessHandle for DockerProcessHandle {
    fn take_stdout(&mut self) -> mpsc::Receiver<StdoutChunk> {
        let (tx, rx) = mpsc::channel(64);
        let Some(mut stdout) = self.child.as_mut().and_then(|c| c.stdout.take()) else {
            return rx;
        };
        tokio::spawn(async move {
            let mut buf = [0u8; 8192];
            loop {
                match stdout.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });
        rx
    }

    fn wait(&mut self) -> Pin<Box<dyn std::future::Future<Output = Result<ExitStatus>> + Send + '_>> {
        Box::pin(async move {
            match self.child.as_mut() {
                Some(child) => {
                    let status = child.wait().await.context("waiting on docker exec child")?;
                    Ok(ExitStatus { code: status.code() })
                }
                None => bail!("process already reaped"),
            }
        })
    }

    fn kill(&mut self) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            if let Some(child) = self.child.as_mut() {
                child.start_kill().context("killing docker exec child")?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
#[path = "container_tests.rs"]
mod tests;
