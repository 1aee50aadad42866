// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Object-safe collaborator traits for the external container runtime.
//!
//! Docker lifecycle itself is out of scope; this crate only ever reaches
//! the container through these two traits, so tests substitute an
//! in-memory fake (see `test_support`).

use std::pin::Pin;

use anyhow::Result;

use crate::model::{ContainerId, DockerId};

/// A line or chunk of stdout bytes from a spawned process.
pub type StdoutChunk = Vec<u8>;

/// The exit status of a spawned process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    pub code: Option<i32>,
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// A single spawned process inside a container.
///
/// `take_stdout` hands back an owned channel rather than a borrowed
/// stream so the reader and waiter tasks can hold the same boxed handle
/// independently without fighting the borrow checker over its lifetime.
pub trait ProcessHandle: Send + Sync {
    /// Take ownership of the stdout channel. Implementations spawn their
    /// own forwarding task internally; this can only be called once.
    fn take_stdout(&mut self) -> tokio::sync::mpsc::Receiver<StdoutChunk>;

    /// Block until the process exits.
    fn wait(&mut self) -> Pin<Box<dyn std::future::Future<Output = Result<ExitStatus>> + Send + '_>>;

    /// Forcibly terminate the process.
    fn kill(&mut self) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + '_>>;
}

/// Specification for a process to spawn inside a container.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub argv: Vec<String>,
    pub workdir: String,
}

/// A running developer container, reached only through this interface.
pub trait ContainerHandle: Send + Sync {
    fn id(&self) -> ContainerId;

    fn docker_id(&self) -> DockerId;

    /// Write bytes to the container's single interactive input stream
    /// (shared serially by injection and headless prompts).
    fn write_input<'a>(
        &'a self,
        bytes: &'a [u8],
    ) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>>;

    /// Ensure the given working directory exists in the container,
    /// creating it if absent.
    fn ensure_workdir<'a>(
        &'a self,
        path: &'a str,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>>;

    /// Spawn a new process in the container per `spec`.
    fn spawn_process<'a>(
        &'a self,
        spec: ProcessSpec,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<Box<dyn ProcessHandle>>> + Send + 'a>>;
}
