// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: in-memory fakes for the container/process and
//! history-store collaborator traits, reused by this crate's unit tests and by
//! `platform-server`'s integration tests.

use std::pin::Pin;
use std::sync::Mutex as StdMutex;

use tokio::sync::{mpsc, oneshot};

use crate::container::{ContainerHandle, ExitStatus, ProcessHandle, ProcessSpec, StdoutChunk};
use crate::headless_session::HistoryHandle;
use crate::model::{ConversationId, DockerId, PromptSource, TurnId};
use crate::strategy::{InputWriter, TaskQueueHandle};

/// A fake child process whose stdout and exit are driven by the test via the
/// channels returned from [`FakeContainer::spawn_next`].
pub struct FakeProcess {
    stdout_rx: Option<mpsc::Receiver<StdoutChunk>>,
    exit_rx: Option<oneshot::Receiver<ExitStatus>>,
    killed: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl ProcessHandle for FakeProcess {
    fn take_stdout(&mut self) -> mpsc::Receiver<StdoutChunk> {
        self.stdout_rx.take().unwrap_or_else(|| mpsc::channel(1).1)
    }

    fn wait(&mut self) -> Pin<Box<dyn std::future::Future<Output = anyhow::Result<ExitStatus>> + Send + '_>> {
        let rx = self.exit_rx.take();
        Box::pin(async move {
            match rx {
                Some(rx) => Ok(rx.await.unwrap_or(ExitStatus { code: Some(0) })),
                None => std::future::pending().await,
            }
        })
    }

    fn kill(&mut self) -> Pin<Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send + '_>> {
        self.killed.store(true, std::sync::atomic::Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    }
}

/// A fake container that hands back a pre-wired [`FakeProcess`] for every
/// `spawn_process` call, and records bytes written via `write_input`.
type PendingProcess = (mpsc::Receiver<StdoutChunk>, oneshot::Receiver<ExitStatus>);

pub struct FakeContainer {
    id: crate::model::ContainerId,
    docker_id: DockerId,
    written: StdMutex<Vec<u8>>,
    ensured_workdirs: StdMutex<Vec<String>>,
    pending_rx: StdMutex<Option<PendingProcess>>,
}

impl FakeContainer {
    pub fn new(id: u64) -> Self {
        Self {
            id: crate::model::ContainerId(id),
            docker_id: DockerId(format!("docker-{id}")),
            written: StdMutex::new(Vec::new()),
            ensured_workdirs: StdMutex::new(Vec::new()),
            pending_rx: StdMutex::new(None),
        }
    }

    /// Prepare the channels the next spawned process will use, returning the
    /// stdout sender and exit sender so the test can drive the process.
    pub fn prime_next_process(&self) -> (mpsc::Sender<StdoutChunk>, oneshot::Sender<ExitStatus>) {
        let (stdout_tx, stdout_rx) = mpsc::channel(32);
        let (exit_tx, exit_rx) = oneshot::channel();
        *self.pending_rx.lock().unwrap_or_else(|e| e.into_inner()) = Some((stdout_rx, exit_rx));
        (stdout_tx, exit_tx)
    }

    pub fn written_input(&self) -> Vec<u8> {
        self.written.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl ContainerHandle for FakeContainer {
    fn id(&self) -> crate::model::ContainerId {
        self.id
    }

    fn docker_id(&self) -> DockerId {
        self.docker_id.clone()
    }

    fn write_input<'a>(&'a self, bytes: &'a [u8]) -> Pin<Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send + 'a>> {
        self.written.lock().unwrap_or_else(|e| e.into_inner()).extend_from_slice(bytes);
        Box::pin(async { Ok(()) })
    }

    fn ensure_workdir<'a>(&'a self, path: &'a str) -> Pin<Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send + 'a>> {
        self.ensured_workdirs.lock().unwrap_or_else(|e| e.into_inner()).push(path.to_string());
        Box::pin(async { Ok(()) })
    }

    fn spawn_process<'a>(
        &'a self,
        _spec: ProcessSpec,
    ) -> Pin<Box<dyn std::future::Future<Output = anyhow::Result<Box<dyn ProcessHandle>>> + Send + 'a>> {
        Box::pin(async move {
            let pending = self.pending_rx.lock().unwrap_or_else(|e| e.into_inner()).take();
            let (stdout_rx, exit_rx) = match pending {
                Some(pair) => pair,
                None => (mpsc::channel(1).1, oneshot::channel().1),
            };
            Ok(Box::new(FakeProcess {
                stdout_rx: Some(stdout_rx),
                exit_rx: Some(exit_rx),
                killed: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false)),
            }) as Box<dyn ProcessHandle>)
        })
    }
}

/// Records every bytes write, for strategies that inject commands.
#[derive(Default)]
pub struct FakeInputWriter {
    pub written: StdMutex<Vec<Vec<u8>>>,
}

impl InputWriter for FakeInputWriter {
    fn write_input<'a>(&'a self, bytes: &'a [u8]) -> Pin<Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send + 'a>> {
        self.written.lock().unwrap_or_else(|e| e.into_inner()).push(bytes.to_vec());
        Box::pin(async { Ok(()) })
    }
}

/// A task queue handle backed by a fixed in-memory list, for strategy tests.
pub struct FakeTaskQueue {
    pub pending: StdMutex<Option<crate::model::Task>>,
    pub marked_in_progress: StdMutex<Vec<crate::model::TaskId>>,
}

impl TaskQueueHandle for FakeTaskQueue {
    fn peek_pending<'a>(&'a self) -> Pin<Box<dyn std::future::Future<Output = Option<crate::model::Task>> + Send + 'a>> {
        let task = self.pending.lock().unwrap_or_else(|e| e.into_inner()).clone();
        Box::pin(async move { task })
    }

    fn mark_in_progress<'a>(&'a self, id: crate::model::TaskId) -> Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        self.marked_in_progress.lock().unwrap_or_else(|e| e.into_inner()).push(id);
        Box::pin(async {})
    }
}

/// An in-memory history store recording every call, for `HeadlessSession`
/// tests that don't need real persistence.
#[derive(Default)]
pub struct FakeHistory {
    pub next_turn: std::sync::atomic::AtomicU64,
    pub events: StdMutex<Vec<(TurnId, String, serde_json::Value)>>,
    pub completed: StdMutex<Vec<(TurnId, String)>>,
    pub failed: StdMutex<Vec<(TurnId, String)>>,
}

impl HistoryHandle for FakeHistory {
    fn start_turn<'a>(
        &'a self,
        _conversation_id: ConversationId,
        _prompt: &'a str,
        _source: PromptSource,
    ) -> Pin<Box<dyn std::future::Future<Output = anyhow::Result<TurnId>> + Send + 'a>> {
        let id = self.next_turn.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
        Box::pin(async move { Ok(TurnId(id)) })
    }

    fn append_event<'a>(
        &'a self,
        turn_id: TurnId,
        event_type: &'a str,
        _event_subtype: Option<&'a str>,
        raw_json: serde_json::Value,
    ) -> Pin<Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send + 'a>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).push((turn_id, event_type.to_string(), raw_json));
        Box::pin(async { Ok(()) })
    }

    fn update_claude_session_id<'a>(
        &'a self,
        _conversation_id: ConversationId,
        _remote_id: &'a str,
    ) -> Pin<Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async { Ok(()) })
    }

    fn complete_turn<'a>(
        &'a self,
        turn_id: TurnId,
        response: &'a str,
        _model: Option<&'a str>,
        _input_tokens: u64,
        _output_tokens: u64,
        _cost_usd: f64,
        _duration_ms: u64,
    ) -> Pin<Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send + 'a>> {
        self.completed.lock().unwrap_or_else(|e| e.into_inner()).push((turn_id, response.to_string()));
        Box::pin(async { Ok(()) })
    }

    fn fail_turn<'a>(
        &'a self,
        turn_id: TurnId,
        error_message: &'a str,
    ) -> Pin<Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send + 'a>> {
        self.failed.lock().unwrap_or_else(|e| e.into_inner()).push((turn_id, error_message.to_string()));
        Box::pin(async { Ok(()) })
    }
}
