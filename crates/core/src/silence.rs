// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session inactivity timer with reset-on-activity and a single
//! exactly-once-per-crossing callback.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
enum TimerCommand {
    Activity,
    Enable,
    Disable,
    Reconfigure(Duration),
}

/// Cancellable background timer. Dropping the handle stops the background
/// task (the watch sender closes).
pub struct SilenceTimer {
    tx: watch::Sender<TimerCommand>,
    started_at: Arc<std::sync::Mutex<Instant>>,
    threshold: Arc<std::sync::Mutex<Duration>>,
    enabled: Arc<std::sync::atomic::AtomicBool>,
}

impl SilenceTimer {
    /// Spawn the timer's background task. `on_threshold` is invoked on a
    /// dedicated `tokio::spawn`ed task — never on the timer's own loop —
    /// so it never holds whatever lock the caller is holding.
    pub fn spawn(
        threshold: Duration,
        on_threshold: Arc<dyn Fn(Duration) + Send + Sync>,
    ) -> Self {
        let (tx, mut rx) = watch::channel(TimerCommand::Disable);
        let started_at = Arc::new(std::sync::Mutex::new(Instant::now()));
        let threshold_box = Arc::new(std::sync::Mutex::new(threshold));
        let enabled = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let task_started_at = started_at.clone();
        let task_threshold = threshold_box.clone();
        let task_enabled = enabled.clone();

        tokio::spawn(async move {
            let mut deadline = Instant::now() + threshold;
            loop {
                let sleep = tokio::time::sleep_until(deadline);
                tokio::select! {
                    changed = rx.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        let cmd = *rx.borrow();
                        match cmd {
                            TimerCommand::Activity => {
                                *task_started_at.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
                                let thr = *task_threshold.lock().unwrap_or_else(|e| e.into_inner());
                                deadline = Instant::now() + thr;
                            }
                            TimerCommand::Enable => {
                                task_enabled.store(true, std::sync::atomic::Ordering::SeqCst);
                                *task_started_at.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
                                let thr = *task_threshold.lock().unwrap_or_else(|e| e.into_inner());
                                deadline = Instant::now() + thr;
                            }
                            TimerCommand::Disable => {
                                task_enabled.store(false, std::sync::atomic::Ordering::SeqCst);
                                deadline = Instant::now() + Duration::from_secs(3600 * 24 * 365);
                            }
                            TimerCommand::Reconfigure(new_threshold) => {
                                *task_threshold.lock().unwrap_or_else(|e| e.into_inner()) = new_threshold;
                                let start = *task_started_at.lock().unwrap_or_else(|e| e.into_inner());
                                deadline = start + new_threshold;
                                if task_enabled.load(std::sync::atomic::Ordering::SeqCst) && deadline <= Instant::now() {
                                    let elapsed = start.elapsed();
                                    let cb = on_threshold.clone();
                                    tokio::spawn(async move { cb(elapsed) });
                                    deadline = Instant::now() + new_threshold;
                                }
                            }
                        }
                    }
                    _ = sleep, if task_enabled.load(std::sync::atomic::Ordering::SeqCst) => {
                        let start = *task_started_at.lock().unwrap_or_else(|e| e.into_inner());
                        let elapsed = start.elapsed();
                        let cb = on_threshold.clone();
                        tokio::spawn(async move { cb(elapsed) });
                        let thr = *task_threshold.lock().unwrap_or_else(|e| e.into_inner());
                        deadline = Instant::now() + thr;
                    }
                }
            }
        });

        Self { tx, started_at, threshold: threshold_box, enabled }
    }

    pub fn enable(&self) {
        let _ = self.tx.send(TimerCommand::Enable);
    }

    pub fn disable(&self) {
        let _ = self.tx.send(TimerCommand::Disable);
    }

    pub fn on_activity(&self) {
        let _ = self.tx.send(TimerCommand::Activity);
    }

    pub fn update_config(&self, threshold: Duration) {
        let _ = self.tx.send(TimerCommand::Reconfigure(threshold));
    }

    pub fn silence_duration(&self) -> Duration {
        self.started_at.lock().unwrap_or_else(|e| e.into_inner()).elapsed()
    }

    pub fn threshold(&self) -> Duration {
        *self.threshold.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[path = "silence_tests.rs"]
mod tests;
