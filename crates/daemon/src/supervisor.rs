// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker supervisor: spawns one subprocess per namespace, waits for
//! its READY handshake with a bounded timeout, restarts it on crash with
//! exponential backoff capped by a failure-rate threshold, and drains a
//! replaced worker through its in-flight calls before killing it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use relay_core::WorkerId;
use thiserror::Error;
use tokio::process::Child;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::Settings;
use crate::worker_transport::{ReadyWorker, WorkerHandle, WorkerState, WorkerTransport};

const INITIAL_BACKOFF: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to spawn worker process: {0}")]
    Spawn(String),
    #[error("namespace {0} exceeded its restart failure threshold and is broken")]
    Broken(String),
}

enum SpawnFailure {
    Spawn(std::io::Error),
    ReadyTimeout,
}

struct RestartState {
    failures: Vec<Instant>,
    backoff: Duration,
}

impl RestartState {
    fn new() -> Self {
        Self { failures: Vec::new(), backoff: INITIAL_BACKOFF }
    }
}

/// Advance the backoff for the next attempt, never exceeding `cap`.
fn next_backoff(current: Duration, cap: Duration) -> Duration {
    (current * 2).min(cap)
}

/// Whether the number of failures within `window` of `now` meets or
/// exceeds `threshold` — the point at which a namespace is marked broken.
fn exceeds_threshold(failures: &[Instant], now: Instant, window: Duration, threshold: u32) -> bool {
    failures.iter().filter(|t| now.saturating_duration_since(**t) <= window).count() as u32 >= threshold
}

/// Outcome of a restart triggered by worker loss, reported to whoever owns
/// the namespace catalog (the registry).
#[derive(Debug, Clone)]
pub enum RestartOutcome {
    Restarted { namespace: String, handle: WorkerHandle, functions: Vec<relay_core::FunctionDescriptor> },
    Broken { namespace: String },
}

struct WorkerSpec {
    source_path: PathBuf,
}

pub struct Supervisor {
    transport: Arc<WorkerTransport>,
    settings: Arc<Settings>,
    specs: Mutex<HashMap<String, WorkerSpec>>,
    restarts: Mutex<HashMap<String, RestartState>>,
    children: Mutex<HashMap<WorkerId, Child>>,
    restart_tx: mpsc::UnboundedSender<RestartOutcome>,
    restart_rx: Mutex<Option<mpsc::UnboundedReceiver<RestartOutcome>>>,
}

impl Supervisor {
    pub fn new(transport: Arc<WorkerTransport>, settings: Arc<Settings>) -> Arc<Self> {
        let (restart_tx, restart_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            transport,
            settings,
            specs: Mutex::new(HashMap::new()),
            restarts: Mutex::new(HashMap::new()),
            children: Mutex::new(HashMap::new()),
            restart_tx,
            restart_rx: Mutex::new(Some(restart_rx)),
        })
    }

    /// Take ownership of the restart-outcome event stream. Panics if called
    /// more than once — there is exactly one consumer.
    #[allow(clippy::expect_used)]
    pub fn take_restart_events(&self) -> mpsc::UnboundedReceiver<RestartOutcome> {
        self.restart_rx.lock().take().expect("restart events already taken")
    }

    /// Bring a namespace up for the first time, retrying with backoff until
    /// READY or the failure threshold is exceeded.
    pub async fn activate(self: &Arc<Self>, namespace: &str, source_path: PathBuf) -> Result<ReadyWorker, SupervisorError> {
        self.specs.lock().insert(namespace.to_string(), WorkerSpec { source_path: source_path.clone() });
        self.spawn_with_retry(namespace, &source_path).await
    }

    async fn spawn_with_retry(self: &Arc<Self>, namespace: &str, source_path: &Path) -> Result<ReadyWorker, SupervisorError> {
        loop {
            match self.try_spawn_once(namespace, source_path).await {
                Ok(handle) => return Ok(handle),
                Err(failure) => {
                    if let SpawnFailure::Spawn(err) = &failure {
                        warn!(%namespace, error = %err, "failed to spawn worker process");
                    } else {
                        warn!(%namespace, "worker did not become ready in time");
                    }
                    let (threshold, window) = self.settings.restart_failure_threshold;
                    let now = Instant::now();
                    let mut restarts = self.restarts.lock();
                    let state = restarts.entry(namespace.to_string()).or_insert_with(RestartState::new);
                    state.failures.push(now);
                    if exceeds_threshold(&state.failures, now, window, threshold) {
                        return Err(SupervisorError::Broken(namespace.to_string()));
                    }
                    let backoff = state.backoff;
                    state.backoff = next_backoff(state.backoff, self.settings.restart_backoff_cap);
                    drop(restarts);
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    async fn try_spawn_once(self: &Arc<Self>, namespace: &str, source_path: &Path) -> Result<ReadyWorker, SpawnFailure> {
        let worker_id = WorkerId::new_random();
        let worker_ws_url = format!("ws://127.0.0.1:{}/worker", self.settings.worker_port);
        let ready = self.transport.expect(worker_id, namespace);

        let mut child = tokio::process::Command::new(&self.settings.worker_runner)
            .arg(source_path)
            .arg(&worker_ws_url)
            .arg(namespace)
            .arg(worker_id.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                self.transport.forget(worker_id);
                SpawnFailure::Spawn(err)
            })?;

        match tokio::time::timeout(self.settings.worker_ready_timeout, ready).await {
            Ok(Ok(ready_worker)) => {
                self.children.lock().insert(worker_id, child);
                info!(%namespace, %worker_id, "worker spawned and ready");
                Ok(ready_worker)
            }
            _ => {
                self.transport.forget(worker_id);
                let _ = child.start_kill();
                Err(SpawnFailure::ReadyTimeout)
            }
        }
    }

    /// Spawn a replacement worker, then mark `old` DRAINING once the
    /// replacement is READY. The caller is responsible for
    /// publishing the new handle as the registry's active reference; this
    /// only arranges the old handle's eventual termination.
    pub async fn reload(self: &Arc<Self>, namespace: &str, source_path: PathBuf, old: WorkerHandle) -> Result<ReadyWorker, SupervisorError> {
        let replacement = self.activate(namespace, source_path).await?;
        old.set_state(WorkerState::Draining);
        self.retire(old);
        Ok(replacement)
    }

    /// Drain a handle's in-flight calls (up to the configured grace period),
    /// then send `shutdown` and kill it. Used both for reload's replaced
    /// handle and for a namespace whose source file disappeared.
    pub fn retire(self: &Arc<Self>, handle: WorkerHandle) {
        let grace = self.settings.drain_grace;
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let deadline = Instant::now() + grace;
            while Instant::now() < deadline && handle.in_flight_count() > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            let _ = handle.send_shutdown();
            tokio::time::sleep(Duration::from_millis(200)).await;
            this.kill(handle.id());
        });
    }

    fn kill(&self, worker_id: WorkerId) {
        if let Some(mut child) = self.children.lock().remove(&worker_id) {
            let _ = child.start_kill();
        }
    }

    /// React to a worker-lost notification from the transport by restarting
    /// the namespace it belonged to, subject to the same backoff/threshold
    /// policy as initial activation.
    pub async fn handle_worker_lost(self: &Arc<Self>, namespace: &str, lost_worker: WorkerId) {
        self.kill(lost_worker);
        let Some(source_path) = self.specs.lock().get(namespace).map(|s| s.source_path.clone()) else {
            return;
        };
        match self.spawn_with_retry(namespace, &source_path).await {
            Ok((handle, functions)) => {
                let _ = self.restart_tx.send(RestartOutcome::Restarted { namespace: namespace.to_string(), handle, functions });
            }
            Err(_) => {
                let _ = self.restart_tx.send(RestartOutcome::Broken { namespace: namespace.to_string() });
            }
        }
    }

    /// Broker shutdown: ask every handle to shut down
    /// cleanly, then kill whatever is still alive after a short grace.
    pub async fn shutdown_all(&self, handles: Vec<WorkerHandle>) {
        for handle in &handles {
            let _ = handle.send_shutdown();
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
        for handle in handles {
            self.kill(handle.id());
        }
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
