// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Namespace registry: scans the tools directory at startup, watches
//! it for changes, and publishes `namespace name -> active worker handle`
//! through a per-namespace lock that readers never contend on reload.
//!
//! Restart policy lives in [`crate::supervisor::Supervisor`]; this module
//! only applies the outcomes it reports and drives the filesystem watcher
//! that decides when a reload is warranted in the first place.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock};
use relay_core::{FunctionDescriptor, Namespace};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use crate::config::Settings;
use crate::supervisor::{RestartOutcome, Supervisor};
use crate::worker_transport::{WorkerHandle, WorkerTransport};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read tools directory: {0}")]
    ToolsDirUnreadable(#[source] std::io::Error),
    #[error("failed to start tools directory watcher: {0}")]
    Watch(#[from] notify::Error),
}

fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

fn content_hash(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hasher.finalize().iter().map(|b| format!("{b:02x}")).collect())
}

/// Scan a directory for regular files whose stem is a valid identifier,
/// rejecting (and logging) the second file claiming an already-used stem.
fn discover_namespace_files(tools_dir: &Path) -> std::io::Result<Vec<(String, PathBuf)>> {
    let entries = std::fs::read_dir(tools_dir)?;
    let mut claimed: HashMap<String, PathBuf> = HashMap::new();
    let mut accepted = Vec::new();
    for entry in entries {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = Namespace::name_for_path(&path) else { continue };
        if let Some(first) = claimed.get(&name) {
            warn!(namespace = %name, kept = %first.display(), rejected = %path.display(), "duplicate namespace stem, rejecting second file");
            continue;
        }
        claimed.insert(name.clone(), path.clone());
        accepted.push((name, path));
    }
    Ok(accepted)
}

struct Slot {
    meta: Mutex<Namespace>,
    active: RwLock<Option<WorkerHandle>>,
}

/// Owns the namespace catalog and drives its lifecycle: startup scan,
/// filesystem watch, and applying supervisor-reported restart outcomes.
pub struct Registry {
    tools_dir: PathBuf,
    supervisor: Arc<Supervisor>,
    transport: Arc<WorkerTransport>,
    settings: Arc<Settings>,
    namespaces: Mutex<HashMap<String, Arc<Slot>>>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    updates_tx: broadcast::Sender<Vec<FunctionDescriptor>>,
}

impl Registry {
    pub fn new(tools_dir: PathBuf, supervisor: Arc<Supervisor>, transport: Arc<WorkerTransport>, settings: Arc<Settings>) -> Arc<Self> {
        let (updates_tx, _) = broadcast::channel(64);
        Arc::new(Self {
            tools_dir,
            supervisor,
            transport,
            settings,
            namespaces: Mutex::new(HashMap::new()),
            watcher: Mutex::new(None),
            updates_tx,
        })
    }

    /// Scan the tools directory, spawn a worker per valid namespace file,
    /// then start the filesystem watcher and the two background consumers
    /// that apply the supervisor's restart/loss outcomes.
    pub async fn start(self: &Arc<Self>) -> Result<(), RegistryError> {
        self.scan().await?;
        self.start_watcher()?;
        self.spawn_restart_consumer();
        self.spawn_lost_consumer();
        Ok(())
    }

    async fn scan(self: &Arc<Self>) -> Result<(), RegistryError> {
        let to_activate = discover_namespace_files(&self.tools_dir).map_err(RegistryError::ToolsDirUnreadable)?;
        for (name, path) in to_activate {
            self.activate_namespace(name, path).await;
        }
        Ok(())
    }

    async fn activate_namespace(self: &Arc<Self>, name: String, path: PathBuf) -> bool {
        let hash = match content_hash(&path) {
            Ok(h) => h,
            Err(err) => {
                warn!(namespace = %name, error = %err, "failed to hash namespace source, skipping");
                return false;
            }
        };
        match self.supervisor.activate(&name, path.clone()).await {
            Ok((handle, functions)) => {
                let namespace = Namespace {
                    name: name.clone(),
                    source_path: path,
                    content_hash: hash,
                    last_load_epoch_ms: epoch_ms(),
                    functions,
                };
                self.namespaces
                    .lock()
                    .insert(name.clone(), Arc::new(Slot { meta: Mutex::new(namespace), active: RwLock::new(Some(handle)) }));
                info!(namespace = %name, "namespace loaded");
                self.broadcast_catalog();
                true
            }
            Err(err) => {
                warn!(namespace = %name, error = %err, "namespace failed to load, marked broken");
                false
            }
        }
    }

    fn start_watcher(self: &Arc<Self>) -> Result<(), RegistryError> {
        let (tx, rx) = mpsc::unbounded_channel::<PathBuf>();
        let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
            if let Ok(event) = res {
                for path in event.paths {
                    let _ = tx.send(path);
                }
            }
        })?;
        watcher.watch(&self.tools_dir, RecursiveMode::NonRecursive)?;
        *self.watcher.lock() = Some(watcher);

        let this = Arc::clone(self);
        tokio::spawn(async move { this.debounce_loop(rx).await });
        Ok(())
    }

    async fn debounce_loop(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<PathBuf>) {
        let mut dirty: std::collections::HashSet<PathBuf> = std::collections::HashSet::new();
        loop {
            tokio::select! {
                maybe_path = rx.recv() => {
                    match maybe_path {
                        Some(path) => { dirty.insert(path); }
                        None => break,
                    }
                }
                _ = tokio::time::sleep(self.settings.reload_debounce), if !dirty.is_empty() => {
                    for path in std::mem::take(&mut dirty) {
                        self.handle_path_change(&path).await;
                    }
                }
            }
        }
    }

    async fn handle_path_change(self: &Arc<Self>, path: &Path) {
        let Some(name) = Namespace::name_for_path(path) else { return };

        if !path.is_file() {
            self.remove_namespace(&name);
            return;
        }

        let hash = match content_hash(path) {
            Ok(h) => h,
            Err(err) => {
                warn!(namespace = %name, error = %err, "failed to hash namespace source on change, skipping");
                return;
            }
        };

        let existing = self.namespaces.lock().get(&name).cloned();
        match existing {
            None => {
                self.activate_namespace(name, path.to_path_buf()).await;
            }
            Some(slot) => {
                if slot.meta.lock().content_hash == hash {
                    return;
                }
                self.reload_namespace(&name, slot, path.to_path_buf(), hash).await;
            }
        }
    }

    async fn reload_namespace(self: &Arc<Self>, name: &str, slot: Arc<Slot>, path: PathBuf, hash: String) {
        let Some(old_handle) = slot.active.read().clone() else { return };
        match self.supervisor.reload(name, path.clone(), old_handle).await {
            Ok((handle, functions)) => {
                {
                    let mut meta = slot.meta.lock();
                    meta.source_path = path;
                    meta.content_hash = hash;
                    meta.last_load_epoch_ms = epoch_ms();
                    meta.functions = functions;
                }
                *slot.active.write() = Some(handle);
                info!(namespace = %name, "namespace reloaded");
                self.broadcast_catalog();
            }
            Err(err) => {
                warn!(namespace = %name, error = %err, "reload failed, namespace marked broken");
                self.namespaces.lock().remove(name);
                self.broadcast_catalog();
            }
        }
    }

    fn remove_namespace(self: &Arc<Self>, name: &str) {
        let Some(slot) = self.namespaces.lock().remove(name) else { return };
        if let Some(handle) = slot.active.read().clone() {
            self.supervisor.retire(handle);
        }
        info!(namespace = %name, "namespace source removed");
        self.broadcast_catalog();
    }

    fn spawn_restart_consumer(self: &Arc<Self>) {
        let mut rx = self.supervisor.take_restart_events();
        let this = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(outcome) = rx.recv().await {
                match outcome {
                    RestartOutcome::Restarted { namespace, handle, functions } => this.apply_restart(&namespace, handle, functions),
                    RestartOutcome::Broken { namespace } => {
                        warn!(%namespace, "namespace exceeded restart threshold, marked broken");
                        this.namespaces.lock().remove(&namespace);
                        this.broadcast_catalog();
                    }
                }
            }
        });
    }

    fn apply_restart(self: &Arc<Self>, namespace: &str, handle: WorkerHandle, functions: Vec<FunctionDescriptor>) {
        let Some(slot) = self.namespaces.lock().get(namespace).cloned() else { return };
        {
            let mut meta = slot.meta.lock();
            meta.functions = functions;
            meta.last_load_epoch_ms = epoch_ms();
        }
        *slot.active.write() = Some(handle);
        info!(%namespace, "worker restarted after crash");
        self.broadcast_catalog();
    }

    fn spawn_lost_consumer(self: &Arc<Self>) {
        let mut rx = self.transport.take_lost_events();
        let supervisor = Arc::clone(&self.supervisor);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                warn!(namespace = %event.namespace, worker_id = %event.worker_id, reason = %event.reason, "worker lost");
                supervisor.handle_worker_lost(&event.namespace, event.worker_id).await;
            }
        });
    }

    /// Look up the active worker handle for a namespace, or `None` if the
    /// namespace is absent or broken.
    pub fn lookup(&self, namespace: &str) -> Option<WorkerHandle> {
        self.namespaces.lock().get(namespace).and_then(|slot| slot.active.read().clone())
    }

    pub fn has_function(&self, namespace: &str, function: &str) -> bool {
        self.namespaces.lock().get(namespace).is_some_and(|slot| slot.meta.lock().has_function(function))
    }

    /// The current catalog across every live namespace, as sent in
    /// `welcome`/`functions_updated` frames.
    pub fn catalog(&self) -> Vec<FunctionDescriptor> {
        self.namespaces.lock().values().flat_map(|slot| slot.meta.lock().functions.clone()).collect()
    }

    /// Names of every currently live namespace, for the HTTP surface's
    /// namespace-listing route.
    pub fn namespace_names(&self) -> Vec<String> {
        self.namespaces.lock().keys().cloned().collect()
    }

    /// The function catalog for one namespace, or `None` if it isn't live.
    pub fn functions_for(&self, namespace: &str) -> Option<Vec<FunctionDescriptor>> {
        self.namespaces.lock().get(namespace).map(|slot| slot.meta.lock().functions.clone())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Vec<FunctionDescriptor>> {
        self.updates_tx.subscribe()
    }

    fn broadcast_catalog(&self) {
        let _ = self.updates_tx.send(self.catalog());
    }

    /// All currently active worker handles, for broker shutdown.
    pub fn active_handles(&self) -> Vec<WorkerHandle> {
        self.namespaces.lock().values().filter_map(|slot| slot.active.read().clone()).collect()
    }

    /// Insert a namespace directly, bypassing `activate_namespace`'s
    /// supervisor round trip. Lets other modules' tests exercise read paths
    /// against a registry without spawning a real worker.
    #[cfg(test)]
    pub(crate) fn insert_test_namespace(&self, name: &str, functions: Vec<FunctionDescriptor>, active: Option<WorkerHandle>) {
        let namespace = Namespace {
            name: name.to_string(),
            source_path: PathBuf::from(name),
            content_hash: "test".to_string(),
            last_load_epoch_ms: 0,
            functions,
        };
        self.namespaces.lock().insert(name.to_string(), Arc::new(Slot { meta: Mutex::new(namespace), active: RwLock::new(active) }));
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
