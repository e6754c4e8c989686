// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process wiring: builds every component from [`Settings`], serves both
//! WebSocket edges plus the HTTP surface, and drives graceful shutdown.
//! Broker shutdown cancels all pending calls with `shutting_down`.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::WebSocketUpgrade;
use axum::routing::get;
use axum::Router;
use relay_sandbox::ExecutionSurface;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::Settings;
use crate::correlation::CorrelationTable;
use crate::execution_history::ExecutionHistory;
use crate::gateway::Gateway;
use crate::http::{self, HttpState};
use crate::registry::{Registry, RegistryError};
use crate::supervisor::Supervisor;
use crate::worker_transport::WorkerTransport;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to start namespace registry: {0}")]
    Registry(#[from] RegistryError),
    #[error("failed to bind {what} port {port}: {source}")]
    Bind { what: &'static str, port: u16, source: std::io::Error },
}

/// Sweep interval for the correlation table's timeout enforcement.
/// Coarser than any reasonable per-call deadline, so it never meaningfully
/// delays a timeout rejection.
const SWEEP_INTERVAL: Duration = Duration::from_millis(200);

/// Every live component, wired together and ready to serve.
pub struct App {
    settings: Arc<Settings>,
    correlation: Arc<CorrelationTable>,
    transport: Arc<WorkerTransport>,
    supervisor: Arc<Supervisor>,
    registry: Arc<Registry>,
    gateway: Arc<Gateway>,
    surface: Arc<ExecutionSurface>,
    history: Arc<ExecutionHistory>,
}

impl App {
    /// Build every component and bring the namespace registry up (startup
    /// scan plus filesystem watcher). Does not yet bind a socket.
    pub async fn bootstrap(settings: Settings) -> Result<Self, AppError> {
        let settings = Arc::new(settings);
        let correlation = Arc::new(CorrelationTable::new());
        let transport = WorkerTransport::new();
        let supervisor = Supervisor::new(Arc::clone(&transport), Arc::clone(&settings));
        let registry = Registry::new(settings.tools_dir.clone(), Arc::clone(&supervisor), Arc::clone(&transport), Arc::clone(&settings));
        registry.start().await?;

        let gateway = Gateway::new(Arc::clone(&correlation), Arc::clone(&registry), Arc::clone(&settings));
        let gateway_url = format!("ws://127.0.0.1:{}/ws", settings.port);
        let surface = Arc::new(ExecutionSurface::new(gateway_url, Arc::new(relay_sandbox::MockScriptRunner::default())));
        let history = Arc::new(ExecutionHistory::new());

        Ok(Self { settings, correlation, transport, supervisor, registry, gateway, surface, history })
    }

    /// Serve both WebSocket edges and the HTTP surface until `shutdown`
    /// resolves, then drain in-flight work.
    pub async fn run(self, shutdown: impl std::future::Future<Output = ()>) -> Result<(), AppError> {
        let client_router = self
            .gateway
            .router()
            .merge(http::router(HttpState { registry: Arc::clone(&self.registry), surface: Arc::clone(&self.surface), history: Arc::clone(&self.history) }));

        let worker_transport = Arc::clone(&self.transport);
        let worker_correlation = Arc::clone(&self.correlation);
        let worker_router = Router::new().route(
            "/worker",
            get(move |ws: WebSocketUpgrade| {
                let transport = Arc::clone(&worker_transport);
                let correlation = Arc::clone(&worker_correlation);
                async move { ws.on_upgrade(move |socket| async move { transport.serve_connection(socket, correlation).await }) }
            }),
        );

        let client_listener = TcpListener::bind(("0.0.0.0", self.settings.port))
            .await
            .map_err(|source| AppError::Bind { what: "client", port: self.settings.port, source })?;
        let worker_listener = TcpListener::bind(("0.0.0.0", self.settings.worker_port))
            .await
            .map_err(|source| AppError::Bind { what: "worker", port: self.settings.worker_port, source })?;

        info!(port = self.settings.port, worker_port = self.settings.worker_port, "broker listening");

        let sweep_correlation = Arc::clone(&self.correlation);
        let sweep_handle = tokio::spawn(async move {
            let clock = relay_core::SystemClock;
            loop {
                tokio::time::sleep(SWEEP_INTERVAL).await;
                sweep_correlation.sweep_expired(&clock);
            }
        });

        tokio::pin!(shutdown);
        tokio::select! {
            result = axum::serve(client_listener, client_router.into_make_service()) => {
                if let Err(err) = result {
                    tracing::error!(error = %err, "client listener exited");
                }
            }
            result = axum::serve(worker_listener, worker_router.into_make_service()) => {
                if let Err(err) = result {
                    tracing::error!(error = %err, "worker listener exited");
                }
            }
            _ = &mut shutdown => {}
        }

        sweep_handle.abort();
        self.shutdown().await;
        Ok(())
    }

    /// Broker shutdown: ask every worker to shut down
    /// cleanly, then reject whatever is still pending with `shutting_down`.
    async fn shutdown(&self) {
        info!("graceful shutdown started");
        self.supervisor.shutdown_all(self.registry.active_handles()).await;
        let rejected = self.correlation.cancel_all();
        info!(rejected = rejected.len(), "graceful shutdown finished");
    }
}

/// Resolves on Ctrl-C (or immediately if the signal handler can't be
/// installed, which should never happen in practice).
pub async fn ctrl_c_shutdown() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to install ctrl-c handler, shutting down anyway");
    }
}
