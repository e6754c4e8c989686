// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The RPC broker and worker supervision subsystem: correlation table,
//! worker transport, worker supervisor, namespace registry, client
//! gateway, and the HTTP surface, wired together by [`app`].

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod app;
pub mod config;
pub mod correlation;
pub mod execution_history;
pub mod gateway;
pub mod http;
pub mod registry;
pub mod supervisor;
pub mod types_gen;
pub mod worker_transport;

pub use app::{ctrl_c_shutdown, App, AppError};
pub use config::{CliOverrides, ConfigError, Settings};
pub use correlation::{CorrelationError, CorrelationTable};
pub use execution_history::{ExecutionHistory, ExecutionRecord};
pub use registry::{Registry, RegistryError};
pub use supervisor::{RestartOutcome, Supervisor, SupervisorError};
pub use worker_transport::{ReadyWorker, TransportError, WorkerHandle, WorkerTransport};
