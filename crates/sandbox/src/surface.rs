// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The execution surface itself: connects a fresh [`RpcClient`] for each
//! submitted script, runs it through a [`ScriptRunner`] under a wall-clock
//! budget, and returns `{result, execution:{duration_ms, success,
//! timestamp}}`.

use std::sync::Arc;
use std::time::Duration;

use relay_core::{Clock, SystemClock};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rpc_client::{ConnectError, RpcClient};
use crate::runner::{RunnerError, ScriptOutcome, ScriptRequest, ScriptRunner};

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error(transparent)]
    Connect(#[from] ConnectError),
}

/// Timing and outcome metadata returned alongside every execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionMeta {
    pub duration_ms: u64,
    pub success: bool,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub result: serde_json::Value,
    pub stdout: String,
    pub stderr: String,
    pub execution: ExecutionMeta,
}

/// The execution surface, wired with a concrete runner and the gateway's
/// own `/ws` URL. A script is usually an in-process collaborator of the
/// broker, but this crate still dials the public endpoint like any other
/// client rather than reaching into the gateway's internals.
pub struct ExecutionSurface<C: Clock = SystemClock> {
    gateway_url: String,
    runner: Arc<dyn ScriptRunner>,
    timeout: Duration,
    clock: C,
}

impl ExecutionSurface<SystemClock> {
    pub fn new(gateway_url: impl Into<String>, runner: Arc<dyn ScriptRunner>) -> Self {
        Self::with_clock(gateway_url, runner, Duration::from_secs(10), SystemClock)
    }
}

impl<C: Clock> ExecutionSurface<C> {
    pub fn with_clock(gateway_url: impl Into<String>, runner: Arc<dyn ScriptRunner>, timeout: Duration, clock: C) -> Self {
        Self { gateway_url: gateway_url.into(), runner, timeout, clock }
    }

    /// Run one script to completion, or until the wall-clock budget
    /// expires.
    pub async fn execute(&self, request: ScriptRequest) -> Result<ExecutionResult, SurfaceError> {
        let rpc = RpcClient::connect(&self.gateway_url).await?;
        let started = self.clock.now();
        let timestamp = self.clock.epoch_ms();

        let outcome = match tokio::time::timeout(self.timeout, self.runner.run(&request, rpc)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(RunnerError::Failed(message))) => {
                ScriptOutcome { result: serde_json::Value::Null, stdout: String::new(), stderr: message, success: false }
            }
            Err(_) => ScriptOutcome {
                result: serde_json::Value::Null,
                stdout: String::new(),
                stderr: format!("script exceeded its {}ms wall-clock budget", self.timeout.as_millis()),
                success: false,
            },
        };

        let duration_ms = self.clock.now().saturating_duration_since(started).as_millis() as u64;
        Ok(ExecutionResult {
            result: outcome.result,
            stdout: outcome.stdout,
            stderr: outcome.stderr,
            execution: ExecutionMeta { duration_ms, success: outcome.success, timestamp },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::MockScriptRunner;
    use relay_core::FakeClock;

    #[test]
    fn execution_meta_serializes_with_expected_fields() {
        let meta = ExecutionMeta { duration_ms: 5, success: true, timestamp: 1_000 };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["duration_ms"], 5);
        assert_eq!(json["success"], true);
        assert_eq!(json["timestamp"], 1_000);
    }

    #[tokio::test]
    async fn surface_rejects_when_gateway_is_unreachable() {
        let clock = FakeClock::new();
        let surface = ExecutionSurface::with_clock(
            "ws://127.0.0.1:1/ws",
            Arc::new(MockScriptRunner::default()),
            Duration::from_millis(200),
            clock,
        );
        let err = surface.execute(ScriptRequest::new("echo hi")).await.unwrap_err();
        assert!(matches!(err, SurfaceError::Connect(_)));
    }
}
