// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The pluggable seam between the execution surface and an actual sandbox
//! runtime: one async trait, one config-ish request struct, one outcome
//! struct, swappable without touching the caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rpc_client::RpcClient;

/// A script body plus optional metadata, submitted for execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptRequest {
    pub body: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl ScriptRequest {
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into(), metadata: serde_json::Value::Null }
    }
}

/// What a runner produces before the surface wraps it with timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptOutcome {
    pub result: serde_json::Value,
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("script runner failed: {0}")]
    Failed(String),
}

/// The sandbox seam. A real implementation denies filesystem access,
/// permits outbound network, and enforces its own internal resource limits
/// in addition to the wall-clock budget the surface applies around the
/// whole call. This crate only specifies the contract; the sandbox itself
/// is an external collaborator.
#[async_trait]
pub trait ScriptRunner: Send + Sync + 'static {
    async fn run(&self, request: &ScriptRequest, rpc: RpcClient) -> Result<ScriptOutcome, RunnerError>;
}

/// An in-process stand-in used by `relay-daemon`'s integration tests and by
/// this crate's own tests, so neither depends on a real sandbox
/// implementation being present.
///
/// Interprets the script body as a tiny fixed grammar instead of running
/// anything: `"call <namespace> <function>"` issues one RPC call and
/// returns its result; anything else returns the body verbatim as the
/// result.
pub struct MockScriptRunner {
    pub call_timeout: std::time::Duration,
}

impl Default for MockScriptRunner {
    fn default() -> Self {
        Self { call_timeout: std::time::Duration::from_secs(10) }
    }
}

#[async_trait]
impl ScriptRunner for MockScriptRunner {
    async fn run(&self, request: &ScriptRequest, rpc: RpcClient) -> Result<ScriptOutcome, RunnerError> {
        let mut parts = request.body.splitn(3, ' ');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("call"), Some(namespace), Some(function)) => {
                match rpc.call(namespace, function, serde_json::Value::Null, self.call_timeout).await {
                    Ok(data) => Ok(ScriptOutcome { result: data, stdout: String::new(), stderr: String::new(), success: true }),
                    Err(err) => Ok(ScriptOutcome {
                        result: serde_json::Value::Null,
                        stdout: String::new(),
                        stderr: err.to_string(),
                        success: false,
                    }),
                }
            }
            _ => Ok(ScriptOutcome {
                result: serde_json::Value::String(request.body.clone()),
                stdout: request.body.clone(),
                stderr: String::new(),
                success: true,
            }),
        }
    }
}
