// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The HTTP surface for the UI: a thin read layer over the registry
//! plus a proxy into the execution surface. Grounded on the JSON
//! `axum::Router` + `State` handler shape in
//! `golemcloud-golem/cli/golem-cli/src/mcp/router.rs`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use relay_sandbox::{ExecutionSurface, ScriptRequest};

use crate::execution_history::{ExecutionHistory, ExecutionRecord};
use crate::registry::Registry;
use crate::types_gen;

#[derive(Clone)]
pub struct HttpState {
    pub registry: Arc<Registry>,
    pub surface: Arc<ExecutionSurface>,
    pub history: Arc<ExecutionHistory>,
}

/// The `axum::Router` fragment serving the read-only UI endpoints plus the
/// script-submission proxy.
pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/namespaces", get(list_namespaces))
        .route("/types/:namespace", get(namespace_types))
        .route("/scripts", post(submit_script))
        .route("/executions", get(execution_history))
        .with_state(state)
}

async fn list_namespaces(State(state): State<HttpState>) -> Json<Vec<String>> {
    let mut names = state.registry.namespace_names();
    names.sort();
    Json(names)
}

async fn namespace_types(State(state): State<HttpState>, Path(namespace): Path<String>) -> Response {
    match state.registry.functions_for(&namespace) {
        Some(functions) => types_gen::render_namespace(&namespace, &functions).into_response(),
        None => (StatusCode::NOT_FOUND, format!("namespace {namespace} not found")).into_response(),
    }
}

async fn submit_script(State(state): State<HttpState>, Json(request): Json<ScriptRequest>) -> Response {
    match state.surface.execute(request.clone()).await {
        Ok(result) => {
            let record = state.history.record(request, result);
            Json(record).into_response()
        }
        Err(err) => (StatusCode::BAD_GATEWAY, err.to_string()).into_response(),
    }
}

async fn execution_history(State(state): State<HttpState>) -> Json<Vec<ExecutionRecord>> {
    Json(state.history.recent())
}
