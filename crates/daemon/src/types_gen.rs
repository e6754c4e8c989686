// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Minimal type-definition rendering for the HTTP surface's "fetch
//! generated type definitions" route and the CLI's `--types` mode.
//!
//! A real on-disk type-definition generator is an external collaborator;
//! this only renders the interface the broker actually has — function
//! names grouped by namespace. Parameter schemas are opaque to the
//! broker, so every function's argument type is rendered as the same
//! generic shape rather than reflected field-by-field.

use relay_core::FunctionDescriptor;

/// Render one namespace's catalog as a `declare namespace` block, the
/// shape a script's ambient `rpc.<namespace>.<function>(args)` proxy
/// would be typed against.
pub fn render_namespace(namespace: &str, functions: &[FunctionDescriptor]) -> String {
    let mut out = format!("declare namespace {namespace} {{\n");
    for f in functions {
        out.push_str(&format!("  function {}(args: Record<string, unknown>): unknown;\n", f.name));
    }
    out.push_str("}\n");
    out
}
