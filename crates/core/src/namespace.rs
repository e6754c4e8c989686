// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Namespace and function-catalog data model.
//!
//! A namespace is a named bundle of exported functions loaded from a single
//! source file. The registry is the only writer of [`Namespace`] values;
//! everything else treats them as read-only snapshots.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One exported function within a namespace.
///
/// The parameter schema is opaque to the broker — it is forwarded to clients
/// verbatim in `welcome`/`functions_updated` frames and never inspected
/// beyond existence checks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionDescriptor {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub schema: serde_json::Value,
}

/// A loaded namespace: source file, content identity, and its catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Namespace {
    pub name: String,
    pub source_path: PathBuf,
    pub content_hash: String,
    pub last_load_epoch_ms: u64,
    pub functions: Vec<FunctionDescriptor>,
}

impl Namespace {
    /// Derive the namespace name from a source file path — the file stem.
    ///
    /// Returns `None` when the stem is not a valid identifier (the file is
    /// skipped by the registry rather than rejected wholesale).
    pub fn name_for_path(path: &Path) -> Option<String> {
        let stem = path.file_stem()?.to_str()?;
        is_valid_identifier(stem).then(|| stem.to_string())
    }

    pub fn has_function(&self, function: &str) -> bool {
        self.functions.iter().any(|f| f.name == function)
    }
}

/// Identifiers must start with a letter or underscore and contain only
/// ASCII alphanumerics and underscores — mirrors what a practical namespace
/// loader can safely turn into a module/file name.
pub fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    !s.is_empty() && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
#[path = "namespace_tests.rs"]
mod tests;
