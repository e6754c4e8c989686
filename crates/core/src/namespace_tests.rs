// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::path::PathBuf;

#[test]
fn name_for_path_uses_file_stem() {
    let path = PathBuf::from("/tools/kv.ts");
    assert_eq!(Namespace::name_for_path(&path), Some("kv".to_string()));
}

#[test]
fn name_for_path_rejects_non_identifier_stem() {
    let path = PathBuf::from("/tools/my-tool.ts");
    assert_eq!(Namespace::name_for_path(&path), None);
}

#[test]
fn name_for_path_rejects_leading_digit() {
    let path = PathBuf::from("/tools/2kv.ts");
    assert_eq!(Namespace::name_for_path(&path), None);
}

#[test]
fn is_valid_identifier_accepts_underscore_prefix() {
    assert!(is_valid_identifier("_kv"));
    assert!(is_valid_identifier("kv_store"));
    assert!(!is_valid_identifier(""));
    assert!(!is_valid_identifier("kv store"));
    assert!(!is_valid_identifier("kv.store"));
}

#[test]
fn has_function_checks_catalog() {
    let ns = Namespace {
        name: "kv".into(),
        source_path: PathBuf::from("/tools/kv.ts"),
        content_hash: "abc".into(),
        last_load_epoch_ms: 0,
        functions: vec![FunctionDescriptor {
            name: "set".into(),
            namespace: "kv".into(),
            schema: serde_json::Value::Null,
        }],
    };
    assert!(ns.has_function("set"));
    assert!(!ns.has_function("get"));
}
