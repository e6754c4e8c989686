// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::config::{CliOverrides, Settings};

fn test_settings() -> Arc<Settings> {
    Arc::new(
        Settings::load(CliOverrides { port: None, worker_port: None, tools_dir: Some(PathBuf::from("/tmp")), worker_runner: None })
            .unwrap(),
    )
}

fn make_registry() -> Arc<Registry> {
    let settings = test_settings();
    let transport = WorkerTransport::new();
    let supervisor = Supervisor::new(Arc::clone(&transport), Arc::clone(&settings));
    Registry::new(PathBuf::from("/tmp"), supervisor, transport, settings)
}

fn fd(namespace: &str, name: &str) -> FunctionDescriptor {
    FunctionDescriptor { name: name.to_string(), namespace: namespace.to_string(), schema: serde_json::Value::Null }
}

fn insert_slot(registry: &Registry, name: &str, functions: Vec<FunctionDescriptor>) {
    let namespace = Namespace {
        name: name.to_string(),
        source_path: PathBuf::from(name),
        content_hash: "deadbeef".to_string(),
        last_load_epoch_ms: 0,
        functions,
    };
    registry.namespaces.lock().insert(name.to_string(), Arc::new(Slot { meta: Mutex::new(namespace), active: RwLock::new(None) }));
}

#[test]
fn catalog_aggregates_functions_across_namespaces() {
    let registry = make_registry();
    insert_slot(&registry, "kv", vec![fd("kv", "set"), fd("kv", "get")]);
    insert_slot(&registry, "http", vec![fd("http", "fetch")]);

    let mut names: Vec<_> = registry.catalog().into_iter().map(|f| f.name).collect();
    names.sort();
    assert_eq!(names, vec!["fetch", "get", "set"]);
}

#[test]
fn namespace_names_lists_every_live_namespace() {
    let registry = make_registry();
    insert_slot(&registry, "kv", vec![fd("kv", "set")]);
    insert_slot(&registry, "http", vec![fd("http", "fetch")]);

    let mut names = registry.namespace_names();
    names.sort();
    assert_eq!(names, vec!["http", "kv"]);
}

#[test]
fn functions_for_returns_none_for_unknown_namespace() {
    let registry = make_registry();
    assert!(registry.functions_for("kv").is_none());
}

#[test]
fn functions_for_returns_only_that_namespaces_catalog() {
    let registry = make_registry();
    insert_slot(&registry, "kv", vec![fd("kv", "set"), fd("kv", "get")]);
    insert_slot(&registry, "http", vec![fd("http", "fetch")]);

    let functions = registry.functions_for("kv").unwrap();
    let mut names: Vec<_> = functions.into_iter().map(|f| f.name).collect();
    names.sort();
    assert_eq!(names, vec!["get", "set"]);
}

#[test]
fn has_function_checks_only_named_namespace() {
    let registry = make_registry();
    insert_slot(&registry, "kv", vec![fd("kv", "set")]);

    assert!(registry.has_function("kv", "set"));
    assert!(!registry.has_function("kv", "nope"));
    assert!(!registry.has_function("other", "set"));
}

#[test]
fn lookup_returns_none_for_unknown_namespace() {
    let registry = make_registry();
    assert!(registry.lookup("kv").is_none());
}

#[test]
fn subscribe_receives_catalog_snapshot_on_broadcast() {
    let registry = make_registry();
    let mut rx = registry.subscribe();
    insert_slot(&registry, "kv", vec![fd("kv", "set")]);

    registry.broadcast_catalog();

    let received = rx.try_recv().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].name, "set");
}

#[test]
fn discover_rejects_duplicate_stem_keeping_one() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("kv.js"), "a").unwrap();
    std::fs::write(dir.path().join("kv.py"), "b").unwrap();

    let found = discover_namespace_files(dir.path()).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].0, "kv");
}

#[test]
fn discover_skips_invalid_identifier_filenames() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("123bad.js"), "a").unwrap();
    std::fs::write(dir.path().join("kv.js"), "a").unwrap();

    let found = discover_namespace_files(dir.path()).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].0, "kv");
}

#[test]
fn discover_ignores_subdirectories() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("kv")).unwrap();
    std::fs::write(dir.path().join("http.js"), "a").unwrap();

    let found = discover_namespace_files(dir.path()).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].0, "http");
}

#[test]
fn discover_errors_on_unreadable_dir() {
    let result = discover_namespace_files(Path::new("/definitely/does/not/exist/here"));
    assert!(result.is_err());
}

#[test]
fn content_hash_is_stable_for_identical_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.js");
    std::fs::write(&path, "same content").unwrap();

    assert_eq!(content_hash(&path).unwrap(), content_hash(&path).unwrap());
}

#[test]
fn content_hash_differs_for_different_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.js");

    std::fs::write(&path, "version one").unwrap();
    let first = content_hash(&path).unwrap();
    std::fs::write(&path, "version two").unwrap();
    let second = content_hash(&path).unwrap();

    assert_ne!(first, second);
}
