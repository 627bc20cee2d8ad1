// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::path::PathBuf;

fn app(id: &str) -> Application {
    Application {
        id: id.to_string(),
        code_dir: PathBuf::from("/apps").join(id),
        main_file: "app".into(),
        runtime_name: "native".into(),
        runtime_parameters: Default::default(),
        supports_application_interface: false,
        built_in: true,
        alias_of: None,
        installation_report: None,
    }
}

fn alias(id: &str, base: &str) -> Application {
    let mut a = app(id);
    a.alias_of = Some(base.to_string());
    a
}

fn open(db: ApplicationDb, apps: Vec<Application>) -> ApplicationRegistry {
    ApplicationRegistry::open_or_recreate(db, true, move || Ok(apps)).unwrap()
}

#[test]
fn recreate_scans_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let db = ApplicationDb::new(dir.path().join("apps.db"));
    let registry = open(db.clone(), vec![app("com.x.a")]);

    assert!(registry.lookup("com.x.a").is_some());
    // persisted: a fresh open without recreate sees the same set
    let reopened =
        ApplicationRegistry::open_or_recreate(db, false, || panic!("must not rescan")).unwrap();
    assert_eq!(reopened.application_ids(), vec!["com.x.a"]);
}

#[test]
fn invalid_database_triggers_rescan() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("apps.db");
    std::fs::write(&path, b"garbage").unwrap();

    let registry =
        ApplicationRegistry::open_or_recreate(ApplicationDb::new(&path), false, || {
            Ok(vec![app("com.x.a")])
        })
        .unwrap();
    assert_eq!(registry.application_ids(), vec!["com.x.a"]);
}

#[test]
fn alias_lookup_is_transparent() {
    let dir = tempfile::tempdir().unwrap();
    let db = ApplicationDb::new(dir.path().join("apps.db"));
    let registry = open(db, vec![app("com.x.a"), alias("com.x.a@ru", "com.x.a")]);

    let entry = registry.lookup("com.x.a@ru").unwrap();
    assert_eq!(entry.alias_of.as_deref(), Some("com.x.a"));
    assert_eq!(registry.resolve_base("com.x.a@ru").unwrap().id, "com.x.a");
}

#[test]
fn alias_without_base_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let db = ApplicationDb::new(dir.path().join("apps.db"));
    let registry = open(db, vec![alias("com.x.gone@ru", "com.x.gone")]);
    assert!(registry.lookup("com.x.gone@ru").is_none());
}

#[test]
fn duplicate_ids_keep_first() {
    let dir = tempfile::tempdir().unwrap();
    let db = ApplicationDb::new(dir.path().join("apps.db"));
    let mut second = app("com.x.a");
    second.main_file = "other".into();
    let registry = open(db, vec![app("com.x.a"), second]);
    assert_eq!(registry.lookup("com.x.a").unwrap().main_file, "app");
}

#[test]
fn remove_takes_aliases_along() {
    let dir = tempfile::tempdir().unwrap();
    let db = ApplicationDb::new(dir.path().join("apps.db"));
    let mut registry = open(
        db,
        vec![app("com.x.a"), alias("com.x.a@ru", "com.x.a"), app("com.x.b")],
    );

    registry.remove("com.x.a").unwrap();
    assert!(registry.lookup("com.x.a").is_none());
    assert!(registry.lookup("com.x.a@ru").is_none());
    assert!(registry.lookup("com.x.b").is_some());
}

#[test]
fn insert_replaces_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let db = ApplicationDb::new(dir.path().join("apps.db"));
    let mut registry = open(db.clone(), vec![app("com.x.a")]);

    let mut update = app("com.x.a");
    update.main_file = "v2".into();
    registry.insert(update).unwrap();
    assert_eq!(registry.lookup("com.x.a").unwrap().main_file, "v2");

    let reopened =
        ApplicationRegistry::open_or_recreate(db, false, || panic!("must not rescan")).unwrap();
    assert_eq!(reopened.lookup("com.x.a").unwrap().main_file, "v2");
}
