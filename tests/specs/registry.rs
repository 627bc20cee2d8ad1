// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry laws: `scan ∘ write` identity and alias resolution.

use crate::prelude::*;
use am_storage::{scan_tree, ApplicationDb, ApplicationRegistry, ScanContext, ScanKind};
use std::collections::BTreeSet;

#[test]
fn scan_then_write_then_open_is_identity() {
    let dir = tempfile::tempdir().unwrap();
    let tree = dir.path().join("builtin");
    write_app(&tree, "com.x.a", "native");
    write_app(&tree, "com.x.b", "qml-inprocess");
    write_app(&tree, "org.demo.c", "native");

    let registered = registered_runtimes();
    let quick_launch = quick_launch_runtimes();
    let ctx = ScanContext {
        registered_runtimes: &registered,
        quick_launch_runtimes: &quick_launch,
        locations: &[],
    };
    let scanned = scan_tree(&tree, ScanKind::BuiltIn, &ctx).unwrap();
    let scanned_ids: BTreeSet<String> = scanned.iter().map(|a| a.id.clone()).collect();

    let db = ApplicationDb::new(dir.path().join("apps.db"));
    db.write(&scanned).unwrap();
    let reloaded = db.read().unwrap();
    let reloaded_ids: BTreeSet<String> = reloaded.iter().map(|a| a.id.clone()).collect();

    assert_eq!(scanned_ids, reloaded_ids);
    // field-level identity too, ignoring ordering
    for app in &scanned {
        let twin = reloaded.iter().find(|a| a.id == app.id).unwrap();
        assert_eq!(twin, app);
    }
}

#[test]
fn alias_lookup_returns_merged_parameters() {
    let dir = tempfile::tempdir().unwrap();
    let tree = dir.path().join("builtin");
    let app_dir = write_app(&tree, "com.x.a", "native");
    std::fs::write(
        app_dir.join("info.yaml"),
        "formatType: am-application\nformatVersion: 1\n---\n\
         id: com.x.a\ncode: app.bin\nruntime: native\n\
         runtimeParameters:\n  theme: default\n  scale: 1\n",
    )
    .unwrap();
    std::fs::write(
        app_dir.join("info-ru.yaml"),
        "formatType: am-application-alias\nformatVersion: 1\n---\n\
         id: com.x.a@ru\nruntimeParameters:\n  theme: ru\n",
    )
    .unwrap();

    let registered = registered_runtimes();
    let quick_launch = quick_launch_runtimes();
    let db = ApplicationDb::new(dir.path().join("apps.db"));
    let registry = ApplicationRegistry::open_or_recreate(db, true, || {
        let ctx = ScanContext {
            registered_runtimes: &registered,
            quick_launch_runtimes: &quick_launch,
            locations: &[],
        };
        scan_tree(&tree, ScanKind::BuiltIn, &ctx)
    })
    .unwrap();

    let alias = registry.lookup("com.x.a@ru").unwrap();
    assert_eq!(alias.alias_of.as_deref(), Some("com.x.a"));
    // alias override wins, base parameters are retained
    assert_eq!(alias.runtime_parameters["theme"], "ru");
    assert_eq!(alias.runtime_parameters["scale"], 1);

    let base = registry.resolve_base("com.x.a@ru").unwrap();
    assert_eq!(base.id, "com.x.a");
    assert_eq!(base.runtime_parameters["theme"], "default");
}

#[test]
fn invalid_database_recovers_from_scan() {
    let dir = tempfile::tempdir().unwrap();
    let tree = dir.path().join("builtin");
    write_app(&tree, "com.x.a", "native");

    let db_path = dir.path().join("apps.db");
    std::fs::write(&db_path, b"definitely not a database").unwrap();

    let registered = registered_runtimes();
    let quick_launch = quick_launch_runtimes();
    let registry =
        ApplicationRegistry::open_or_recreate(ApplicationDb::new(&db_path), false, || {
            let ctx = ScanContext {
                registered_runtimes: &registered,
                quick_launch_runtimes: &quick_launch,
                locations: &[],
            };
            scan_tree(&tree, ScanKind::BuiltIn, &ctx)
        })
        .unwrap();
    assert_eq!(registry.application_ids(), vec!["com.x.a"]);

    // and the recreated database is valid from here on
    let reloaded = ApplicationDb::new(&db_path).read().unwrap();
    assert_eq!(reloaded.len(), 1);
}
