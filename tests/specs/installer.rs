// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Installer laws: cold install, install/remove round-trip, and restart
//! recovery.

use crate::prelude::*;
use am_daemon::event_bus;
use am_daemon::installer::{package, Installer, InstallerSetup, InstallerSignal};
use std::path::Path;
use std::time::Duration;

fn installer(base: &Path) -> Installer {
    let (bus, _reader) = event_bus::channel();
    Installer::new(
        InstallerSetup {
            locations: vec![internal_location(base)],
            manifest_dir: base.join("manifests"),
            image_mount_dir: base.join("image-mounts"),
            hardware_id: "spec-hw".into(),
            ca_certificate_files: vec![],
            allow_unsigned: true,
            uid_separation: None,
        },
        bus,
    )
    .unwrap()
}

fn build_package(base: &Path, id: &str) -> std::path::PathBuf {
    let src = base.join("pkg-src").join(id);
    write_app(&base.join("pkg-src"), id, "native");
    let out = base.join(format!("{id}.pkg"));
    package::create_package(&src, &out).unwrap();
    out
}

async fn run_install(installer: &Installer, package_path: std::path::PathBuf) {
    let mut signals = installer.subscribe();
    let task = installer
        .start_package_installation("internal-0", package_path)
        .unwrap();

    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match signals.recv().await.unwrap() {
                InstallerSignal::RequiresAcknowledge { task_id, .. } if task_id == task => {
                    installer.acknowledge_package_installation(&task).unwrap();
                }
                InstallerSignal::Finished { task_id } if task_id == task => break,
                InstallerSignal::Failed { message, .. } => panic!("install failed: {message}"),
                _ => {}
            }
        }
    })
    .await
    .unwrap();
}

async fn run_remove(installer: &Installer, id: &str) {
    let mut signals = installer.subscribe();
    let task = installer.remove_package(id, false, false, false).unwrap();
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match signals.recv().await.unwrap() {
                InstallerSignal::Finished { task_id } if task_id == task => break,
                InstallerSignal::Failed { message, .. } => panic!("remove failed: {message}"),
                _ => {}
            }
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn cold_install_produces_database_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let installer = installer(dir.path());
    let package_path = build_package(dir.path(), "com.x.a");

    run_install(&installer, package_path).await;

    assert!(dir.path().join("apps/com.x.a/app.bin").exists());
    let report =
        am_manifest::load_report(&dir.path().join("manifests/com.x.a/installation-report.yaml"))
            .unwrap();
    assert_eq!(report.application_id, "com.x.a");
    assert_eq!(report.installation_location_id, "internal-0");
    assert!(!report.is_signed());
}

#[tokio::test]
async fn install_then_remove_restores_the_location() {
    let dir = tempfile::tempdir().unwrap();
    let installer = installer(dir.path());
    let package_path = build_package(dir.path(), "com.x.a");

    // the location lock file is created on first use; prime it so the
    // before/after listings are comparable
    std::fs::write(dir.path().join("apps/.apps.lock"), b"").unwrap();
    let before_apps = tree_listing(&dir.path().join("apps"));
    let before_docs = tree_listing(&dir.path().join("docs"));
    let before_manifests = tree_listing(&dir.path().join("manifests"));

    run_install(&installer, package_path).await;
    assert_ne!(tree_listing(&dir.path().join("apps")), before_apps);

    run_remove(&installer, "com.x.a").await;
    assert_eq!(tree_listing(&dir.path().join("apps")), before_apps);
    assert_eq!(tree_listing(&dir.path().join("docs")), before_docs);
    assert_eq!(tree_listing(&dir.path().join("manifests")), before_manifests);
}

#[tokio::test]
async fn restart_recovery_keeps_the_pre_crash_set() {
    let dir = tempfile::tempdir().unwrap();
    let installer = installer(dir.path());
    run_install(&installer, build_package(dir.path(), "com.x.a")).await;

    // a manager killed mid-Applying leaves staging and an unreported dir
    std::fs::create_dir_all(dir.path().join("apps/com.x.b+")).unwrap();
    std::fs::write(dir.path().join("apps/com.x.b+/partial"), b"x").unwrap();
    std::fs::create_dir_all(dir.path().join("apps/com.x.c")).unwrap();

    // "restart": a fresh installer over the same state dir
    let restarted = installer_over(dir.path());
    restarted.cleanup_broken_installations().unwrap();

    // registry scan must list exactly the pre-crash set
    let registered = registered_runtimes();
    let quick_launch = quick_launch_runtimes();
    let ctx = am_storage::ScanContext {
        registered_runtimes: &registered,
        quick_launch_runtimes: &quick_launch,
        locations: &[],
    };
    let apps = am_storage::scan_tree(
        &dir.path().join("manifests"),
        am_storage::ScanKind::Installed,
        &ctx,
    )
    .unwrap();
    let ids: Vec<&str> = apps.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["com.x.a"]);
    assert!(!dir.path().join("apps/com.x.b+").exists());
    assert!(!dir.path().join("apps/com.x.c").exists());
}

fn installer_over(base: &Path) -> Installer {
    installer(base)
}

#[tokio::test]
async fn unacknowledged_task_waits_indefinitely() {
    let dir = tempfile::tempdir().unwrap();
    let installer = installer(dir.path());
    let package_path = build_package(dir.path(), "com.x.a");

    let mut signals = installer.subscribe();
    let task = installer
        .start_package_installation("internal-0", package_path)
        .unwrap();
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let InstallerSignal::RequiresAcknowledge { task_id, .. } =
                signals.recv().await.unwrap()
            {
                if task_id == task {
                    break;
                }
            }
        }
    })
    .await
    .unwrap();

    // no built-in timeout: still awaiting after a quiet period
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(
        installer.task_state(&task).unwrap().1,
        am_daemon::installer::TaskState::AwaitingAck
    );

    // cancel transitions to Failed and removes the staging directory
    installer.cancel_task(&task).unwrap();
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let InstallerSignal::Failed { task_id, code, .. } = signals.recv().await.unwrap() {
                if task_id == task {
                    assert_eq!(code, am_core::ErrorKind::Canceled.code());
                    break;
                }
            }
        }
    })
    .await
    .unwrap();
    assert!(!dir.path().join("apps/com.x.a+").exists());
}
