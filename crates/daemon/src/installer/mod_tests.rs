// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::event_bus::{self, EventReader};
use am_core::LocationType;
use std::time::Duration;
use tokio::sync::broadcast;

const INFO: &str = "\
formatType: am-application
formatVersion: 1
---
id: com.x.a
code: app.bin
runtime: native
";

struct Fixture {
    installer: Installer,
    reader: EventReader,
    dir: tempfile::TempDir,
}

impl Fixture {
    fn new(allow_unsigned: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let location = InstallationLocation {
            location_type: LocationType::Internal,
            index: 0,
            installation_path: dir.path().join("apps"),
            document_path: dir.path().join("docs"),
            mount_point: None,
            is_default: true,
        };
        std::fs::create_dir_all(&location.installation_path).unwrap();
        std::fs::create_dir_all(&location.document_path).unwrap();

        let (bus, reader) = event_bus::channel();
        let installer = Installer::new(
            InstallerSetup {
                locations: vec![location],
                manifest_dir: dir.path().join("manifests"),
                image_mount_dir: dir.path().join("image-mounts"),
                hardware_id: "test-hw-1".into(),
                ca_certificate_files: vec![],
                allow_unsigned,
                uid_separation: None,
            },
            bus,
        )
        .unwrap();
        Self {
            installer,
            reader,
            dir,
        }
    }

    fn build_package(&self) -> PathBuf {
        let app_dir = self.dir.path().join("pkg-src");
        std::fs::create_dir_all(&app_dir).unwrap();
        std::fs::write(app_dir.join("info.yaml"), INFO).unwrap();
        std::fs::write(app_dir.join("app.bin"), b"#!/bin/sh\nexit 0\n").unwrap();
        let package = self.dir.path().join("com.x.a.pkg");
        package::create_package(&app_dir, &package).unwrap();
        package
    }

    fn install_dir(&self) -> PathBuf {
        self.dir.path().join("apps/com.x.a")
    }

    fn report_path(&self) -> PathBuf {
        self.dir
            .path()
            .join("manifests/com.x.a/installation-report.yaml")
    }
}

async fn next_signal(rx: &mut broadcast::Receiver<InstallerSignal>) -> InstallerSignal {
    tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("no signal in time")
        .expect("signal stream closed")
}

async fn wait_for(
    rx: &mut broadcast::Receiver<InstallerSignal>,
    mut pred: impl FnMut(&InstallerSignal) -> bool,
) -> InstallerSignal {
    loop {
        let signal = next_signal(rx).await;
        if pred(&signal) {
            return signal;
        }
    }
}

#[tokio::test]
async fn cold_install_acknowledge_and_finish() {
    let mut fx = Fixture::new(true);
    let package = fx.build_package();
    let mut signals = fx.installer.subscribe();

    let task = fx
        .installer
        .start_package_installation("internal-0", package)
        .unwrap();

    let ack = wait_for(&mut signals, |s| {
        matches!(s, InstallerSignal::RequiresAcknowledge { .. })
    })
    .await;
    match &ack {
        InstallerSignal::RequiresAcknowledge { task_id, manifest } => {
            assert_eq!(task_id, &task);
            assert_eq!(manifest["id"], "com.x.a");
        }
        _ => unreachable!(),
    }
    assert_eq!(
        fx.installer.task_state(&task).unwrap().1,
        TaskState::AwaitingAck
    );

    fx.installer.acknowledge_package_installation(&task).unwrap();
    wait_for(&mut signals, |s| matches!(s, InstallerSignal::Finished { .. })).await;

    // I3: the report exists and deserializes
    let report = am_manifest::load_report(&fx.report_path()).unwrap();
    assert_eq!(report.application_id, "com.x.a");
    assert_eq!(report.installation_location_id, "internal-0");
    assert!(fx.install_dir().join("app.bin").exists());
    assert!(!fx.dir.path().join("apps/com.x.a+").exists());

    // the engine loop learns about the new application
    let application = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match fx.reader.recv().await {
                Some(Event::InstallerInstalled { application, .. }) => break application,
                Some(_) => continue,
                None => panic!("bus closed"),
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(application.id, "com.x.a");
    assert_eq!(application.code_dir, fx.install_dir());
    assert!(application.installation_report.is_some());
}

#[tokio::test]
async fn cancel_during_awaiting_ack_cleans_staging() {
    let mut fx = Fixture::new(true);
    let package = fx.build_package();
    let mut signals = fx.installer.subscribe();

    let task = fx
        .installer
        .start_package_installation("internal-0", package)
        .unwrap();
    wait_for(&mut signals, |s| {
        matches!(s, InstallerSignal::RequiresAcknowledge { .. })
    })
    .await;

    // staging exists while awaiting the client
    assert!(fx.dir.path().join("apps/com.x.a+").exists());

    fx.installer.cancel_task(&task).unwrap();
    let failed = wait_for(&mut signals, |s| matches!(s, InstallerSignal::Failed { .. })).await;
    match failed {
        InstallerSignal::Failed { code, .. } => {
            assert_eq!(code, am_core::ErrorKind::Canceled.code())
        }
        _ => unreachable!(),
    }

    // I4: nothing the task created remains
    assert!(!fx.dir.path().join("apps/com.x.a+").exists());
    assert!(!fx.install_dir().exists());
    assert!(!fx.report_path().exists());
    assert_eq!(fx.installer.task_state(&task).unwrap().1, TaskState::Failed);

    let _ = fx.reader.try_recv();
}

#[tokio::test]
async fn unsigned_package_is_rejected_when_signatures_are_required() {
    let fx = Fixture::new(false);
    let package = fx.build_package();
    let mut signals = fx.installer.subscribe();

    let _task = fx
        .installer
        .start_package_installation("internal-0", package)
        .unwrap();
    let failed = wait_for(&mut signals, |s| matches!(s, InstallerSignal::Failed { .. })).await;
    match failed {
        InstallerSignal::Failed { code, message, .. } => {
            assert_eq!(code, am_core::ErrorKind::Security.code());
            assert!(message.contains("not signed"));
        }
        _ => unreachable!(),
    }
    assert!(!fx.dir.path().join("apps/com.x.a+").exists());
}

#[tokio::test]
async fn unknown_location_is_not_found() {
    let fx = Fixture::new(true);
    let err = fx
        .installer
        .start_package_installation("removable-9", PathBuf::from("/tmp/none.pkg"))
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

async fn install(fx: &mut Fixture) {
    let package = fx.build_package();
    let mut signals = fx.installer.subscribe();
    let task = fx
        .installer
        .start_package_installation("internal-0", package)
        .unwrap();
    wait_for(&mut signals, |s| {
        matches!(s, InstallerSignal::RequiresAcknowledge { .. })
    })
    .await;
    fx.installer.acknowledge_package_installation(&task).unwrap();
    wait_for(&mut signals, |s| matches!(s, InstallerSignal::Finished { .. })).await;
}

#[tokio::test]
async fn remove_undoes_an_install() {
    let mut fx = Fixture::new(true);
    install(&mut fx).await;
    std::fs::write(fx.dir.path().join("docs/com.x.a/note.txt"), b"doc").unwrap();

    let mut signals = fx.installer.subscribe();
    let task = fx
        .installer
        .remove_package("com.x.a", false, false, false)
        .unwrap();
    wait_for(&mut signals, |s| matches!(s, InstallerSignal::Finished { .. })).await;
    assert_eq!(fx.installer.task_state(&task).unwrap().0, TaskKind::Remove);

    assert!(!fx.install_dir().exists());
    assert!(!fx.report_path().exists());
    assert!(!fx.dir.path().join("docs/com.x.a").exists());
    // lock file is infrastructure, not payload
    let leftovers: Vec<_> = std::fs::read_dir(fx.dir.path().join("apps"))
        .unwrap()
        .flatten()
        .filter(|e| e.file_name() != ".apps.lock")
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn remove_can_keep_documents() {
    let mut fx = Fixture::new(true);
    install(&mut fx).await;
    std::fs::write(fx.dir.path().join("docs/com.x.a/note.txt"), b"doc").unwrap();

    let mut signals = fx.installer.subscribe();
    fx.installer
        .remove_package("com.x.a", true, false, false)
        .unwrap();
    wait_for(&mut signals, |s| matches!(s, InstallerSignal::Finished { .. })).await;

    assert!(!fx.install_dir().exists());
    assert!(fx.dir.path().join("docs/com.x.a/note.txt").exists());
}

#[tokio::test]
async fn removing_a_running_application_needs_force() {
    let mut fx = Fixture::new(true);
    install(&mut fx).await;

    let mut signals = fx.installer.subscribe();
    let _task = fx
        .installer
        .remove_package("com.x.a", false, false, true)
        .unwrap();
    let failed = wait_for(&mut signals, |s| matches!(s, InstallerSignal::Failed { .. })).await;
    match failed {
        InstallerSignal::Failed { code, .. } => {
            assert_eq!(code, am_core::ErrorKind::AppRunning.code())
        }
        _ => unreachable!(),
    }
    // still installed
    assert!(fx.install_dir().exists());

    // force removal proceeds
    let task = fx
        .installer
        .remove_package("com.x.a", false, true, true)
        .unwrap();
    wait_for(&mut signals, |s| matches!(s, InstallerSignal::Finished { .. })).await;
    assert_eq!(fx.installer.task_state(&task).unwrap().1, TaskState::Finished);
    assert!(!fx.install_dir().exists());
}

#[tokio::test]
async fn removing_an_unknown_application_fails_synchronously() {
    let fx = Fixture::new(true);
    let err = fx
        .installer
        .remove_package("com.x.gone", false, false, false)
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn cleanup_removes_staging_and_unreported_installs() {
    let mut fx = Fixture::new(true);
    install(&mut fx).await;

    // a crashed install leaves a staging dir and an unreported dir
    std::fs::create_dir_all(fx.dir.path().join("apps/com.x.b+")).unwrap();
    std::fs::create_dir_all(fx.dir.path().join("apps/com.x.c")).unwrap();
    // and an orphaned manifest entry without a report
    std::fs::create_dir_all(fx.dir.path().join("manifests/com.x.d")).unwrap();

    let removed = fx.installer.cleanup_broken_installations().unwrap();
    assert_eq!(removed, 3);

    assert!(!fx.dir.path().join("apps/com.x.b+").exists());
    assert!(!fx.dir.path().join("apps/com.x.c").exists());
    assert!(!fx.dir.path().join("manifests/com.x.d").exists());
    // the valid installation survives (restart recovery)
    assert!(fx.install_dir().exists());
    assert!(fx.report_path().exists());
}

#[test]
fn uid_assignment_is_stable_and_in_range() {
    let separation = UidSeparation {
        min_user_id: 1200,
        max_user_id: 1299,
        common_group_id: 1200,
    };
    let a = separation.uid_for("com.x.a");
    let b = separation.uid_for("com.x.b");
    assert_eq!(a, separation.uid_for("com.x.a"));
    assert!((1200..=1299).contains(&a));
    assert!((1200..=1299).contains(&b));
}

#[tokio::test]
async fn acknowledge_before_receiving_finishes_is_accepted() {
    let fx = Fixture::new(true);
    let package = fx.build_package();
    let mut signals = fx.installer.subscribe();

    let task = fx
        .installer
        .start_package_installation("internal-0", package)
        .unwrap();
    // acknowledge as soon as the task shows up in Receiving; the control
    // message is consumed at the gate
    loop {
        match fx.installer.task_state(&task) {
            Some((_, TaskState::Receiving | TaskState::AwaitingAck)) => break,
            Some((_, TaskState::Failed)) => panic!("task failed early"),
            _ => tokio::time::sleep(Duration::from_millis(5)).await,
        }
    }
    fx.installer.acknowledge_package_installation(&task).unwrap();
    wait_for(&mut signals, |s| matches!(s, InstallerSignal::Finished { .. })).await;
}
