// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn write_read_remove_cycle() {
    let mut files = SidecarFiles::default();
    files
        .write(Interface::NotificationManager, "/run/appman/nm.socket")
        .unwrap();

    let path = sidecar_path(Interface::NotificationManager);
    assert!(path.exists());
    assert_eq!(
        read_sidecar(Interface::NotificationManager).unwrap(),
        PathBuf::from("/run/appman/nm.socket")
    );

    drop(files);
    assert!(!path.exists());
}

#[test]
fn missing_sidecar_is_an_io_error() {
    let _ = std::fs::remove_file(sidecar_path(Interface::ApplicationManager));
    let err = read_sidecar(Interface::ApplicationManager).unwrap_err();
    assert_eq!(err.kind, am_core::ErrorKind::Io);
}
