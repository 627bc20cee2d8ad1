// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for the scenario tests.

use am_core::{InstallationLocation, LocationType};
use std::path::{Path, PathBuf};

pub const RUNTIMES: [&str; 2] = ["native", "qml-inprocess"];
pub const QUICK_LAUNCH_RUNTIMES: [&str; 1] = ["native"];

pub fn registered_runtimes() -> Vec<String> {
    RUNTIMES.iter().map(|s| s.to_string()).collect()
}

pub fn quick_launch_runtimes() -> Vec<String> {
    QUICK_LAUNCH_RUNTIMES.iter().map(|s| s.to_string()).collect()
}

/// Write a minimal application manifest tree entry.
pub fn write_app(base: &Path, id: &str, runtime: &str) -> PathBuf {
    let dir = base.join(id);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("info.yaml"),
        format!(
            "formatType: am-application\nformatVersion: 1\n---\n\
             id: {id}\ncode: app.bin\nruntime: {runtime}\n"
        ),
    )
    .unwrap();
    std::fs::write(dir.join("app.bin"), b"#!/bin/sh\nexit 0\n").unwrap();
    dir
}

pub fn internal_location(base: &Path) -> InstallationLocation {
    let location = InstallationLocation {
        location_type: LocationType::Internal,
        index: 0,
        installation_path: base.join("apps"),
        document_path: base.join("docs"),
        mount_point: None,
        is_default: true,
    };
    std::fs::create_dir_all(&location.installation_path).unwrap();
    std::fs::create_dir_all(&location.document_path).unwrap();
    location
}

/// Sorted listing of every path under `root`, for byte-identity checks.
pub fn tree_listing(root: &Path) -> Vec<String> {
    fn walk(root: &Path, dir: &Path, out: &mut Vec<String>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(&path);
            out.push(relative.display().to_string());
            if path.is_dir() {
                walk(root, &path, out);
            }
        }
    }
    let mut out = Vec::new();
    walk(root, root, &mut out);
    out.sort();
    out
}
