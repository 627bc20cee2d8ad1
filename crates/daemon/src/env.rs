// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon filesystem layout defaults.

use std::path::PathBuf;

/// Root of all persisted manager state.
pub fn default_state_dir() -> PathBuf {
    PathBuf::from("/opt/am")
}

/// Base directory for the per-interface RPC sockets.
///
/// The session runtime dir when available, `/run/appman` otherwise.
pub fn runtime_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir).join("appman");
        }
    }
    PathBuf::from("/run/appman")
}

/// Where the `<interface>.bus` sidecar files go.
pub fn sidecar_dir() -> PathBuf {
    std::env::temp_dir()
}
