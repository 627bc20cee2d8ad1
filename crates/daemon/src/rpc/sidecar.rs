// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interface sidecar files.
//!
//! For every registered interface the daemon writes
//! `/tmp/<interface>.bus` containing the socket address, so out-of-band
//! tools (the controller, possibly started via ssh without any session
//! environment) can find the running instance. The files are removed at
//! shutdown.

use crate::rpc::protocol::Interface;
use am_core::{Error, Result};
use std::path::PathBuf;
use tracing::warn;

pub fn sidecar_path(interface: Interface) -> PathBuf {
    crate::env::sidecar_dir().join(format!("{}.bus", interface.name()))
}

/// Owns the written sidecar files; dropping removes them.
#[derive(Default)]
pub struct SidecarFiles {
    written: Vec<PathBuf>,
}

impl SidecarFiles {
    pub fn write(&mut self, interface: Interface, address: &str) -> Result<()> {
        let path = sidecar_path(interface);
        std::fs::write(&path, address).map_err(|e| {
            Error::io(format!(
                "could not write the bus address of interface {} to {}: {}",
                interface,
                path.display(),
                e
            ))
        })?;
        self.written.push(path);
        Ok(())
    }

    pub fn remove_all(&mut self) {
        for path in self.written.drain(..) {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "could not remove sidecar file");
            }
        }
    }
}

impl Drop for SidecarFiles {
    fn drop(&mut self) {
        self.remove_all();
    }
}

/// Resolve a sidecar file back to a socket address (client side).
pub fn read_sidecar(interface: Interface) -> Result<PathBuf> {
    let path = sidecar_path(interface);
    let address = std::fs::read_to_string(&path).map_err(|_| {
        Error::io(format!(
            "could not find the bus address of a running application manager \
             instance (no {}); was the daemon started with this interface set \
             to 'none'?",
            path.display()
        ))
    })?;
    Ok(PathBuf::from(address.trim()))
}

#[cfg(test)]
#[path = "sidecar_tests.rs"]
mod tests;
