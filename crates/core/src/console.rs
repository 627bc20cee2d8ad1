// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal capability detection and process identity helpers.

use crate::env::{forced_color_mode, ColorMode};
use std::io::IsTerminal;
use std::os::fd::AsFd;

/// Whether ANSI escape sequences should be emitted on the given stream.
///
/// `AM_FORCE_COLOR_OUTPUT` wins; otherwise the stream must be a terminal
/// that is not `dumb`.
pub fn ansi_color_support<F: IsTerminal>(stream: &F) -> bool {
    match forced_color_mode() {
        ColorMode::On => true,
        ColorMode::Off => false,
        ColorMode::Auto => {
            stream.is_terminal() && std::env::var("TERM").map_or(false, |t| t != "dumb")
        }
    }
}

/// Current console width in columns, if determinable.
pub fn console_width<F: AsFd>(stream: &F) -> Option<u16> {
    if let Ok(size) = nix::sys::termios::tcgetwinsize(stream.as_fd()) {
        if size.ws_col > 0 {
            return Some(size.ws_col);
        }
    }
    std::env::var("COLUMNS").ok().and_then(|c| c.parse().ok())
}

/// Short process title, for crash banners and log prefixes.
pub fn process_title() -> String {
    if let Ok(comm) = std::fs::read_to_string("/proc/self/comm") {
        let comm = comm.trim();
        if !comm.is_empty() {
            return comm.to_string();
        }
    }
    std::env::current_exe()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "appman".to_string())
}

/// Name of the parent process, when discoverable.
pub fn parent_process_name() -> Option<String> {
    let ppid = nix::unistd::getppid().as_raw();
    let comm = std::fs::read_to_string(format!("/proc/{ppid}/comm")).ok()?;
    let comm = comm.trim();
    (!comm.is_empty()).then(|| comm.to_string())
}

#[cfg(test)]
#[path = "console_tests.rs"]
mod tests;
