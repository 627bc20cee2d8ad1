// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment variables understood by every manager binary.
//!
//! - `AM_TIMEOUT_FACTOR`: positive integer multiplier applied to every
//!   configured timeout (useful on slow targets and in CI)
//! - `AM_STARTUP_TIMER`: `1` prints the startup report to stderr, any
//!   other non-empty value is treated as a file to append it to
//! - `AM_FORCE_COLOR_OUTPUT`: force ANSI color `on`/`off` regardless of
//!   the attached terminal

use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

/// Multiplier applied to all configured timeouts. Read once.
pub fn timeout_factor() -> u32 {
    static FACTOR: OnceLock<u32> = OnceLock::new();
    *FACTOR.get_or_init(|| {
        let factor = std::env::var("AM_TIMEOUT_FACTOR")
            .ok()
            .and_then(|v| v.trim().parse::<u32>().ok())
            .filter(|f| *f > 0)
            .unwrap_or(1);
        if factor != 1 {
            tracing::info!(factor, "all timeouts are multiplied (set by $AM_TIMEOUT_FACTOR)");
        }
        factor
    })
}

/// Scale a configured timeout by [`timeout_factor`].
pub fn scaled(timeout: Duration) -> Duration {
    timeout * timeout_factor()
}

/// Where the startup timer report goes, if anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupTimerSink {
    Stderr,
    File(PathBuf),
}

pub fn startup_timer_sink() -> Option<StartupTimerSink> {
    match std::env::var("AM_STARTUP_TIMER") {
        Ok(v) if v == "1" => Some(StartupTimerSink::Stderr),
        Ok(v) if !v.is_empty() => Some(StartupTimerSink::File(PathBuf::from(v))),
        _ => None,
    }
}

/// Tri-state color override from `AM_FORCE_COLOR_OUTPUT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorMode {
    On,
    Off,
    #[default]
    Auto,
}

pub fn forced_color_mode() -> ColorMode {
    match std::env::var("AM_FORCE_COLOR_OUTPUT").as_deref() {
        Ok("on") | Ok("1") => ColorMode::On,
        Ok("off") | Ok("0") => ColorMode::Off,
        _ => ColorMode::Auto,
    }
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
