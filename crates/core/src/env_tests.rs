// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn default_factor_is_identity() {
    // AM_TIMEOUT_FACTOR is unset in the test environment
    assert_eq!(scaled(Duration::from_millis(250)), Duration::from_millis(250));
}

// The env-reading helpers are exercised in one test to keep the
// process-global environment mutations sequential.
#[test]
fn env_overrides() {
    std::env::set_var("AM_STARTUP_TIMER", "1");
    assert_eq!(startup_timer_sink(), Some(StartupTimerSink::Stderr));

    std::env::set_var("AM_STARTUP_TIMER", "/tmp/am-startup.log");
    assert_eq!(
        startup_timer_sink(),
        Some(StartupTimerSink::File(PathBuf::from("/tmp/am-startup.log")))
    );

    std::env::remove_var("AM_STARTUP_TIMER");
    assert_eq!(startup_timer_sink(), None);

    std::env::set_var("AM_FORCE_COLOR_OUTPUT", "on");
    assert_eq!(forced_color_mode(), ColorMode::On);
    std::env::set_var("AM_FORCE_COLOR_OUTPUT", "0");
    assert_eq!(forced_color_mode(), ColorMode::Off);
    std::env::set_var("AM_FORCE_COLOR_OUTPUT", "auto");
    assert_eq!(forced_color_mode(), ColorMode::Auto);
    std::env::remove_var("AM_FORCE_COLOR_OUTPUT");
    assert_eq!(forced_color_mode(), ColorMode::Auto);
}
