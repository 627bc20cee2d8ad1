// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    parse = { ErrorKind::Parse, 1, "parse" },
    io = { ErrorKind::Io, 2, "io" },
    security = { ErrorKind::Security, 4, "security" },
    app_running = { ErrorKind::AppRunning, 6, "app-running" },
    canceled = { ErrorKind::Canceled, 9, "canceled" },
)]
fn kind_codes_and_names(kind: ErrorKind, code: u32, name: &str) {
    assert_eq!(kind.code(), code);
    assert_eq!(kind.to_string(), name);
}

#[test]
fn display_includes_kind_and_message() {
    let e = Error::not_found("no application com.x.a");
    assert_eq!(e.to_string(), "not-found: no application com.x.a");
}

#[test]
fn io_error_converts() {
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let e: Error = io.into();
    assert_eq!(e.kind, ErrorKind::Io);
    assert!(e.message.contains("denied"));
}

#[test]
fn serde_round_trip() {
    let e = Error::new(ErrorKind::Security, "digest mismatch");
    let json = serde_json::to_string(&e).unwrap();
    let back: Error = serde_json::from_str(&json).unwrap();
    assert_eq!(back, e);
}
