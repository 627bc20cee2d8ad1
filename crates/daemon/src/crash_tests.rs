// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::fmt::Write;
use yare::parameterized;

#[parameterized(
    segv = { libc::SIGSEGV, "SIGSEGV" },
    fpe = { libc::SIGFPE, "SIGFPE" },
    bus = { libc::SIGBUS, "SIGBUS" },
    abrt = { libc::SIGABRT, "SIGABRT" },
    other = { libc::SIGUSR1, "<unknown>" },
)]
fn signal_names(signal: i32, name: &str) {
    assert_eq!(signal_name(signal), name);
}

#[test]
fn stack_writer_formats_without_allocating_past_its_buffer() {
    let mut buf = [0u8; 32];
    let mut writer = StackWriter::new(&mut buf);
    write!(writer, "pid {} sig {}", 1234, "SIGSEGV").unwrap();
    let len = writer.len();
    assert_eq!(&buf[..len], b"pid 1234 sig SIGSEGV");
}

#[test]
fn stack_writer_truncates_on_overflow() {
    let mut buf = [0u8; 8];
    let mut writer = StackWriter::new(&mut buf);
    write!(writer, "0123456789abcdef").unwrap();
    assert_eq!(writer.len(), 8);
    assert_eq!(&buf, b"01234567");
}

#[test]
fn crash_action_configuration_is_stored() {
    set_crash_action(&CrashActionConfig {
        print_backtrace: false,
        wait_for_gdb_attach: 0,
        dump_core: false,
    });
    assert!(!PRINT_BACKTRACE.load(Ordering::Relaxed));
    assert!(!DUMP_CORE.load(Ordering::Relaxed));

    set_crash_action(&CrashActionConfig::default());
    assert!(PRINT_BACKTRACE.load(Ordering::Relaxed));
    assert!(DUMP_CORE.load(Ordering::Relaxed));
}
