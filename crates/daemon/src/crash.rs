// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signal-safe crash handling.
//!
//! Installed before anything else at startup. On a fault signal the
//! handler resets the signal to its default disposition (a second fault
//! aborts), writes a fixed-format banner to stderr with raw `write(2)`
//! calls, optionally prints a demangled backtrace, optionally suspends
//! the process so a debugger can attach, and finally either aborts (core
//! dump) or exits with -1.
//!
//! The fault path formats everything into fixed stack buffers sized
//! before the first fault; panics route through the same terminal
//! handler via the panic hook.

use crate::config::CrashActionConfig;
use am_core::env::timeout_factor;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::OnceLock;

const FAULT_SIGNALS: [i32; 6] = [
    libc::SIGFPE,
    libc::SIGSEGV,
    libc::SIGILL,
    libc::SIGBUS,
    libc::SIGPIPE,
    libc::SIGABRT,
];

static PRINT_BACKTRACE: AtomicBool = AtomicBool::new(true);
static DUMP_CORE: AtomicBool = AtomicBool::new(true);
static WAIT_FOR_GDB_SECS: AtomicU32 = AtomicU32::new(0);
static USE_ANSI_COLOR: AtomicBool = AtomicBool::new(false);

static PROCESS_TITLE: OnceLock<String> = OnceLock::new();

/// Size of the per-line format buffer; fixed before any fault.
const LINE_BUF_SIZE: usize = 1024;

/// Install the fault-signal handlers and the panic hook. Must run before
/// the event loop starts; idempotent.
pub fn install() {
    static INSTALLED: AtomicBool = AtomicBool::new(false);
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return;
    }

    USE_ANSI_COLOR.store(
        am_core::console::ansi_color_support(&std::io::stderr()),
        Ordering::Relaxed,
    );
    let _ = PROCESS_TITLE.set(am_core::console::process_title());

    for signal in FAULT_SIGNALS {
        // SAFETY: the handler only uses async-signal-safe calls plus
        // address resolution, mirroring the default fatal path
        let result = unsafe {
            signal_hook::low_level::register(signal, move || fault_handler(signal))
        };
        if result.is_err() {
            let _ = writeln_raw(b"cannot install crash handler\n");
        }
    }

    std::panic::set_hook(Box::new(|info| {
        let mut buf = [0u8; LINE_BUF_SIZE];
        let mut writer = StackWriter::new(&mut buf);
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| info.payload().downcast_ref::<String>().map(String::as_str))
            .unwrap_or("non-string panic payload");
        use std::fmt::Write;
        let _ = match info.location() {
            Some(location) => write!(writer, "uncaught panic at {location}: {payload}"),
            None => write!(writer, "uncaught panic: {payload}"),
        };
        let len = writer.len();
        crash_handler(&buf[..len], 0);
    }));
}

/// Apply the `crashAction` configuration; read before the first fault.
pub fn set_crash_action(config: &CrashActionConfig) {
    PRINT_BACKTRACE.store(config.print_backtrace, Ordering::Relaxed);
    DUMP_CORE.store(config.dump_core, Ordering::Relaxed);
    WAIT_FOR_GDB_SECS.store(
        config.wait_for_gdb_attach * timeout_factor(),
        Ordering::Relaxed,
    );
}

pub fn signal_name(signal: i32) -> &'static str {
    match signal {
        libc::SIGFPE => "SIGFPE",
        libc::SIGSEGV => "SIGSEGV",
        libc::SIGILL => "SIGILL",
        libc::SIGBUS => "SIGBUS",
        libc::SIGPIPE => "SIGPIPE",
        libc::SIGABRT => "SIGABRT",
        libc::SIGALRM => "SIGALRM",
        _ => "<unknown>",
    }
}

fn fault_handler(signal: i32) {
    // a second fault must run the default action
    unsafe {
        libc::signal(signal, libc::SIG_DFL);
    }

    let mut buf = [0u8; LINE_BUF_SIZE];
    let mut writer = StackWriter::new(&mut buf);
    use std::fmt::Write;
    let _ = write!(writer, "uncaught signal {} ({})", signal, signal_name(signal));
    let len = writer.len();
    crash_handler(&buf[..len], signal);
}

fn crash_handler(why: &[u8], signal: i32) -> ! {
    let title = PROCESS_TITLE.get().map(String::as_str).unwrap_or("appman");
    let pid = std::process::id();

    {
        let mut buf = [0u8; LINE_BUF_SIZE];
        let mut writer = StackWriter::new(&mut buf);
        use std::fmt::Write;
        let _ = write!(writer, "\n*** process {title} ({pid}) crashed ***\n\n > why: ");
        let len = writer.len();
        writeln_raw(&buf[..len]);
        writeln_raw(why);
        writeln_raw(b"\n");
    }

    if PRINT_BACKTRACE.load(Ordering::Relaxed) {
        print_backtrace();
    }

    let wait = WAIT_FOR_GDB_SECS.load(Ordering::Relaxed);
    if wait > 0 {
        let mut buf = [0u8; LINE_BUF_SIZE];
        let mut writer = StackWriter::new(&mut buf);
        use std::fmt::Write;
        let _ = write!(
            writer,
            "\n > the process will be suspended for {wait} seconds and you can attach a debugger to it via\n\n   gdb -p {pid}\n"
        );
        let len = writer.len();
        writeln_raw(&buf[..len]);

        let handler: extern "C" fn(libc::c_int) = noop_alarm;
        unsafe {
            libc::signal(libc::SIGALRM, handler as usize as libc::sighandler_t);
            libc::alarm(wait);
            libc::pause();
        }
    }

    if DUMP_CORE.load(Ordering::Relaxed) {
        writeln_raw(b"\n > the process will be aborted (core dump)\n\n");
        for fault in FAULT_SIGNALS {
            unsafe {
                libc::signal(fault, libc::SIG_DFL);
            }
        }
        // re-raise to produce the core file with the original signal
        if signal != 0 {
            unsafe {
                libc::raise(signal);
            }
        }
        std::process::abort();
    }
    unsafe {
        libc::_exit(-1);
    }
}

extern "C" fn noop_alarm(_signal: libc::c_int) {}

fn print_backtrace() {
    writeln_raw(b" > backtrace:\n");
    let mut level = 0usize;
    // SAFETY: called from the terminal crash path only
    unsafe {
        backtrace::trace_unsynchronized(|frame| {
            let ip = frame.ip();
            let mut line = [0u8; LINE_BUF_SIZE];
            let mut writer = StackWriter::new(&mut line);
            use std::fmt::Write;
            let mut resolved = false;

            backtrace::resolve_frame_unsynchronized(frame, |symbol| {
                if resolved {
                    return;
                }
                resolved = true;
                let _ = write!(writer, " {level:3}: ");
                match symbol.name().and_then(|n| n.as_str()) {
                    Some(name) => {
                        if USE_ANSI_COLOR.load(Ordering::Relaxed) {
                            let _ = write!(
                                writer,
                                "\x1b[1m{}\x1b[0m [\x1b[36m{ip:p}\x1b[0m]",
                                rustc_demangle::demangle(name)
                            );
                        } else {
                            let _ =
                                write!(writer, "{} [{ip:p}]", rustc_demangle::demangle(name));
                        }
                    }
                    None => {
                        let _ = write!(writer, "?? [{ip:p}]");
                    }
                }
                if let (Some(file), Some(lineno)) = (symbol.filename(), symbol.lineno()) {
                    let _ = write!(writer, " in {}:{}", file.display(), lineno);
                }
                let _ = writeln!(writer);
            });
            if !resolved {
                let _ = writeln!(writer, " {level:3}: ?? [{ip:p}]");
            }
            let len = writer.len();
            writeln_raw(&line[..len]);
            level += 1;
            level < 64
        });
    }
}

fn writeln_raw(bytes: &[u8]) {
    // SAFETY: plain write(2) on stderr
    unsafe {
        libc::write(libc::STDERR_FILENO, bytes.as_ptr().cast(), bytes.len());
    }
}

/// `fmt::Write` into a fixed stack buffer, truncating on overflow.
struct StackWriter<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl<'a> StackWriter<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, len: 0 }
    }

    fn len(&self) -> usize {
        self.len
    }
}

impl std::fmt::Write for StackWriter<'_> {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        let available = self.buf.len() - self.len;
        let take = s.len().min(available);
        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        Ok(())
    }
}

#[cfg(test)]
#[path = "crash_tests.rs"]
mod tests;
