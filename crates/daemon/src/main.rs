// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Application manager daemon (appmand)
//!
//! Owns the process-wide lifetime: crash handler first, then logging,
//! then the fixed component startup order, then the engine loop.
//!
//! Architecture:
//! - Listener tasks: one Unix socket per RPC interface
//! - Engine loop: main task processing events sequentially

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use am_daemon::lifecycle::{self, StartupResult};
use am_daemon::rpc::{self, RegisteredInterfaces};
use am_daemon::{crash, Config};
use am_core::Event;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

fn main() {
    // the crash handler precedes everything, even argument parsing
    crash::install();

    let config_path = match parse_args() {
        Ok(path) => path,
        Err(code) => std::process::exit(code),
    };

    let config = match Config::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("appmand: {e}");
            std::process::exit(1);
        }
    };

    crash::set_crash_action(&config.crash_action);

    let _log_guard = match setup_logging(&config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("appmand: cannot set up logging: {e}");
            std::process::exit(1);
        }
    };

    // single-threaded cooperative main loop; children run in parallel
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("appmand: cannot create the runtime: {e}");
            std::process::exit(1);
        }
    };

    let exit_code = runtime.block_on(run(config));
    std::process::exit(exit_code);
}

async fn run(config: Config) -> i32 {
    info!("starting appmand {}", env!("CARGO_PKG_VERSION"));

    let registration_delay = Duration::from_millis(config.rpc.registration_delay);
    let buses = config.rpc.buses.clone();

    let StartupResult {
        mut daemon,
        mut event_reader,
        listen_ctx,
        mut startup_timer,
    } = match lifecycle::startup(config) {
        Ok(result) => result,
        Err(e) => {
            error!("failed to start: {}", e);
            return 1;
        }
    };

    // RPC bring-up, deferred by registrationDelay; the registration
    // handle owns the sidecar files until shutdown
    let registration: Arc<Mutex<Option<RegisteredInterfaces>>> = Arc::new(Mutex::new(None));
    {
        let registration = Arc::clone(&registration);
        let listen_ctx = Arc::clone(&listen_ctx);
        tokio::spawn(async move {
            if !registration_delay.is_zero() {
                tokio::time::sleep(registration_delay).await;
            }
            match rpc::register_interfaces(&buses, listen_ctx) {
                Ok(interfaces) => *registration.lock() = Some(interfaces),
                Err(e) => error!("RPC registration failed: {}", e),
            }
        });
    }

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            error!("cannot install SIGTERM handler: {}", e);
            return 1;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(sigint) => sigint,
        Err(e) => {
            error!("cannot install SIGINT handler: {}", e);
            return 1;
        }
    };

    startup_timer.checkpoint("daemon ready");
    startup_timer.create_report("appmand");
    info!("daemon ready");

    // engine loop: every state transition arrives here, in order
    let exit_code = loop {
        tokio::select! {
            event = event_reader.recv() => {
                match event {
                    Some(event) => {
                        if let Some(code) = daemon.process_event(event) {
                            break code;
                        }
                    }
                    None => {
                        error!("event bus closed unexpectedly");
                        break 1;
                    }
                }
            }

            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down...");
                let _ = daemon.bus.send(Event::ShutdownRequested { exit_code: 0 });
            }

            _ = sigint.recv() => {
                eprintln!("\n*** received SIGINT / Ctrl+C ... exiting ***\n");
                let _ = daemon.bus.send(Event::ShutdownRequested { exit_code: 0 });
            }
        }
    };

    // removes sockets' sidecar files
    registration.lock().take();
    info!("daemon stopped");
    exit_code
}

fn parse_args() -> Result<Option<PathBuf>, i32> {
    let mut config_path = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("appmand {}", env!("CARGO_PKG_VERSION"));
                return Err(0);
            }
            "--help" | "-h" | "help" => {
                println!("appmand {}", env!("CARGO_PKG_VERSION"));
                println!("Application manager daemon - owns the application lifecycle,");
                println!("the quick-launch pool, the installer, and the RPC surface.");
                println!();
                println!("USAGE:");
                println!("    appmand [--config <file>]");
                println!();
                println!("OPTIONS:");
                println!("    -c, --config <file>  Configuration file (YAML)");
                println!("    -h, --help           Print help information");
                println!("    -v, --version        Print version information");
                return Err(0);
            }
            "--config" | "-c" => match args.next() {
                Some(path) => config_path = Some(PathBuf::from(path)),
                None => {
                    eprintln!("error: --config needs a file argument");
                    return Err(1);
                }
            },
            other => {
                eprintln!("error: unexpected argument '{other}'");
                eprintln!("Usage: appmand [--config <file>]");
                return Err(1);
            }
        }
    }
    Ok(config_path)
}

fn setup_logging(
    config: &Config,
) -> std::io::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(config.logging.rules.as_deref().unwrap_or("info"))
    });

    match &config.logging.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            rotate_log_if_needed(path);
            let directory = path.parent().unwrap_or(std::path::Path::new("."));
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "appmand.log".to_string());
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
            Ok(None)
        }
    }
}

/// Maximum log file size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated log files to keep.
const MAX_ROTATED_LOGS: u32 = 3;

/// Shift `appmand.log` → `.1` → `.2` → `.3`, dropping the oldest.
/// Best-effort: failures never block startup.
fn rotate_log_if_needed(log_path: &std::path::Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(metadata) => metadata.len(),
        Err(_) => return,
    };
    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }
    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}
