// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! am-daemon: the application manager daemon (`appmand`).
//!
//! Architecture:
//! - Listener tasks: one Unix socket per registered RPC interface,
//!   translating requests into calls on the shared components
//! - Engine loop: the main task, processing [`am_core::Event`]s
//!   sequentially (process exits, timers, installer completions,
//!   shutdown progress)
//!
//! Everything that blocks runs either in a child process or behind a
//! `spawn_blocking`; the loop itself never waits.

pub mod config;
pub mod container;
pub mod crash;
pub mod env;
pub mod event_bus;
pub mod installer;
pub mod lifecycle;
pub mod manager;
pub mod notifications;
pub mod quicklaunch;
pub mod rpc;
pub mod runtime;
pub mod sysmonitor;
pub mod window;

pub use config::Config;
pub use event_bus::{EventBus, EventReader};
pub use rpc::protocol::{self, InstallerSignal, Request, Response};
