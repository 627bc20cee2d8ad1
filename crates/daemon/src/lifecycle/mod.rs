// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: the fixed startup order and the shutdown fan-in.

mod startup;
pub use startup::{startup, StartupResult};

use crate::event_bus::EventBus;
use crate::installer::Installer;
use crate::manager::ApplicationManager;
use crate::notifications::NotificationManager;
use crate::quicklaunch::QuickLauncher;
use crate::sysmonitor::SystemMonitor;
use crate::window::WindowCompositor;
use crate::Config;
use am_core::{Event, ShutdownPart};
use am_storage::ApplicationRegistry;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

pub struct DaemonState {
    pub config: Config,
    pub bus: EventBus,
    pub registry: Arc<Mutex<ApplicationRegistry>>,
    pub manager: Arc<Mutex<ApplicationManager>>,
    pub quick_launcher: Arc<Mutex<QuickLauncher>>,
    pub installer: Arc<Installer>,
    pub notifications: Arc<Mutex<NotificationManager>>,
    pub window: Box<dyn WindowCompositor>,
    pub system_monitor: SystemMonitor,
    shutdown: ShutdownTracker,
}

/// Fan-in over the three parties that report `shutDownFinished`.
struct ShutdownTracker {
    active: bool,
    exit_code: i32,
    pending: HashSet<ShutdownPart>,
}

impl ShutdownTracker {
    fn new() -> Self {
        Self {
            active: false,
            exit_code: 0,
            pending: HashSet::new(),
        }
    }
}

impl DaemonState {
    pub(crate) fn new(
        config: Config,
        bus: EventBus,
        registry: Arc<Mutex<ApplicationRegistry>>,
        manager: Arc<Mutex<ApplicationManager>>,
        quick_launcher: Arc<Mutex<QuickLauncher>>,
        installer: Arc<Installer>,
        notifications: Arc<Mutex<NotificationManager>>,
        window: Box<dyn WindowCompositor>,
        system_monitor: SystemMonitor,
    ) -> Self {
        Self {
            config,
            bus,
            registry,
            manager,
            quick_launcher,
            installer,
            notifications,
            window,
            system_monitor,
            shutdown: ShutdownTracker::new(),
        }
    }

    /// Begin the asynchronous shutdown fan-out. Idempotent.
    pub fn begin_shutdown(&mut self, exit_code: i32) {
        if self.shutdown.active {
            return;
        }
        info!("shutting down...");
        self.shutdown.active = true;
        self.shutdown.exit_code = exit_code;
        self.shutdown.pending = [
            ShutdownPart::ApplicationManager,
            ShutdownPart::QuickLauncher,
            ShutdownPart::WindowManager,
        ]
        .into();

        self.manager.lock().shut_down();
        self.quick_launcher.lock().shut_down();
        self.window.shut_down(&self.bus);
    }

    /// Process one event from the engine loop.
    ///
    /// Returns the exit code once all three shutdown parties have
    /// reported.
    pub fn process_event(&mut self, event: Event) -> Option<i32> {
        match event {
            Event::ShutdownRequested { exit_code } => {
                self.begin_shutdown(exit_code);
            }
            Event::ShutDownFinished { part } => {
                self.shutdown.pending.remove(&part);
                if self.shutdown.active && self.shutdown.pending.is_empty() {
                    info!("shutdown complete");
                    return Some(self.shutdown.exit_code);
                }
            }
            Event::InstallerInstalled { application, .. } => {
                info!(id = application.id, "installation finished, updating the registry");
                if let Err(e) = self.registry.lock().insert(*application) {
                    warn!(error = %e, "could not persist the new application");
                }
            }
            Event::InstallerRemoved { application_id, .. } => {
                info!(id = application_id, "removal finished, updating the registry");
                if let Err(e) = self.registry.lock().remove(&application_id) {
                    warn!(error = %e, "could not persist the removal");
                }
            }
            runtime_event => {
                let handled = self.manager.lock().handle_event(&runtime_event);
                if !handled && !self.quick_launcher.lock().handle_event(&runtime_event) {
                    // events for already-gone runtimes are expected
                    tracing::debug!(event = ?runtime_event, "unrouted event");
                }
            }
        }
        None
    }
}
