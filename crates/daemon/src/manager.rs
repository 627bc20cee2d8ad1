// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The application manager: start/stop semantics and the runtime state
//! machine.
//!
//! State graph per runtime:
//! `Inactive → Startup → Active → Shutdown → Inactive`, with the
//! quick-attach shortcut `Inactive → Active` and the crash path back to
//! `Inactive` from anywhere. Per application, starts are serialized and a
//! `start()` issued during `Shutdown` is queued until the runtime has
//! fully wound down.

use crate::container::{ContainerFactory, StdioSpec};
use crate::event_bus::EventBus;
use crate::quicklaunch::QuickLauncher;
use crate::runtime::{RunState, Runtime, RuntimeFactory, StartSpec};
use am_core::{env, Application, Error, ErrorKind, Event, ExitStatus, Result, RuntimeId};
use am_storage::ApplicationRegistry;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Aborts its timer task when dropped or superseded.
pub struct TimerGuard(tokio::task::JoinHandle<()>);

impl TimerGuard {
    pub fn arm(bus: EventBus, delay: Duration, event: Event) -> Self {
        Self(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = bus.send(event);
        }))
    }
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// The two system-properties tiers applications can see.
#[derive(Default, Clone)]
pub struct ApplicationProperties {
    pub third_party: serde_json::Value,
    pub built_in: serde_json::Value,
}

pub struct ManagerSettings {
    pub quit_time: Duration,
    pub start_timeout: Duration,
    pub single_process: bool,
    pub debug_wrappers: HashMap<String, Vec<String>>,
    pub properties: ApplicationProperties,
}

struct RuntimeEntry {
    runtime: Runtime,
    deadline_timer: Option<TimerGuard>,
    quit_timer: Option<TimerGuard>,
    /// Set when the exit is already accounted as a kill (deadline,
    /// `stop(force)`): the exit reports `Crash`
    force_killed: bool,
    /// `start()` received while winding down; replayed from `Inactive`
    pending_start: Option<PendingStart>,
}

struct PendingStart {
    id: String,
    document: Option<String>,
}

pub struct ApplicationManager {
    registry: Arc<Mutex<ApplicationRegistry>>,
    containers: Arc<ContainerFactory>,
    runtimes: Arc<RuntimeFactory>,
    quick_launcher: Option<Arc<Mutex<QuickLauncher>>>,
    bus: EventBus,
    settings: ManagerSettings,
    entries: HashMap<RuntimeId, RuntimeEntry>,
    by_app: HashMap<String, RuntimeId>,
    last_exit: HashMap<String, (i32, ExitStatus)>,
    shutting_down: bool,
}

impl ApplicationManager {
    pub fn new(
        registry: Arc<Mutex<ApplicationRegistry>>,
        containers: Arc<ContainerFactory>,
        runtimes: Arc<RuntimeFactory>,
        bus: EventBus,
        settings: ManagerSettings,
    ) -> Self {
        Self {
            registry,
            containers,
            runtimes,
            quick_launcher: None,
            bus,
            settings,
            entries: HashMap::new(),
            by_app: HashMap::new(),
            last_exit: HashMap::new(),
            shutting_down: false,
        }
    }

    /// Wire in the quick-launch pool (after both exist).
    pub fn set_quick_launcher(&mut self, pool: Arc<Mutex<QuickLauncher>>) {
        self.quick_launcher = Some(pool);
    }

    // -- RPC operations ------------------------------------------------

    /// Start an application (or deliver a document to a running one).
    pub fn start_application(
        &mut self,
        id: &str,
        document: Option<String>,
        stdio: StdioSpec,
        debug_wrapper: Option<&str>,
    ) -> Result<bool> {
        if self.shutting_down {
            return Err(Error::system("the manager is shutting down"));
        }

        let (base, document) = {
            let registry = self.registry.lock();
            let entry = registry
                .lookup(id)
                .ok_or_else(|| Error::not_found(format!("no application {id:?}")))?;
            // an alias can carry its own default document
            let document = document.or_else(|| {
                entry
                    .runtime_parameters
                    .get("documentUrl")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            });
            let base = registry
                .resolve_base(id)
                .ok_or_else(|| Error::not_found(format!("no application {id:?}")))?
                .clone();
            (base, document)
        };

        let wrapper = match debug_wrapper {
            Some(name) => Some(
                self.settings
                    .debug_wrappers
                    .get(name)
                    .cloned()
                    .ok_or_else(|| Error::not_found(format!("no debug wrapper {name:?}")))?,
            ),
            None => None,
        };

        if let Some(&rt_id) = self.by_app.get(&base.id) {
            let entry = self
                .entries
                .get_mut(&rt_id)
                .ok_or_else(|| Error::system("runtime table out of sync"))?;
            match entry.runtime.state {
                RunState::Active => {
                    if wrapper.is_some() {
                        return Err(Error::new(
                            ErrorKind::AppRunning,
                            format!("application {} is already running", base.id),
                        ));
                    }
                    if let Some(doc) = document {
                        entry.runtime.open_document(&doc);
                    }
                    return Ok(true);
                }
                RunState::Startup => return Ok(true),
                RunState::Shutdown => {
                    // serialized per application: run again once Inactive
                    entry.pending_start = Some(PendingStart {
                        id: id.to_string(),
                        document,
                    });
                    return Ok(true);
                }
                RunState::Inactive => {
                    // exit event still in flight; treat like Shutdown
                    entry.pending_start = Some(PendingStart {
                        id: id.to_string(),
                        document,
                    });
                    return Ok(true);
                }
            }
        }

        self.begin_start(&base, document, stdio, wrapper)
    }

    fn begin_start(
        &mut self,
        app: &Application,
        document: Option<String>,
        stdio: StdioSpec,
        debug_wrapper: Option<Vec<String>>,
    ) -> Result<bool> {
        let container_kind = self.containers.select_kind(&app.id).to_string();
        let runtime_kind = app.runtime_name.clone();

        let plain_start = debug_wrapper.is_none()
            && stdio.attach.iter().all(Option::is_none);

        // quick-launch: a full pair attaches (Inactive → Active
        // directly), a container-only pair just saves container setup
        let mut warm_container = None;
        if plain_start {
            if let Some(pool) = &self.quick_launcher {
                match pool.lock().take(&container_kind, &runtime_kind) {
                    Some(crate::quicklaunch::WarmPair::Full(mut runtime)) => {
                        runtime.attach_application(app)?;
                        runtime.interface_connected = true;
                        if let Some(doc) = &document {
                            runtime.open_document(doc);
                        }
                        info!(id = app.id, runtime = %runtime.id, "attached to a quick-launch runtime");
                        let rt_id = runtime.id;
                        self.by_app.insert(app.id.clone(), rt_id);
                        self.entries.insert(
                            rt_id,
                            RuntimeEntry {
                                runtime,
                                deadline_timer: None,
                                quit_timer: None,
                                force_killed: false,
                                pending_start: None,
                            },
                        );
                        return Ok(true);
                    }
                    Some(crate::quicklaunch::WarmPair::ContainerOnly(container)) => {
                        warm_container = Some(container);
                    }
                    None => {}
                }
            }
        }

        let container = match warm_container {
            Some(container) => container,
            None => self.containers.create(&container_kind)?,
        };
        let mut runtime = self.runtimes.create(&runtime_kind, container)?;
        runtime.application_id = Some(app.id.clone());
        runtime.state = RunState::Startup;
        runtime.pending_document = document.clone();

        let properties = if app.built_in {
            self.settings.properties.built_in.clone()
        } else {
            self.settings.properties.third_party.clone()
        };
        let mut spec = StartSpec {
            document,
            stdio,
            debug_wrapper,
            system_properties: properties,
        };

        if let Err(e) = runtime.start(app, &mut spec, &self.bus) {
            // spawn error: straight back to Inactive, reported as a crash
            self.last_exit
                .insert(app.id.clone(), (-1, ExitStatus::Crash));
            warn!(id = app.id, error = %e, "application failed to launch");
            return Err(e);
        }

        let rt_id = runtime.id;
        let deadline = TimerGuard::arm(
            self.bus.clone(),
            env::scaled(self.settings.start_timeout),
            Event::RuntimeDeadline { runtime: rt_id },
        );
        self.by_app.insert(app.id.clone(), rt_id);
        self.entries.insert(
            rt_id,
            RuntimeEntry {
                runtime,
                deadline_timer: Some(deadline),
                quit_timer: None,
                force_killed: false,
                pending_start: None,
            },
        );
        info!(id = app.id, runtime = %rt_id, "application starting");
        Ok(true)
    }

    /// Stop an application. `stop()` on an inactive application is a
    /// no-op.
    pub fn stop_application(&mut self, id: &str, force_kill: bool) -> Result<()> {
        let base_id = {
            let registry = self.registry.lock();
            registry
                .resolve_base(id)
                .map(|a| a.id.clone())
                .ok_or_else(|| Error::not_found(format!("no application {id:?}")))?
        };
        let Some(&rt_id) = self.by_app.get(&base_id) else {
            return Ok(());
        };
        self.stop_runtime(rt_id, force_kill);
        Ok(())
    }

    fn stop_runtime(&mut self, rt_id: RuntimeId, force_kill: bool) {
        let Some(entry) = self.entries.get_mut(&rt_id) else {
            return;
        };
        match entry.runtime.state {
            RunState::Inactive => {}
            RunState::Shutdown => {
                if force_kill {
                    entry.force_killed = true;
                    entry.runtime.force_kill();
                }
            }
            RunState::Active | RunState::Startup if force_kill => {
                // immediate force-kill, straight to Inactive
                entry.deadline_timer = None;
                entry.force_killed = true;
                entry.runtime.state = RunState::Inactive;
                entry.runtime.force_kill();
            }
            RunState::Active | RunState::Startup => {
                entry.deadline_timer = None;
                entry.runtime.state = RunState::Shutdown;
                entry.runtime.request_quit();
                entry.quit_timer = Some(TimerGuard::arm(
                    self.bus.clone(),
                    env::scaled(self.settings.quit_time),
                    Event::RuntimeQuitElapsed { runtime: rt_id },
                ));
            }
        }
    }

    // -- queries -------------------------------------------------------

    pub fn application_ids(&self) -> Vec<String> {
        self.registry.lock().application_ids()
    }

    /// The serialized view of one application, with its run state.
    pub fn get(&self, id: &str) -> Option<serde_json::Value> {
        let map = {
            let registry = self.registry.lock();
            registry.lookup(id).map(|a| a.to_map())?
        };
        let mut map = map;
        let base_id = id.split('@').next().unwrap_or(id);
        let state = self.run_state(base_id);
        if let Some(object) = map.as_object_mut() {
            object.insert("runState".into(), serde_json::json!(state.to_string()));
            if let Some(&rt_id) = self.by_app.get(base_id) {
                if let Some(entry) = self.entries.get(&rt_id) {
                    object.insert("pid".into(), serde_json::json!(entry.runtime.pid()));
                }
            }
            if let Some((code, status)) = self.last_exit.get(base_id) {
                object.insert("lastExitCode".into(), serde_json::json!(code));
                object.insert("lastExitStatus".into(), serde_json::json!(status));
            }
        }
        Some(map)
    }

    pub fn run_state(&self, id: &str) -> RunState {
        self.by_app
            .get(id)
            .and_then(|rt_id| self.entries.get(rt_id))
            .map(|e| e.runtime.state)
            .unwrap_or(RunState::Inactive)
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.run_state(id) != RunState::Inactive
    }

    // -- event handling ------------------------------------------------

    /// Process a runtime event. Returns false when the runtime is not
    /// ours (e.g. it belongs to the quick-launch pool).
    pub fn handle_event(&mut self, event: &Event) -> bool {
        match event {
            Event::RuntimeStarted { runtime, .. } => self.with_entry(*runtime, |m, e| {
                e.runtime.child_started = true;
                m.maybe_activate(e);
            }),
            Event::RuntimeConnected { runtime } => self.with_entry(*runtime, |m, e| {
                e.runtime.interface_connected = true;
                m.maybe_activate(e);
            }),
            Event::RuntimeDeadline { runtime } => self.with_entry(*runtime, |_, e| {
                if e.runtime.state == RunState::Startup {
                    warn!(runtime = %e.runtime.id, "startup deadline elapsed, killing");
                    e.deadline_timer = None;
                    e.force_killed = true;
                    e.runtime.state = RunState::Inactive;
                    e.runtime.force_kill();
                }
            }),
            Event::RuntimeQuitElapsed { runtime } => self.with_entry(*runtime, |_, e| {
                if e.runtime.state == RunState::Shutdown {
                    e.quit_timer = None;
                    e.runtime.force_kill();
                }
            }),
            Event::RuntimeExited {
                runtime,
                exit_code,
                signaled,
            } => self.handle_exited(*runtime, *exit_code, *signaled),
            _ => false,
        }
    }

    fn with_entry(
        &mut self,
        rt_id: RuntimeId,
        f: impl FnOnce(&mut Self, &mut RuntimeEntry),
    ) -> bool {
        let Some(mut entry) = self.entries.remove(&rt_id) else {
            return false;
        };
        f(self, &mut entry);
        self.entries.insert(rt_id, entry);
        true
    }

    fn maybe_activate(&mut self, entry: &mut RuntimeEntry) {
        if entry.runtime.state != RunState::Startup {
            return;
        }
        let needs_interface = entry
            .runtime
            .application_id
            .as_ref()
            .and_then(|id| self.registry.lock().lookup(id).map(|a| a.supports_application_interface))
            .unwrap_or(false);
        if !entry.runtime.child_started {
            return;
        }
        if needs_interface && !entry.runtime.interface_connected {
            return;
        }
        entry.runtime.state = RunState::Active;
        entry.deadline_timer = None;
        if let Some(doc) = entry.runtime.pending_document.take() {
            entry.runtime.open_document(&doc);
        }
        info!(
            id = entry.runtime.application_id.as_deref().unwrap_or("-"),
            runtime = %entry.runtime.id,
            "application is active"
        );
    }

    fn handle_exited(&mut self, rt_id: RuntimeId, exit_code: i32, signaled: bool) -> bool {
        let Some(entry) = self.entries.remove(&rt_id) else {
            return false;
        };

        // in Shutdown every exit counts as a normal one
        let status = match entry.runtime.state {
            RunState::Shutdown => ExitStatus::NormalExit,
            _ if entry.force_killed || signaled || exit_code != 0 => ExitStatus::Crash,
            _ => ExitStatus::NormalExit,
        };

        let app_id = entry.runtime.application_id.clone();
        if let Some(id) = &app_id {
            self.by_app.remove(id);
            self.last_exit.insert(id.clone(), (exit_code, status));
            info!(id, exit_code, ?status, "application finished");
        }
        // entry drop releases the container

        if let Some(pending) = entry.pending_start {
            if !self.shutting_down {
                if let Err(e) = self.start_application(
                    &pending.id,
                    pending.document,
                    StdioSpec::default(),
                    None,
                ) {
                    warn!(id = pending.id, error = %e, "queued start failed");
                }
            }
        }

        if self.shutting_down && self.entries.is_empty() {
            let _ = self.bus.send(Event::ShutDownFinished {
                part: am_core::ShutdownPart::ApplicationManager,
            });
        }
        true
    }

    // -- shutdown ------------------------------------------------------

    /// Stop everything; `shutDownFinished` is reported once the last
    /// runtime has wound down.
    pub fn shut_down(&mut self) {
        self.shutting_down = true;
        let ids: Vec<RuntimeId> = self.entries.keys().copied().collect();
        for rt_id in ids {
            self.stop_runtime(rt_id, false);
        }
        if self.entries.is_empty() {
            let _ = self.bus.send(Event::ShutDownFinished {
                part: am_core::ShutdownPart::ApplicationManager,
            });
        }
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
