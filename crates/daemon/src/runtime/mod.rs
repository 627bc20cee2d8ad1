// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtimes: one live execution of an application.
//!
//! A runtime owns exactly one container and moves through
//! `Inactive → Startup → Active → Shutdown → Inactive`. The state field
//! lives here; the transitions are driven by the application manager on
//! the main loop (see `manager.rs`).

pub mod inprocess;
pub mod native;

use crate::container::{Container, StdioSpec};
use crate::event_bus::EventBus;
use am_core::{Application, Error, Result, RuntimeId};
use serde::Serialize;
use tracing::warn;

pub use inprocess::InProcessRuntimeManager;
pub use native::NativeRuntimeManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Inactive,
    Startup,
    Active,
    Shutdown,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RunState::Inactive => "inactive",
            RunState::Startup => "startup",
            RunState::Active => "active",
            RunState::Shutdown => "shutdown",
        })
    }
}

/// What to do once a starting runtime reaches `Active`.
pub struct StartSpec {
    pub document: Option<String>,
    pub stdio: StdioSpec,
    pub debug_wrapper: Option<Vec<String>>,
    /// The system-properties tier visible to this application
    pub system_properties: serde_json::Value,
}

impl Default for StartSpec {
    fn default() -> Self {
        Self {
            document: None,
            stdio: StdioSpec::default(),
            debug_wrapper: None,
            system_properties: serde_json::Value::Null,
        }
    }
}

pub enum Backend {
    Native(native::NativeBackend),
    InProcess(inprocess::InProcessHost),
}

pub struct Runtime {
    pub id: RuntimeId,
    /// None for unbound quick-launchers
    pub application_id: Option<String>,
    pub state: RunState,
    pub is_quick_launcher: bool,
    pub interface_connected: bool,
    pub child_started: bool,
    pub pending_document: Option<String>,
    pub slow_animations: bool,
    runtime_kind: String,
    container: Container,
    backend: Backend,
}

impl Runtime {
    pub fn runtime_kind(&self) -> &str {
        &self.runtime_kind
    }

    pub fn container_kind(&self) -> &str {
        self.container.kind()
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn is_in_process(&self) -> bool {
        matches!(self.backend, Backend::InProcess(_))
    }

    pub fn pid(&self) -> Option<u32> {
        match &self.backend {
            Backend::Native(_) => self.container.pid(),
            // the hosted context lives in the manager's own process
            Backend::InProcess(_) => Some(std::process::id()),
        }
    }

    /// Spawn the process (or instantiate the in-process context) for
    /// `app`. The caller transitions the state machine.
    pub fn start(&mut self, app: &Application, spec: &mut StartSpec, bus: &EventBus) -> Result<()> {
        match &mut self.backend {
            Backend::Native(native) => {
                native.start(&mut self.container, self.id, app, spec, bus)
            }
            Backend::InProcess(host) => host.start(self.id, app, bus),
        }
    }

    /// Start as an unbound quick-launcher (native runtimes only).
    pub fn start_quick_launcher(&mut self, bus: &EventBus) -> Result<()> {
        match &mut self.backend {
            Backend::Native(native) => {
                native.start_quick_launcher(&mut self.container, self.id, bus)?;
                self.is_quick_launcher = true;
                self.child_started = true;
                self.state = RunState::Active;
                Ok(())
            }
            Backend::InProcess(_) => {
                Err(Error::system("in-process runtimes cannot quick-launch"))
            }
        }
    }

    /// Bind a warm quick-launcher to an application.
    pub fn attach_application(&mut self, app: &Application) -> Result<()> {
        match &self.backend {
            Backend::Native(_) => {
                self.container.send_control(control_line(&serde_json::json!({
                    "op": "attach",
                    "id": app.id,
                    "mainFile": app.absolute_main_file(),
                    "runtimeParameters": app.runtime_parameters,
                })))?;
                self.application_id = Some(app.non_aliased_id().to_string());
                self.is_quick_launcher = false;
                Ok(())
            }
            Backend::InProcess(_) => Err(Error::system("in-process runtimes cannot attach")),
        }
    }

    /// Ask the application to open a document, now that it is active.
    pub fn open_document(&mut self, document: &str) {
        match &self.backend {
            Backend::Native(_) => {
                if self.container.has_control_channel() {
                    let line = control_line(&serde_json::json!({
                        "op": "open-document",
                        "url": document,
                    }));
                    if let Err(e) = self.container.send_control(line) {
                        warn!(runtime = %self.id, error = %e, "could not deliver openDocument");
                    }
                } else {
                    warn!(runtime = %self.id, "runtime has no control channel for openDocument");
                }
            }
            Backend::InProcess(host) => host.open_document(document),
        }
    }

    /// Graceful stop request (`aboutToStop` on the application side).
    pub fn request_quit(&mut self) {
        match &mut self.backend {
            Backend::Native(_) => {
                if self.container.has_control_channel() {
                    let line = control_line(&serde_json::json!({ "op": "quit" }));
                    if self.container.send_control(line).is_ok() {
                        return;
                    }
                }
                self.container.terminate();
            }
            Backend::InProcess(host) => host.quit(),
        }
    }

    /// POSIX `SIGKILL` equivalent; for in-process runtimes the hosted
    /// context is dropped and a synthetic crash is reported.
    pub fn force_kill(&mut self) {
        match &mut self.backend {
            Backend::Native(_) => self.container.kill(),
            Backend::InProcess(host) => host.force_kill(),
        }
    }

    pub fn set_slow_animations(&mut self, slow: bool) {
        self.slow_animations = slow;
        if let Backend::Native(_) = &self.backend {
            if self.container.has_control_channel() {
                let line = control_line(&serde_json::json!({
                    "op": "slow-animations",
                    "enabled": slow,
                }));
                let _ = self.container.send_control(line);
            }
        }
    }
}

fn control_line(value: &serde_json::Value) -> String {
    let mut line = value.to_string();
    line.push('\n');
    line
}

/// A registered runtime kind.
pub trait RuntimeManager: Send + Sync {
    fn kind(&self) -> &str;
    fn in_process(&self) -> bool;
    /// True when the launcher can be pre-started and attached later;
    /// such launchers provide the application interface themselves.
    fn supports_quick_launch(&self) -> bool;
    fn create_backend(&self, for_quick_launch: bool) -> Result<Backend>;
}

/// Registry of runtime kinds; produces [`Runtime`] objects bound to
/// containers.
pub struct RuntimeFactory {
    managers: Vec<Box<dyn RuntimeManager>>,
    next_id: std::sync::atomic::AtomicU64,
}

impl RuntimeFactory {
    pub fn new() -> Self {
        Self {
            managers: Vec::new(),
            next_id: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn register(&mut self, manager: Box<dyn RuntimeManager>) -> Result<()> {
        if self.manager(manager.kind()).is_some() {
            return Err(Error::new(
                am_core::ErrorKind::AlreadyExists,
                format!("runtime manager {:?} is already registered", manager.kind()),
            ));
        }
        self.managers.push(manager);
        Ok(())
    }

    pub fn manager(&self, kind: &str) -> Option<&dyn RuntimeManager> {
        self.managers
            .iter()
            .find(|m| m.kind() == kind)
            .map(|m| m.as_ref())
    }

    pub fn kinds(&self) -> Vec<String> {
        self.managers.iter().map(|m| m.kind().to_string()).collect()
    }

    pub fn quick_launch_kinds(&self) -> Vec<String> {
        self.managers
            .iter()
            .filter(|m| m.supports_quick_launch())
            .map(|m| m.kind().to_string())
            .collect()
    }

    /// Create an inactive runtime of `kind` bound to `container`.
    pub fn create(&self, kind: &str, container: Container) -> Result<Runtime> {
        self.create_inner(kind, container, false)
    }

    /// Create the quick-launcher variant (not yet bound to any
    /// application).
    pub fn create_quick_launcher(&self, kind: &str, container: Container) -> Result<Runtime> {
        self.create_inner(kind, container, true)
    }

    fn create_inner(
        &self,
        kind: &str,
        container: Container,
        for_quick_launch: bool,
    ) -> Result<Runtime> {
        let manager = self
            .manager(kind)
            .ok_or_else(|| Error::not_found(format!("no runtime manager for kind {kind:?}")))?;
        if for_quick_launch && !manager.supports_quick_launch() {
            return Err(Error::system(format!(
                "runtime kind {kind:?} does not support quick-launch"
            )));
        }
        let backend = manager.create_backend(for_quick_launch)?;
        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
            + 1;
        Ok(Runtime {
            id: RuntimeId(id),
            application_id: None,
            state: RunState::Inactive,
            is_quick_launcher: false,
            interface_connected: false,
            child_started: false,
            pending_document: None,
            slow_animations: false,
            runtime_kind: kind.to_string(),
            container,
            backend,
        })
    }
}

impl Default for RuntimeFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
