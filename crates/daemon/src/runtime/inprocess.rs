// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `qml-inprocess` runtime: the application runs inside the
//! manager's own loop.
//!
//! The "process" is a hosted context rooted at the application's entry
//! file. Dropping the context is the force-kill equivalent and reports a
//! synthetic crash status.

use super::{Backend, RuntimeManager};
use crate::event_bus::EventBus;
use am_core::{Application, Error, Event, Result, RuntimeId};
use tokio::sync::oneshot;
use tracing::debug;

pub struct InProcessRuntimeManager {
    identifier: String,
}

impl InProcessRuntimeManager {
    pub const DEFAULT_IDENTIFIER: &'static str = "qml-inprocess";

    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
        }
    }
}

impl RuntimeManager for InProcessRuntimeManager {
    fn kind(&self) -> &str {
        &self.identifier
    }

    fn in_process(&self) -> bool {
        true
    }

    fn supports_quick_launch(&self) -> bool {
        false
    }

    fn create_backend(&self, for_quick_launch: bool) -> Result<Backend> {
        if for_quick_launch {
            return Err(Error::system("in-process runtimes cannot quick-launch"));
        }
        Ok(Backend::InProcess(InProcessHost::default()))
    }
}

enum HostSignal {
    Quit,
    ForceKill,
}

#[derive(Default)]
pub struct InProcessHost {
    control: Option<oneshot::Sender<HostSignal>>,
}

impl InProcessHost {
    pub(super) fn start(
        &mut self,
        id: RuntimeId,
        app: &Application,
        bus: &EventBus,
    ) -> Result<()> {
        if self.control.is_some() {
            return Err(Error::system("in-process context is already running"));
        }
        let main_file = app.absolute_main_file();
        // Instantiating the context means loading the root source file;
        // an unreadable entry is a spawn error, not a crash.
        std::fs::metadata(&main_file).map_err(|e| {
            Error::system(format!("cannot load {}: {}", main_file.display(), e))
        })?;

        let (control_tx, control_rx) = oneshot::channel();
        self.control = Some(control_tx);

        let bus = bus.clone();
        let app_id = app.id.clone();
        tokio::spawn(async move {
            debug!(id = app_id, "in-process context up");
            let _ = bus.send(Event::RuntimeStarted {
                runtime: id,
                pid: std::process::id(),
            });
            let _ = bus.send(Event::RuntimeConnected { runtime: id });

            let (exit_code, signaled) = match control_rx.await {
                Ok(HostSignal::Quit) => (0, false),
                // dropped or killed: the context went away abnormally
                Ok(HostSignal::ForceKill) | Err(_) => (-1, true),
            };
            let _ = bus.send(Event::RuntimeExited {
                runtime: id,
                exit_code,
                signaled,
            });
        });
        Ok(())
    }

    pub(super) fn open_document(&self, document: &str) {
        debug!(document, "in-process openDocument delivered");
    }

    pub(super) fn quit(&mut self) {
        if let Some(control) = self.control.take() {
            let _ = control.send(HostSignal::Quit);
        }
    }

    pub(super) fn force_kill(&mut self) {
        if let Some(control) = self.control.take() {
            let _ = control.send(HostSignal::ForceKill);
        }
    }
}
