// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `native` runtime: the application runs as a child of a container.
//!
//! Without a configured launcher the entry file itself is executed.
//! With one (secondary identifiers like `qml`), the launcher binary runs
//! the entry file and speaks the control protocol on its stdin, which is
//! also what makes quick-launch possible.

use super::{Backend, RuntimeManager, StartSpec};
use crate::container::Container;
use crate::event_bus::EventBus;
use am_core::{Application, Error, Result, RuntimeId};
use std::path::PathBuf;

pub struct NativeRuntimeManager {
    identifier: String,
    /// Launcher binary hosting the entry file; None executes it directly
    launcher: Option<PathBuf>,
    /// Binary pre-started for the quick-launch pool
    quick_launch_program: Option<PathBuf>,
}

impl NativeRuntimeManager {
    pub const DEFAULT_IDENTIFIER: &'static str = "native";

    /// `config` is this kind's entry of the `runtimes` config map.
    pub fn new(identifier: impl Into<String>, config: &serde_json::Value) -> Self {
        let launcher = config
            .get("launcher")
            .and_then(|v| v.as_str())
            .map(PathBuf::from);
        let quick_launch_program = config
            .get("quickLaunchProgram")
            .and_then(|v| v.as_str())
            .map(PathBuf::from)
            .or_else(|| launcher.clone());
        Self {
            identifier: identifier.into(),
            launcher,
            quick_launch_program,
        }
    }
}

impl RuntimeManager for NativeRuntimeManager {
    fn kind(&self) -> &str {
        &self.identifier
    }

    fn in_process(&self) -> bool {
        false
    }

    fn supports_quick_launch(&self) -> bool {
        self.quick_launch_program.is_some()
    }

    fn create_backend(&self, _for_quick_launch: bool) -> Result<Backend> {
        Ok(Backend::Native(NativeBackend {
            launcher: self.launcher.clone(),
            quick_launch_program: self.quick_launch_program.clone(),
        }))
    }
}

pub struct NativeBackend {
    launcher: Option<PathBuf>,
    quick_launch_program: Option<PathBuf>,
}

impl NativeBackend {
    pub(super) fn start(
        &mut self,
        container: &mut Container,
        id: RuntimeId,
        app: &Application,
        spec: &mut StartSpec,
        bus: &EventBus,
    ) -> Result<()> {
        let main_file = app.absolute_main_file();
        let (program, mut arguments, control_channel) = match &self.launcher {
            Some(launcher) => (
                launcher.clone(),
                vec![main_file.display().to_string()],
                true,
            ),
            None => (main_file, Vec::new(), false),
        };
        arguments.extend(manifest_arguments(app));

        let mut env = vec![("AM_APPLICATION_ID".to_string(), app.id.clone())];
        if let Some(doc) = &spec.document {
            env.push(("AM_DOCUMENT_URL".to_string(), doc.clone()));
        }
        if !spec.system_properties.is_null() {
            env.push((
                "AM_SYSTEM_PROPERTIES".to_string(),
                spec.system_properties.to_string(),
            ));
        }

        container.set_base_dir(app.code_dir.clone());
        let mut stdio = std::mem::take(&mut spec.stdio);
        stdio.control_channel = control_channel;
        container.start(
            &program,
            &arguments,
            &env,
            stdio,
            spec.debug_wrapper.as_deref(),
            id,
            bus,
        )?;
        if control_channel {
            // the launcher's control pipe doubles as the application
            // interface channel
            let _ = bus.send(am_core::Event::RuntimeConnected { runtime: id });
        }
        Ok(())
    }

    pub(super) fn start_quick_launcher(
        &mut self,
        container: &mut Container,
        id: RuntimeId,
        bus: &EventBus,
    ) -> Result<()> {
        let program = self.quick_launch_program.clone().ok_or_else(|| {
            Error::system("this runtime kind has no quick-launch program configured")
        })?;
        container.start(
            &program,
            &[],
            &[],
            crate::container::StdioSpec {
                attach: [None, None, None],
                control_channel: true,
            },
            None,
            id,
            bus,
        )?;
        Ok(())
    }
}

/// The `arguments` runtime parameter, when present.
fn manifest_arguments(app: &Application) -> Vec<String> {
    app.runtime_parameters
        .get("arguments")
        .and_then(|v| v.as_array())
        .map(|values| {
            values
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
