// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Containers: the isolation wrapper around one runtime's OS process.
//!
//! The built-in `process` kind is a plain host child process with
//! forwarded (or attached) standard streams and optional control-group
//! assignment. Other kinds can be registered at startup; the factory
//! picks the kind for an application through the ordered
//! container-selection list.

use crate::event_bus::EventBus;
use am_core::{Error, Event, Result, RuntimeId};
use std::os::fd::OwnedFd;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub const PROCESS_CONTAINER: &str = "process";

/// Standard-stream wiring for a container process.
#[derive(Default)]
pub struct StdioSpec {
    /// Client-provided fds for stdin/stdout/stderr; `None` entries inherit
    pub attach: [Option<OwnedFd>; 3],
    /// Pipe stdin for the runtime control channel (quick-launch attach,
    /// openDocument); wins over an attached stdin
    pub control_channel: bool,
}

pub struct Container {
    kind: String,
    base_dir: PathBuf,
    config: serde_json::Value,
    control_group: Option<String>,
    process: Option<StartedProcess>,
}

struct StartedProcess {
    pid: u32,
    control_tx: Option<mpsc::UnboundedSender<String>>,
}

impl Container {
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    pub fn set_base_dir(&mut self, dir: PathBuf) {
        self.base_dir = dir;
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().map(|p| p.pid)
    }

    pub fn is_started(&self) -> bool {
        self.process.is_some()
    }

    pub fn control_group(&self) -> Option<&str> {
        self.control_group.as_deref()
    }

    /// Start the container process.
    ///
    /// `debug_wrapper` is a resolved wrapper command with `%program%` and
    /// `%arguments%` placeholders. The child is monitored; its exit
    /// arrives on the bus as `runtime:exited` for `runtime`.
    pub fn start(
        &mut self,
        program: &PathBuf,
        arguments: &[String],
        env: &[(String, String)],
        stdio: StdioSpec,
        debug_wrapper: Option<&[String]>,
        runtime: RuntimeId,
        bus: &EventBus,
    ) -> Result<u32> {
        if self.process.is_some() {
            return Err(Error::system(format!(
                "container process {} is already started",
                program.display()
            )));
        }
        if !program.exists() {
            return Err(Error::not_found(format!(
                "no such program: {}",
                program.display()
            )));
        }

        let (argv0, argv) = match debug_wrapper {
            Some(wrapper) => resolve_debug_wrapper(wrapper, program, arguments)?,
            None => (program.clone(), arguments.to_vec()),
        };

        let mut command = tokio::process::Command::new(&argv0);
        command.args(&argv);
        if self.base_dir.is_dir() {
            command.current_dir(&self.base_dir);
        }
        command.envs(env.iter().map(|(k, v)| (k, v)));

        let [fd_in, fd_out, fd_err] = stdio.attach;
        if stdio.control_channel {
            command.stdin(Stdio::piped());
        } else if let Some(fd) = fd_in {
            command.stdin(Stdio::from(fd));
        }
        if let Some(fd) = fd_out {
            command.stdout(Stdio::from(fd));
        }
        if let Some(fd) = fd_err {
            command.stderr(Stdio::from(fd));
        }

        if self.config_bool("stopBeforeExec") {
            eprintln!(
                "\n*** a '{}' container was started in stopped state ***\n\
                 the process is suspended via SIGSTOP and you can attach a debugger to it\n",
                self.kind
            );
            unsafe {
                command.pre_exec(|| {
                    // between fork and exec: only async-signal-safe calls
                    unsafe {
                        libc::raise(libc::SIGSTOP);
                    }
                    Ok(())
                });
            }
        }

        debug!(program = %argv0.display(), args = ?argv, "running command");
        let mut child = command
            .spawn()
            .map_err(|e| Error::system(format!("cannot start {}: {}", argv0.display(), e)))?;
        let pid = child.id().unwrap_or_default();

        let control_tx = child.stdin.take().map(|mut stdin| {
            let (tx, mut rx) = mpsc::unbounded_channel::<String>();
            tokio::spawn(async move {
                while let Some(line) = rx.recv().await {
                    if stdin.write_all(line.as_bytes()).await.is_err() {
                        break;
                    }
                    let _ = stdin.flush().await;
                }
                // keep the pipe open until the container goes away
                std::mem::drop(stdin);
            });
            tx
        });

        let monitor_bus = bus.clone();
        tokio::spawn(async move {
            let _ = monitor_bus.send(Event::RuntimeStarted { runtime, pid });
            let (exit_code, signaled) = match child.wait().await {
                Ok(status) => match status.signal() {
                    Some(sig) => (128 + sig, true),
                    None => (status.code().unwrap_or(-1), false),
                },
                Err(e) => {
                    warn!(%runtime, error = %e, "waiting for container process failed");
                    (-1, false)
                }
            };
            let _ = monitor_bus.send(Event::RuntimeExited {
                runtime,
                exit_code,
                signaled,
            });
        });

        self.process = Some(StartedProcess { pid, control_tx });

        if let Some(group) = self.config_str("defaultControlGroup") {
            let group = group.to_string();
            if !self.set_control_group(&group) {
                warn!(group, "failed to assign the default control group");
            }
        }
        Ok(pid)
    }

    /// Send one line on the runtime control channel.
    pub fn send_control(&self, line: String) -> Result<()> {
        let tx = self
            .process
            .as_ref()
            .and_then(|p| p.control_tx.as_ref())
            .ok_or_else(|| Error::system("container has no control channel"))?;
        tx.send(line)
            .map_err(|_| Error::system("container control channel is gone"))
    }

    pub fn has_control_channel(&self) -> bool {
        self.process
            .as_ref()
            .is_some_and(|p| p.control_tx.is_some())
    }

    pub fn terminate(&self) {
        self.signal(nix::sys::signal::Signal::SIGTERM);
    }

    pub fn kill(&self) {
        self.signal(nix::sys::signal::Signal::SIGKILL);
    }

    fn signal(&self, signal: nix::sys::signal::Signal) {
        let Some(pid) = self.pid() else {
            return;
        };
        let _ = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), signal);
    }

    /// Move the process into a configured control group.
    ///
    /// The `controlGroups` config maps a group name to
    /// `resource → user class`; assignment writes the pid into each
    /// matching `/sys/fs/cgroup/<resource>/<class>/cgroup.procs`.
    pub fn set_control_group(&mut self, group_name: &str) -> bool {
        if Some(group_name) == self.control_group.as_deref() {
            return true;
        }
        let Some(pid) = self.pid() else {
            return false;
        };
        let Some(mapping) = self
            .config
            .get("controlGroups")
            .and_then(|g| g.get(group_name))
            .and_then(|m| m.as_object())
        else {
            return false;
        };

        for (resource, class) in mapping {
            let Some(class) = class.as_str() else {
                return false;
            };
            let path = format!("/sys/fs/cgroup/{resource}/{class}/cgroup.procs");
            if std::fs::write(&path, format!("{pid}\n")).is_err() {
                warn!(pid, resource, class, "failed setting control group");
                return false;
            }
        }
        self.control_group = Some(group_name.to_string());
        true
    }

    fn config_bool(&self, key: &str) -> bool {
        self.config.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
    }

    fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(|v| v.as_str())
    }
}

fn resolve_debug_wrapper(
    wrapper: &[String],
    program: &PathBuf,
    arguments: &[String],
) -> Result<(PathBuf, Vec<String>)> {
    let mut resolved: Vec<String> = Vec::with_capacity(wrapper.len() + arguments.len());
    for part in wrapper {
        match part.as_str() {
            "%program%" => resolved.push(program.display().to_string()),
            "%arguments%" => resolved.extend(arguments.iter().cloned()),
            _ => resolved.push(part.clone()),
        }
    }
    if resolved.is_empty() {
        return Err(Error::parse("debug wrapper resolves to an empty command"));
    }
    let argv0 = PathBuf::from(resolved.remove(0));
    Ok((argv0, resolved))
}

/// A registered container kind.
pub trait ContainerManager: Send + Sync {
    fn kind(&self) -> &str;
    fn supports_quick_launch(&self) -> bool;
    fn create(&self) -> Container;
}

/// The built-in host-process container.
pub struct ProcessContainerManager {
    config: serde_json::Value,
}

impl ProcessContainerManager {
    pub fn new(config: serde_json::Value) -> Self {
        Self { config }
    }
}

impl ContainerManager for ProcessContainerManager {
    fn kind(&self) -> &str {
        PROCESS_CONTAINER
    }

    fn supports_quick_launch(&self) -> bool {
        true
    }

    fn create(&self) -> Container {
        Container {
            kind: PROCESS_CONTAINER.to_string(),
            base_dir: PathBuf::new(),
            config: self.config.clone(),
            control_group: None,
            process: None,
        }
    }
}

/// Registry of container kinds plus the selection list.
pub struct ContainerFactory {
    managers: Vec<Box<dyn ContainerManager>>,
    selection: Vec<(glob::Pattern, String)>,
}

impl ContainerFactory {
    pub fn new() -> Self {
        Self {
            managers: Vec::new(),
            selection: Vec::new(),
        }
    }

    pub fn register(&mut self, manager: Box<dyn ContainerManager>) -> Result<()> {
        if self.manager(manager.kind()).is_some() {
            return Err(Error::new(
                am_core::ErrorKind::AlreadyExists,
                format!("container manager {:?} is already registered", manager.kind()),
            ));
        }
        self.managers.push(manager);
        Ok(())
    }

    pub fn manager(&self, kind: &str) -> Option<&dyn ContainerManager> {
        self.managers
            .iter()
            .find(|m| m.kind() == kind)
            .map(|m| m.as_ref())
    }

    pub fn kinds(&self) -> Vec<String> {
        self.managers.iter().map(|m| m.kind().to_string()).collect()
    }

    pub fn create(&self, kind: &str) -> Result<Container> {
        self.manager(kind)
            .map(|m| m.create())
            .ok_or_else(|| Error::not_found(format!("no container manager for kind {kind:?}")))
    }

    /// Install the ordered `(glob, kind)` selection list.
    pub fn set_selection(&mut self, pairs: &[(String, String)]) -> Result<()> {
        self.selection.clear();
        for (pattern, kind) in pairs {
            let compiled = glob::Pattern::new(pattern)
                .map_err(|e| Error::parse(format!("bad container-selection glob {pattern:?}: {e}")))?;
            self.selection.push((compiled, kind.clone()));
        }
        Ok(())
    }

    /// First selection match wins; the default is the `process` kind.
    pub fn select_kind(&self, application_id: &str) -> &str {
        self.selection
            .iter()
            .find(|(pattern, _)| pattern.matches(application_id))
            .map(|(_, kind)| kind.as_str())
            .unwrap_or(PROCESS_CONTAINER)
    }
}

impl Default for ContainerFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "container_tests.rs"]
mod tests;
