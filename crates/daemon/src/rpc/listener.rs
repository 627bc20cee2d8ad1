// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-interface socket listeners.
//!
//! Each registered interface gets its own Unix socket; every incoming
//! call is checked against the interface's access policy using the
//! peer's socket credentials.

use crate::container::StdioSpec;
use crate::installer::Installer;
use crate::manager::ApplicationManager;
use crate::notifications::NotificationManager;
use crate::rpc::policy::Policy;
use crate::rpc::protocol::{self, Interface, Request, Response};
use crate::rpc::{fdpass, sidecar::SidecarFiles};
use am_core::{Error, ErrorKind, Result};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};

pub struct ListenCtx {
    pub manager: Arc<Mutex<ApplicationManager>>,
    pub installer: Arc<Installer>,
    pub notifications: Arc<Mutex<NotificationManager>>,
    pub policy: Policy,
}

pub struct RegisteredInterfaces {
    pub sidecars: SidecarFiles,
    pub handles: Vec<tokio::task::JoinHandle<()>>,
}

/// Map a configured bus name to a socket path.
///
/// `system` and `session` choose well-known locations; anything else is
/// an explicit path. `none` yields no registration.
pub fn resolve_bus_address(interface: Interface, bus: &str) -> Option<PathBuf> {
    match bus {
        "none" => None,
        "system" => Some(PathBuf::from(format!(
            "/run/appman/{}.socket",
            interface.name()
        ))),
        "session" => Some(crate::env::runtime_dir().join(format!("{}.socket", interface.name()))),
        explicit => Some(PathBuf::from(explicit)),
    }
}

/// Bind and announce every interface that is not configured `none`.
pub fn register_interfaces(
    buses: &std::collections::HashMap<String, String>,
    ctx: Arc<ListenCtx>,
) -> Result<RegisteredInterfaces> {
    let mut sidecars = SidecarFiles::default();
    let mut handles = Vec::new();

    info!("registering RPC interfaces:");
    for interface in Interface::ALL {
        let bus = buses
            .get(interface.name())
            .map(String::as_str)
            .unwrap_or("session");
        let Some(socket_path) = resolve_bus_address(interface, bus) else {
            debug!(interface = interface.name(), "interface not registered (bus: none)");
            continue;
        };

        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::new(
                    ErrorKind::Bus,
                    format!("could not create {}: {}", parent.display(), e),
                )
            })?;
        }
        if socket_path.exists() {
            let _ = std::fs::remove_file(&socket_path);
        }
        let listener = UnixListener::bind(&socket_path).map_err(|e| {
            Error::new(
                ErrorKind::Bus,
                format!("could not register object {} on {}: {}", interface, bus, e),
            )
        })?;
        info!(" * {} [on bus: {}]", socket_path.display(), bus);
        sidecars.write(interface, &socket_path.display().to_string())?;

        let ctx = Arc::clone(&ctx);
        handles.push(tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _)) => {
                        let ctx = Arc::clone(&ctx);
                        tokio::spawn(handle_connection(stream, interface, ctx));
                    }
                    Err(e) => {
                        warn!(interface = interface.name(), error = %e, "accept failed");
                        break;
                    }
                }
            }
        }));
    }
    Ok(RegisteredInterfaces { sidecars, handles })
}

async fn handle_connection(mut stream: UnixStream, interface: Interface, ctx: Arc<ListenCtx>) {
    let peer_uid = stream
        .peer_cred()
        .map(|cred| cred.uid())
        .unwrap_or(u32::MAX);

    loop {
        let request = match protocol::read_message(&mut stream).await {
            Ok(bytes) => match protocol::decode::<Request>(&bytes) {
                Ok(request) => request,
                Err(e) => {
                    let response = Response::Error {
                        kind: ErrorKind::Bus,
                        message: format!("unreadable request: {e}"),
                    };
                    let _ = write(&mut stream, &response).await;
                    return;
                }
            },
            Err(protocol::ProtocolError::ConnectionClosed) => return,
            Err(e) => {
                debug!(error = %e, "connection error");
                return;
            }
        };

        // interface scoping, then the configured policy
        if let Some(required) = request.interface() {
            if required != interface {
                let response = Response::Error {
                    kind: ErrorKind::Bus,
                    message: format!(
                        "{} is not published on the {} interface",
                        request.method_name(),
                        interface
                    ),
                };
                if write(&mut stream, &response).await.is_err() {
                    return;
                }
                continue;
            }
        }
        if let Err(e) = ctx.policy.check(interface, request.method_name(), peer_uid) {
            warn!(interface = interface.name(), method = request.method_name(), peer_uid, "policy violation");
            if write(&mut stream, &Response::error(&e)).await.is_err() {
                return;
            }
            continue;
        }

        match request {
            Request::SubscribeInstaller => {
                stream_signals(stream, ctx).await;
                return;
            }
            request => {
                let response = dispatch(request, &mut stream, &ctx).await;
                if write(&mut stream, &response).await.is_err() {
                    return;
                }
            }
        }
    }
}

async fn write(stream: &mut UnixStream, response: &Response) -> Result<()> {
    protocol::write_response(stream, response, protocol::DEFAULT_TIMEOUT)
        .await
        .map_err(|e| Error::new(ErrorKind::Bus, e.to_string()))
}

/// Forward installer signals until the client goes away.
async fn stream_signals(mut stream: UnixStream, ctx: Arc<ListenCtx>) {
    let mut signals = ctx.installer.subscribe();
    if write(&mut stream, &Response::Ok).await.is_err() {
        return;
    }
    loop {
        match signals.recv().await {
            Ok(signal) => {
                if write(&mut stream, &Response::Signal { signal }).await.is_err() {
                    return;
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                warn!(missed = n, "installer signal subscriber lagged");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
        }
    }
}

async fn dispatch(request: Request, stream: &mut UnixStream, ctx: &Arc<ListenCtx>) -> Response {
    match request {
        Request::Ping => Response::Pong,
        Request::Hello { version } => {
            debug!(client_version = version, "hello");
            Response::Hello {
                version: protocol::PROTOCOL_VERSION.to_string(),
            }
        }

        Request::StartApplication {
            id,
            document_url,
            attach_stdio,
        } => {
            let mut stdio = StdioSpec::default();
            if !attach_stdio.is_empty() {
                if write(stream, &Response::SendFds { count: attach_stdio.len() }).await.is_err() {
                    return Response::Error {
                        kind: ErrorKind::Bus,
                        message: "connection lost during fd transfer".into(),
                    };
                }
                match fdpass::recv_fds(stream, attach_stdio.len()).await {
                    Ok(fds) => {
                        for (slot, fd) in attach_stdio.iter().zip(fds) {
                            stdio.attach[slot.index()] = Some(fd);
                        }
                    }
                    Err(e) => {
                        return Response::Error {
                            kind: ErrorKind::Bus,
                            message: format!("fd transfer failed: {e}"),
                        }
                    }
                }
            }
            match ctx
                .manager
                .lock()
                .start_application(&id, document_url, stdio, None)
            {
                Ok(value) => Response::Bool { value },
                Err(e) => Response::error(&e),
            }
        }

        Request::DebugApplication {
            debug_wrapper,
            id,
            document_url,
        } => match ctx.manager.lock().start_application(
            &id,
            document_url,
            StdioSpec::default(),
            Some(&debug_wrapper),
        ) {
            Ok(value) => Response::Bool { value },
            Err(e) => Response::error(&e),
        },

        Request::StopApplication { id, force_kill } => {
            match ctx.manager.lock().stop_application(&id, force_kill) {
                Ok(()) => Response::Ok,
                Err(e) => Response::error(&e),
            }
        }

        Request::ApplicationIds => Response::Ids {
            ids: ctx.manager.lock().application_ids(),
        },

        Request::GetApplication { id } => match ctx.manager.lock().get(&id) {
            Some(map) => Response::Map { map },
            None => Response::error(&Error::not_found(format!("no application {id:?}"))),
        },

        Request::StartPackageInstallation {
            location_id,
            package_path,
        } => match ctx
            .installer
            .start_package_installation(&location_id, package_path)
        {
            Ok(task_id) => Response::TaskCreated { task_id },
            Err(e) => Response::error(&e),
        },

        Request::AcknowledgePackageInstallation { task_id } => {
            match ctx.installer.acknowledge_package_installation(&task_id) {
                Ok(()) => Response::Ok,
                Err(e) => Response::error(&e),
            }
        }

        Request::CancelTask { task_id } => match ctx.installer.cancel_task(&task_id) {
            Ok(()) => Response::Ok,
            Err(e) => Response::error(&e),
        },

        Request::RemovePackage {
            id,
            keep_documents,
            force,
        } => {
            let running = ctx.manager.lock().is_running(&id);
            match ctx.installer.remove_package(&id, keep_documents, force, running) {
                Ok(task_id) => Response::TaskCreated { task_id },
                Err(e) => Response::error(&e),
            }
        }

        Request::InstallationLocationIds => Response::Ids {
            ids: ctx.installer.installation_location_ids(),
        },

        Request::GetInstallationLocation { id } => {
            match ctx.installer.get_installation_location(&id) {
                Some(map) => Response::Map { map },
                None => Response::error(&Error::not_found(format!(
                    "no installation location {id:?}"
                ))),
            }
        }

        Request::GetTaskState { task_id } => match ctx.installer.task_state(&task_id) {
            Some((kind, state)) => Response::TaskState { kind, state },
            None => Response::error(&Error::not_found(format!("no task {task_id}"))),
        },

        // handled by the caller
        Request::SubscribeInstaller => Response::Ok,

        Request::Notify {
            app_id,
            replaces_id,
            summary,
            body,
            icon,
            timeout,
        } => {
            let id = ctx
                .notifications
                .lock()
                .notify(app_id, replaces_id, summary, body, icon, timeout);
            Response::NotificationId { id }
        }

        Request::CloseNotification { id } => Response::Bool {
            value: ctx.notifications.lock().close(id),
        },
    }
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
