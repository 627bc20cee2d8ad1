// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One handler per sub-command.

use crate::client::{Client, SignalStream};
use crate::exit_error::ExitError;
use am_daemon::protocol::{InstallerSignal, Request, Response, StdStream};
use am_daemon::rpc::Interface;
use anyhow::{bail, Context, Result};
use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::path::PathBuf;

fn refused(response: Response, what: &str) -> anyhow::Error {
    match response {
        Response::Error { message, .. } => {
            ExitError::remote_refusal(format!("failed to call {what}: {message}")).into()
        }
        other => ExitError::remote_refusal(format!("unexpected reply to {what}: {other:?}")).into(),
    }
}

pub async fn start_application(
    id: &str,
    document_url: Option<String>,
    attach_stdin: bool,
    attach_stdout: bool,
    attach_stderr: bool,
) -> Result<()> {
    let mut attach_stdio = Vec::new();
    let mut fds = Vec::new();
    if attach_stdin {
        attach_stdio.push(StdStream::In);
        fds.push(std::io::stdin().as_raw_fd());
    }
    if attach_stdout {
        attach_stdio.push(StdStream::Out);
        fds.push(std::io::stdout().as_raw_fd());
    }
    if attach_stderr {
        attach_stdio.push(StdStream::Err);
        fds.push(std::io::stderr().as_raw_fd());
    }

    let mut client = Client::connect(Interface::ApplicationManager).await?;
    let mut response = client
        .request(&Request::StartApplication {
            id: id.to_string(),
            document_url,
            attach_stdio,
        })
        .await?;
    if let Response::SendFds { count } = response {
        if count != fds.len() {
            bail!("manager asked for {count} fds, have {}", fds.len());
        }
        client.send_fds(&fds).await?;
        response = client.read_response().await?;
    }
    match response {
        Response::Bool { value: true } => Ok(()),
        Response::Bool { value: false } => {
            Err(ExitError::remote_refusal(format!("could not start application {id}")).into())
        }
        other => Err(refused(other, "startApplication")),
    }
}

pub async fn debug_application(
    debug_wrapper: &str,
    id: &str,
    document_url: Option<String>,
) -> Result<()> {
    let mut client = Client::connect(Interface::ApplicationManager).await?;
    let response = client
        .request(&Request::DebugApplication {
            debug_wrapper: debug_wrapper.to_string(),
            id: id.to_string(),
            document_url,
        })
        .await?;
    match response {
        Response::Bool { value: true } => Ok(()),
        Response::Bool { value: false } => {
            Err(ExitError::remote_refusal(format!("could not debug application {id}")).into())
        }
        other => Err(refused(other, "debugApplication")),
    }
}

pub async fn stop_application(id: &str) -> Result<()> {
    let mut client = Client::connect(Interface::ApplicationManager).await?;
    match client
        .request(&Request::StopApplication {
            id: id.to_string(),
            force_kill: false,
        })
        .await?
    {
        Response::Ok => Ok(()),
        other => Err(refused(other, "stopApplication")),
    }
}

pub async fn list_applications() -> Result<()> {
    let mut client = Client::connect(Interface::ApplicationManager).await?;
    match client.request(&Request::ApplicationIds).await? {
        Response::Ids { ids } => {
            println!("{}", ids.join("\n"));
            Ok(())
        }
        other => Err(refused(other, "applicationIds")),
    }
}

pub async fn show_application(id: &str) -> Result<()> {
    let mut client = Client::connect(Interface::ApplicationManager).await?;
    match client
        .request(&Request::GetApplication { id: id.to_string() })
        .await?
    {
        Response::Map { map } => {
            print!("{}", serde_yaml::to_string(&map)?);
            Ok(())
        }
        other => Err(refused(other, "get")),
    }
}

pub async fn install_package(package: &str, location: &str) -> Result<()> {
    // `-` copies stdin into a temp file, kept alive until the daemon
    // has read it
    let mut _stdin_copy = None;
    let package_file = if package == "-" {
        let mut file = tempfile::NamedTempFile::new()
            .context("could not create a temporary package file")?;
        let mut stdin = std::io::stdin().lock();
        let mut buffer = [0u8; 64 * 1024];
        loop {
            let n = stdin.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            file.write_all(&buffer[..n])?;
        }
        file.flush()?;
        let path = file.path().to_path_buf();
        _stdin_copy = Some(file);
        path
    } else {
        PathBuf::from(package)
    };

    let metadata = std::fs::metadata(&package_file)
        .with_context(|| format!("package file is not readable: {}", package_file.display()))?;
    if !metadata.is_file() {
        bail!("package file is not readable: {}", package_file.display());
    }
    let package_file = package_file
        .canonicalize()
        .unwrap_or(package_file);

    println!(
        "Starting installation of package {} to {}...",
        package_file.display(),
        location
    );

    let mut signals = SignalStream::subscribe().await?;
    let mut client = Client::connect(Interface::ApplicationInstaller).await?;

    let task_id = match client
        .request(&Request::StartPackageInstallation {
            location_id: location.to_string(),
            package_path: package_file,
        })
        .await?
    {
        Response::TaskCreated { task_id } => task_id,
        other => return Err(refused(other, "startPackageInstallation")),
    };

    loop {
        match signals.next().await? {
            InstallerSignal::RequiresAcknowledge {
                task_id: signal_task,
                manifest,
            } if signal_task == task_id => {
                let application_id = manifest
                    .get("id")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                if application_id.is_empty() {
                    return Err(ExitError::event_failure(
                        "could not find a valid application id in the package",
                    )
                    .into());
                }
                println!("Acknowledging package installation...");
                match client
                    .request(&Request::AcknowledgePackageInstallation {
                        task_id: task_id.clone(),
                    })
                    .await?
                {
                    Response::Ok => {}
                    other => return Err(refused(other, "acknowledgePackageInstallation")),
                }
            }
            InstallerSignal::Finished {
                task_id: signal_task,
            } if signal_task == task_id => {
                println!("Package installation finished successfully.");
                return Ok(());
            }
            InstallerSignal::Failed {
                task_id: signal_task,
                code,
                message,
            } if signal_task == task_id => {
                return Err(ExitError::event_failure(format!(
                    "failed to install package: {message} (code: {code})"
                ))
                .into());
            }
            _ => {}
        }
    }
}

pub async fn remove_package(id: &str, keep_documents: bool, force: bool) -> Result<()> {
    println!("Starting removal of package {id}...");

    let mut signals = SignalStream::subscribe().await?;
    let mut client = Client::connect(Interface::ApplicationInstaller).await?;

    let task_id = match client
        .request(&Request::RemovePackage {
            id: id.to_string(),
            keep_documents,
            force,
        })
        .await?
    {
        Response::TaskCreated { task_id } => task_id,
        other => return Err(refused(other, "removePackage")),
    };

    loop {
        match signals.next().await? {
            InstallerSignal::Finished {
                task_id: signal_task,
            } if signal_task == task_id => {
                println!("Package removal finished successfully.");
                return Ok(());
            }
            InstallerSignal::Failed {
                task_id: signal_task,
                code,
                message,
            } if signal_task == task_id => {
                return Err(ExitError::event_failure(format!(
                    "failed to remove package: {message} (code: {code})"
                ))
                .into());
            }
            _ => {}
        }
    }
}

pub async fn list_installation_locations() -> Result<()> {
    let mut client = Client::connect(Interface::ApplicationInstaller).await?;
    match client.request(&Request::InstallationLocationIds).await? {
        Response::Ids { ids } => {
            println!("{}", ids.join("\n"));
            Ok(())
        }
        other => Err(refused(other, "installationLocationIds")),
    }
}

pub async fn show_installation_location(id: &str) -> Result<()> {
    let mut client = Client::connect(Interface::ApplicationInstaller).await?;
    match client
        .request(&Request::GetInstallationLocation { id: id.to_string() })
        .await?
    {
        Response::Map { map } => {
            print!("{}", serde_yaml::to_string(&map)?);
            Ok(())
        }
        other => Err(refused(other, "getInstallationLocation")),
    }
}
