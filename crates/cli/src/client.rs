// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection handling towards a running appmand.
//!
//! The daemon writes one sidecar file per interface; resolving it gives
//! the interface's socket address. Installer signals arrive on a second,
//! subscribed connection.

use am_daemon::protocol::{self, InstallerSignal, Request, Response};
use am_daemon::rpc::sidecar;
use am_daemon::rpc::Interface;
use anyhow::{anyhow, bail, Context, Result};
use tokio::net::UnixStream;

pub struct Client {
    stream: UnixStream,
}

impl Client {
    pub async fn connect(interface: Interface) -> Result<Self> {
        let address = sidecar::read_sidecar(interface).map_err(|e| anyhow!(e.message))?;
        let stream = UnixStream::connect(&address).await.with_context(|| {
            format!(
                "could not connect to the {} interface at {}",
                interface,
                address.display()
            )
        })?;
        Ok(Self { stream })
    }

    pub async fn request(&mut self, request: &Request) -> Result<Response> {
        let bytes = protocol::encode(request)?;
        protocol::write_message(&mut self.stream, &bytes).await?;
        self.read_response().await
    }

    pub async fn read_response(&mut self) -> Result<Response> {
        let bytes = protocol::read_message(&mut self.stream).await?;
        Ok(protocol::decode(&bytes)?)
    }

    /// Pass raw fds after a `SendFds` reply.
    pub async fn send_fds(&mut self, fds: &[std::os::fd::RawFd]) -> Result<()> {
        am_daemon::rpc::fdpass::send_fds(&self.stream, fds).await?;
        Ok(())
    }
}

/// A connection switched into the installer signal stream.
pub struct SignalStream {
    client: Client,
}

impl SignalStream {
    pub async fn subscribe() -> Result<Self> {
        let mut client = Client::connect(Interface::ApplicationInstaller).await?;
        match client.request(&Request::SubscribeInstaller).await? {
            Response::Ok => Ok(Self { client }),
            Response::Error { message, .. } => bail!("could not subscribe: {message}"),
            other => bail!("unexpected subscribe reply: {other:?}"),
        }
    }

    pub async fn next(&mut self) -> Result<InstallerSignal> {
        match self.client.read_response().await? {
            Response::Signal { signal } => Ok(signal),
            other => bail!("unexpected message on the signal stream: {other:?}"),
        }
    }
}
