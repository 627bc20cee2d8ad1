// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The RPC wire protocol.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload. Each
//! registered interface listens on its own Unix socket; clients find the
//! address through the `/tmp/<interface>.bus` sidecar file.

use am_core::{ErrorKind, TaskId};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub use crate::installer::{InstallerSignal, TaskKind, TaskState};

/// The three published interfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interface {
    ApplicationManager,
    ApplicationInstaller,
    NotificationManager,
}

impl Interface {
    pub const ALL: [Interface; 3] = [
        Interface::ApplicationManager,
        Interface::ApplicationInstaller,
        Interface::NotificationManager,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Interface::ApplicationManager => "ApplicationManager",
            Interface::ApplicationInstaller => "ApplicationInstaller",
            Interface::NotificationManager => "NotificationManager",
        }
    }
}

impl std::fmt::Display for Interface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Standard streams a controller can hand over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StdStream {
    In,
    Out,
    Err,
}

impl StdStream {
    pub fn index(self) -> usize {
        match self {
            StdStream::In => 0,
            StdStream::Out => 1,
            StdStream::Err => 2,
        }
    }
}

/// Request from a client to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    /// Health check ping
    Ping,

    /// Version handshake
    Hello { version: String },

    // -- ApplicationManager --
    StartApplication {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        document_url: Option<String>,
        /// Streams the client will pass as fds after a `SendFds` reply
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        attach_stdio: Vec<StdStream>,
    },

    DebugApplication {
        debug_wrapper: String,
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        document_url: Option<String>,
    },

    StopApplication {
        id: String,
        #[serde(default)]
        force_kill: bool,
    },

    ApplicationIds,

    GetApplication { id: String },

    // -- ApplicationInstaller --
    StartPackageInstallation {
        location_id: String,
        package_path: PathBuf,
    },

    AcknowledgePackageInstallation { task_id: TaskId },

    CancelTask { task_id: TaskId },

    RemovePackage {
        id: String,
        #[serde(default)]
        keep_documents: bool,
        #[serde(default)]
        force: bool,
    },

    InstallationLocationIds,

    GetInstallationLocation { id: String },

    GetTaskState { task_id: TaskId },

    /// Switch this connection into a signal stream
    SubscribeInstaller,

    // -- NotificationManager --
    Notify {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        app_id: Option<String>,
        #[serde(default)]
        replaces_id: u32,
        summary: String,
        #[serde(default)]
        body: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        icon: Option<String>,
        /// Milliseconds; -1 lets the server decide, 0 never expires
        #[serde(default)]
        timeout: i32,
    },

    CloseNotification { id: u32 },
}

impl Request {
    /// Method name as used in the per-interface access policies.
    pub fn method_name(&self) -> &'static str {
        match self {
            Request::Ping => "ping",
            Request::Hello { .. } => "hello",
            Request::StartApplication { .. } => "startApplication",
            Request::DebugApplication { .. } => "debugApplication",
            Request::StopApplication { .. } => "stopApplication",
            Request::ApplicationIds => "applicationIds",
            Request::GetApplication { .. } => "get",
            Request::StartPackageInstallation { .. } => "startPackageInstallation",
            Request::AcknowledgePackageInstallation { .. } => "acknowledgePackageInstallation",
            Request::CancelTask { .. } => "cancelTask",
            Request::RemovePackage { .. } => "removePackage",
            Request::InstallationLocationIds => "installationLocationIds",
            Request::GetInstallationLocation { .. } => "getInstallationLocation",
            Request::GetTaskState { .. } => "taskState",
            Request::SubscribeInstaller => "subscribe",
            Request::Notify { .. } => "notify",
            Request::CloseNotification { .. } => "closeNotification",
        }
    }

    /// Which interface serves this request; `None` means any.
    pub fn interface(&self) -> Option<Interface> {
        match self {
            Request::Ping | Request::Hello { .. } => None,
            Request::StartApplication { .. }
            | Request::DebugApplication { .. }
            | Request::StopApplication { .. }
            | Request::ApplicationIds
            | Request::GetApplication { .. } => Some(Interface::ApplicationManager),
            Request::StartPackageInstallation { .. }
            | Request::AcknowledgePackageInstallation { .. }
            | Request::CancelTask { .. }
            | Request::RemovePackage { .. }
            | Request::InstallationLocationIds
            | Request::GetInstallationLocation { .. }
            | Request::GetTaskState { .. }
            | Request::SubscribeInstaller => Some(Interface::ApplicationInstaller),
            Request::Notify { .. } | Request::CloseNotification { .. } => {
                Some(Interface::NotificationManager)
            }
        }
    }
}

/// Response from the daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Response {
    /// Generic success
    Ok,

    /// Health check response
    Pong,

    /// Version handshake response
    Hello { version: String },

    /// Boolean reply (`startApplication`, ...)
    Bool { value: bool },

    /// Id list reply
    Ids { ids: Vec<String> },

    /// Serialized object reply (`get`, `getInstallationLocation`)
    Map { map: serde_json::Value },

    /// A task was created
    TaskCreated { task_id: TaskId },

    /// Task state reply
    TaskState { kind: TaskKind, state: TaskState },

    /// Notification created or replaced
    NotificationId { id: u32 },

    /// The daemon is ready to receive `count` fds over the socket
    SendFds { count: usize },

    /// Streamed installer signal (after `SubscribeInstaller`)
    Signal { signal: InstallerSignal },

    /// Error reply
    Error { kind: ErrorKind, message: String },
}

impl Response {
    pub fn error(e: &am_core::Error) -> Self {
        Response::Error {
            kind: e.kind,
            message: e.message.clone(),
        }
    }
}

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Timeout")]
    Timeout,
}

/// Maximum message size (16 MB)
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Default request/response timeout
pub const DEFAULT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Protocol version
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Encode a message to JSON bytes (without length prefix).
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, ProtocolError> {
    let json = serde_json::to_vec(msg)?;
    if json.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: json.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(json)
}

/// Decode a message from wire format.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Read a length-prefixed message from an async reader.
pub async fn read_message<R: tokio::io::AsyncReadExt + Unpin>(
    reader: &mut R,
) -> Result<Vec<u8>, ProtocolError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::ConnectionClosed);
        }
        Err(e) => return Err(ProtocolError::Io(e)),
    }
    let len = u32::from_be_bytes(len_buf) as usize;

    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Write a length-prefixed message to an async writer.
pub async fn write_message<W: tokio::io::AsyncWriteExt + Unpin>(
    writer: &mut W,
    data: &[u8],
) -> Result<(), ProtocolError> {
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: data.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    writer.write_all(&(data.len() as u32).to_be_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a request with timeout.
pub async fn read_request<R: tokio::io::AsyncReadExt + Unpin>(
    reader: &mut R,
    timeout: std::time::Duration,
) -> Result<Request, ProtocolError> {
    let bytes = tokio::time::timeout(timeout, read_message(reader))
        .await
        .map_err(|_| ProtocolError::Timeout)??;
    decode(&bytes)
}

/// Write a response with timeout.
pub async fn write_response<W: tokio::io::AsyncWriteExt + Unpin>(
    writer: &mut W,
    response: &Response,
    timeout: std::time::Duration,
) -> Result<(), ProtocolError> {
    let data = encode(response)?;
    tokio::time::timeout(timeout, write_message(writer, &data))
        .await
        .map_err(|_| ProtocolError::Timeout)?
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
