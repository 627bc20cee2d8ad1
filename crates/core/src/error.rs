// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stable error kinds shared across every interface of the manager.
//!
//! Subsystems keep their own `thiserror` enums internally; everything that
//! crosses a component or RPC boundary is narrowed to one of these kinds
//! plus a human-readable message.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error classification, stable across the RPC surface and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Malformed manifest, database record, or configuration
    Parse,
    /// File or stream I/O failure
    Io,
    /// OS-level or startup failure
    System,
    /// Digest mismatch, bad signature, or policy violation
    Security,
    /// Message-bus registration or transport failure
    Bus,
    /// Operation refused because the application is running
    AppRunning,
    AlreadyExists,
    NotFound,
    Canceled,
}

impl ErrorKind {
    /// Numeric code used on the wire (`taskFailed` and error replies).
    pub fn code(self) -> u32 {
        match self {
            ErrorKind::Parse => 1,
            ErrorKind::Io => 2,
            ErrorKind::System => 3,
            ErrorKind::Security => 4,
            ErrorKind::Bus => 5,
            ErrorKind::AppRunning => 6,
            ErrorKind::AlreadyExists => 7,
            ErrorKind::NotFound => 8,
            ErrorKind::Canceled => 9,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ErrorKind::Parse => "parse",
            ErrorKind::Io => "io",
            ErrorKind::System => "system",
            ErrorKind::Security => "security",
            ErrorKind::Bus => "bus",
            ErrorKind::AppRunning => "app-running",
            ErrorKind::AlreadyExists => "already-exists",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Canceled => "canceled",
        })
    }
}

/// An error kind with its message, as observed at component boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    pub fn system(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::System, message)
    }

    pub fn security(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Security, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn canceled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Canceled, message)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorKind::Io, e.to_string())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
