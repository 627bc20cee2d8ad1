// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Events that drive the daemon's main loop.
//!
//! Everything asynchronous — child-process exits, timer expiries, installer
//! completions, shutdown progress — is translated into one of these and
//! delivered to the loop in order.

use serde::{Deserialize, Serialize};

/// Handle to a runtime instance, assigned by the runtime factory.
///
/// Stable for the lifetime of the runtime object; never reused within one
/// daemon run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuntimeId(pub u64);

impl std::fmt::Display for RuntimeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "runtime-{}", self.0)
    }
}

/// Opaque installer task id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a runtime's OS process (or hosted context) went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitStatus {
    NormalExit,
    Crash,
}

/// The three parties of the shutdown fan-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownPart {
    ApplicationManager,
    QuickLauncher,
    WindowManager,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // -- runtime --
    #[serde(rename = "runtime:started")]
    RuntimeStarted { runtime: RuntimeId, pid: u32 },

    /// The application connected its application-interface channel
    #[serde(rename = "runtime:connected")]
    RuntimeConnected { runtime: RuntimeId },

    #[serde(rename = "runtime:exited")]
    RuntimeExited {
        runtime: RuntimeId,
        exit_code: i32,
        /// True when the process died from a signal
        signaled: bool,
    },

    /// Startup deadline elapsed before the runtime became active
    #[serde(rename = "runtime:deadline")]
    RuntimeDeadline { runtime: RuntimeId },

    /// Quit timer elapsed after a graceful stop request
    #[serde(rename = "runtime:quit-elapsed")]
    RuntimeQuitElapsed { runtime: RuntimeId },

    // -- quick-launch --
    #[serde(rename = "quicklaunch:tick")]
    QuickLaunchTick,

    // -- installer --
    /// A finished install: the registry picks up the new application
    #[serde(rename = "installer:installed")]
    InstallerInstalled {
        task: TaskId,
        application: Box<crate::Application>,
    },

    /// A finished removal: the registry drops the application
    #[serde(rename = "installer:removed")]
    InstallerRemoved { task: TaskId, application_id: String },

    // -- shutdown --
    #[serde(rename = "shutdown:requested")]
    ShutdownRequested { exit_code: i32 },

    #[serde(rename = "shutdown:finished")]
    ShutDownFinished { part: ShutdownPart },
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
