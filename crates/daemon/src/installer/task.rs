// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Installer task bookkeeping and notification plumbing.

use crate::event_bus::EventBus;
use am_core::{Error, ErrorKind, TaskId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

/// Task states, strictly forward-moving; `Failed` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    Queued,
    Receiving,
    AwaitingAck,
    Applying,
    Finished,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Finished | TaskState::Failed)
    }

    /// Position in the forward order.
    fn rank(self) -> u8 {
        match self {
            TaskState::Queued => 0,
            TaskState::Receiving => 1,
            TaskState::AwaitingAck => 2,
            TaskState::Applying => 3,
            TaskState::Finished => 4,
            TaskState::Failed => 5,
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TaskState::Queued => "queued",
            TaskState::Receiving => "receiving",
            TaskState::AwaitingAck => "awaiting-ack",
            TaskState::Applying => "applying",
            TaskState::Finished => "finished",
            TaskState::Failed => "failed",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    Install,
    Remove,
}

/// Out-of-band notifications, forwarded to RPC subscribers in emission
/// order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal")]
pub enum InstallerSignal {
    #[serde(rename = "taskRequestingInstallationAcknowledge")]
    RequiresAcknowledge {
        task_id: TaskId,
        manifest: serde_json::Value,
    },

    #[serde(rename = "taskProgressChanged")]
    ProgressChanged { task_id: TaskId, progress: f64 },

    #[serde(rename = "taskStateChanged")]
    StateChanged { task_id: TaskId, state: TaskState },

    #[serde(rename = "taskFinished")]
    Finished { task_id: TaskId },

    #[serde(rename = "taskFailed")]
    Failed {
        task_id: TaskId,
        code: u32,
        message: String,
    },
}

pub enum TaskControl {
    Acknowledge,
    Cancel,
}

pub struct TaskHandle {
    pub kind: TaskKind,
    pub location_id: String,
    pub application_id: Option<String>,
    pub state: TaskState,
    pub control: mpsc::UnboundedSender<TaskControl>,
}

pub type TaskTable = Arc<Mutex<HashMap<TaskId, TaskHandle>>>;

/// Per-task context shared with the spawned flow.
#[derive(Clone)]
pub(crate) struct TaskCtx {
    pub id: TaskId,
    pub tasks: TaskTable,
    pub signals: broadcast::Sender<InstallerSignal>,
    pub bus: EventBus,
}

impl TaskCtx {
    pub fn emit(&self, signal: InstallerSignal) {
        // no subscribers is fine
        let _ = self.signals.send(signal);
    }

    /// Move the task forward. Backward transitions are a programming
    /// error and ignored with a log line.
    pub fn set_state(&self, state: TaskState) {
        {
            let mut tasks = self.tasks.lock();
            let Some(handle) = tasks.get_mut(&self.id) else {
                return;
            };
            if handle.state.is_terminal() || state.rank() <= handle.state.rank() {
                if state != handle.state {
                    debug!(task = %self.id, from = %handle.state, to = %state, "refusing backward task transition");
                }
                return;
            }
            handle.state = state;
        }
        self.emit(InstallerSignal::StateChanged {
            task_id: self.id.clone(),
            state,
        });
    }

    pub fn progress(&self, progress: f64) {
        self.emit(InstallerSignal::ProgressChanged {
            task_id: self.id.clone(),
            progress,
        });
    }

    pub fn state(&self) -> Option<TaskState> {
        self.tasks.lock().get(&self.id).map(|h| h.state)
    }

    pub fn set_application_id(&self, id: &str) {
        if let Some(handle) = self.tasks.lock().get_mut(&self.id) {
            handle.application_id = Some(id.to_string());
        }
    }

    /// Terminal failure: artifacts are already cleaned up by the caller.
    pub fn fail(&self, error: &Error) {
        self.set_state(TaskState::Failed);
        self.emit(InstallerSignal::Failed {
            task_id: self.id.clone(),
            code: error.kind.code(),
            message: error.message.clone(),
        });
    }
}

/// Map a cancel request onto the task graph.
pub fn cancelable(state: TaskState) -> Result<(), Error> {
    match state {
        TaskState::Queued | TaskState::Receiving | TaskState::AwaitingAck => Ok(()),
        other => Err(Error::new(
            ErrorKind::System,
            format!("a task in state {other} cannot be canceled"),
        )),
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
