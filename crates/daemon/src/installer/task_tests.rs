// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::event_bus;
use yare::parameterized;

fn ctx() -> (TaskCtx, broadcast::Receiver<InstallerSignal>, TaskTable) {
    let tasks: TaskTable = Arc::new(Mutex::new(HashMap::new()));
    let (signals, signal_rx) = broadcast::channel(64);
    let (bus, _reader) = event_bus::channel();
    let id = TaskId("task-1".into());
    let (control, _control_rx) = mpsc::unbounded_channel();
    tasks.lock().insert(
        id.clone(),
        TaskHandle {
            kind: TaskKind::Install,
            location_id: "internal-0".into(),
            application_id: None,
            state: TaskState::Queued,
            control,
        },
    );
    (
        TaskCtx {
            id,
            tasks: tasks.clone(),
            signals,
            bus,
        },
        signal_rx,
        tasks,
    )
}

#[tokio::test]
async fn states_only_move_forward() {
    let (ctx, _rx, tasks) = ctx();
    ctx.set_state(TaskState::Receiving);
    ctx.set_state(TaskState::AwaitingAck);
    // backward transition is refused
    ctx.set_state(TaskState::Receiving);
    assert_eq!(tasks.lock()[&ctx.id].state, TaskState::AwaitingAck);
}

#[tokio::test]
async fn failure_is_absorbing_and_signals() {
    let (ctx, mut rx, tasks) = ctx();
    ctx.set_state(TaskState::Receiving);
    ctx.fail(&am_core::Error::canceled("canceled by client"));

    assert_eq!(tasks.lock()[&ctx.id].state, TaskState::Failed);
    ctx.set_state(TaskState::Applying);
    assert_eq!(tasks.lock()[&ctx.id].state, TaskState::Failed);

    let mut saw_failed = false;
    while let Ok(signal) = rx.try_recv() {
        if let InstallerSignal::Failed { code, message, .. } = signal {
            assert_eq!(code, am_core::ErrorKind::Canceled.code());
            assert!(message.contains("canceled"));
            saw_failed = true;
        }
    }
    assert!(saw_failed);
}

#[parameterized(
    queued = { TaskState::Queued, true },
    receiving = { TaskState::Receiving, true },
    awaiting = { TaskState::AwaitingAck, true },
    applying = { TaskState::Applying, false },
    finished = { TaskState::Finished, false },
    failed = { TaskState::Failed, false },
)]
fn cancel_windows(state: TaskState, ok: bool) {
    assert_eq!(cancelable(state).is_ok(), ok);
}

#[test]
fn signals_serialize_with_wire_names() {
    let signal = InstallerSignal::Failed {
        task_id: TaskId("t".into()),
        code: 9,
        message: "canceled".into(),
    };
    let json = serde_json::to_value(&signal).unwrap();
    assert_eq!(json["signal"], "taskFailed");
    assert_eq!(json["code"], 9);

    let ack = InstallerSignal::RequiresAcknowledge {
        task_id: TaskId("t".into()),
        manifest: serde_json::json!({"id": "com.x.a"}),
    };
    let json = serde_json::to_value(&ack).unwrap();
    assert_eq!(json["signal"], "taskRequestingInstallationAcknowledge");
}
