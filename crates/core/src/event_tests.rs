// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn events_serialize_with_type_tag() {
    let event = Event::RuntimeExited {
        runtime: RuntimeId(7),
        exit_code: 139,
        signaled: true,
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "runtime:exited");
    assert_eq!(json["runtime"], 7);
    assert_eq!(json["exit_code"], 139);
}

#[test]
fn events_round_trip() {
    let events = vec![
        Event::RuntimeStarted {
            runtime: RuntimeId(1),
            pid: 4242,
        },
        Event::QuickLaunchTick,
        Event::ShutDownFinished {
            part: ShutdownPart::QuickLauncher,
        },
        Event::InstallerRemoved {
            task: TaskId("t-1".into()),
            application_id: "com.x.a".into(),
        },
    ];
    for event in events {
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}

#[test]
fn runtime_id_display() {
    assert_eq!(RuntimeId(3).to_string(), "runtime-3");
}
