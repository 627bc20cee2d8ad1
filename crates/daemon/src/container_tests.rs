// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::event_bus;
use am_core::Event;

fn factory() -> ContainerFactory {
    let mut f = ContainerFactory::new();
    f.register(Box::new(ProcessContainerManager::new(serde_json::json!({}))))
        .unwrap();
    f
}

#[test]
fn registering_a_kind_twice_fails() {
    let mut f = factory();
    let err = f
        .register(Box::new(ProcessContainerManager::new(serde_json::json!({}))))
        .unwrap_err();
    assert_eq!(err.kind, am_core::ErrorKind::AlreadyExists);
}

#[test]
fn selection_first_match_wins() {
    let mut f = factory();
    f.set_selection(&[
        ("com.demo.*".into(), "lxc".into()),
        ("*".into(), "process".into()),
    ])
    .unwrap();
    assert_eq!(f.select_kind("com.demo.app"), "lxc");
    assert_eq!(f.select_kind("org.other.app"), "process");
}

#[test]
fn selection_defaults_to_process() {
    let f = factory();
    assert_eq!(f.select_kind("com.x.a"), "process");
}

#[test]
fn bad_selection_glob_is_a_parse_error() {
    let mut f = factory();
    let err = f.set_selection(&[("com.[".into(), "process".into())]).unwrap_err();
    assert_eq!(err.kind, am_core::ErrorKind::Parse);
}

#[test]
fn debug_wrapper_substitutes_placeholders() {
    let wrapper = vec![
        "gdbserver".to_string(),
        ":5555".to_string(),
        "%program%".to_string(),
        "%arguments%".to_string(),
    ];
    let (argv0, argv) = resolve_debug_wrapper(
        &wrapper,
        &PathBuf::from("/bin/app"),
        &["--a".to_string(), "--b".to_string()],
    )
    .unwrap();
    assert_eq!(argv0, PathBuf::from("gdbserver"));
    assert_eq!(argv, vec![":5555", "/bin/app", "--a", "--b"]);
}

#[tokio::test]
async fn starts_and_observes_exit() {
    let (bus, mut reader) = event_bus::channel();
    let mut container = factory().create(PROCESS_CONTAINER).unwrap();

    let pid = container
        .start(
            &PathBuf::from("/bin/true"),
            &[],
            &[],
            StdioSpec::default(),
            None,
            am_core::RuntimeId(1),
            &bus,
        )
        .unwrap();
    assert!(pid > 0);

    let started = reader.recv().await.unwrap();
    assert!(matches!(started, Event::RuntimeStarted { pid: p, .. } if p == pid));

    let exited = reader.recv().await.unwrap();
    match exited {
        Event::RuntimeExited {
            exit_code, signaled, ..
        } => {
            assert_eq!(exit_code, 0);
            assert!(!signaled);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn kill_reports_a_signaled_exit() {
    let (bus, mut reader) = event_bus::channel();
    let mut container = factory().create(PROCESS_CONTAINER).unwrap();

    container
        .start(
            &PathBuf::from("/bin/sleep"),
            &["30".to_string()],
            &[],
            StdioSpec::default(),
            None,
            am_core::RuntimeId(2),
            &bus,
        )
        .unwrap();

    assert!(matches!(
        reader.recv().await.unwrap(),
        Event::RuntimeStarted { .. }
    ));
    container.kill();

    match reader.recv().await.unwrap() {
        Event::RuntimeExited {
            exit_code, signaled, ..
        } => {
            assert!(signaled);
            assert_eq!(exit_code, 128 + libc::SIGKILL);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn missing_program_fails_cleanly() {
    let (bus, _reader) = event_bus::channel();
    let mut container = factory().create(PROCESS_CONTAINER).unwrap();
    let err = container
        .start(
            &PathBuf::from("/no/such/program"),
            &[],
            &[],
            StdioSpec::default(),
            None,
            am_core::RuntimeId(3),
            &bus,
        )
        .unwrap_err();
    assert_eq!(err.kind, am_core::ErrorKind::NotFound);
    assert!(!container.is_started());
}

#[tokio::test]
async fn control_channel_reaches_the_child() {
    let (bus, mut reader) = event_bus::channel();
    let mut container = factory().create(PROCESS_CONTAINER).unwrap();

    // `head -1` exits once it has read one full line from stdin
    container
        .start(
            &PathBuf::from("/usr/bin/head"),
            &["-1".to_string()],
            &[],
            StdioSpec {
                attach: [None, None, None],
                control_channel: true,
            },
            None,
            am_core::RuntimeId(4),
            &bus,
        )
        .unwrap();
    assert!(container.has_control_channel());
    container.send_control("{\"op\":\"noop\"}\n".to_string()).unwrap();

    assert!(matches!(
        reader.recv().await.unwrap(),
        Event::RuntimeStarted { .. }
    ));
    match tokio::time::timeout(std::time::Duration::from_secs(5), reader.recv())
        .await
        .unwrap()
        .unwrap()
    {
        Event::RuntimeExited { exit_code, .. } => assert_eq!(exit_code, 0),
        other => panic!("unexpected event: {other:?}"),
    }
}
