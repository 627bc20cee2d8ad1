// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Quick-launch accounting: warm-pool fill, take, and refill.

use am_daemon::container::{ContainerFactory, ProcessContainerManager};
use am_daemon::event_bus;
use am_daemon::quicklaunch::{QuickLauncher, WarmPair};
use am_daemon::runtime::{InProcessRuntimeManager, NativeRuntimeManager, RuntimeFactory};
use std::sync::Arc;
use std::time::Duration;

fn factories() -> (Arc<ContainerFactory>, Arc<RuntimeFactory>) {
    let mut containers = ContainerFactory::new();
    containers
        .register(Box::new(ProcessContainerManager::new(serde_json::json!({}))))
        .unwrap();
    let mut runtimes = RuntimeFactory::new();
    runtimes
        .register(Box::new(NativeRuntimeManager::new(
            "native",
            &serde_json::json!({ "quickLaunchProgram": "/bin/cat" }),
        )))
        .unwrap();
    runtimes
        .register(Box::new(InProcessRuntimeManager::new("qml-inprocess")))
        .unwrap();
    (Arc::new(containers), Arc::new(runtimes))
}

#[tokio::test]
async fn warm_pool_fills_takes_and_refills() {
    let (containers, runtimes) = factories();
    let (bus, mut reader) = event_bus::channel();
    let (idle_tx, idle_rx) = tokio::sync::watch::channel(true);

    let mut pool = QuickLauncher::initialize(containers, runtimes, bus, 2, 0.5, idle_rx);

    // drive rebuild ticks until the pool is full: one new pair per tick
    let filled = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if pool.warm_count("process", "native") == 2 {
                break;
            }
            let event = reader.recv().await.unwrap();
            pool.handle_event(&event);
        }
    })
    .await;
    assert!(filled.is_ok(), "pool never filled");

    // a start consumes one warm pair without creating a new process
    let pair = pool.take("process", "native").unwrap();
    let mut runtime = match pair {
        WarmPair::Full(runtime) => runtime,
        WarmPair::ContainerOnly(_) => panic!("expected a pre-started pair"),
    };
    assert!(runtime.is_quick_launcher);
    assert_eq!(pool.warm_count("process", "native"), 1);

    // the rebuild tick scheduled by the take restores the pool
    let restored = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if pool.warm_count("process", "native") == 2 {
                break;
            }
            let event = reader.recv().await.unwrap();
            pool.handle_event(&event);
        }
    })
    .await;
    assert!(restored.is_ok(), "pool never refilled");

    runtime.force_kill();
    pool.shut_down();
    drop(idle_tx);
}
