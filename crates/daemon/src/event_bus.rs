// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event bus feeding the engine loop.
//!
//! Timers, child-process monitors, installer tasks, and the RPC listener
//! all push [`Event`]s here; the engine loop is the only consumer, so all
//! state transitions are observed in delivery order.

use am_core::Event;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
#[error("event bus closed")]
pub struct BusClosed;

#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::UnboundedSender<Event>,
}

pub struct EventReader {
    rx: mpsc::UnboundedReceiver<Event>,
}

pub fn channel() -> (EventBus, EventReader) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventBus { tx }, EventReader { rx })
}

impl EventBus {
    pub fn send(&self, event: Event) -> Result<(), BusClosed> {
        self.tx.send(event).map_err(|_| BusClosed)
    }
}

impl EventReader {
    /// Next event, or `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Drain without waiting; for tests.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}
