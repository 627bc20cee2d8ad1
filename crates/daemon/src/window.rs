// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The compositor collaborator boundary.
//!
//! Window management lives outside this crate; the orchestrator only
//! needs the collaborator to take part in the shutdown fan-in and to
//! receive its raw configuration block.

use crate::event_bus::EventBus;
use am_core::{Event, ShutdownPart};

pub trait WindowCompositor: Send {
    /// Hand over the `ui` configuration block (surface setup, OpenGL
    /// configuration) at startup.
    fn setup(&mut self, ui_config: &serde_yaml::Value);

    /// Begin winding down; must eventually emit
    /// `shutdown:finished(window_manager)` on the bus.
    fn shut_down(&mut self, bus: &EventBus);
}

/// The headless build has no compositor: setup is a no-op and shutdown
/// reports finished immediately.
#[derive(Default)]
pub struct HeadlessCompositor;

impl WindowCompositor for HeadlessCompositor {
    fn setup(&mut self, _ui_config: &serde_yaml::Value) {}

    fn shut_down(&mut self, bus: &EventBus) {
        let _ = bus.send(Event::ShutDownFinished {
            part: ShutdownPart::WindowManager,
        });
    }
}
