// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The notification broker, shaped after the freedesktop Notifications
//! interface.
//!
//! Applications post notifications through the RPC surface; while no UI
//! consumer is attached, they are forwarded to the host's desktop
//! notification service on a best-effort basis.

use std::collections::HashMap;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct Notification {
    pub id: u32,
    pub app_id: Option<String>,
    pub summary: String,
    pub body: String,
    pub icon: Option<String>,
    pub timeout: i32,
}

pub struct NotificationManager {
    next_id: u32,
    active: HashMap<u32, Notification>,
    forward_to_desktop: bool,
}

impl NotificationManager {
    pub fn new(forward_to_desktop: bool) -> Self {
        Self {
            next_id: 0,
            active: HashMap::new(),
            forward_to_desktop,
        }
    }

    /// Post or replace a notification; returns its id.
    #[allow(clippy::too_many_arguments)]
    pub fn notify(
        &mut self,
        app_id: Option<String>,
        replaces_id: u32,
        summary: String,
        body: String,
        icon: Option<String>,
        timeout: i32,
    ) -> u32 {
        let id = if replaces_id != 0 && self.active.contains_key(&replaces_id) {
            replaces_id
        } else {
            self.next_id += 1;
            self.next_id
        };
        let notification = Notification {
            id,
            app_id,
            summary,
            body,
            icon,
            timeout,
        };
        debug!(id, app = ?notification.app_id, "notification posted");
        if self.forward_to_desktop {
            forward(&notification);
        }
        self.active.insert(id, notification);
        id
    }

    /// Close a notification; true when it existed.
    pub fn close(&mut self, id: u32) -> bool {
        self.active.remove(&id).is_some()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

fn forward(notification: &Notification) {
    let mut desktop = notify_rust::Notification::new();
    desktop.summary(&notification.summary).body(&notification.body);
    if let Some(icon) = &notification.icon {
        desktop.icon(icon);
    }
    if notification.timeout >= 0 {
        desktop.timeout(notification.timeout);
    }
    // the desktop bus blocks; keep it off the loop
    tokio::task::spawn_blocking(move || {
        if let Err(e) = desktop.show() {
            warn!(error = %e, "could not forward notification to the desktop");
        }
    });
}

#[cfg(test)]
#[path = "notifications_tests.rs"]
mod tests;
