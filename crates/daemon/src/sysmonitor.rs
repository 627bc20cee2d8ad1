// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Load-average sampling and the system-wide idle signal.
//!
//! The quick-launch pool only rebuilds while the host is idle; idle means
//! the 1-minute load average stays below the configured threshold.

use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

const SAMPLE_INTERVAL: Duration = Duration::from_secs(10);

/// 1-minute load average, when the platform reports one.
pub fn load_average() -> Option<f64> {
    let mut loads = [0f64; 3];
    let n = unsafe { libc::getloadavg(loads.as_mut_ptr(), 3) };
    (n >= 1).then(|| loads[0])
}

pub struct SystemMonitor {
    idle_rx: watch::Receiver<bool>,
    sampler: Option<tokio::task::JoinHandle<()>>,
}

impl SystemMonitor {
    /// Start sampling with the given idle threshold. A threshold of zero
    /// (or below) pins the idle signal to `true` and samples nothing.
    pub fn start(idle_load: f64) -> Self {
        let (idle_tx, idle_rx) = watch::channel(idle_load <= 0.0);
        if idle_load <= 0.0 {
            return Self {
                idle_rx,
                sampler: None,
            };
        }

        let sampler = tokio::spawn(async move {
            let mut interval = tokio::time::interval(SAMPLE_INTERVAL);
            loop {
                interval.tick().await;
                let Some(load) = load_average() else {
                    continue;
                };
                let idle = load < idle_load;
                if *idle_tx.borrow() != idle {
                    debug!(load, idle, "idle state changed");
                }
                // send_if_modified keeps receivers silent on no-ops
                idle_tx.send_if_modified(|current| {
                    let changed = *current != idle;
                    *current = idle;
                    changed
                });
            }
        });

        Self {
            idle_rx,
            sampler: Some(sampler),
        }
    }

    pub fn is_idle(&self) -> bool {
        *self.idle_rx.borrow()
    }

    /// A receiver that wakes on every idle transition.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.idle_rx.clone()
    }
}

impl Drop for SystemMonitor {
    fn drop(&mut self) {
        if let Some(sampler) = self.sampler.take() {
            sampler.abort();
        }
    }
}

#[cfg(test)]
#[path = "sysmonitor_tests.rs"]
mod tests;
