// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup checkpointing, reported via `AM_STARTUP_TIMER`.

use crate::env::{startup_timer_sink, StartupTimerSink};
use std::io::Write;
use std::time::{Duration, Instant};

pub struct StartupTimer {
    origin: Instant,
    checkpoints: Vec<(Duration, String)>,
    enabled: bool,
}

impl Default for StartupTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl StartupTimer {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            checkpoints: Vec::new(),
            enabled: startup_timer_sink().is_some(),
        }
    }

    pub fn checkpoint(&mut self, label: impl Into<String>) {
        if self.enabled {
            self.checkpoints.push((self.origin.elapsed(), label.into()));
        }
    }

    /// Render and emit the report to the configured sink.
    pub fn create_report(&mut self, title: &str) {
        let Some(sink) = startup_timer_sink() else {
            return;
        };
        let report = self.render(title);
        match sink {
            StartupTimerSink::Stderr => {
                let _ = std::io::stderr().write_all(report.as_bytes());
            }
            StartupTimerSink::File(path) => {
                if let Ok(mut f) = std::fs::OpenOptions::new().create(true).append(true).open(path)
                {
                    let _ = f.write_all(report.as_bytes());
                }
            }
        }
        self.checkpoints.clear();
    }

    fn render(&self, title: &str) -> String {
        let mut out = format!("== startup timing report: {title} ==\n");
        for (elapsed, label) in &self.checkpoints {
            out.push_str(&format!("{:>8.3}ms {}\n", elapsed.as_secs_f64() * 1000.0, label));
        }
        out
    }
}

#[cfg(test)]
#[path = "startup_timer_tests.rs"]
mod tests;
