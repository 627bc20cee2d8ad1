// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The quick-launch pool: pre-warmed (container, runtime) pairs.
//!
//! Entries are the cross product of container kinds that support
//! quick-launch and runtime kinds that are not in-process. When the
//! runtime kind itself cannot quick-launch, the slot only pre-creates
//! containers. A rebuild adds at most one pair per tick; when work
//! remains, the next tick is scheduled 1000 ms out. With `idleLoad > 0`,
//! rebuilds only proceed while the system monitor reports idle.

use crate::container::{Container, ContainerFactory};
use crate::event_bus::EventBus;
use crate::manager::TimerGuard;
use crate::runtime::{Runtime, RuntimeFactory};
use am_core::{Event, RuntimeId, ShutdownPart};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Upper bound for `runtimesPerContainer`.
pub const MAX_RUNTIMES_PER_CONTAINER: u32 = 10;

/// Delay before the next rebuild tick while the pool is under-filled.
const REBUILD_DELAY: Duration = Duration::from_millis(1000);

/// A warm pool element.
pub enum WarmPair {
    /// Pre-created container with a started, attachable runtime
    Full(Runtime),
    /// Pre-created container only
    ContainerOnly(Container),
}

struct QuickLaunchEntry {
    container_kind: String,
    /// None when the runtime kind cannot pre-start
    runtime_kind: Option<String>,
    maximum: usize,
    warm: Vec<WarmPair>,
}

pub struct QuickLauncher {
    containers: Arc<ContainerFactory>,
    runtimes: Arc<RuntimeFactory>,
    bus: EventBus,
    entries: Vec<QuickLaunchEntry>,
    only_rebuild_when_idle: bool,
    idle: tokio::sync::watch::Receiver<bool>,
    rebuild_timer: Option<TimerGuard>,
    shutting_down: bool,
}

impl QuickLauncher {
    /// Enumerate the pool entries and trigger the first rebuild.
    pub fn initialize(
        containers: Arc<ContainerFactory>,
        runtimes: Arc<RuntimeFactory>,
        bus: EventBus,
        runtimes_per_container: u32,
        idle_load: f64,
        idle: tokio::sync::watch::Receiver<bool>,
    ) -> Self {
        let maximum = runtimes_per_container.min(MAX_RUNTIMES_PER_CONTAINER) as usize;

        let mut entries = Vec::new();
        for container_kind in containers.kinds() {
            let supports = containers
                .manager(&container_kind)
                .is_some_and(|m| m.supports_quick_launch());
            if !supports {
                continue;
            }
            for runtime_kind in runtimes.kinds() {
                let manager = match runtimes.manager(&runtime_kind) {
                    Some(m) => m,
                    None => continue,
                };
                if manager.in_process() {
                    continue;
                }
                let runtime_kind = manager
                    .supports_quick_launch()
                    .then(|| runtime_kind.clone());
                debug!(
                    container = container_kind,
                    runtime = runtime_kind.as_deref().unwrap_or("-"),
                    maximum,
                    "created quick-launch slot"
                );
                entries.push(QuickLaunchEntry {
                    container_kind: container_kind.clone(),
                    runtime_kind,
                    maximum,
                    warm: Vec::new(),
                });
            }
        }

        let mut pool = Self {
            containers,
            runtimes,
            bus,
            entries,
            only_rebuild_when_idle: idle_load > 0.0,
            idle,
            rebuild_timer: None,
            shutting_down: false,
        };
        pool.trigger_rebuild(Duration::ZERO);
        pool
    }

    fn trigger_rebuild(&mut self, delay: Duration) {
        self.rebuild_timer = Some(TimerGuard::arm(
            self.bus.clone(),
            delay,
            Event::QuickLaunchTick,
        ));
    }

    /// One rebuild tick: add at most one warm pair.
    pub fn rebuild(&mut self) {
        if self.shutting_down {
            return;
        }
        if self.only_rebuild_when_idle && !*self.idle.borrow() {
            return;
        }

        let mut todo = 0usize;
        let mut done = 0usize;

        for i in 0..self.entries.len() {
            let missing = {
                let entry = &self.entries[i];
                entry.maximum.saturating_sub(entry.warm.len())
            };
            if missing == 0 {
                continue;
            }
            todo += missing;
            if done >= 1 {
                continue;
            }
            if self.fill_one(i) {
                done += 1;
            }
        }

        if todo > done {
            self.trigger_rebuild(REBUILD_DELAY);
        }
    }

    /// Produce one warm pair for entry `i`; on any failure the pair is
    /// discarded and the entry stays under-filled.
    fn fill_one(&mut self, i: usize) -> bool {
        let (container_kind, runtime_kind) = {
            let entry = &self.entries[i];
            (entry.container_kind.clone(), entry.runtime_kind.clone())
        };

        let container = match self.containers.create(&container_kind) {
            Ok(c) => c,
            Err(e) => {
                warn!(kind = container_kind, error = %e, "could not create quick-launch container");
                return false;
            }
        };

        let pair = match &runtime_kind {
            None => WarmPair::ContainerOnly(container),
            Some(kind) => {
                let mut runtime = match self.runtimes.create_quick_launcher(kind, container) {
                    Ok(r) => r,
                    Err(e) => {
                        warn!(kind, error = %e, "could not create quick-launch runtime");
                        return false;
                    }
                };
                if let Err(e) = runtime.start_quick_launcher(&self.bus) {
                    warn!(kind, error = %e, "could not start quick-launch runtime");
                    return false;
                }
                WarmPair::Full(runtime)
            }
        };
        debug!(
            container = container_kind,
            runtime = runtime_kind.as_deref().unwrap_or("-"),
            "added a warm pair to the quick-launch pool"
        );
        self.entries[i].warm.push(pair);
        true
    }

    /// Take a warm pair. First pass: exact (container, runtime) match;
    /// second pass: container match with a runtime-less slot. A hit
    /// schedules a new rebuild tick.
    pub fn take(&mut self, container_kind: &str, runtime_kind: &str) -> Option<WarmPair> {
        for pass in 1..=2 {
            for entry in &mut self.entries {
                if entry.container_kind != container_kind {
                    continue;
                }
                let matches = match pass {
                    1 => entry.runtime_kind.as_deref() == Some(runtime_kind),
                    _ => entry.runtime_kind.is_none(),
                };
                if matches && !entry.warm.is_empty() {
                    let pair = entry.warm.remove(0);
                    self.trigger_rebuild(Duration::ZERO);
                    return Some(pair);
                }
            }
        }
        None
    }

    /// Number of warm pairs for an exact (container, runtime) slot.
    pub fn warm_count(&self, container_kind: &str, runtime_kind: &str) -> usize {
        self.entries
            .iter()
            .filter(|e| {
                e.container_kind == container_kind
                    && e.runtime_kind.as_deref() == Some(runtime_kind)
            })
            .map(|e| e.warm.len())
            .sum()
    }

    /// Route a runtime event to the pool. Returns false when the runtime
    /// is not one of ours.
    pub fn handle_event(&mut self, event: &Event) -> bool {
        match event {
            Event::QuickLaunchTick => {
                self.rebuild();
                true
            }
            Event::RuntimeExited { runtime, .. } => {
                let before = self.warm_total();
                self.remove_runtime(*runtime);
                let removed = self.warm_total() < before;
                if removed && !self.shutting_down {
                    // a warm launcher died; refill
                    self.trigger_rebuild(REBUILD_DELAY);
                }
                if self.shutting_down && self.live_runtime_total() == 0 {
                    let _ = self.bus.send(Event::ShutDownFinished {
                        part: ShutdownPart::QuickLauncher,
                    });
                    self.shutting_down = false;
                }
                removed
            }
            Event::RuntimeStarted { runtime, .. } | Event::RuntimeConnected { runtime } => {
                self.owns(*runtime)
            }
            _ => false,
        }
    }

    fn owns(&self, id: RuntimeId) -> bool {
        self.entries.iter().any(|e| {
            e.warm
                .iter()
                .any(|p| matches!(p, WarmPair::Full(r) if r.id == id))
        })
    }

    fn remove_runtime(&mut self, id: RuntimeId) {
        for entry in &mut self.entries {
            entry
                .warm
                .retain(|p| !matches!(p, WarmPair::Full(r) if r.id == id));
        }
    }

    fn warm_total(&self) -> usize {
        self.entries.iter().map(|e| e.warm.len()).sum()
    }

    fn live_runtime_total(&self) -> usize {
        self.entries
            .iter()
            .flat_map(|e| &e.warm)
            .filter(|p| matches!(p, WarmPair::Full(_)))
            .count()
    }

    /// Kill every warm pair; `shutDownFinished` is reported once the last
    /// launcher has exited.
    pub fn shut_down(&mut self) {
        self.shutting_down = true;
        self.rebuild_timer = None;
        // container-only pairs have no process to wait for
        for entry in &mut self.entries {
            entry.warm.retain(|p| matches!(p, WarmPair::Full(_)));
        }
        if self.live_runtime_total() == 0 {
            let _ = self.bus.send(Event::ShutDownFinished {
                part: ShutdownPart::QuickLauncher,
            });
            self.shutting_down = false;
            return;
        }
        for entry in &mut self.entries {
            for pair in &mut entry.warm {
                if let WarmPair::Full(runtime) = pair {
                    runtime.force_kill();
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "quicklaunch_tests.rs"]
mod tests;
