// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Manifest-tree scanning.
//!
//! A scan walks the immediate subdirectories of a base directory and
//! loads one application per directory. Per-entry problems are logged and
//! the entry skipped; only I/O failure on the base directory itself
//! aborts the scan.

use am_core::{is_valid_application_id, Application, Error, InstallationLocation, Result};
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanKind {
    BuiltIn,
    Installed,
}

/// Registration state the scanner validates entries against.
pub struct ScanContext<'a> {
    /// Keys of the registered runtime managers (I1: unknown runtime ⇒ skip)
    pub registered_runtimes: &'a [String],
    /// Runtime kinds whose launcher provides the application interface
    pub quick_launch_runtimes: &'a [String],
    /// Configured locations, for rebinding installed code directories
    pub locations: &'a [InstallationLocation],
}

/// Scan one manifest tree.
///
/// Built-in trees also load `info-*.yaml` aliases; installed trees
/// require a valid `installation-report.yaml` per entry and silently skip
/// entries without one.
pub fn scan_tree(
    base_dir: &Path,
    kind: ScanKind,
    ctx: &ScanContext<'_>,
) -> Result<Vec<Application>> {
    let mut result = Vec::new();

    let entries = std::fs::read_dir(base_dir)
        .map_err(|e| Error::io(format!("cannot scan {}: {}", base_dir.display(), e)))?;

    for entry in entries {
        let entry = entry.map_err(|e| Error::io(e.to_string()))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        if kind == ScanKind::Installed && path.is_symlink() {
            continue;
        }
        let Some(dir_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        // staging and removal leftovers
        if dir_name.ends_with('+') || dir_name.ends_with('-') {
            continue;
        }
        if let Err(reason) = is_valid_application_id(dir_name, false) {
            debug!(dir = dir_name, reason, "ignoring directory: not a valid application id");
            continue;
        }

        match scan_application_dir(&path, dir_name, kind, ctx) {
            Ok(mut apps) => result.append(&mut apps),
            Err(e) => warn!(dir = dir_name, error = %e, "skipping application directory"),
        }
    }
    Ok(result)
}

fn scan_application_dir(
    app_dir: &Path,
    dir_name: &str,
    kind: ScanKind,
    ctx: &ScanContext<'_>,
) -> Result<Vec<Application>> {
    let info_path = app_dir.join("info.yaml");
    if !info_path.exists() {
        return Err(Error::not_found(format!(
            "no info.yaml in {}",
            app_dir.display()
        )));
    }

    let mut app = am_manifest::load_info(&info_path)?;

    if !ctx.registered_runtimes.contains(&app.runtime_name) {
        // I1: never hand out an application nothing can run
        debug!(
            id = app.id,
            runtime = app.runtime_name,
            "ignoring application: it uses an unknown runtime"
        );
        return Ok(Vec::new());
    }
    if ctx.quick_launch_runtimes.contains(&app.runtime_name) {
        if app.supports_application_interface {
            debug!(
                id = app.id,
                "ignoring supportsApplicationInterface: the runtime launcher supports it by default"
            );
        }
        app.supports_application_interface = true;
    }
    if app.id != dir_name {
        return Err(Error::parse(format!(
            "an info.yaml must be in a directory that has the same name as the \
             application's id: found {} in {}",
            app.id, dir_name
        )));
    }

    match kind {
        ScanKind::BuiltIn => {
            app.built_in = true;
            let aliases = load_aliases(app_dir, &app);
            let mut out = vec![app];
            out.extend(aliases);
            Ok(out)
        }
        ScanKind::Installed => {
            let report_path = app_dir.join("installation-report.yaml");
            if !report_path.exists() {
                // silently skipped: the install never finished
                return Ok(Vec::new());
            }
            let report = match am_manifest::load_report(&report_path) {
                Ok(r) => r,
                Err(e) => {
                    debug!(id = app.id, error = %e, "ignoring installed application: bad report");
                    return Ok(Vec::new());
                }
            };
            if let Some(location) = ctx
                .locations
                .iter()
                .find(|l| l.id() == report.installation_location_id)
            {
                app.rebind_code_dir(&location.installation_path);
            }
            app.installation_report = Some(report);
            Ok(vec![app])
        }
    }
}

fn load_aliases(app_dir: &Path, base: &Application) -> Vec<Application> {
    let Ok(entries) = std::fs::read_dir(app_dir) else {
        return Vec::new();
    };
    let mut aliases = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.starts_with("info-") || !name.ends_with(".yaml") {
            continue;
        }
        match am_manifest::load_alias(&path, base) {
            Ok(alias) => aliases.push(alias),
            Err(e) => warn!(file = name, error = %e, "skipping alias manifest"),
        }
    }
    // directory order is unspecified; keep alias order deterministic
    aliases.sort_by(|a, b| a.id.cmp(&b.id));
    aliases
}

#[cfg(test)]
#[path = "scan_tests.rs"]
mod tests;
