// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration.
//!
//! One YAML document; every key has a sensible default so an empty file
//! (or none at all) yields a usable single-location setup under
//! `/opt/am`.

use crate::env::default_state_dir;
use am_core::{Error, LocationConfig, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    /// Main UI entry file; resolved and checked at startup when set
    #[serde(default)]
    pub main_entry: Option<PathBuf>,

    #[serde(default)]
    pub force_single_process: bool,
    #[serde(default)]
    pub force_multi_process: bool,

    #[serde(default)]
    pub builtin_apps_manifest_dirs: Vec<PathBuf>,
    #[serde(default)]
    pub installed_apps_manifest_dir: Option<PathBuf>,
    #[serde(default)]
    pub database: Option<PathBuf>,
    #[serde(default)]
    pub recreate_database: bool,
    #[serde(default)]
    pub app_image_mount_dir: Option<PathBuf>,

    #[serde(default)]
    pub hardware_id: Option<String>,
    #[serde(default)]
    pub hardware_id_file: Option<PathBuf>,

    #[serde(default)]
    pub installation_locations: Vec<LocationConfig>,

    /// Ordered `(glob, container kind)` pairs; first match wins
    #[serde(default)]
    pub container_selection: Vec<HashMap<String, String>>,
    /// Per container-kind configuration (control groups, debug wrappers)
    #[serde(default)]
    pub containers: HashMap<String, serde_json::Value>,
    /// Per runtime-kind configuration (launcher binaries)
    #[serde(default)]
    pub runtimes: HashMap<String, serde_json::Value>,
    /// Named wrapper commands for `debug-application`
    /// (`%program%`/`%arguments%` placeholders)
    #[serde(default)]
    pub debug_wrappers: HashMap<String, Vec<String>>,

    #[serde(default)]
    pub quick_launch: QuickLaunchConfig,
    #[serde(default)]
    pub installer: InstallerConfig,
    #[serde(default)]
    pub crash_action: CrashActionConfig,
    #[serde(default)]
    pub system_properties: SystemPropertiesConfig,
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Out-of-scope UI collaborator settings, passed through verbatim
    /// (compositor, OpenGL configuration, window icon)
    #[serde(default)]
    pub ui: serde_yaml::Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct QuickLaunchConfig {
    #[serde(default)]
    pub runtimes_per_container: u32,
    /// Load-average threshold gating pool rebuilds; 0 disables the gate
    #[serde(default)]
    pub idle_load: f64,
}

impl Default for QuickLaunchConfig {
    fn default() -> Self {
        Self {
            runtimes_per_container: 0,
            idle_load: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InstallerConfig {
    #[serde(default)]
    pub allow_installation_of_unsigned_packages: bool,
    #[serde(default)]
    pub ca_certificates: Vec<PathBuf>,
    /// Enabled iff this sub-map is present (and complete)
    #[serde(default)]
    pub application_user_id_separation: Option<UserIdSeparationConfig>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UserIdSeparationConfig {
    pub min_user_id: u32,
    pub max_user_id: u32,
    pub common_group_id: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CrashActionConfig {
    #[serde(default = "default_true")]
    pub print_backtrace: bool,
    /// Seconds to suspend for a debugger; scaled by `AM_TIMEOUT_FACTOR`
    #[serde(default)]
    pub wait_for_gdb_attach: u32,
    #[serde(default = "default_true")]
    pub dump_core: bool,
}

impl Default for CrashActionConfig {
    fn default() -> Self {
        Self {
            print_backtrace: true,
            wait_for_gdb_attach: 0,
            dump_core: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SystemPropertiesConfig {
    #[serde(default)]
    pub public: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub protected: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub private: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RpcConfig {
    /// Milliseconds to delay interface registration at startup
    #[serde(default)]
    pub registration_delay: u64,
    /// Interface name → `system` | `session` | `none` | explicit path
    #[serde(default)]
    pub buses: HashMap<String, String>,
    /// Interface name → method name → allowed peer uids
    #[serde(default)]
    pub policies: HashMap<String, HashMap<String, PolicyEntry>>,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            registration_delay: 0,
            buses: HashMap::new(),
            policies: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PolicyEntry {
    #[serde(default)]
    pub allowed_uids: Vec<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TimeoutConfig {
    /// Grace period in ms between `aboutToStop` and force-kill
    #[serde(default = "default_quit_time")]
    pub quit_time: u64,
    /// Startup deadline in ms for a runtime to become active
    #[serde(default = "default_start_timeout")]
    pub start_timeout: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            quit_time: default_quit_time(),
            start_timeout: default_start_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log file; stderr when unset
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// Filter directives for the subscriber (overridden by `RUST_LOG`)
    #[serde(default)]
    pub rules: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_quit_time() -> u64 {
    250
}

fn default_start_timeout() -> u64 {
    30_000
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    Error::io(format!("cannot read config file {}: {}", path.display(), e))
                })?;
                serde_yaml::from_str(&text).map_err(|e| {
                    Error::parse(format!("config file {}: {}", path.display(), e))
                })?
            }
            None => Config::default(),
        };
        config.apply_defaults();
        Ok(config)
    }

    fn apply_defaults(&mut self) {
        let state_dir = default_state_dir();
        if self.database.is_none() {
            self.database = Some(state_dir.join("apps.db"));
        }
        if self.installed_apps_manifest_dir.is_none() {
            self.installed_apps_manifest_dir = Some(state_dir.join("manifests"));
        }
        if self.app_image_mount_dir.is_none() {
            self.app_image_mount_dir = Some(state_dir.join("image-mounts"));
        }
        if self.installation_locations.is_empty() {
            self.installation_locations = vec![LocationConfig {
                id: "internal-0".into(),
                installation_path: state_dir.join("apps").display().to_string(),
                document_path: state_dir.join("docs").display().to_string(),
                mount_point: None,
                is_default: true,
            }];
        }
    }

    pub fn database_path(&self) -> &Path {
        self.database.as_deref().unwrap_or(Path::new("/opt/am/apps.db"))
    }

    pub fn installed_apps_manifest_dir(&self) -> &Path {
        self.installed_apps_manifest_dir
            .as_deref()
            .unwrap_or(Path::new("/opt/am/manifests"))
    }

    pub fn app_image_mount_dir(&self) -> &Path {
        self.app_image_mount_dir
            .as_deref()
            .unwrap_or(Path::new("/opt/am/image-mounts"))
    }

    /// Flattened container-selection list, in configuration order.
    pub fn container_selection_pairs(&self) -> Vec<(String, String)> {
        self.container_selection
            .iter()
            .flat_map(|entry| entry.iter().map(|(k, v)| (k.clone(), v.clone())))
            .collect()
    }

    /// The device-stable hardware id used for path templating and report
    /// binding: configured value, file contents, or the first usable
    /// interface MAC.
    pub fn resolve_hardware_id(&self) -> String {
        if let Some(id) = &self.hardware_id {
            return id.clone();
        }
        if let Some(file) = &self.hardware_id_file {
            if let Ok(contents) = std::fs::read_to_string(file) {
                let id = contents.trim();
                if !id.is_empty() {
                    return id.to_string();
                }
            }
        }
        first_interface_mac().unwrap_or_default()
    }
}

/// MAC address of the first up, non-loopback interface (`:` → `-`).
fn first_interface_mac() -> Option<String> {
    let entries = std::fs::read_dir("/sys/class/net").ok()?;
    let mut names: Vec<String> = entries
        .flatten()
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|n| n != "lo")
        .collect();
    names.sort();
    for name in names {
        let base = PathBuf::from("/sys/class/net").join(&name);
        let operstate = std::fs::read_to_string(base.join("operstate")).unwrap_or_default();
        if operstate.trim() != "up" {
            continue;
        }
        let address = std::fs::read_to_string(base.join("address")).unwrap_or_default();
        let address = address.trim();
        if !address.is_empty() && address != "00:00:00:00:00:00" {
            return Some(address.replace(':', "-"));
        }
    }
    None
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
