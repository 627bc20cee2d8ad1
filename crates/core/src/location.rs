// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Installation locations: where packages are installed and where their
//! document trees live.
//!
//! A location is identified by `"<type>-<index>"` (e.g. `internal-0`).
//! Removable locations come and go with their mount point; internal ones
//! must exist (or be creatable) at startup.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Token replaced by the device's hardware id in configured paths.
pub const HARDWARE_ID_TOKEN: &str = "@HARDWARE-ID@";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationType {
    Internal,
    Removable,
}

impl std::fmt::Display for LocationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            LocationType::Internal => "internal",
            LocationType::Removable => "removable",
        })
    }
}

/// Raw configuration entry, as found in the daemon's config file.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationConfig {
    pub id: String,
    pub installation_path: String,
    pub document_path: String,
    #[serde(default)]
    pub mount_point: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationLocation {
    pub location_type: LocationType,
    pub index: u32,
    pub installation_path: PathBuf,
    pub document_path: PathBuf,
    pub mount_point: Option<PathBuf>,
    pub is_default: bool,
}

impl InstallationLocation {
    pub fn id(&self) -> String {
        format!("{}-{}", self.location_type, self.index)
    }

    /// Parse an id of the form `"<type>-<index>"`.
    pub fn parse_id(id: &str) -> Option<(LocationType, u32)> {
        let (type_str, index_str) = id.rsplit_once('-')?;
        let location_type = match type_str {
            "internal" => LocationType::Internal,
            "removable" => LocationType::Removable,
            _ => return None,
        };
        let index = index_str.parse().ok()?;
        Some((location_type, index))
    }

    pub fn is_removable(&self) -> bool {
        self.location_type == LocationType::Removable
    }

    /// A non-removable location is always mounted; a removable one only
    /// while its mount point shows up in the mount table.
    pub fn is_mounted(&self) -> bool {
        if !self.is_removable() {
            return true;
        }
        let Some(mp) = &self.mount_point else {
            return false;
        };
        let canonical = mp.canonicalize().unwrap_or_else(|_| mp.clone());
        mounted_directories().iter().any(|(dir, _)| *dir == canonical)
    }

    pub fn installation_device_free_space(&self) -> Option<(u64, u64)> {
        disk_usage(&self.installation_path)
    }

    pub fn document_device_free_space(&self) -> Option<(u64, u64)> {
        disk_usage(&self.document_path)
    }

    /// Serialized view for the RPC `getInstallationLocation` operation.
    pub fn to_map(&self) -> serde_json::Value {
        let mounted = self.is_mounted();
        let (inst_total, inst_free) = if mounted {
            self.installation_device_free_space().unwrap_or((0, 0))
        } else {
            (0, 0)
        };
        let (doc_total, doc_free) = if mounted {
            self.document_device_free_space().unwrap_or((0, 0))
        } else {
            (0, 0)
        };
        serde_json::json!({
            "id": self.id(),
            "type": self.location_type,
            "index": self.index,
            "installationPath": self.installation_path,
            "documentPath": self.document_path,
            "isRemovable": self.is_removable(),
            "isDefault": self.is_default,
            "isMounted": mounted,
            "installationDeviceSize": inst_total,
            "installationDeviceFree": inst_free,
            "documentDeviceSize": doc_total,
            "documentDeviceFree": doc_free,
        })
    }

    /// Parse and validate the configured location list.
    ///
    /// `@HARDWARE-ID@` tokens are resolved once, here. Directories of
    /// non-removable locations are created when missing.
    pub fn parse_list(configs: &[LocationConfig], hardware_id: &str) -> Result<Vec<Self>> {
        let mut locations = Vec::with_capacity(configs.len());
        let mut got_default = false;

        for config in configs {
            if config.is_default {
                if got_default {
                    return Err(Error::parse("multiple default installation locations defined"));
                }
                got_default = true;
            }

            let Some((location_type, index)) = Self::parse_id(&config.id) else {
                return Err(Error::parse(format!(
                    "could not parse the installation location with id {:?}",
                    config.id
                )));
            };

            let location = InstallationLocation {
                location_type,
                index,
                installation_path: fix_path(&config.installation_path, hardware_id),
                document_path: fix_path(&config.document_path, hardware_id),
                mount_point: config.mount_point.as_ref().map(PathBuf::from),
                is_default: config.is_default,
            };

            if !location.is_removable() {
                for (what, dir) in [
                    ("app", &location.installation_path),
                    ("doc", &location.document_path),
                ] {
                    std::fs::create_dir_all(dir).map_err(|e| {
                        Error::parse(format!(
                            "the {} directory {} for the installation location {} \
                             does not exist and cannot be created: {}",
                            what,
                            dir.display(),
                            config.id,
                            e
                        ))
                    })?;
                }
            }
            locations.push(location);
        }

        if locations.is_empty() {
            return Err(Error::parse("no installation locations defined in config file"));
        }
        Ok(locations)
    }
}

fn fix_path(path: &str, hardware_id: &str) -> PathBuf {
    let fixed = path.replace(HARDWARE_ID_TOKEN, hardware_id);
    let p = PathBuf::from(fixed);
    p.canonicalize().unwrap_or(p)
}

/// `(mount directory, filesystem source)` pairs from the mount table.
pub fn mounted_directories() -> Vec<(PathBuf, String)> {
    let Ok(mounts) = std::fs::read_to_string("/proc/self/mounts") else {
        return Vec::new();
    };
    mounts
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let source = fields.next()?;
            let dir = fields.next()?;
            Some((PathBuf::from(dir), source.to_string()))
        })
        .collect()
}

/// Total and available bytes of the filesystem holding `path`.
fn disk_usage(path: &Path) -> Option<(u64, u64)> {
    let target = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let stat = nix::sys::statvfs::statvfs(&target).ok()?;
    let frsize = stat.fragment_size() as u64;
    Some((
        frsize * stat.blocks() as u64,
        frsize * stat.blocks_available() as u64,
    ))
}

#[cfg(test)]
#[path = "location_tests.rs"]
mod tests;
