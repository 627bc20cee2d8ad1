// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `Application` record and application-id validation.
//!
//! An application is identified by a reverse-DNS id. Aliases are additional
//! entry points with an id of the form `<base>@<qualifier>`; they carry a
//! back-reference to their base by id (never by pointer) and their runtime
//! parameters are the base's merged with the alias's overrides.

use crate::report::InstallationReport;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Maximum length of an application id, including any alias qualifier.
pub const MAX_ID_LEN: usize = 253;

/// A built-in or installed application as known to the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    /// Reverse-DNS id; unique among non-aliases
    pub id: String,
    /// Absolute directory holding the application's code
    pub code_dir: PathBuf,
    /// Entry file inside `code_dir` (executable or hosted source)
    pub main_file: String,
    /// Key of the runtime manager that hosts this application
    pub runtime_name: String,
    /// Free-form parameters forwarded to the runtime
    #[serde(default)]
    pub runtime_parameters: IndexMap<String, serde_json::Value>,
    #[serde(default)]
    pub supports_application_interface: bool,
    #[serde(default)]
    pub built_in: bool,
    /// For aliases, the id of the non-aliased base entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias_of: Option<String>,
    /// Present iff the application was installed by the installer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installation_report: Option<InstallationReport>,
}

impl Application {
    pub fn is_alias(&self) -> bool {
        self.alias_of.is_some()
    }

    /// The id start/stop operate on: the base id for aliases.
    pub fn non_aliased_id(&self) -> &str {
        self.alias_of.as_deref().unwrap_or(&self.id)
    }

    /// Path of the entry file.
    pub fn absolute_main_file(&self) -> PathBuf {
        self.code_dir.join(&self.main_file)
    }

    /// Installation location id, when installed.
    pub fn installation_location_id(&self) -> Option<&str> {
        self.installation_report
            .as_ref()
            .map(|r| r.installation_location_id.as_str())
    }

    /// Serialized view for the RPC `get` operation.
    pub fn to_map(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "codeDir": self.code_dir,
            "mainFile": self.main_file,
            "runtimeName": self.runtime_name,
            "runtimeParameters": self.runtime_parameters,
            "supportsApplicationInterface": self.supports_application_interface,
            "isBuiltIn": self.built_in,
            "isAlias": self.is_alias(),
            "nonAliased": self.alias_of,
            "installationLocationId": self.installation_location_id(),
        })
    }

    pub fn rebind_code_dir(&mut self, installation_path: &Path) {
        self.code_dir = installation_path.join(&self.id);
    }
}

/// Validate an application id.
///
/// Rules: dot-separated lowercase labels (`[a-z][a-z0-9-]*`, not ending in
/// `-`), at least two labels, at most [`MAX_ID_LEN`] bytes. With
/// `alias_allowed`, a single `@<qualifier>` suffix is accepted where the
/// qualifier follows the same character rules as a label.
pub fn is_valid_application_id(id: &str, alias_allowed: bool) -> Result<(), String> {
    if id.is_empty() {
        return Err("id is empty".into());
    }
    if id.len() > MAX_ID_LEN {
        return Err(format!("id is longer than {MAX_ID_LEN} characters"));
    }

    let (base, qualifier) = match id.split_once('@') {
        Some((b, q)) => {
            if !alias_allowed {
                return Err("alias qualifier not allowed here".into());
            }
            (b, Some(q))
        }
        None => (id, None),
    };

    let labels: Vec<&str> = base.split('.').collect();
    if labels.len() < 2 {
        return Err("id must be a reverse-DNS name with at least two labels".into());
    }
    for label in labels {
        check_label(label)?;
    }
    if let Some(q) = qualifier {
        check_label(q).map_err(|e| format!("invalid alias qualifier: {e}"))?;
    }
    Ok(())
}

fn check_label(label: &str) -> Result<(), String> {
    if label.is_empty() {
        return Err("empty label".into());
    }
    let mut chars = label.chars();
    let first = chars.next().unwrap_or('.');
    if !first.is_ascii_lowercase() {
        return Err(format!("label {label:?} must start with a lowercase letter"));
    }
    if label.ends_with('-') {
        return Err(format!("label {label:?} must not end with a dash"));
    }
    for c in chars {
        if !(c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
            return Err(format!("label {label:?} contains invalid character {c:?}"));
        }
    }
    Ok(())
}

/// Split an alias id into `(base, qualifier)`, or `None` for plain ids.
pub fn split_alias_id(id: &str) -> Option<(&str, &str)> {
    id.split_once('@')
}

#[cfg(test)]
#[path = "application_tests.rs"]
mod tests;
