// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `info.yaml` application manifests and `info-<qualifier>.yaml` aliases.

use crate::docs::{check_header, load_documents, to_json};
use crate::ManifestError;
use am_core::{is_valid_application_id, split_alias_id, Application};
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;

pub const INFO_FORMAT_TYPE: &str = "am-application";
pub const ALIAS_FORMAT_TYPE: &str = "am-application-alias";
pub const INFO_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Deserialize)]
struct InfoBody {
    id: String,
    /// Entry file relative to the manifest's directory
    code: String,
    runtime: String,
    #[serde(rename = "runtimeParameters", default)]
    runtime_parameters: IndexMap<String, serde_yaml::Value>,
    #[serde(rename = "supportsApplicationInterface", default)]
    supports_application_interface: bool,
}

#[derive(Debug, Deserialize)]
struct AliasBody {
    id: String,
    #[serde(rename = "runtimeParameters", default)]
    runtime_parameters: IndexMap<String, serde_yaml::Value>,
}

/// Load an application manifest; its directory becomes `code_dir`.
pub fn load_info(path: &Path) -> Result<Application, ManifestError> {
    let text = std::fs::read_to_string(path)?;
    let code_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    parse_info(&text, &code_dir)
}

/// Parse an application manifest from memory (e.g. out of a package
/// stream).
pub fn parse_info(text: &str, code_dir: &Path) -> Result<Application, ManifestError> {
    let docs = crate::docs::split_documents(text)?;
    check_header(&docs, 2, &[INFO_FORMAT_TYPE], INFO_FORMAT_VERSION)?;
    let body: InfoBody = serde_yaml::from_value(docs[1].clone())?;

    is_valid_application_id(&body.id, false).map_err(|e| {
        ManifestError::Field(format!("invalid application id {:?}: {}", body.id, e))
    })?;
    if body.code.is_empty() {
        return Err(ManifestError::Field("manifest has an empty code entry".into()));
    }
    if body.runtime.is_empty() {
        return Err(ManifestError::Field("manifest has an empty runtime entry".into()));
    }

    Ok(Application {
        id: body.id,
        code_dir: code_dir.to_path_buf(),
        main_file: body.code,
        runtime_name: body.runtime,
        runtime_parameters: convert_parameters(body.runtime_parameters)?,
        supports_application_interface: body.supports_application_interface,
        built_in: false,
        alias_of: None,
        installation_report: None,
    })
}

/// Load an alias manifest for `base`.
///
/// The file must be named `info-<qualifier>.yaml` and its id must be
/// `<base-id>@<qualifier>`. The alias's runtime parameters are the base's
/// merged with the alias's overrides.
pub fn load_alias(path: &Path, base: &Application) -> Result<Application, ManifestError> {
    let docs = load_documents(path)?;
    check_header(&docs, 2, &[ALIAS_FORMAT_TYPE], INFO_FORMAT_VERSION)?;
    let body: AliasBody = serde_yaml::from_value(docs[1].clone())?;

    is_valid_application_id(&body.id, true)
        .map_err(|e| ManifestError::Field(format!("invalid alias id {:?}: {}", body.id, e)))?;

    let Some((alias_base, qualifier)) = split_alias_id(&body.id) else {
        return Err(ManifestError::Field(format!(
            "alias id {:?} is missing its @<qualifier> suffix",
            body.id
        )));
    };
    if alias_base != base.id {
        return Err(ManifestError::Field(format!(
            "alias id {:?} does not reference its base application {:?}",
            body.id, base.id
        )));
    }

    let file_qualifier = path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_prefix("info-"))
        .and_then(|n| n.strip_suffix(".yaml"));
    if file_qualifier != Some(qualifier) {
        return Err(ManifestError::Field(format!(
            "alias file {} does not match its id qualifier {:?}",
            path.display(),
            qualifier
        )));
    }

    let mut parameters = base.runtime_parameters.clone();
    for (key, value) in convert_parameters(body.runtime_parameters)? {
        parameters.insert(key, value);
    }

    Ok(Application {
        id: body.id,
        code_dir: base.code_dir.clone(),
        main_file: base.main_file.clone(),
        runtime_name: base.runtime_name.clone(),
        runtime_parameters: parameters,
        supports_application_interface: base.supports_application_interface,
        built_in: base.built_in,
        alias_of: Some(base.id.clone()),
        installation_report: None,
    })
}

fn convert_parameters(
    raw: IndexMap<String, serde_yaml::Value>,
) -> Result<IndexMap<String, serde_json::Value>, ManifestError> {
    let mut parameters = IndexMap::with_capacity(raw.len());
    for (key, value) in raw {
        parameters.insert(key, to_json(&value)?);
    }
    Ok(parameters)
}

#[cfg(test)]
#[path = "info_tests.rs"]
mod tests;
