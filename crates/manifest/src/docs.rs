// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! YAML document-stream handling and the standard format header.

use crate::ManifestError;
use serde::Deserialize;
use serde_yaml::Value;
use std::path::Path;

/// The first document of every manifest stream.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentHeader {
    #[serde(rename = "formatType", default)]
    pub format_type: String,
    #[serde(rename = "formatVersion", default)]
    pub format_version: u32,
}

/// Split a YAML stream into its documents.
pub fn split_documents(text: &str) -> Result<Vec<Value>, ManifestError> {
    let mut docs = Vec::new();
    for document in serde_yaml::Deserializer::from_str(text) {
        docs.push(Value::deserialize(document)?);
    }
    Ok(docs)
}

/// Read a file and split it into YAML documents.
pub fn load_documents(path: &Path) -> Result<Vec<Value>, ManifestError> {
    let text = std::fs::read_to_string(path)?;
    split_documents(&text)
}

/// Check a document stream against the standard header.
///
/// The document count must match exactly, `formatType` must be one of
/// `format_types` and `formatVersion` must equal `format_version`.
pub fn check_header(
    docs: &[Value],
    count: usize,
    format_types: &[&str],
    format_version: u32,
) -> Result<(), ManifestError> {
    if docs.len() != count {
        return Err(ManifestError::WrongDocumentCount {
            expected: count,
            got: docs.len(),
        });
    }
    let header: DocumentHeader = serde_yaml::from_value(docs[0].clone())?;
    if !format_types.contains(&header.format_type.as_str()) {
        return Err(ManifestError::WrongFormatType {
            expected: format_types.join(", or "),
            got: header.format_type,
        });
    }
    if header.format_version != format_version {
        return Err(ManifestError::WrongFormatVersion {
            expected: format_version,
            got: header.format_version,
        });
    }
    Ok(())
}

/// Convert a YAML value into a JSON value, rejecting non-string keys.
pub fn to_json(value: &Value) -> Result<serde_json::Value, ManifestError> {
    serde_json::to_value(value)
        .map_err(|e| ManifestError::Field(format!("unrepresentable YAML value: {e}")))
}

#[cfg(test)]
#[path = "docs_tests.rs"]
mod tests;
