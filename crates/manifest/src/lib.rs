// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! am-manifest: the YAML file formats of the application manager.
//!
//! Every on-disk document is a YAML stream whose first document is a
//! header carrying `formatType` and `formatVersion`; the second document
//! is the payload. This crate parses `info.yaml` application manifests,
//! `info-<qualifier>.yaml` aliases, and `installation-report.yaml`
//! receipts.

pub mod docs;
pub mod info;
pub mod report;

pub use docs::{check_header, load_documents, split_documents, DocumentHeader};
pub use info::{
    load_alias, load_info, parse_info, ALIAS_FORMAT_TYPE, INFO_FORMAT_TYPE, INFO_FORMAT_VERSION,
};
pub use report::{load_report, save_report, REPORT_FORMAT_TYPE, REPORT_FORMAT_VERSION};

use am_core::{Error, ErrorKind};
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("wrong number of YAML documents: expected {expected}, got {got}")]
    WrongDocumentCount { expected: usize, got: usize },

    #[error("wrong formatType header: expected {expected}, got {got:?}")]
    WrongFormatType { expected: String, got: String },

    #[error("wrong formatVersion header: expected {expected}, got {got}")]
    WrongFormatVersion { expected: u32, got: u32 },

    #[error("{0}")]
    Field(String),
}

impl From<ManifestError> for Error {
    fn from(e: ManifestError) -> Self {
        let kind = match &e {
            ManifestError::Io(_) => ErrorKind::Io,
            _ => ErrorKind::Parse,
        };
        Error::new(kind, e.to_string())
    }
}
