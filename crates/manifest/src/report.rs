// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `installation-report.yaml`: the signed receipt written last on every
//! successful installation.

use crate::docs::{check_header, load_documents};
use crate::ManifestError;
use am_core::InstallationReport;
use std::io::Write;
use std::path::Path;

pub const REPORT_FORMAT_TYPE: &str = "am-installation-report";
pub const REPORT_FORMAT_VERSION: u32 = 1;

pub fn load_report(path: &Path) -> Result<InstallationReport, ManifestError> {
    let docs = load_documents(path)?;
    check_header(&docs, 2, &[REPORT_FORMAT_TYPE], REPORT_FORMAT_VERSION)?;
    let report: InstallationReport = serde_yaml::from_value(docs[1].clone())?;
    if report.application_id.is_empty() {
        return Err(ManifestError::Field("report has an empty applicationId".into()));
    }
    if report.installation_location_id.is_empty() {
        return Err(ManifestError::Field(
            "report has an empty installationLocationId".into(),
        ));
    }
    Ok(report)
}

pub fn save_report(path: &Path, report: &InstallationReport) -> Result<(), ManifestError> {
    let mut out = Vec::new();
    writeln!(out, "formatType: {REPORT_FORMAT_TYPE}")?;
    writeln!(out, "formatVersion: {REPORT_FORMAT_VERSION}")?;
    writeln!(out, "---")?;
    let body = serde_yaml::to_string(report)?;
    out.extend_from_slice(body.as_bytes());
    std::fs::write(path, out)?;
    Ok(())
}

#[cfg(test)]
#[path = "report_tests.rs"]
mod tests;
