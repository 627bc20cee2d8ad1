// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The on-disk receipt of a package installation.
//!
//! Created by the installer as the last step of a successful install and
//! consulted by the registry on every scan to bind an installed
//! application to its storage location.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationReport {
    pub application_id: String,
    pub installation_location_id: String,
    pub disk_space_used: u64,
    /// Hex SHA-256 over the package payload
    pub digest: String,
    /// Subject names of the verified signer chain, outermost first;
    /// empty for unsigned installations
    #[serde(default)]
    pub signer_chain: Vec<String>,
    /// Numeric uid assigned under user-id separation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_uid: Option<u32>,
    /// RFC 3339 timestamp of the install
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl InstallationReport {
    pub fn is_signed(&self) -> bool {
        !self.signer_chain.is_empty()
    }
}
