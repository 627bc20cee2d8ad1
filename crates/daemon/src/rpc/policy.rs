// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-interface access policies.
//!
//! A policy maps method names to the peer uids allowed to call them.
//! Methods without an entry are unrestricted; with an entry, the caller's
//! socket credentials must match.

use crate::config::RpcConfig;
use crate::rpc::protocol::Interface;
use am_core::{Error, ErrorKind, Result};
use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct Policy {
    /// interface name → method name → allowed uids
    rules: HashMap<String, HashMap<String, Vec<u32>>>,
}

impl Policy {
    pub fn from_config(config: &RpcConfig) -> Self {
        let rules = config
            .policies
            .iter()
            .map(|(interface, methods)| {
                let methods = methods
                    .iter()
                    .map(|(method, entry)| (method.clone(), entry.allowed_uids.clone()))
                    .collect();
                (interface.clone(), methods)
            })
            .collect();
        Self { rules }
    }

    /// Check one incoming call.
    pub fn check(&self, interface: Interface, method: &str, peer_uid: u32) -> Result<()> {
        let Some(methods) = self.rules.get(interface.name()) else {
            return Ok(());
        };
        let Some(allowed) = methods.get(method) else {
            return Ok(());
        };
        if allowed.contains(&peer_uid) {
            return Ok(());
        }
        Err(Error::new(
            ErrorKind::Security,
            format!("uid {peer_uid} may not call {interface}.{method}"),
        ))
    }
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
