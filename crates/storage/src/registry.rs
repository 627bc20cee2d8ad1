// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The in-memory application registry backed by the binary database.

use crate::db::ApplicationDb;
use am_core::{Application, Error, Result};
use std::collections::HashMap;
use tracing::{info, warn};

pub struct ApplicationRegistry {
    db: ApplicationDb,
    apps: Vec<Application>,
    index: HashMap<String, usize>,
}

impl ApplicationRegistry {
    /// Open the database, or rebuild it from `scan` when it is absent or
    /// invalid. `recreate` forces the rebuild.
    pub fn open_or_recreate(
        db: ApplicationDb,
        recreate: bool,
        scan: impl FnOnce() -> Result<Vec<Application>>,
    ) -> Result<Self> {
        if !recreate && db.exists() {
            match db.read() {
                Ok(apps) => return Ok(Self::build(db, apps, false)),
                Err(e) if e.is_recoverable() => {
                    warn!(db = %db.path().display(), error = %e, "recreating application database");
                }
                Err(e) => return Err(Error::system(e.to_string())),
            }
        }

        let apps = scan()?;
        info!(count = apps.len(), "registering applications");
        let registry = Self::build(db, apps, true);
        registry
            .db
            .write(&registry.apps)
            .map_err(|e| Error::system(e.to_string()))?;
        Ok(registry)
    }

    fn build(db: ApplicationDb, apps: Vec<Application>, log_entries: bool) -> Self {
        let mut registry = Self {
            db,
            apps: Vec::with_capacity(apps.len()),
            index: HashMap::new(),
        };
        // bases first so alias back-references can be checked
        let (bases, aliases): (Vec<_>, Vec<_>) = apps.into_iter().partition(|a| !a.is_alias());
        for app in bases.into_iter().chain(aliases) {
            registry.insert_unpersisted(app, log_entries);
        }
        registry
    }

    fn insert_unpersisted(&mut self, app: Application, log_entry: bool) {
        if self.index.contains_key(&app.id) {
            warn!(id = app.id, "duplicate application id, keeping the first entry");
            return;
        }
        if let Some(base_id) = &app.alias_of {
            // an alias is never registered without its base
            if !self.index.contains_key(base_id) {
                warn!(id = app.id, base = base_id, "skipping alias without a base");
                return;
            }
        }
        if log_entry {
            info!(" * {} [at: {}]", app.id, app.code_dir.display());
        }
        self.index.insert(app.id.clone(), self.apps.len());
        self.apps.push(app);
    }

    /// Resolve an application by id; aliases resolve like any other entry.
    pub fn lookup(&self, id: &str) -> Option<&Application> {
        self.index.get(id).map(|&i| &self.apps[i])
    }

    /// The non-aliased application a start/stop operation targets.
    pub fn resolve_base(&self, id: &str) -> Option<&Application> {
        let app = self.lookup(id)?;
        self.lookup(app.non_aliased_id())
    }

    pub fn application_ids(&self) -> Vec<String> {
        self.apps.iter().map(|a| a.id.clone()).collect()
    }

    pub fn applications(&self) -> &[Application] {
        &self.apps
    }

    /// Add an installed application and persist the database.
    pub fn insert(&mut self, app: Application) -> Result<()> {
        if self.index.contains_key(&app.id) {
            self.remove_in_memory(&app.id);
        }
        self.insert_unpersisted(app, false);
        self.persist()
    }

    /// Remove an application (and its aliases) and persist the database.
    pub fn remove(&mut self, id: &str) -> Result<()> {
        self.remove_in_memory(id);
        self.persist()
    }

    fn remove_in_memory(&mut self, id: &str) {
        self.apps
            .retain(|a| a.id != id && a.alias_of.as_deref() != Some(id));
        self.reindex();
    }

    fn reindex(&mut self) {
        self.index = self
            .apps
            .iter()
            .enumerate()
            .map(|(i, a)| (a.id.clone(), i))
            .collect();
    }

    fn persist(&self) -> Result<()> {
        self.db
            .write(&self.apps)
            .map_err(|e| Error::system(e.to_string()))
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
