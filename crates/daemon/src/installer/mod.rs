// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The installer task engine.
//!
//! Every mutation of installed state is an asynchronous task with an
//! opaque id. Install: `Queued → Receiving → AwaitingAck → Applying →
//! Finished|Failed`; removal skips the acknowledge gate. A failed task
//! removes everything it created before the failure becomes observable.
//! At most one task applies per location; disjoint locations proceed in
//! parallel.

pub mod package;
pub mod task;

pub use task::{InstallerSignal, TaskKind, TaskState};

use crate::event_bus::EventBus;
use am_core::{Application, Error, ErrorKind, Event, InstallationLocation, Result, TaskId};
use fs2::FileExt;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use task::{TaskControl, TaskCtx, TaskHandle, TaskTable};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

/// Numeric-uid assignment for installed applications (Linux only).
#[derive(Debug, Clone, Copy)]
pub struct UidSeparation {
    pub min_user_id: u32,
    pub max_user_id: u32,
    pub common_group_id: u32,
}

impl UidSeparation {
    /// Stable uid within `[min, max]`, derived from the application id.
    pub fn uid_for(&self, application_id: &str) -> u32 {
        let span = self.max_user_id.saturating_sub(self.min_user_id) + 1;
        let digest = Sha256::digest(application_id.as_bytes());
        let n = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]);
        self.min_user_id + n % span
    }
}

pub struct InstallerSetup {
    pub locations: Vec<InstallationLocation>,
    pub manifest_dir: PathBuf,
    pub image_mount_dir: PathBuf,
    pub hardware_id: String,
    pub ca_certificate_files: Vec<PathBuf>,
    pub allow_unsigned: bool,
    pub uid_separation: Option<UidSeparation>,
}

pub struct Installer {
    locations: Vec<InstallationLocation>,
    manifest_dir: PathBuf,
    ca_certificates: Vec<Vec<u8>>,
    allow_unsigned: bool,
    uid_separation: Option<UidSeparation>,
    tasks: TaskTable,
    signals: broadcast::Sender<InstallerSignal>,
    location_locks: HashMap<String, Arc<tokio::sync::Mutex<()>>>,
    bus: EventBus,
}

impl Installer {
    pub fn new(setup: InstallerSetup, bus: EventBus) -> Result<Self> {
        if setup.hardware_id.is_empty() {
            return Err(Error::system(
                "the installer is enabled, but the device-id is empty",
            ));
        }
        std::fs::create_dir_all(&setup.manifest_dir).map_err(|e| {
            Error::system(format!(
                "could not create manifest directory {}: {}",
                setup.manifest_dir.display(),
                e
            ))
        })?;
        std::fs::create_dir_all(&setup.image_mount_dir).map_err(|e| {
            Error::system(format!(
                "could not create the image-mount directory {}: {}",
                setup.image_mount_dir.display(),
                e
            ))
        })?;

        let mut ca_certificates = Vec::with_capacity(setup.ca_certificate_files.len());
        for path in &setup.ca_certificate_files {
            let cert = std::fs::read(path).map_err(|e| {
                Error::system(format!(
                    "could not open CA-certificate file {}: {}",
                    path.display(),
                    e
                ))
            })?;
            if cert.is_empty() {
                return Err(Error::system(format!(
                    "CA-certificate file {} is empty",
                    path.display()
                )));
            }
            ca_certificates.push(cert);
        }

        if !setup.allow_unsigned {
            if let Err(e) = am_crypto::initialize() {
                warn!(error = %e, "libcrypto unavailable; signed installs will fail");
            }
        }

        let location_locks = setup
            .locations
            .iter()
            .map(|l| (l.id(), Arc::new(tokio::sync::Mutex::new(()))))
            .collect();

        let (signals, _) = broadcast::channel(256);
        Ok(Self {
            locations: setup.locations,
            manifest_dir: setup.manifest_dir,
            ca_certificates,
            allow_unsigned: setup.allow_unsigned,
            uid_separation: setup.uid_separation,
            tasks: Arc::new(parking_lot::Mutex::new(HashMap::new())),
            signals,
            location_locks,
            bus,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InstallerSignal> {
        self.signals.subscribe()
    }

    pub fn locations(&self) -> &[InstallationLocation] {
        &self.locations
    }

    pub fn installation_location_ids(&self) -> Vec<String> {
        self.locations.iter().map(|l| l.id()).collect()
    }

    pub fn get_installation_location(&self, id: &str) -> Option<serde_json::Value> {
        self.locations
            .iter()
            .find(|l| l.id() == id)
            .map(|l| l.to_map())
    }

    pub fn default_location(&self) -> Option<&InstallationLocation> {
        self.locations
            .iter()
            .find(|l| l.is_default)
            .or_else(|| self.locations.first())
    }

    pub fn task_state(&self, task: &TaskId) -> Option<(TaskKind, TaskState)> {
        self.tasks.lock().get(task).map(|h| (h.kind, h.state))
    }

    fn location(&self, id: &str) -> Result<&InstallationLocation> {
        let location = self
            .locations
            .iter()
            .find(|l| l.id() == id)
            .ok_or_else(|| Error::not_found(format!("no installation location {id:?}")))?;
        if !location.is_mounted() {
            return Err(Error::not_found(format!(
                "installation location {id:?} is not mounted"
            )));
        }
        Ok(location)
    }

    fn new_task(&self, kind: TaskKind, location_id: &str) -> (TaskCtx, mpsc::UnboundedReceiver<TaskControl>) {
        let id = TaskId(uuid::Uuid::new_v4().to_string());
        let (control, control_rx) = mpsc::unbounded_channel();
        self.tasks.lock().insert(
            id.clone(),
            TaskHandle {
                kind,
                location_id: location_id.to_string(),
                application_id: None,
                state: TaskState::Queued,
                control,
            },
        );
        (
            TaskCtx {
                id,
                tasks: Arc::clone(&self.tasks),
                signals: self.signals.clone(),
                bus: self.bus.clone(),
            },
            control_rx,
        )
    }

    // -- install -------------------------------------------------------

    /// Begin installing a package file into a location. Returns the task
    /// id synchronously; progress arrives via the signal stream.
    pub fn start_package_installation(
        &self,
        location_id: &str,
        package: PathBuf,
    ) -> Result<TaskId> {
        let location = self.location(location_id)?.clone();
        let (ctx, control_rx) = self.new_task(TaskKind::Install, location_id);
        let task_id = ctx.id.clone();
        info!(task = %task_id, location = location_id, package = %package.display(), "installation task created");

        let location_lock = self
            .location_locks
            .get(location_id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("no installation location {location_id:?}")))?;
        let flow = InstallFlow {
            ctx,
            control_rx,
            package,
            location,
            manifest_dir: self.manifest_dir.clone(),
            ca_certificates: self.ca_certificates.clone(),
            allow_unsigned: self.allow_unsigned,
            uid_separation: self.uid_separation,
            location_lock,
        };
        tokio::spawn(flow.run());
        Ok(task_id)
    }

    pub fn acknowledge_package_installation(&self, task: &TaskId) -> Result<()> {
        self.send_control(task, TaskControl::Acknowledge, |state| {
            if state == TaskState::AwaitingAck || state == TaskState::Receiving {
                Ok(())
            } else {
                Err(Error::system(format!(
                    "task in state {state} is not awaiting acknowledge"
                )))
            }
        })
    }

    pub fn cancel_task(&self, task: &TaskId) -> Result<()> {
        self.send_control(task, TaskControl::Cancel, task::cancelable)
    }

    fn send_control(
        &self,
        task: &TaskId,
        control: TaskControl,
        check: impl Fn(TaskState) -> Result<()>,
    ) -> Result<()> {
        let tasks = self.tasks.lock();
        let handle = tasks
            .get(task)
            .ok_or_else(|| Error::not_found(format!("no task {task}")))?;
        check(handle.state)?;
        handle
            .control
            .send(control)
            .map_err(|_| Error::system("task is no longer reachable"))
    }

    // -- remove --------------------------------------------------------

    /// Begin removing an installed application. `running` is the
    /// manager's view; a running application is only removed with
    /// `force`.
    pub fn remove_package(
        &self,
        application_id: &str,
        keep_documents: bool,
        force: bool,
        running: bool,
    ) -> Result<TaskId> {
        let report_path = self
            .manifest_dir
            .join(application_id)
            .join("installation-report.yaml");
        let report = am_manifest::load_report(&report_path)
            .map_err(|_| Error::not_found(format!("application {application_id:?} is not installed")))?;
        let location = self.location(&report.installation_location_id)?.clone();

        let (ctx, control_rx) = self.new_task(TaskKind::Remove, &location.id());
        ctx.set_application_id(application_id);
        let task_id = ctx.id.clone();
        info!(task = %task_id, id = application_id, "removal task created");

        if running && !force {
            let error = Error::new(
                ErrorKind::AppRunning,
                format!("application {application_id:?} is running"),
            );
            tokio::spawn(async move {
                ctx.fail(&error);
            });
            return Ok(task_id);
        }

        let location_lock = self
            .location_locks
            .get(report.installation_location_id.as_str())
            .cloned()
            .ok_or_else(|| {
                Error::not_found(format!(
                    "no installation location {:?}",
                    report.installation_location_id
                ))
            })?;
        let flow = RemoveFlow {
            ctx,
            control_rx,
            application_id: application_id.to_string(),
            keep_documents,
            location,
            manifest_dir: self.manifest_dir.clone(),
            location_lock,
        };
        tokio::spawn(flow.run());
        Ok(task_id)
    }

    // -- crash recovery ------------------------------------------------

    /// Remove staging leftovers and installations without a valid
    /// report. Runs at startup, before the registry scan.
    pub fn cleanup_broken_installations(&self) -> Result<usize> {
        let mut removed = 0usize;

        for location in &self.locations {
            if !location.is_mounted() {
                continue;
            }
            let entries = match std::fs::read_dir(&location.installation_path) {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_dir() {
                    // lock files and other infrastructure
                    continue;
                }
                let Some(name) = path.file_name().and_then(|n| n.to_str()).map(String::from)
                else {
                    continue;
                };
                let broken = name.ends_with('+')
                    || name.ends_with('-')
                    || !self.report_is_valid(&name, &location.id());
                if broken {
                    warn!(path = %path.display(), "removing broken installation");
                    remove_path(&path);
                    removed += 1;
                }
            }
        }

        let entries = std::fs::read_dir(&self.manifest_dir)
            .map_err(|e| Error::io(e.to_string()))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(String::from) else {
                continue;
            };
            let report = am_manifest::load_report(&path.join("installation-report.yaml")).ok();
            let broken = match report {
                None => true,
                Some(report) => {
                    // valid report, but the code directory is gone
                    !self
                        .locations
                        .iter()
                        .any(|l| l.id() == report.installation_location_id
                            && l.installation_path.join(&name).is_dir())
                }
            };
            if broken {
                warn!(path = %path.display(), "removing orphaned manifest entry");
                remove_path(&path);
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn report_is_valid(&self, application_id: &str, location_id: &str) -> bool {
        let path = self
            .manifest_dir
            .join(application_id)
            .join("installation-report.yaml");
        match am_manifest::load_report(&path) {
            Ok(report) => report.installation_location_id == location_id,
            Err(_) => false,
        }
    }
}

fn remove_path(path: &Path) {
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    if let Err(e) = result {
        warn!(path = %path.display(), error = %e, "cleanup failed");
    }
}

// -- install flow ------------------------------------------------------

struct InstallFlow {
    ctx: TaskCtx,
    control_rx: mpsc::UnboundedReceiver<TaskControl>,
    package: PathBuf,
    location: InstallationLocation,
    manifest_dir: PathBuf,
    ca_certificates: Vec<Vec<u8>>,
    allow_unsigned: bool,
    uid_separation: Option<UidSeparation>,
    location_lock: Arc<tokio::sync::Mutex<()>>,
}

impl InstallFlow {
    async fn run(mut self) {
        match self.execute().await {
            Ok(application) => {
                self.ctx.progress(1.0);
                self.ctx.set_state(TaskState::Finished);
                self.ctx.emit(InstallerSignal::Finished {
                    task_id: self.ctx.id.clone(),
                });
                let _ = self.ctx.bus.send(Event::InstallerInstalled {
                    task: self.ctx.id.clone(),
                    application: Box::new(application),
                });
            }
            Err((error, staging)) => {
                // artifacts disappear before Failed becomes observable
                if let Some(staging) = staging {
                    let _ = tokio::task::spawn_blocking(move || remove_path(&staging)).await;
                }
                self.ctx.fail(&error);
            }
        }
    }

    async fn execute(&mut self) -> std::result::Result<Application, (Error, Option<PathBuf>)> {
        self.ctx.set_state(TaskState::Receiving);
        self.ctx.progress(0.0);

        // read, digest, and stage the package
        let package = self.package.clone();
        let install_path = self.location.installation_path.clone();
        let contents = tokio::task::spawn_blocking(move || {
            package::read_and_stage(&package, &install_path)
        })
        .await
        .map_err(|e| (Error::system(e.to_string()), None))?
        .map_err(|e| (e, None))?;

        let staging = contents.staging_dir.clone();
        let fail = |e: Error| (e, Some(staging.clone()));
        self.ctx.set_application_id(&contents.application.id);

        if let Some((_, free)) = self.location.installation_device_free_space() {
            if contents.disk_space_used > free {
                return Err(fail(Error::io(format!(
                    "not enough free space: the package needs {} bytes",
                    contents.disk_space_used
                ))));
            }
        }

        // an update must target the location it is already installed at
        let report_path = self
            .manifest_dir
            .join(&contents.application.id)
            .join("installation-report.yaml");
        if let Ok(existing) = am_manifest::load_report(&report_path) {
            if existing.installation_location_id != self.location.id() {
                return Err(fail(Error::new(
                    ErrorKind::AlreadyExists,
                    format!(
                        "application {} is already installed at {}",
                        contents.application.id, existing.installation_location_id
                    ),
                )));
            }
        }

        // signature chain, unless unsigned packages are allowed
        let signer_chain = if self.allow_unsigned {
            Vec::new()
        } else {
            let Some(signature) = contents.signature.clone() else {
                return Err(fail(Error::security("package is not signed")));
            };
            let digest = contents.digest.clone().into_bytes();
            let ca_certificates = self.ca_certificates.clone();
            tokio::task::spawn_blocking(move || {
                am_crypto::verify_signer_chain(&digest, &signature, &ca_certificates)
            })
            .await
            .map_err(|e| fail(Error::system(e.to_string())))?
            .map_err(|e| fail(e.into()))?
        };

        self.ctx.progress(0.5);

        // acknowledge gate: waits indefinitely for the client
        self.ctx.emit(InstallerSignal::RequiresAcknowledge {
            task_id: self.ctx.id.clone(),
            manifest: manifest_map(&contents.manifest_text).map_err(&fail)?,
        });
        self.ctx.set_state(TaskState::AwaitingAck);
        match self.control_rx.recv().await {
            Some(TaskControl::Acknowledge) => {}
            Some(TaskControl::Cancel) | None => {
                return Err(fail(Error::canceled("installation canceled")));
            }
        }

        self.ctx.set_state(TaskState::Applying);
        let _location_guard = self.location_lock.lock().await;

        let params = ApplyParams {
            application: contents.application,
            manifest_text: contents.manifest_text,
            digest: contents.digest,
            disk_space_used: contents.disk_space_used,
            signer_chain,
            staging,
            location: self.location.clone(),
            manifest_dir: self.manifest_dir.clone(),
            uid_separation: self.uid_separation,
        };
        tokio::task::spawn_blocking(move || apply_install(params))
            .await
            .map_err(|e| (Error::system(e.to_string()), None))?
    }
}

fn manifest_map(manifest_text: &str) -> Result<serde_json::Value> {
    let docs = am_manifest::split_documents(manifest_text).map_err(am_core::Error::from)?;
    let body = docs
        .get(1)
        .ok_or_else(|| Error::parse("manifest has no body document"))?;
    am_manifest::docs::to_json(body).map_err(am_core::Error::from)
}

struct ApplyParams {
    application: Application,
    manifest_text: String,
    digest: String,
    disk_space_used: u64,
    signer_chain: Vec<String>,
    staging: PathBuf,
    location: InstallationLocation,
    manifest_dir: PathBuf,
    uid_separation: Option<UidSeparation>,
}

/// The commit step. Holds the location's file lock; the rename is the
/// atomicity point and the report write is last.
fn apply_install(p: ApplyParams) -> std::result::Result<Application, (Error, Option<PathBuf>)> {
    let fail = |e: Error| (e, Some(p.staging.clone()));

    let _lock = lock_location(&p.location.installation_path).map_err(&fail)?;

    let app_id = p.application.id.clone();
    let final_dir = p.location.installation_path.join(&app_id);
    let document_dir = p.location.document_path.join(&app_id);
    let manifest_dir = p.manifest_dir.join(&app_id);

    let documents_existed = document_dir.exists();
    std::fs::create_dir_all(&document_dir).map_err(|e| fail(e.into()))?;

    let uid = p.uid_separation.map(|s| s.uid_for(&app_id));
    if let Some(uid) = uid {
        let gid = p.uid_separation.map(|s| s.common_group_id);
        apply_ownership(&p.staging, uid, gid);
        apply_ownership(&document_dir, uid, gid);
    }

    let commit = (|| -> Result<am_core::InstallationReport> {
        // updates replace the previous installation in place
        if final_dir.exists() {
            std::fs::remove_dir_all(&final_dir)?;
        }
        std::fs::rename(&p.staging, &final_dir)?;

        std::fs::create_dir_all(&manifest_dir)?;
        std::fs::write(manifest_dir.join("info.yaml"), &p.manifest_text)?;

        let report = am_core::InstallationReport {
            application_id: app_id.clone(),
            installation_location_id: p.location.id(),
            disk_space_used: p.disk_space_used,
            digest: p.digest.clone(),
            signer_chain: p.signer_chain.clone(),
            application_uid: uid,
            created_at: Some(chrono::Utc::now().to_rfc3339()),
        };
        am_manifest::save_report(&manifest_dir.join("installation-report.yaml"), &report)
            .map_err(am_core::Error::from)?;
        Ok(report)
    })();

    match commit {
        Ok(report) => {
            let mut application = p.application;
            application.code_dir = final_dir;
            application.installation_report = Some(report);
            Ok(application)
        }
        Err(e) => {
            // unwind whatever this task created
            remove_path(&p.staging);
            if !manifest_dir.join("installation-report.yaml").exists() {
                if final_dir.exists() {
                    remove_path(&final_dir);
                }
                if manifest_dir.exists() {
                    remove_path(&manifest_dir);
                }
            }
            if !documents_existed && document_dir.exists() {
                remove_path(&document_dir);
            }
            Err((e, None))
        }
    }
}

fn lock_location(install_path: &Path) -> Result<std::fs::File> {
    let lock_path = install_path.join(".apps.lock");
    let file = std::fs::File::create(&lock_path)
        .map_err(|e| Error::io(format!("cannot create {}: {}", lock_path.display(), e)))?;
    file.lock_exclusive()
        .map_err(|e| Error::system(format!("cannot lock {}: {}", lock_path.display(), e)))?;
    Ok(file)
}

#[cfg(target_os = "linux")]
fn apply_ownership(root: &Path, uid: u32, gid: Option<u32>) {
    fn walk(path: &Path, uid: u32, gid: Option<u32>) {
        if std::os::unix::fs::chown(path, Some(uid), gid).is_err() {
            // needs privileges; installs still work without separation
            warn!(path = %path.display(), uid, "could not change ownership");
            return;
        }
        if let Ok(entries) = std::fs::read_dir(path) {
            for entry in entries.flatten() {
                walk(&entry.path(), uid, gid);
            }
        }
    }
    walk(root, uid, gid);
}

#[cfg(not(target_os = "linux"))]
fn apply_ownership(_root: &Path, _uid: u32, _gid: Option<u32>) {}

// -- remove flow -------------------------------------------------------

struct RemoveFlow {
    ctx: TaskCtx,
    control_rx: mpsc::UnboundedReceiver<TaskControl>,
    application_id: String,
    keep_documents: bool,
    location: InstallationLocation,
    manifest_dir: PathBuf,
    location_lock: Arc<tokio::sync::Mutex<()>>,
}

impl RemoveFlow {
    async fn run(mut self) {
        match self.execute().await {
            Ok(()) => {
                self.ctx.set_state(TaskState::Finished);
                self.ctx.emit(InstallerSignal::Finished {
                    task_id: self.ctx.id.clone(),
                });
                let _ = self.ctx.bus.send(Event::InstallerRemoved {
                    task: self.ctx.id.clone(),
                    application_id: self.application_id.clone(),
                });
            }
            Err(error) => self.ctx.fail(&error),
        }
    }

    async fn execute(&mut self) -> Result<()> {
        // a cancel racing task creation is still honored
        if let Ok(TaskControl::Cancel) = self.control_rx.try_recv() {
            return Err(Error::canceled("removal canceled"));
        }

        self.ctx.set_state(TaskState::Applying);
        let _location_guard = self.location_lock.lock().await;

        let application_id = self.application_id.clone();
        let keep_documents = self.keep_documents;
        let location = self.location.clone();
        let manifest_dir = self.manifest_dir.clone();
        tokio::task::spawn_blocking(move || {
            let _lock = lock_location(&location.installation_path)?;

            let install_dir = location.installation_path.join(&application_id);
            if install_dir.exists() {
                // the `-` suffix marks a half-removed installation for
                // startup cleanup
                let doomed = location
                    .installation_path
                    .join(format!("{application_id}-"));
                std::fs::rename(&install_dir, &doomed)?;
                std::fs::remove_dir_all(&doomed)?;
            }

            let manifest_entry = manifest_dir.join(&application_id);
            if manifest_entry.exists() {
                std::fs::remove_dir_all(&manifest_entry)?;
            }

            if !keep_documents {
                let document_dir = location.document_path.join(&application_id);
                if document_dir.exists() {
                    std::fs::remove_dir_all(&document_dir)?;
                }
            }
            Ok(())
        })
        .await
        .map_err(|e| Error::system(e.to_string()))?
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
