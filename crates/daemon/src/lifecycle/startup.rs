// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The one valid startup order.
//!
//! Dependencies flow strictly downwards: system properties → runtimes
//! and containers → installation locations → application database →
//! singletons → installer → compositor collaborator. The crash handler
//! and logging are already up when this runs; RPC registration follows
//! afterwards, deferred by `registrationDelay`.

use super::DaemonState;
use crate::container::{ContainerFactory, ProcessContainerManager};
use crate::event_bus::{EventBus, EventReader};
use crate::installer::{Installer, InstallerSetup, UidSeparation};
use crate::manager::{ApplicationManager, ApplicationProperties, ManagerSettings};
use crate::notifications::NotificationManager;
use crate::quicklaunch::QuickLauncher;
use crate::rpc::{ListenCtx, Policy};
use crate::runtime::{InProcessRuntimeManager, NativeRuntimeManager, RuntimeFactory};
use crate::sysmonitor::SystemMonitor;
use crate::window::{HeadlessCompositor, WindowCompositor};
use crate::{event_bus, Config};
use am_core::{Error, InstallationLocation, Result, StartupTimer};
use am_storage::{ApplicationDb, ApplicationRegistry, ScanContext, ScanKind};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub struct StartupResult {
    pub daemon: DaemonState,
    pub event_reader: EventReader,
    pub listen_ctx: Arc<ListenCtx>,
    pub startup_timer: StartupTimer,
}

pub fn startup(config: Config) -> Result<StartupResult> {
    let mut timer = StartupTimer::new();
    let (bus, event_reader) = event_bus::channel();

    // system properties: public ⊂ protected ⊂ private
    let properties = layer_system_properties(&config);
    timer.checkpoint("after system-properties layering");

    // main entry resolution
    if let Some(main_entry) = &config.main_entry {
        if !main_entry.exists() {
            return Err(Error::system(format!(
                "no/invalid main entry file specified: {}",
                main_entry.display()
            )));
        }
    }
    timer.checkpoint("after main entry resolution");

    // single/multi-process decision
    if config.force_single_process && config.force_multi_process {
        return Err(Error::system(
            "you cannot enforce multi- and single-process mode at the same time",
        ));
    }
    let single_process = config.force_single_process;

    // runtimes and containers, fixed registration order
    let (containers, runtimes) = register_factories(&config, single_process)?;
    let containers = Arc::new(containers);
    let runtimes = Arc::new(runtimes);
    timer.checkpoint("after runtime registration");

    // installation locations
    let hardware_id = config.resolve_hardware_id();
    let locations =
        InstallationLocation::parse_list(&config.installation_locations, &hardware_id)?;
    timer.checkpoint("after installation-location setup");

    // application database
    let registry = load_database(&config, &runtimes, &locations)?;
    let registry = Arc::new(Mutex::new(registry));
    timer.checkpoint("after application database loading");

    // singletons
    let notifications = Arc::new(Mutex::new(NotificationManager::new(true)));
    let system_monitor = SystemMonitor::start(config.quick_launch.idle_load);

    let settings = ManagerSettings {
        quit_time: Duration::from_millis(config.timeouts.quit_time),
        start_timeout: Duration::from_millis(config.timeouts.start_timeout),
        single_process,
        debug_wrappers: config.debug_wrappers.clone(),
        properties,
    };
    let manager = Arc::new(Mutex::new(ApplicationManager::new(
        Arc::clone(&registry),
        Arc::clone(&containers),
        Arc::clone(&runtimes),
        bus.clone(),
        settings,
    )));
    timer.checkpoint("after ApplicationManager instantiation");

    let quick_launcher = Arc::new(Mutex::new(QuickLauncher::initialize(
        Arc::clone(&containers),
        Arc::clone(&runtimes),
        bus.clone(),
        config.quick_launch.runtimes_per_container,
        config.quick_launch.idle_load,
        system_monitor.subscribe(),
    )));
    manager.lock().set_quick_launcher(Arc::clone(&quick_launcher));
    timer.checkpoint("after quick-launcher setup");

    // installer
    let installer = setup_installer(&config, locations, hardware_id, bus.clone())?;
    let removed = installer.cleanup_broken_installations()?;
    if removed > 0 {
        info!(removed, "cleaned up broken installations");
    }
    let installer = Arc::new(installer);
    timer.checkpoint("after installer setup");

    // the out-of-scope compositor collaborator
    let mut window: Box<dyn WindowCompositor> = Box::new(HeadlessCompositor);
    window.setup(&config.ui);
    timer.checkpoint("after compositor attach");

    let listen_ctx = Arc::new(ListenCtx {
        manager: Arc::clone(&manager),
        installer: Arc::clone(&installer),
        notifications: Arc::clone(&notifications),
        policy: Policy::from_config(&config.rpc),
    });

    let daemon = DaemonState::new(
        config,
        bus,
        registry,
        manager,
        quick_launcher,
        installer,
        notifications,
        window,
        system_monitor,
    );

    Ok(StartupResult {
        daemon,
        event_reader,
        listen_ctx,
        startup_timer: timer,
    })
}

/// `public ⊂ protected ⊂ private`: third-party applications see the
/// public tier, built-in ones additionally the protected tier, the
/// system UI everything.
fn layer_system_properties(config: &Config) -> ApplicationProperties {
    let third_party = config.system_properties.public.clone();

    let mut built_in = third_party.clone();
    for (key, value) in &config.system_properties.protected {
        built_in.insert(key.clone(), value.clone());
    }

    // the private tier is consumed by the UI engine only; it never
    // reaches an application
    let mut system_ui = built_in.clone();
    for (key, value) in &config.system_properties.private {
        system_ui.insert(key.clone(), value.clone());
    }
    debug!(keys = system_ui.len(), "system properties layered");

    ApplicationProperties {
        third_party: serde_json::Value::Object(third_party),
        built_in: serde_json::Value::Object(built_in),
    }
}

fn register_factories(
    config: &Config,
    single_process: bool,
) -> Result<(ContainerFactory, RuntimeFactory)> {
    let empty = serde_json::Value::Null;

    let mut runtimes = RuntimeFactory::new();
    runtimes.register(Box::new(InProcessRuntimeManager::new(
        InProcessRuntimeManager::DEFAULT_IDENTIFIER,
    )))?;
    if single_process {
        runtimes.register(Box::new(InProcessRuntimeManager::new("qml")))?;
    } else {
        let native_config = config.runtimes.get("native").unwrap_or(&empty);
        runtimes.register(Box::new(NativeRuntimeManager::new(
            NativeRuntimeManager::DEFAULT_IDENTIFIER,
            native_config,
        )))?;
        let qml_config = config.runtimes.get("qml").unwrap_or(&empty);
        runtimes.register(Box::new(NativeRuntimeManager::new("qml", qml_config)))?;
    }

    // in-process runtimes own a container too (it just never starts), so
    // the process manager is registered in both modes
    let mut containers = ContainerFactory::new();
    let process_config = config
        .containers
        .get("process")
        .cloned()
        .unwrap_or(serde_json::json!({}));
    containers.register(Box::new(ProcessContainerManager::new(process_config)))?;
    containers.set_selection(&config.container_selection_pairs())?;
    Ok((containers, runtimes))
}

fn load_database(
    config: &Config,
    runtimes: &RuntimeFactory,
    locations: &[InstallationLocation],
) -> Result<ApplicationRegistry> {
    let db = ApplicationDb::new(config.database_path());
    let registered = runtimes.kinds();
    let quick_launch = runtimes.quick_launch_kinds();
    let builtin_dirs = config.builtin_apps_manifest_dirs.clone();
    let installed_dir = config.installed_apps_manifest_dir().to_path_buf();

    ApplicationRegistry::open_or_recreate(db, config.recreate_database, move || {
        let ctx = ScanContext {
            registered_runtimes: &registered,
            quick_launch_runtimes: &quick_launch,
            locations,
        };
        let mut apps = Vec::new();
        for dir in &builtin_dirs {
            apps.extend(am_storage::scan_tree(dir, ScanKind::BuiltIn, &ctx)?);
        }
        if installed_dir.is_dir() {
            apps.extend(am_storage::scan_tree(&installed_dir, ScanKind::Installed, &ctx)?);
        }
        Ok(apps)
    })
}

fn setup_installer(
    config: &Config,
    locations: Vec<InstallationLocation>,
    hardware_id: String,
    bus: EventBus,
) -> Result<Installer> {
    let uid_separation = config
        .installer
        .application_user_id_separation
        .as_ref()
        .map(|s| {
            if s.max_user_id < s.min_user_id {
                return Err(Error::parse(
                    "applicationUserIdSeparation: maxUserId is below minUserId",
                ));
            }
            Ok(UidSeparation {
                min_user_id: s.min_user_id,
                max_user_id: s.max_user_id,
                common_group_id: s.common_group_id,
            })
        })
        .transpose()?;

    #[cfg(not(target_os = "linux"))]
    if uid_separation.is_some() {
        tracing::warn!("application user-id separation requested, but not possible on this platform");
    }

    Installer::new(
        InstallerSetup {
            locations,
            manifest_dir: config.installed_apps_manifest_dir().to_path_buf(),
            image_mount_dir: config.app_image_mount_dir().to_path_buf(),
            hardware_id,
            ca_certificate_files: config.installer.ca_certificates.clone(),
            allow_unsigned: config.installer.allow_installation_of_unsigned_packages,
            uid_separation,
        },
        bus,
    )
}

#[cfg(test)]
#[path = "startup_tests.rs"]
mod tests;
