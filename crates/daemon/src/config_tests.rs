// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn empty_config_gets_defaults() {
    let config = Config::load(None).unwrap();
    assert_eq!(config.database_path(), Path::new("/opt/am/apps.db"));
    assert_eq!(
        config.installed_apps_manifest_dir(),
        Path::new("/opt/am/manifests")
    );
    assert_eq!(
        config.app_image_mount_dir(),
        Path::new("/opt/am/image-mounts")
    );
    assert_eq!(config.installation_locations.len(), 1);
    assert!(config.installation_locations[0].is_default);
    assert_eq!(config.timeouts.quit_time, 250);
    assert!(config.crash_action.print_backtrace);
    assert!(config.installer.application_user_id_separation.is_none());
}

#[test]
fn full_config_parses() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(
        &path,
        r#"
mainEntry: /usr/share/ui/main.qml
hardwareId: test-device-1
database: /var/am/apps.db
builtinAppsManifestDirs: [/usr/share/am/apps]
installationLocations:
  - id: internal-0
    installationPath: /var/am/apps
    documentPath: /var/am/docs
    isDefault: true
  - id: removable-0
    installationPath: /media/sd/apps
    documentPath: /media/sd/docs
    mountPoint: /media/sd
containerSelection:
  - "com.demo.*": process
  - "*": process
quickLaunch:
  runtimesPerContainer: 11
  idleLoad: 0.5
installer:
  allowInstallationOfUnsignedPackages: true
  applicationUserIdSeparation:
    minUserId: 1200
    maxUserId: 1299
    commonGroupId: 1200
crashAction:
  printBacktrace: false
  waitForGdbAttach: 5
  dumpCore: false
rpc:
  registrationDelay: 200
  buses:
    ApplicationManager: session
    NotificationManager: none
  policies:
    ApplicationInstaller:
      startPackageInstallation:
        allowedUids: [0]
timeouts:
  quitTime: 500
systemProperties:
  public: {storeUrl: "https://store.example"}
  protected: {theme: dark}
  private: {secret: 1}
"#,
    )
    .unwrap();

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.resolve_hardware_id(), "test-device-1");
    assert_eq!(config.quick_launch.runtimes_per_container, 11);
    assert_eq!(
        config.container_selection_pairs(),
        vec![
            ("com.demo.*".to_string(), "process".to_string()),
            ("*".to_string(), "process".to_string()),
        ]
    );
    let separation = config.installer.application_user_id_separation.unwrap();
    assert_eq!(separation.min_user_id, 1200);
    assert_eq!(config.rpc.buses["NotificationManager"], "none");
    assert_eq!(
        config.rpc.policies["ApplicationInstaller"]["startPackageInstallation"].allowed_uids,
        vec![0]
    );
    assert_eq!(config.timeouts.quit_time, 500);
    assert_eq!(config.timeouts.start_timeout, 30_000);
    assert!(!config.crash_action.dump_core);
}

#[test]
fn unknown_keys_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "databasePathTypo: /tmp/x\n").unwrap();
    let err = Config::load(Some(&path)).unwrap_err();
    assert_eq!(err.kind, am_core::ErrorKind::Parse);
}

#[test]
fn incomplete_user_id_separation_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(
        &path,
        "installer:\n  applicationUserIdSeparation:\n    minUserId: 1200\n",
    )
    .unwrap();
    assert!(Config::load(Some(&path)).is_err());
}

#[test]
fn hardware_id_file_wins_over_interfaces() {
    let dir = tempfile::tempdir().unwrap();
    let id_file = dir.path().join("hwid");
    std::fs::write(&id_file, "  dev-42 \n").unwrap();

    let mut config = Config::load(None).unwrap();
    config.hardware_id_file = Some(id_file);
    assert_eq!(config.resolve_hardware_id(), "dev-42");
}
