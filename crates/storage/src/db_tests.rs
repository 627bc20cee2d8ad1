// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::BTreeSet;

fn app(id: &str) -> Application {
    Application {
        id: id.to_string(),
        code_dir: PathBuf::from("/opt/am/manifests").join(id),
        main_file: "app".into(),
        runtime_name: "native".into(),
        runtime_parameters: Default::default(),
        supports_application_interface: true,
        built_in: false,
        alias_of: None,
        installation_report: None,
    }
}

#[test]
fn write_then_read_is_identity() {
    let dir = tempfile::tempdir().unwrap();
    let db = ApplicationDb::new(dir.path().join("apps.db"));

    let apps = vec![app("com.x.a"), app("com.x.b"), app("org.demo.c")];
    db.write(&apps).unwrap();

    let loaded = db.read().unwrap();
    let ids: BTreeSet<_> = loaded.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, ["com.x.a", "com.x.b", "org.demo.c"].into());
    assert_eq!(loaded, apps);
}

#[test]
fn missing_file_is_recoverable() {
    let dir = tempfile::tempdir().unwrap();
    let db = ApplicationDb::new(dir.path().join("apps.db"));
    let err = db.read().unwrap_err();
    assert!(err.is_recoverable());
}

#[test]
fn wrong_magic_is_recoverable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("apps.db");
    std::fs::write(&path, b"not-a-db-at-all").unwrap();
    let err = ApplicationDb::new(&path).read().unwrap_err();
    assert!(matches!(&err, DbError::Invalid { .. }), "{err}");
    assert!(err.is_recoverable());
}

#[test]
fn unknown_version_is_recoverable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("apps.db");
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&DB_MAGIC);
    bytes.extend_from_slice(&99u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    std::fs::write(&path, bytes).unwrap();
    assert!(ApplicationDb::new(&path).read().unwrap_err().is_recoverable());
}

#[test]
fn truncated_record_is_recoverable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("apps.db");
    let db = ApplicationDb::new(&path);
    db.write(&[app("com.x.a")]).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 5]).unwrap();
    assert!(db.read().unwrap_err().is_recoverable());
}

#[test]
fn write_leaves_no_temp_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("apps.db");
    ApplicationDb::new(&path).write(&[app("com.x.a")]).unwrap();
    assert!(path.exists());
    assert!(!path.with_extension("tmp").exists());
}
