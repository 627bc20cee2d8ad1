// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

pub(crate) fn test_app(id: &str) -> Application {
    Application {
        id: id.to_string(),
        code_dir: PathBuf::from("/opt/am/manifests").join(id),
        main_file: "app".to_string(),
        runtime_name: "native".to_string(),
        runtime_parameters: IndexMap::new(),
        supports_application_interface: false,
        built_in: false,
        alias_of: None,
        installation_report: None,
    }
}

#[parameterized(
    simple = { "com.x.a" },
    long_chain = { "io.qt.application-manager.demo1" },
    digits = { "org.app2.v3" },
)]
fn accepts_valid_ids(id: &str) {
    assert!(is_valid_application_id(id, false).is_ok(), "{id}");
}

#[parameterized(
    empty = { "" },
    single_label = { "application" },
    empty_label = { "com..a" },
    uppercase = { "com.X.a" },
    leading_digit = { "com.1x.a" },
    trailing_dash = { "com.x-.a" },
    space = { "com.x a.b" },
    alias_without_permission = { "com.x.a@ru" },
)]
fn rejects_invalid_ids(id: &str) {
    assert!(is_valid_application_id(id, false).is_err(), "{id}");
}

#[test]
fn alias_ids_accepted_when_allowed() {
    assert!(is_valid_application_id("com.x.a@ru", true).is_ok());
    assert!(is_valid_application_id("com.x.a@RU", true).is_err());
    assert!(is_valid_application_id("com.x.a@", true).is_err());
}

#[test]
fn overlong_id_rejected() {
    let id = format!("com.{}.a", "x".repeat(MAX_ID_LEN));
    assert!(is_valid_application_id(&id, false).is_err());
}

#[test]
fn non_aliased_id_follows_back_reference() {
    let mut alias = test_app("com.x.a@ru");
    alias.alias_of = Some("com.x.a".to_string());
    assert!(alias.is_alias());
    assert_eq!(alias.non_aliased_id(), "com.x.a");

    let base = test_app("com.x.a");
    assert_eq!(base.non_aliased_id(), "com.x.a");
}

#[test]
fn rebind_code_dir_appends_id() {
    let mut app = test_app("com.x.a");
    app.rebind_code_dir(Path::new("/media/sd/apps"));
    assert_eq!(app.code_dir, PathBuf::from("/media/sd/apps/com.x.a"));
}

#[test]
fn map_view_exposes_identity_fields() {
    let app = test_app("com.x.a");
    let map = app.to_map();
    assert_eq!(map["id"], "com.x.a");
    assert_eq!(map["runtimeName"], "native");
    assert_eq!(map["isAlias"], false);
}

#[test]
fn serde_round_trip_preserves_parameters() {
    let mut app = test_app("com.x.a");
    app.runtime_parameters
        .insert("loadDummyData".into(), serde_json::json!(true));
    let json = serde_json::to_string(&app).unwrap();
    let back: Application = serde_json::from_str(&json).unwrap();
    assert_eq!(back, app);
}
