// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn manager() -> NotificationManager {
    NotificationManager::new(false)
}

#[test]
fn ids_are_assigned_sequentially() {
    let mut nm = manager();
    let a = nm.notify(None, 0, "a".into(), String::new(), None, -1);
    let b = nm.notify(None, 0, "b".into(), String::new(), None, -1);
    assert_ne!(a, b);
    assert_eq!(nm.active_count(), 2);
}

#[test]
fn replaces_id_reuses_the_notification() {
    let mut nm = manager();
    let id = nm.notify(Some("com.x.a".into()), 0, "v1".into(), String::new(), None, -1);
    let replaced = nm.notify(None, id, "v2".into(), String::new(), None, -1);
    assert_eq!(replaced, id);
    assert_eq!(nm.active_count(), 1);
}

#[test]
fn replacing_a_closed_id_creates_a_new_one() {
    let mut nm = manager();
    let id = nm.notify(None, 0, "x".into(), String::new(), None, -1);
    assert!(nm.close(id));
    assert!(!nm.close(id));
    let next = nm.notify(None, id, "y".into(), String::new(), None, -1);
    assert_ne!(next, id);
}
