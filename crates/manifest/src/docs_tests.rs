// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

const TWO_DOCS: &str = "\
formatType: am-application
formatVersion: 1
---
id: com.x.a
";

#[test]
fn splits_document_streams() {
    let docs = split_documents(TWO_DOCS).unwrap();
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[1]["id"], "com.x.a");
}

#[test]
fn header_check_passes_for_matching_stream() {
    let docs = split_documents(TWO_DOCS).unwrap();
    check_header(&docs, 2, &["am-application"], 1).unwrap();
}

#[test]
fn header_check_rejects_wrong_count() {
    let docs = split_documents("formatType: am-application\nformatVersion: 1\n").unwrap();
    let err = check_header(&docs, 2, &["am-application"], 1).unwrap_err();
    assert!(matches!(
        err,
        ManifestError::WrongDocumentCount { expected: 2, got: 1 }
    ));
}

#[test]
fn header_check_rejects_unknown_format_type() {
    let docs = split_documents(TWO_DOCS).unwrap();
    let err = check_header(&docs, 2, &["am-package-header"], 1).unwrap_err();
    assert!(matches!(err, ManifestError::WrongFormatType { .. }));
}

#[test]
fn header_check_rejects_off_by_one_version() {
    let docs = split_documents(TWO_DOCS).unwrap();
    let err = check_header(&docs, 2, &["am-application"], 2).unwrap_err();
    assert!(matches!(
        err,
        ManifestError::WrongFormatVersion { expected: 2, got: 1 }
    ));
}

#[test]
fn json_conversion_preserves_scalars_and_maps() {
    let docs = split_documents("a: 1\nb: [x, y]\nc: {d: true}\n").unwrap();
    let json = to_json(&docs[0]).unwrap();
    assert_eq!(json["a"], 1);
    assert_eq!(json["b"][1], "y");
    assert_eq!(json["c"]["d"], true);
}
