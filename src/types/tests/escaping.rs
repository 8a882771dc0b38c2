// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::types::{escape, is_root_reserved, unescape};

#[test]
fn escapes_substitution_table() {
    let cases = [
        ("simple", "simple"),
        ("has_underscore", "has_underscore"),
        ("has__dunder", "has__underscores__dunder"),
        ("dot.name", "dot__dot__name"),
        ("dash-name", "dash__dash__name"),
        ("slash/name", "slash__slash__name"),
        ("in", "__in__"),
        ("namespace", "__namespace__"),
        ("true", "__true__"),
        ("a.b-c/d__e", "a__dot__b__dash__c__slash__d__underscores__e"),
    ];
    for (name, escaped) in cases {
        assert_eq!(escape(name).as_deref(), Some(escaped), "escaping {name}");
        assert_eq!(unescape(escaped), name, "unescaping {escaped}");
    }
}

#[test]
fn rejects_unrepresentable_names() {
    for name in ["", "1leading", "has space", "colon:name", "unicodé"] {
        assert_eq!(escape(name), None, "{name} should not escape");
    }
}

#[test]
fn root_reserved_names() {
    assert!(is_root_reserved("int"));
    assert!(is_root_reserved("null_type"));
    assert!(!is_root_reserved("replicas"));
}
