// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::error::MatchError;
use crate::matcher::{LabelSelector, SelectorOperator};

use std::collections::BTreeMap;

fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn empty_selector_matches_everything() {
    let selector = LabelSelector::default();
    assert!(selector.is_empty());
    assert!(selector.matches(&labels(&[])).unwrap());
    assert!(selector.matches(&labels(&[("a", "b")])).unwrap());
}

#[test]
fn match_labels_and_expressions_are_anded() {
    let selector = LabelSelector::default()
        .with_label("app", "web")
        .with_expression("tier", SelectorOperator::In, &["frontend", "edge"])
        .with_expression("legacy", SelectorOperator::DoesNotExist, &[]);

    assert!(selector
        .matches(&labels(&[("app", "web"), ("tier", "edge")]))
        .unwrap());
    assert!(!selector
        .matches(&labels(&[("app", "web"), ("tier", "backend")]))
        .unwrap());
    assert!(!selector
        .matches(&labels(&[("app", "web"), ("tier", "edge"), ("legacy", "")]))
        .unwrap());
    assert!(!selector.matches(&labels(&[("tier", "edge")])).unwrap());
}

#[test]
fn not_in_matches_missing_keys() {
    let selector =
        LabelSelector::default().with_expression("env", SelectorOperator::NotIn, &["prod"]);
    assert!(selector.matches(&labels(&[])).unwrap());
    assert!(selector.matches(&labels(&[("env", "dev")])).unwrap());
    assert!(!selector.matches(&labels(&[("env", "prod")])).unwrap());

    let exists = LabelSelector::default().with_expression("env", SelectorOperator::Exists, &[]);
    assert!(!exists.matches(&labels(&[])).unwrap());
    assert!(exists.matches(&labels(&[("env", "")])).unwrap());
}

#[test]
fn malformed_selectors_are_errors() {
    let cases = [
        LabelSelector::default().with_expression("env", SelectorOperator::In, &[]),
        LabelSelector::default().with_expression("env", SelectorOperator::Exists, &["x"]),
        LabelSelector::default().with_label("-bad", "x"),
        LabelSelector::default().with_label("Example.com/app", "x"),
        LabelSelector::default().with_label("app", "not valid"),
    ];
    for selector in cases {
        assert!(
            matches!(
                selector.matches(&labels(&[])),
                Err(MatchError::InvalidSelector(_))
            ),
            "{selector:?}"
        );
    }
    LabelSelector::default()
        .with_label("example.com/app", "web-1")
        .validate()
        .unwrap();
}

#[test]
fn decodes_from_yaml() {
    let selector: LabelSelector = serde_yaml::from_str(
        r#"
matchLabels:
  app: web
matchExpressions:
  - key: env
    operator: NotIn
    values: [prod]
"#,
    )
    .unwrap();
    assert!(selector
        .matches(&labels(&[("app", "web"), ("env", "dev")]))
        .unwrap());
}
