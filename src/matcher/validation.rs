// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Registration-time checks of match rules.

use super::rules::{
    MatchRule, NamedRuleWithOperations, RuleWithOperations, CLUSTER_SCOPE, NAMESPACED_SCOPE,
    WILDCARD,
};
use super::MatchCriteria;

use crate::error::{FieldError, FieldErrorKind, FieldErrors};
use crate::path::FieldPath;

use std::collections::BTreeSet;

const SUPPORTED_OPERATIONS: [&str; 5] = ["*", "CONNECT", "CREATE", "DELETE", "UPDATE"];
const SUPPORTED_SCOPES: [&str; 3] = ["*", "Cluster", "Namespaced"];

fn has_wildcard(items: &[String]) -> bool {
    items.iter().any(|i| i == WILDCARD)
}

fn supported(values: &[&str]) -> String {
    values
        .iter()
        .map(|v| format!("{v:?}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Validates a match rule, returning every problem found.
pub fn validate_rule(rule: &MatchRule, path: &FieldPath) -> FieldErrors {
    let mut errs = FieldErrors::new();
    let groups = path.child("apiGroups");
    if rule.api_groups.is_empty() {
        errs.push(FieldError::required(&groups, ""));
    }
    // The empty group is the legacy core group and is allowed.
    if rule.api_groups.len() > 1 && has_wildcard(&rule.api_groups) {
        errs.push(FieldError::invalid(
            &groups,
            "if '*' is present, must not specify other API groups",
        ));
    }

    let versions = path.child("apiVersions");
    if rule.api_versions.is_empty() {
        errs.push(FieldError::required(&versions, ""));
    }
    if rule.api_versions.len() > 1 && has_wildcard(&rule.api_versions) {
        errs.push(FieldError::invalid(
            &versions,
            "if '*' is present, must not specify other API versions",
        ));
    }
    for (idx, version) in rule.api_versions.iter().enumerate() {
        if version.is_empty() {
            errs.push(FieldError::required(&versions.index(idx), ""));
        }
    }

    errs.extend(validate_resources(&rule.resources, &path.child("resources")));

    if let Some(scope) = &rule.scope {
        if ![WILDCARD, CLUSTER_SCOPE, NAMESPACED_SCOPE].contains(&scope.as_str()) {
            errs.push(FieldError::not_supported(
                &path.child("scope"),
                format!("{scope:?}: supported values: {}", supported(&SUPPORTED_SCOPES)),
            ));
        }
    }
    errs
}

fn validate_resources(resources: &[String], path: &FieldPath) -> FieldErrors {
    let mut errs = FieldErrors::new();
    if resources.is_empty() {
        errs.push(FieldError::required(path, ""));
    }

    // x/*
    let mut wildcard_subresources = BTreeSet::new();
    // */x
    let mut wildcard_resources = BTreeSet::new();
    let mut has_double_wildcard = false;
    let mut has_single_wildcard = false;
    let mut has_plain_resource = false;

    for (idx, entry) in resources.iter().enumerate() {
        if entry.is_empty() {
            errs.push(FieldError::required(&path.index(idx), ""));
            continue;
        }
        has_double_wildcard |= entry == "*/*";
        has_single_wildcard |= entry == WILDCARD;
        let Some((res, sub)) = entry.split_once('/') else {
            has_plain_resource |= entry != WILDCARD;
            continue;
        };
        if wildcard_subresources.contains(res) {
            errs.push(FieldError::invalid(
                &path.index(idx),
                format!("if '{res}/*' is present, must not specify {entry}"),
            ));
        }
        if wildcard_resources.contains(sub) {
            errs.push(FieldError::invalid(
                &path.index(idx),
                format!("if '*/{sub}' is present, must not specify {entry}"),
            ));
        }
        if sub == WILDCARD {
            wildcard_subresources.insert(res);
        }
        if res == WILDCARD {
            wildcard_resources.insert(sub);
        }
    }

    if resources.len() > 1 && has_double_wildcard {
        errs.push(FieldError::invalid(
            path,
            "if '*/*' is present, must not specify other resources",
        ));
    }
    if has_single_wildcard && has_plain_resource {
        errs.push(FieldError::invalid(
            path,
            "if '*' is present, must not specify other resources without subresources",
        ));
    }
    errs
}

pub fn validate_rule_with_operations(rule: &RuleWithOperations, path: &FieldPath) -> FieldErrors {
    let mut errs = FieldErrors::new();
    let operations = path.child("operations");
    if rule.operations.is_empty() {
        errs.push(FieldError::required(&operations, ""));
    }
    if rule.operations.len() > 1 && has_wildcard(&rule.operations) {
        errs.push(FieldError::invalid(
            &operations,
            "if '*' is present, must not specify other operations",
        ));
    }
    for (idx, op) in rule.operations.iter().enumerate() {
        if !SUPPORTED_OPERATIONS.contains(&op.as_str()) {
            errs.push(FieldError::not_supported(
                &operations.index(idx),
                format!("{op:?}: supported values: {}", supported(&SUPPORTED_OPERATIONS)),
            ));
        }
    }
    errs.extend(validate_rule(&rule.rule, path));
    errs
}

fn validate_named_rules(rules: &[NamedRuleWithOperations], path: &FieldPath) -> FieldErrors {
    let mut errs = FieldErrors::new();
    for (idx, rule) in rules.iter().enumerate() {
        let rule_path = path.index(idx);
        errs.extend(validate_rule_with_operations(&rule.rule, &rule_path));
        let mut seen = BTreeSet::new();
        for (n, name) in rule.resource_names.iter().enumerate() {
            if !seen.insert(name) {
                errs.push(FieldError::new(
                    rule_path.child("resourceNames").index(n),
                    FieldErrorKind::Duplicate,
                    format!("{name:?}"),
                ));
            }
        }
    }
    errs
}

impl MatchCriteria {
    /// Checks the criteria can be registered. Definitions require at least one resource rule;
    /// bindings may leave them out to match everything their definition matches.
    pub fn validate(&self, is_binding: bool) -> FieldErrors {
        let mut errs = FieldErrors::new();
        if !is_binding && self.resource_rules.is_empty() {
            errs.push(FieldError::required(&FieldPath::root().child("resourceRules"), ""));
        }
        errs.extend(validate_named_rules(
            &self.resource_rules,
            &FieldPath::root().child("resourceRules"),
        ));
        errs.extend(validate_named_rules(
            &self.exclude_resource_rules,
            &FieldPath::root().child("excludeResourceRules"),
        ));
        for (name, selector) in [
            ("namespaceSelector", &self.namespace_selector),
            ("objectSelector", &self.object_selector),
        ] {
            if let Err(e) = selector.validate() {
                errs.push(FieldError::invalid(&FieldPath::root().child(name), e.to_string()));
            }
        }
        errs
    }
}
