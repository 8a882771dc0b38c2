// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::error::MatchError;
use crate::matcher::{
    LabelSelector, MatchCriteria, MatchPolicy, Matcher, NamedRuleWithOperations,
    SelectorOperator, StaticResourceMapper,
};
use crate::request::{AdmissionRequest, GroupVersionKind, GroupVersionResource, Operation};

use std::sync::Arc;

use serde_json::json;

fn request(group: &str, version: &str, resource: &str, sub: &str) -> AdmissionRequest {
    AdmissionRequest {
        kind: GroupVersionKind::new(group, version, "Deployment"),
        resource: GroupVersionResource::new(group, version, resource),
        sub_resource: sub.to_string(),
        name: "web".to_string(),
        namespace: "default".to_string(),
        operation: Operation::Create,
        object: Some(json!({"metadata": {"name": "web", "labels": {"app": "web"}}})),
        ..AdmissionRequest::default()
    }
}

fn rule(resources: &[&str]) -> NamedRuleWithOperations {
    NamedRuleWithOperations::new(&["*"], &["*"], &["*"], resources)
}

fn matches(criteria: &MatchCriteria, request: &AdmissionRequest) -> bool {
    Matcher::new()
        .matches(criteria, request, Some(&json!({"metadata": {}})), false)
        .unwrap()
}

#[test]
fn subresource_wildcards() {
    let pods = request("", "v1", "pods", "");
    let pods_log = request("", "v1", "pods", "log");

    let all_subresources = MatchCriteria::default().with_rule(rule(&["pods/*"]));
    assert!(matches(&all_subresources, &pods_log));
    assert!(!matches(&all_subresources, &pods));

    let all_resources = MatchCriteria::default().with_rule(rule(&["*"]));
    assert!(matches(&all_resources, &pods));
    assert!(!matches(&all_resources, &pods_log));

    let everything = MatchCriteria::default().with_rule(rule(&["*/*"]));
    assert!(matches(&everything, &pods));
    assert!(matches(&everything, &pods_log));

    let any_log = MatchCriteria::default().with_rule(rule(&["*/log"]));
    assert!(matches(&any_log, &pods_log));
    assert!(!matches(&any_log, &pods));
}

#[test]
fn groups_versions_and_operations() {
    let deploy = request("apps", "v1", "deployments", "");
    let criteria = MatchCriteria::default().with_rule(NamedRuleWithOperations::new(
        &["UPDATE"],
        &["apps"],
        &["v1"],
        &["deployments"],
    ));
    assert!(!matches(&criteria, &deploy));

    let mut update = deploy.clone();
    update.operation = Operation::Update;
    assert!(matches(&criteria, &update));

    let mut other_group = update.clone();
    other_group.resource.group = "extensions".to_string();
    assert!(!matches(&criteria, &other_group));
}

#[test]
fn scopes() {
    let namespaced = request("", "v1", "configmaps", "");
    let mut cluster = request("rbac.authorization.k8s.io", "v1", "clusterroles", "");
    cluster.namespace = String::new();
    let mut namespace = request("", "v1", "namespaces", "");
    namespace.namespace = "team-a".to_string();

    let only_namespaced =
        MatchCriteria::default().with_rule(rule(&["*"]).with_scope("Namespaced"));
    assert!(matches(&only_namespaced, &namespaced));
    assert!(!matches(&only_namespaced, &cluster));
    assert!(!matches(&only_namespaced, &namespace));

    let only_cluster = MatchCriteria::default().with_rule(rule(&["*"]).with_scope("Cluster"));
    assert!(!matches(&only_cluster, &namespaced));
    assert!(matches(&only_cluster, &cluster));
    assert!(matches(&only_cluster, &namespace));
}

#[test]
fn resource_names() {
    let deploy = request("apps", "v1", "deployments", "");
    let named = MatchCriteria::default()
        .with_rule(rule(&["deployments"]).with_resource_names(&["api", "web"]));
    assert!(matches(&named, &deploy));

    let other = MatchCriteria::default()
        .with_rule(rule(&["deployments"]).with_resource_names(&["api"]));
    assert!(!matches(&other, &deploy));
}

#[test]
fn exclusions_win() {
    let deploy = request("apps", "v1", "deployments", "");
    let criteria = MatchCriteria::default()
        .with_rule(rule(&["*"]))
        .with_exclude_rule(rule(&["deployments"]));
    assert!(!matches(&criteria, &deploy));
    assert!(matches(&criteria, &request("", "v1", "pods", "")));
}

#[test]
fn empty_rules_match_everything_only_for_bindings() {
    let deploy = request("apps", "v1", "deployments", "");
    let criteria = MatchCriteria::default();
    let ns = json!({"metadata": {}});
    assert!(Matcher::new()
        .matches(&criteria, &deploy, Some(&ns), true)
        .unwrap());
    assert!(!Matcher::new()
        .matches(&criteria, &deploy, Some(&ns), false)
        .unwrap());
}

fn deployment_mapper() -> StaticResourceMapper {
    StaticResourceMapper::new().with_equivalents([
        (
            GroupVersionResource::new("apps", "v1", "deployments"),
            GroupVersionKind::new("apps", "v1", "Deployment"),
        ),
        (
            GroupVersionResource::new("apps", "v1beta1", "deployments"),
            GroupVersionKind::new("apps", "v1beta1", "Deployment"),
        ),
    ])
}

#[test]
fn equivalent_policy_matches_other_versions() {
    let matcher = Matcher::new().with_mapper(Arc::new(deployment_mapper()));
    let v1beta1 = request("apps", "v1beta1", "deployments", "");
    let ns = json!({"metadata": {}});
    let criteria = MatchCriteria::default().with_rule(NamedRuleWithOperations::new(
        &["*"],
        &["apps"],
        &["v1"],
        &["deployments"],
    ));

    let equivalent = criteria.clone().with_policy(MatchPolicy::Equivalent);
    let matched = matcher
        .matching_resource(&equivalent, &v1beta1, Some(&ns), false)
        .unwrap()
        .unwrap();
    assert_eq!(
        matched.resource,
        GroupVersionResource::new("apps", "v1", "deployments")
    );
    assert_eq!(matched.kind, GroupVersionKind::new("apps", "v1", "Deployment"));

    let exact = criteria.with_policy(MatchPolicy::Exact);
    assert!(!matcher.matches(&exact, &v1beta1, Some(&ns), false).unwrap());
}

#[test]
fn equivalent_exclusions_apply() {
    let matcher = Matcher::new().with_mapper(Arc::new(deployment_mapper()));
    let v1beta1 = request("apps", "v1beta1", "deployments", "");
    let criteria = MatchCriteria::default()
        .with_rule(rule(&["*"]))
        .with_exclude_rule(NamedRuleWithOperations::new(
            &["*"],
            &["apps"],
            &["v1"],
            &["deployments"],
        ))
        .with_policy(MatchPolicy::Equivalent);
    assert!(!matcher
        .matches(&criteria, &v1beta1, Some(&json!({})), false)
        .unwrap());
}

#[test]
fn namespace_selector() {
    let criteria = MatchCriteria::default()
        .with_rule(rule(&["*"]))
        .with_namespace_selector(LabelSelector::default().with_label("env", "prod"));
    let deploy = request("apps", "v1", "deployments", "");
    let matcher = Matcher::new();

    let prod = json!({"metadata": {"name": "default", "labels": {"env": "prod"}}});
    let dev = json!({"metadata": {"name": "default", "labels": {"env": "dev"}}});
    assert!(matcher.matches(&criteria, &deploy, Some(&prod), false).unwrap());
    assert!(!matcher.matches(&criteria, &deploy, Some(&dev), false).unwrap());
    // Unknown namespaces do not match.
    assert!(!matcher.matches(&criteria, &deploy, None, false).unwrap());

    // Cluster scoped objects are not exempted by namespace selectors.
    let mut cluster = request("rbac.authorization.k8s.io", "v1", "clusterroles", "");
    cluster.namespace = String::new();
    assert!(matcher.matches(&criteria, &cluster, None, false).unwrap());

    // A namespace is selected by its own labels.
    let mut namespace = request("", "v1", "namespaces", "");
    namespace.namespace = "team-a".to_string();
    namespace.object = Some(prod.clone());
    assert!(matcher.matches(&criteria, &namespace, None, false).unwrap());
}

#[test]
fn object_selector() {
    let matcher = Matcher::new();
    let ns = json!({});
    let selected = MatchCriteria::default()
        .with_rule(rule(&["*"]))
        .with_object_selector(LabelSelector::default().with_label("app", "web"));
    let deploy = request("apps", "v1", "deployments", "");
    assert!(matcher.matches(&selected, &deploy, Some(&ns), false).unwrap());

    // Either the new or the old object may carry the labels.
    let mut relabeled = deploy.clone();
    relabeled.operation = Operation::Update;
    relabeled.object = Some(json!({"metadata": {"labels": {"app": "api"}}}));
    relabeled.old_object = Some(json!({"metadata": {"labels": {"app": "web"}}}));
    assert!(matcher.matches(&selected, &relabeled, Some(&ns), false).unwrap());

    // Objects without labels are selected by their empty label set.
    let mut unlabeled = deploy.clone();
    unlabeled.object = Some(json!({"metadata": {"name": "web"}}));
    assert!(!matcher.matches(&selected, &unlabeled, Some(&ns), false).unwrap());
    let no_env = MatchCriteria::default()
        .with_rule(rule(&["*"]))
        .with_object_selector(LabelSelector::default().with_expression(
            "env",
            SelectorOperator::DoesNotExist,
            &[],
        ));
    assert!(matcher.matches(&no_env, &unlabeled, Some(&ns), false).unwrap());
    let not_prod = MatchCriteria::default()
        .with_rule(rule(&["*"]))
        .with_object_selector(LabelSelector::default().with_expression(
            "env",
            SelectorOperator::NotIn,
            &["prod"],
        ));
    assert!(matcher.matches(&not_prod, &unlabeled, Some(&ns), false).unwrap());

    // Objects without metadata never match.
    unlabeled.object = Some(json!({"data": {}}));
    assert!(!matcher.matches(&no_env, &unlabeled, Some(&ns), false).unwrap());
    unlabeled.object = None;
    assert!(!matcher.matches(&selected, &unlabeled, Some(&ns), false).unwrap());
    assert!(!matcher.matches(&no_env, &unlabeled, Some(&ns), false).unwrap());
}

#[test]
fn invalid_selectors_propagate() {
    let criteria = MatchCriteria::default()
        .with_rule(rule(&["*"]))
        .with_object_selector(LabelSelector::default().with_expression(
            "app",
            SelectorOperator::In,
            &[],
        ));
    let result = Matcher::new().matches(
        &criteria,
        &request("apps", "v1", "deployments", ""),
        Some(&json!({})),
        false,
    );
    assert!(matches!(result, Err(MatchError::InvalidSelector(_))));
}

#[test]
fn decodes_criteria() {
    let criteria: MatchCriteria = serde_json::from_value(json!({
        "matchPolicy": "Equivalent",
        "resourceRules": [{
            "operations": ["CREATE", "UPDATE"],
            "apiGroups": ["apps"],
            "apiVersions": ["v1"],
            "resources": ["deployments", "deployments/scale"],
            "scope": "Namespaced",
            "resourceNames": ["web"]
        }],
        "objectSelector": {"matchLabels": {"app": "web"}}
    }))
    .unwrap();
    assert_eq!(criteria.match_policy, Some(MatchPolicy::Equivalent));
    let rule = &criteria.resource_rules[0];
    assert_eq!(rule.resource_names, vec!["web"]);
    assert_eq!(rule.rule.operations, vec!["CREATE", "UPDATE"]);
    assert_eq!(rule.rule.rule.scope.as_deref(), Some("Namespaced"));
    assert!(matches(&criteria, &request("apps", "v1", "deployments", "")));
}
