// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use admission_cel::matcher::{MatchCriteria, MatchPolicy, StaticResourceMapper};
use admission_cel::*;

use std::sync::Arc;

use anyhow::Result;
use serde_json::json;

const CRITERIA: &str = r#"
namespaceSelector:
  matchExpressions:
    - key: environment
      operator: In
      values: [prod, staging]
objectSelector:
  matchLabels:
    app: web
resourceRules:
  - apiGroups: [apps]
    apiVersions: [v1]
    operations: [CREATE, UPDATE]
    resources: [deployments, deployments/scale]
    scope: Namespaced
excludeResourceRules:
  - apiGroups: [apps]
    apiVersions: [v1]
    operations: ["*"]
    resources: [deployments]
    resourceNames: [legacy]
matchPolicy: Equivalent
"#;

fn request(name: &str, version: &str, sub_resource: &str) -> AdmissionRequest {
    AdmissionRequest {
        kind: GroupVersionKind::new("apps", version, "Deployment"),
        resource: GroupVersionResource::new("apps", version, "deployments"),
        sub_resource: sub_resource.to_string(),
        name: name.to_string(),
        namespace: "shop".to_string(),
        operation: Operation::Create,
        object: Some(json!({"metadata": {"name": name, "labels": {"app": "web"}}})),
        ..AdmissionRequest::default()
    }
}

fn namespace(environment: &str) -> serde_json::Value {
    json!({"metadata": {"name": "shop", "labels": {"environment": environment}}})
}

#[test]
fn decoded_criteria() -> Result<()> {
    let criteria: MatchCriteria = serde_yaml::from_str(CRITERIA)?;
    assert_eq!(criteria.match_policy, Some(MatchPolicy::Equivalent));
    assert!(criteria.validate(false).is_empty());

    let engine = Engine::new();
    let prod = namespace("prod");
    assert!(engine.matches(&criteria, &request("web", "v1", ""), Some(&prod), false)?);
    assert!(engine.matches(&criteria, &request("web", "v1", "scale"), Some(&prod), false)?);
    assert!(!engine.matches(&criteria, &request("web", "v1", "status"), Some(&prod), false)?);
    assert!(!engine.matches(&criteria, &request("legacy", "v1", ""), Some(&prod), false)?);

    let dev = namespace("dev");
    assert!(!engine.matches(&criteria, &request("web", "v1", ""), Some(&dev), false)?);
    assert!(!engine.matches(&criteria, &request("web", "v1", ""), None, false)?);
    Ok(())
}

#[test]
fn equivalent_versions() -> Result<()> {
    let criteria: MatchCriteria = serde_yaml::from_str(CRITERIA)?;
    let prod = namespace("prod");
    let old_version = request("web", "v1beta1", "");

    let mut engine = Engine::new();
    assert!(!engine.matches(&criteria, &old_version, Some(&prod), false)?);

    let mapper = StaticResourceMapper::new().with_equivalents([
        (
            GroupVersionResource::new("apps", "v1", "deployments"),
            GroupVersionKind::new("apps", "v1", "Deployment"),
        ),
        (
            GroupVersionResource::new("apps", "v1beta1", "deployments"),
            GroupVersionKind::new("apps", "v1beta1", "Deployment"),
        ),
    ]);
    engine.set_resource_mapper(Arc::new(mapper));
    let matched = engine
        .matching_resource(&criteria, &old_version, Some(&prod), false)?
        .expect("equivalent resource");
    assert_eq!(matched.resource.version, "v1");
    assert_eq!(matched.kind.version, "v1");

    // The exclusion applies to the equivalent resource too.
    assert!(!engine.matches(&criteria, &request("legacy", "v1beta1", ""), Some(&prod), false)?);
    Ok(())
}

#[test]
fn invalid_criteria_are_reported() -> Result<()> {
    let criteria: MatchCriteria = serde_yaml::from_str(
        r#"
resourceRules:
  - apiGroups: [apps]
    apiVersions: []
    operations: [DESTROY]
    resources: ["*/*", pods]
"#,
    )?;
    let errors = criteria.validate(false);
    assert!(!errors.is_empty());
    let text = errors.to_string();
    assert!(text.contains("resourceRules[0].apiVersions"), "{text}");
    assert!(text.contains("DESTROY"), "{text}");
    Ok(())
}
