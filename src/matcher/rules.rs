// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::request::{AdmissionRequest, GroupVersionResource};

use serde::{Deserialize, Serialize};

pub const WILDCARD: &str = "*";
pub const CLUSTER_SCOPE: &str = "Cluster";
pub const NAMESPACED_SCOPE: &str = "Namespaced";

/// Group, version and resource patterns selecting requests.
///
/// Resources are written as `resource` or `resource/subresource`. `*` matches every resource
/// without a subresource, `pods/*` matches every subresource of pods, `*/scale` matches the scale
/// subresource of every resource and `*/*` matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MatchRule {
    pub api_groups: Vec<String>,
    pub api_versions: Vec<String>,
    pub resources: Vec<String>,
    /// `Cluster`, `Namespaced` or `*`. Absent means `*`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleWithOperations {
    /// `CREATE`, `UPDATE`, `DELETE`, `CONNECT` or `*`.
    pub operations: Vec<String>,
    #[serde(flatten)]
    pub rule: MatchRule,
}

/// A rule further restricted to objects with the given names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NamedRuleWithOperations {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resource_names: Vec<String>,
    #[serde(flatten)]
    pub rule: RuleWithOperations,
}

impl NamedRuleWithOperations {
    pub fn new(operations: &[&str], groups: &[&str], versions: &[&str], resources: &[&str]) -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            resource_names: Vec::new(),
            rule: RuleWithOperations {
                operations: owned(operations),
                rule: MatchRule {
                    api_groups: owned(groups),
                    api_versions: owned(versions),
                    resources: owned(resources),
                    scope: None,
                },
            },
        }
    }

    pub fn with_scope(mut self, scope: &str) -> Self {
        self.rule.rule.scope = Some(scope.to_string());
        self
    }

    pub fn with_resource_names(mut self, names: &[&str]) -> Self {
        self.resource_names = names.iter().map(|s| s.to_string()).collect();
        self
    }

    /// True if the rule selects `request` when it is viewed as a request for `resource`.
    pub fn matches(&self, request: &AdmissionRequest, resource: &GroupVersionResource) -> bool {
        RuleMatcher {
            rule: &self.rule,
            request,
            resource,
        }
        .matches()
            && (self.resource_names.is_empty() || self.resource_names.contains(&request.name))
    }
}

pub(crate) fn split_resource(resource: &str) -> (&str, &str) {
    resource.split_once('/').unwrap_or((resource, ""))
}

fn wildcard_or(patterns: &[String], actual: &str) -> bool {
    patterns.iter().any(|p| p == WILDCARD || p == actual)
}

/// Evaluates one rule against a request whose resource may have been substituted by an
/// equivalent one.
struct RuleMatcher<'a> {
    rule: &'a RuleWithOperations,
    request: &'a AdmissionRequest,
    resource: &'a GroupVersionResource,
}

impl RuleMatcher<'_> {
    fn matches(&self) -> bool {
        self.scope() && self.operation() && self.group() && self.version() && self.resource()
    }

    fn scope(&self) -> bool {
        // Namespace objects are cluster scoped although their requests carry a namespace.
        let cluster_scoped =
            self.resource.is_namespaces() || self.request.namespace.is_empty();
        match self.rule.rule.scope.as_deref() {
            None | Some(WILDCARD) => true,
            Some(NAMESPACED_SCOPE) => !cluster_scoped,
            Some(CLUSTER_SCOPE) => cluster_scoped,
            Some(_) => false,
        }
    }

    fn operation(&self) -> bool {
        wildcard_or(&self.rule.operations, self.request.operation.as_str())
    }

    fn group(&self) -> bool {
        wildcard_or(&self.rule.rule.api_groups, &self.resource.group)
    }

    fn version(&self) -> bool {
        wildcard_or(&self.rule.rule.api_versions, &self.resource.version)
    }

    fn resource(&self) -> bool {
        let (op_res, op_sub) = (
            self.resource.resource.as_str(),
            self.request.sub_resource.as_str(),
        );
        self.rule.rule.resources.iter().any(|pattern| {
            let (res, sub) = split_resource(pattern);
            // `pods/*` covers the subresources of pods but not pods itself, `*/*` covers both.
            let sub_matches = match sub {
                WILDCARD => res == WILDCARD || !op_sub.is_empty(),
                _ => sub == op_sub,
            };
            (res == WILDCARD || res == op_res) && sub_matches
        })
    }
}
