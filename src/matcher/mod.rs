// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Decides whether a policy applies to an admission request.
//!
//! Selectors are checked first, then exclusions, then resource rules. Under the `Equivalent`
//! policy a request that no rule matches exactly is retried against every resource known to be
//! equivalent to the one it names.

mod rules;
mod selectors;
mod validation;

#[cfg(test)]
mod tests;

pub use rules::{MatchRule, NamedRuleWithOperations, RuleWithOperations};
pub use selectors::{LabelSelector, LabelSelectorRequirement, SelectorOperator};
pub use validation::{validate_rule, validate_rule_with_operations};

use crate::error::MatchError;
use crate::request::{labels_of, AdmissionRequest, GroupVersionKind, GroupVersionResource};

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::trace;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchPolicy {
    #[default]
    Exact,
    Equivalent,
}

/// Selectors and resource rules deciding whether a policy applies to a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MatchCriteria {
    pub namespace_selector: LabelSelector,
    pub object_selector: LabelSelector,
    pub resource_rules: Vec<NamedRuleWithOperations>,
    pub exclude_resource_rules: Vec<NamedRuleWithOperations>,
    /// Absent means `Exact`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_policy: Option<MatchPolicy>,
}

impl MatchCriteria {
    pub fn with_rule(mut self, rule: NamedRuleWithOperations) -> Self {
        self.resource_rules.push(rule);
        self
    }

    pub fn with_exclude_rule(mut self, rule: NamedRuleWithOperations) -> Self {
        self.exclude_resource_rules.push(rule);
        self
    }

    pub fn with_policy(mut self, policy: MatchPolicy) -> Self {
        self.match_policy = Some(policy);
        self
    }

    pub fn with_namespace_selector(mut self, selector: LabelSelector) -> Self {
        self.namespace_selector = selector;
        self
    }

    pub fn with_object_selector(mut self, selector: LabelSelector) -> Self {
        self.object_selector = selector;
        self
    }
}

/// Maps a resource to the other resources serving the same objects, for example the same
/// resource under another version.
pub trait EquivalentResourceMapper: Send + Sync {
    /// Resources equivalent to `resource`, which may include `resource` itself.
    fn equivalent_resources_for(
        &self,
        resource: &GroupVersionResource,
        sub_resource: &str,
    ) -> Vec<GroupVersionResource>;

    /// Kind served by `resource`, if known.
    fn kind_for(&self, resource: &GroupVersionResource, sub_resource: &str)
        -> Option<GroupVersionKind>;
}

/// Mapper built from explicit equivalence classes.
#[derive(Debug, Clone, Default)]
pub struct StaticResourceMapper {
    classes: Vec<Vec<(GroupVersionResource, GroupVersionKind)>>,
}

impl StaticResourceMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a set of resources serving the same objects.
    pub fn with_equivalents(
        mut self,
        resources: impl IntoIterator<Item = (GroupVersionResource, GroupVersionKind)>,
    ) -> Self {
        self.classes.push(resources.into_iter().collect());
        self
    }

    fn class_of(
        &self,
        resource: &GroupVersionResource,
    ) -> Option<&[(GroupVersionResource, GroupVersionKind)]> {
        self.classes
            .iter()
            .find(|c| c.iter().any(|(r, _)| r == resource))
            .map(Vec::as_slice)
    }
}

impl EquivalentResourceMapper for StaticResourceMapper {
    fn equivalent_resources_for(
        &self,
        resource: &GroupVersionResource,
        _sub_resource: &str,
    ) -> Vec<GroupVersionResource> {
        self.class_of(resource)
            .map(|c| c.iter().map(|(r, _)| r.clone()).collect())
            .unwrap_or_default()
    }

    fn kind_for(
        &self,
        resource: &GroupVersionResource,
        _sub_resource: &str,
    ) -> Option<GroupVersionKind> {
        self.class_of(resource)?
            .iter()
            .find(|(r, _)| r == resource)
            .map(|(_, k)| k.clone())
    }
}

/// The resource a request matched as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedResource {
    pub resource: GroupVersionResource,
    pub sub_resource: String,
    pub kind: GroupVersionKind,
}

impl MatchedResource {
    fn of(request: &AdmissionRequest) -> Self {
        Self {
            resource: request.resource.clone(),
            sub_resource: request.sub_resource.clone(),
            kind: request.kind.clone(),
        }
    }
}

/// Matches requests against criteria.
#[derive(Clone, Default)]
pub struct Matcher {
    mapper: Option<Arc<dyn EquivalentResourceMapper>>,
}

impl core::fmt::Debug for Matcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Matcher")
            .field("has_mapper", &self.mapper.is_some())
            .finish()
    }
}

impl Matcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the mapper consulted under the `Equivalent` policy. Without one, `Equivalent`
    /// behaves like `Exact`.
    pub fn with_mapper(mut self, mapper: Arc<dyn EquivalentResourceMapper>) -> Self {
        self.mapper = Some(mapper);
        self
    }

    /// True if `criteria` selects `request`.
    ///
    /// `namespace_object` is the namespace the request's object lives in. `is_binding` selects
    /// the binding reading of an empty `resourceRules`, which matches every request.
    pub fn matches(
        &self,
        criteria: &MatchCriteria,
        request: &AdmissionRequest,
        namespace_object: Option<&serde_json::Value>,
        is_binding: bool,
    ) -> Result<bool, MatchError> {
        Ok(self
            .matching_resource(criteria, request, namespace_object, is_binding)?
            .is_some())
    }

    /// Like [`Matcher::matches`], returning the resource the request matched as. Under the
    /// `Equivalent` policy this may differ from the request's own resource.
    pub fn matching_resource(
        &self,
        criteria: &MatchCriteria,
        request: &AdmissionRequest,
        namespace_object: Option<&serde_json::Value>,
        is_binding: bool,
    ) -> Result<Option<MatchedResource>, MatchError> {
        if !self.matches_namespace_selector(criteria, request, namespace_object)? {
            trace!(name = %request.name, "namespace selector did not match");
            return Ok(None);
        }
        if !self.matches_object_selector(criteria, request)? {
            trace!(name = %request.name, "object selector did not match");
            return Ok(None);
        }
        let policy = criteria.match_policy.unwrap_or_default();
        if self
            .match_rules(&criteria.exclude_resource_rules, policy, request)
            .is_some()
        {
            return Ok(None);
        }
        if is_binding && criteria.resource_rules.is_empty() {
            return Ok(Some(MatchedResource::of(request)));
        }
        Ok(self.match_rules(&criteria.resource_rules, policy, request))
    }

    fn matches_namespace_selector(
        &self,
        criteria: &MatchCriteria,
        request: &AdmissionRequest,
        namespace_object: Option<&serde_json::Value>,
    ) -> Result<bool, MatchError> {
        let selector = &criteria.namespace_selector;
        if selector.is_empty() {
            return Ok(true);
        }
        let is_namespace = request.resource.is_namespaces();
        // Cluster scoped objects other than namespaces are never exempted by namespace.
        if request.namespace.is_empty() && !is_namespace {
            return Ok(true);
        }
        let labels = if is_namespace {
            // A namespace is selected by its own labels.
            labels_of(request.object.as_ref().or(request.old_object.as_ref()))
        } else {
            labels_of(namespace_object)
        };
        match labels {
            Some(labels) => selector.matches(&labels),
            None if namespace_object.is_some() || is_namespace => {
                selector.matches(&BTreeMap::new())
            }
            None => Ok(false),
        }
    }

    fn matches_object_selector(
        &self,
        criteria: &MatchCriteria,
        request: &AdmissionRequest,
    ) -> Result<bool, MatchError> {
        let selector = &criteria.object_selector;
        if selector.is_empty() {
            return Ok(true);
        }
        selector.validate()?;
        for labels in [request.object_labels(), request.old_object_labels()]
            .into_iter()
            .flatten()
        {
            if selector.matches(&labels)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn match_rules(
        &self,
        rules: &[NamedRuleWithOperations],
        policy: MatchPolicy,
        request: &AdmissionRequest,
    ) -> Option<MatchedResource> {
        if rules.iter().any(|r| r.matches(request, &request.resource)) {
            return Some(MatchedResource::of(request));
        }
        if policy == MatchPolicy::Exact {
            return None;
        }
        let mapper = self.mapper.as_ref()?;
        let equivalents =
            mapper.equivalent_resources_for(&request.resource, &request.sub_resource);
        // Earlier rules take precedence over earlier equivalents.
        for rule in rules {
            for equivalent in &equivalents {
                if *equivalent == request.resource || !rule.matches(request, equivalent) {
                    continue;
                }
                let kind = mapper
                    .kind_for(equivalent, &request.sub_resource)
                    .unwrap_or_else(|| request.kind.clone());
                trace!(resource = %equivalent, "matched equivalent resource");
                return Some(MatchedResource {
                    resource: equivalent.clone(),
                    sub_resource: request.sub_resource.clone(),
                    kind,
                });
            }
        }
        None
    }
}
