// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::compiler::RuleCompiler;
use crate::error::SchemaError;
use crate::request::GroupVersionKind;
use crate::schema::Schema;
use crate::validator::{StaticSchemaResolver, ValidatorCache};

use std::sync::Arc;

use serde_json::json;

fn resolver() -> StaticSchemaResolver {
    let mut resolver = StaticSchemaResolver::new();
    let schema = Schema::from_json(&json!({
        "type": "object",
        "properties": {
            "spec": {
                "type": "object",
                "properties": {"replicas": {"type": "integer"}},
                "x-kubernetes-validations": [{"rule": "self.replicas >= 0"}]
            }
        }
    }))
    .unwrap();
    resolver.insert(GroupVersionKind::new("apps", "v1", "Deployment"), schema);
    resolver
}

#[test]
fn builds_once_and_shares() {
    let cache = ValidatorCache::new();
    let compiler = RuleCompiler::default();
    let resolver = resolver();
    let gvk = GroupVersionKind::new("apps", "v1", "Deployment");

    assert!(cache.get(&gvk).is_none());
    let first = cache.get_or_build(&gvk, &resolver, &compiler).unwrap();
    let second = cache.get_or_build(&gvk, &resolver, &compiler).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cache.len(), 1);
}

#[test]
fn unknown_kinds_are_errors() {
    let cache = ValidatorCache::new();
    let gvk = GroupVersionKind::new("", "v1", "Pod");
    let result = cache.get_or_build(&gvk, &resolver(), &RuleCompiler::default());
    assert!(matches!(result, Err(SchemaError::UnresolvedRef(_))));
    assert!(cache.is_empty());
}

#[test]
fn concurrent_builders_publish_one_tree() {
    let cache = Arc::new(ValidatorCache::new());
    let resolver = Arc::new(resolver());
    let gvk = GroupVersionKind::new("apps", "v1", "Deployment");

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let cache = cache.clone();
            let resolver = resolver.clone();
            let gvk = gvk.clone();
            std::thread::spawn(move || {
                cache
                    .get_or_build(&gvk, resolver.as_ref(), &RuleCompiler::default())
                    .unwrap()
            })
        })
        .collect();
    let built: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let published = cache.get(&gvk).unwrap();
    assert!(built.iter().all(|v| Arc::ptr_eq(v, &published)));
}
