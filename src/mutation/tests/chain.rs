// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::deployment_schema;

use crate::activation::CallContext;
use crate::compiler::RuleCompiler;
use crate::error::MutationError;
use crate::mutation::{CompiledMutations, JsonPatchOperation, Mutation, PatchOp};
use crate::program::EvalOptions;

use std::sync::Arc;

use serde_json::{json, Value};

fn compile(mutations: &[Mutation]) -> CompiledMutations {
    CompiledMutations::new(
        mutations,
        Some(Arc::new(deployment_schema())),
        &RuleCompiler::default(),
    )
}

fn run(mutations: &CompiledMutations, object: Value, budget: i64) -> crate::mutation::MutationOutcome {
    mutations.apply(
        object,
        None,
        &CallContext::default(),
        &EvalOptions::default(),
        budget,
    )
}

fn replace_replicas(value: &str) -> Mutation {
    Mutation::json_patch(vec![
        JsonPatchOperation::new(PatchOp::Replace, "'/spec/replicas'").with_value(value)
    ])
}

#[test]
fn failed_test_operation_skips_the_patch() {
    let mutations = compile(&[Mutation::json_patch(vec![
        JsonPatchOperation::new(PatchOp::Test, "'/spec/replicas'").with_value("100"),
        JsonPatchOperation::new(PatchOp::Replace, "'/spec/replicas'").with_value("3"),
    ])]);
    let outcome = run(&mutations, json!({"spec": {"replicas": 1}}), 1000);
    assert!(outcome.error.is_none(), "{:?}", outcome.error);
    assert_eq!(outcome.object, json!({"spec": {"replicas": 1}}));
    assert!(outcome.remaining_budget < 1000);
}

#[test]
fn mutations_see_previous_results() {
    let mutations = compile(&[
        replace_replicas("object.spec.replicas * 2"),
        Mutation::apply_configuration(
            "Object{spec: Object.spec{replicas: object.spec.replicas + 1, tags: ['scaled']}}",
        ),
        Mutation::json_patch(vec![JsonPatchOperation::new(
            PatchOp::Add,
            "'/spec/containers/-'",
        )
        .with_value("Object.spec.containers{name: 'sidecar', image: 'envoy'}")]),
    ]);
    assert_eq!(mutations.len(), 3);
    let object = run(
        &mutations,
        json!({"spec": {"replicas": 2, "containers": []}}),
        1000,
    )
    .into_result()
    .unwrap();
    assert_eq!(
        object,
        json!({
            "spec": {
                "replicas": 5,
                "tags": ["scaled"],
                "containers": [{"name": "sidecar", "image": "envoy"}]
            }
        })
    );
}

#[test]
fn old_object_is_bound() {
    let mutations = compile(&[replace_replicas(
        "oldObject == null ? 0 : oldObject.spec.replicas",
    )]);
    let context = CallContext::default();
    let options = EvalOptions::default();
    let old = json!({"spec": {"replicas": 7}});
    let outcome = mutations.apply(
        json!({"spec": {"replicas": 1}}),
        Some(&old),
        &context,
        &options,
        1000,
    );
    assert_eq!(outcome.into_result().unwrap(), json!({"spec": {"replicas": 7}}));

    let outcome = run(&mutations, json!({"spec": {"replicas": 1}}), 1000);
    assert_eq!(outcome.into_result().unwrap(), json!({"spec": {"replicas": 0}}));
}

#[test]
fn compile_errors_abort_before_evaluation() {
    let mutations = compile(&[
        replace_replicas("5"),
        replace_replicas("object.spec.nope"),
    ]);
    assert!(mutations.mutators()[0].error().is_none());
    assert!(mutations.mutators()[1].error().is_some());

    let outcome = run(&mutations, json!({"spec": {"replicas": 1}}), 1000);
    assert!(matches!(outcome.error, Some(MutationError::Compile { index: 1, .. })));
    assert_eq!(outcome.object, json!({"spec": {"replicas": 1}}));
    assert_eq!(outcome.remaining_budget, 1000);
}

#[test]
fn budget_is_shared_by_the_chain() {
    // Each mutation evaluates two literals.
    let mutations = compile(&[replace_replicas("2"), replace_replicas("3")]);

    let outcome = run(&mutations, json!({"spec": {"replicas": 1}}), 4);
    assert!(outcome.error.is_none());
    assert_eq!(outcome.remaining_budget, 0);

    let outcome = run(&mutations, json!({"spec": {"replicas": 1}}), 3);
    assert!(matches!(
        outcome.error,
        Some(MutationError::BudgetExceeded { index: 1 })
    ));
    assert_eq!(outcome.remaining_budget, -1);
    // The first mutation is kept.
    assert_eq!(outcome.object, json!({"spec": {"replicas": 2}}));

    let outcome = run(&mutations, json!({"spec": {"replicas": 1}}), 0);
    assert!(matches!(
        outcome.error,
        Some(MutationError::BudgetExceeded { index: 0 })
    ));
}

#[test]
fn patch_values_must_match_the_target_type() {
    let mutations = compile(&[Mutation::json_patch(vec![JsonPatchOperation::new(
        PatchOp::Replace,
        "'/spec'",
    )
    .with_value("Object.spec.containers{name: 'web'}")])]);
    let outcome = run(&mutations, json!({"spec": {}}), 1000);
    assert!(
        matches!(&outcome.error, Some(MutationError::TypeMismatch(m)) if m.contains("Object.spec.containers")),
        "{:?}",
        outcome.error
    );
}

#[test]
fn patch_errors_are_reported() {
    let mutations = compile(&[Mutation::json_patch(vec![JsonPatchOperation::new(
        PatchOp::Remove,
        "'/spec/missing'",
    )])]);
    let outcome = run(&mutations, json!({"spec": {}}), 1000);
    assert!(matches!(outcome.error, Some(MutationError::Patch { .. })));

    let mutations = compile(&[Mutation::json_patch(vec![JsonPatchOperation::new(
        PatchOp::Remove,
        "'spec'",
    )])]);
    let outcome = run(&mutations, json!({"spec": {}}), 1000);
    assert!(matches!(outcome.error, Some(MutationError::InvalidPointer { .. })));
}

#[test]
fn apply_configuration_requires_a_schema() {
    let mutations = CompiledMutations::new(
        &[Mutation::apply_configuration("params")],
        None,
        &RuleCompiler::default(),
    );
    let outcome = run(&mutations, json!({}), 1000);
    assert!(matches!(outcome.error, Some(MutationError::MissingSchema)));
}

#[test]
fn apply_configuration_rejects_atomic_writes() {
    let mutations = compile(&[Mutation::apply_configuration(
        "Object{spec: Object.spec{selector: Object.spec.selector{app: 'web'}}}",
    )]);
    let outcome = run(&mutations, json!({"spec": {}}), 1000);
    assert!(
        matches!(&outcome.error, Some(MutationError::AtomicMutation { paths }) if paths == &["spec.selector"]),
        "{:?}",
        outcome.error
    );
}

#[test]
fn decodes_mutations() {
    let mutations: Vec<Mutation> = serde_json::from_value(json!([
        {
            "patchType": "JSONPatch",
            "jsonPatch": [
                {"op": "add", "pathExpression": "'/spec/replicas'", "valueExpression": "1"},
                {"op": "move", "pathExpression": "'/b'", "fromExpression": "'/a'"}
            ]
        },
        {
            "patchType": "ApplyConfiguration",
            "applyConfiguration": {"expression": "Object{}"}
        }
    ]))
    .unwrap();
    assert_eq!(
        mutations,
        vec![
            Mutation::json_patch(vec![
                JsonPatchOperation::new(PatchOp::Add, "'/spec/replicas'").with_value("1"),
                JsonPatchOperation::new(PatchOp::Move, "'/b'").with_from("'/a'"),
            ]),
            Mutation::apply_configuration("Object{}"),
        ]
    );

    let unknown = serde_json::from_value::<Mutation>(json!({
        "patchType": "JSONPatch",
        "jsonPatch": [{"op": "add", "pathExpression": "'/a'", "path": "/a"}]
    }));
    assert!(unknown.is_err());
}
