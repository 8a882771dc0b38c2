// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use admission_cel::mutation::{CompiledMutations, JsonPatchOperation, Mutation, PatchOp};
use admission_cel::*;

use std::sync::Arc;

use anyhow::Result;
use serde_json::json;

const POLICY: &str = r#"
- patchType: JSONPatch
  jsonPatch:
    - op: test
      pathExpression: "'/metadata/labels/managed'"
      valueExpression: "'false'"
    - op: replace
      pathExpression: "'/spec/replicas'"
      valueExpression: "0"
- patchType: JSONPatch
  jsonPatch:
    - op: add
      pathExpression: "'/metadata/labels/owner'"
      valueExpression: "request.userInfo.username"
"#;

fn request_context(username: &str) -> CallContext {
    let request = AdmissionRequest {
        user_info: UserInfo {
            username: username.to_string(),
            ..UserInfo::default()
        },
        ..AdmissionRequest::default()
    };
    CallContext {
        request: Some(request.to_value()),
        ..CallContext::default()
    }
}

#[test]
fn untyped_chain() -> Result<()> {
    let mutations: Vec<Mutation> = serde_yaml::from_str(POLICY)?;
    let compiled = CompiledMutations::new(&mutations, None, &RuleCompiler::default());
    assert_eq!(compiled.len(), 2);

    let object = json!({"metadata": {"labels": {"managed": "true"}}, "spec": {"replicas": 3}});
    let outcome = compiled.apply(
        object,
        None,
        &request_context("alice"),
        &EvalOptions::default(),
        1_000,
    );
    // The failed test skips the first patch only.
    assert_eq!(
        outcome.into_result()?,
        json!({
            "metadata": {"labels": {"managed": "true", "owner": "alice"}},
            "spec": {"replicas": 3}
        })
    );
    Ok(())
}

#[test]
fn failed_chain_is_reported() -> Result<()> {
    let schema = Schema::from_json(&json!({
        "type": "object",
        "properties": {
            "spec": {
                "type": "object",
                "properties": {"replicas": {"type": "integer"}}
            }
        }
    }))?;
    let mutations = vec![
        Mutation::json_patch(vec![
            JsonPatchOperation::new(PatchOp::Replace, "'/spec/replicas'").with_value("2")
        ]),
        Mutation::json_patch(vec![
            JsonPatchOperation::new(PatchOp::Replace, "'/spec/replicas'")
                .with_value("10 / (object.spec.replicas - 2)"),
        ]),
    ];
    let compiled =
        CompiledMutations::new(&mutations, Some(Arc::new(schema)), &RuleCompiler::default());
    let outcome = compiled.apply(
        json!({"spec": {"replicas": 1}}),
        None,
        &CallContext::default(),
        &EvalOptions::default(),
        1_000,
    );
    assert_eq!(outcome.object, json!({"spec": {"replicas": 2}}));
    let err = outcome.into_result().unwrap_err();
    assert_eq!(
        err,
        MutationError::Eval {
            index: 1,
            error: EvalError::DivisionByZero
        }
    );
    Ok(())
}
