// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use admission_cel::validator::{SchemaResolver, StaticSchemaResolver, WalkOptions};
use admission_cel::*;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use serde_json::json;

fn widget() -> GroupVersionKind {
    GroupVersionKind::new("stable.example.com", "v1", "Widget")
}

fn widget_schema() -> Result<Schema> {
    Ok(Schema::from_json(&json!({
        "type": "object",
        "properties": {
            "metadata": {"type": "object"},
            "spec": {
                "type": "object",
                "x-kubernetes-validations": [
                    {"rule": "self.size in ['small', 'large']", "message": "unknown size"}
                ],
                "properties": {
                    "size": {"type": "string"},
                    "replicas": {"type": "integer"}
                }
            }
        }
    }))?)
}

/// Counts schema resolutions.
struct CountingResolver {
    inner: StaticSchemaResolver,
    calls: AtomicUsize,
}

impl SchemaResolver for CountingResolver {
    fn resolve(&self, gvk: &GroupVersionKind) -> Result<Arc<Schema>, SchemaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.resolve(gvk)
    }
}

fn engine() -> Result<Engine> {
    let mut schemas = StaticSchemaResolver::new();
    schemas.insert(widget(), widget_schema()?);
    let mut engine = Engine::new();
    engine.set_schemas(schemas);
    Ok(engine)
}

#[test]
fn validates_objects() -> Result<()> {
    let engine = engine()?;
    let context = CallContext::default();

    let valid = engine.validate(&widget(), &json!({"spec": {"size": "small"}}), None, &context)?;
    assert!(valid.is_valid());
    assert!(valid.remaining_budget < engine.config().runtime_cost_budget);

    let invalid = engine.validate(&widget(), &json!({"spec": {"size": "huge"}}), None, &context)?;
    assert!(!invalid.is_valid());
    assert_eq!(invalid.errors.to_string(), "spec: Invalid value: unknown size");
    Ok(())
}

#[test]
fn unknown_kinds_are_errors() -> Result<()> {
    let engine = engine()?;
    let other = GroupVersionKind::new("stable.example.com", "v1", "Gadget");
    let result = engine.validate(&other, &json!({}), None, &CallContext::default());
    assert!(matches!(result, Err(SchemaError::UnresolvedRef(_))));
    Ok(())
}

#[test]
fn validators_are_built_once() -> Result<()> {
    let mut inner = StaticSchemaResolver::new();
    inner.insert(widget(), widget_schema()?);
    let resolver = Arc::new(CountingResolver {
        inner,
        calls: AtomicUsize::new(0),
    });
    let mut engine = Engine::new();
    engine.set_resolver(resolver.clone());

    let first = engine.validator(&widget())?;
    let second = engine.validator(&widget())?;
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);

    // Clones share the cache.
    let clone = engine.clone();
    assert!(Arc::ptr_eq(&first, &clone.validator(&widget())?));

    // Changing the environment discards compiled validators.
    engine.set_env_options(EnvOptions::default());
    let rebuilt = engine.validator(&widget())?;
    assert!(!Arc::ptr_eq(&first, &rebuilt));
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[test]
fn validates_concurrently() -> Result<()> {
    let engine = Arc::new(engine()?);
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let engine = engine.clone();
            std::thread::spawn(move || {
                let size = if i % 2 == 0 { "small" } else { "medium" };
                engine
                    .validate(
                        &widget(),
                        &json!({"spec": {"size": size}}),
                        None,
                        &CallContext::default(),
                    )
                    .map(|v| v.is_valid())
            })
        })
        .collect();
    for (i, handle) in handles.into_iter().enumerate() {
        let valid = handle.join().map_err(|_| anyhow::anyhow!("thread panicked"))??;
        assert_eq!(valid, i % 2 == 0);
    }
    Ok(())
}

#[test]
fn config_limits_apply() -> Result<()> {
    let mut engine = engine()?;
    engine.set_config(EngineConfig::from_json_str(r#"{"runtimeCostBudget": 1}"#)?);
    let validation = engine.validate(
        &widget(),
        &json!({"spec": {"size": "small"}}),
        None,
        &CallContext::default(),
    )?;
    assert!(validation.remaining_budget < 0);
    assert!(validation.errors.has_budget_error());
    Ok(())
}

#[test]
fn mutates_typed_objects() -> Result<()> {
    let engine = engine()?;
    let mutations = engine.compile_mutations(
        Some(&widget()),
        &[mutation::Mutation::apply_configuration(
            "Object{spec: Object.spec{replicas: object.spec.size == 'large' ? 5 : 1}}",
        )],
    )?;
    let object = engine
        .mutate(
            &mutations,
            json!({"spec": {"size": "large"}}),
            None,
            &CallContext::default(),
        )
        .into_result()?;
    assert_eq!(object, json!({"spec": {"size": "large", "replicas": 5}}));

    // The mutated object is still valid.
    let validation = engine.validate(&widget(), &object, None, &CallContext::default())?;
    assert!(validation.is_valid());
    Ok(())
}

#[test]
fn cancellation_interrupts_evaluation() -> Result<()> {
    let mut engine = engine()?;
    engine.set_config(EngineConfig::from_json_str(r#"{"interruptCheckFrequency": 1}"#)?);
    let flag = Arc::new(AtomicBool::new(false));
    engine.set_cancellation_flag(Some(flag.clone()));
    let object = json!({"spec": {"size": "small"}});
    let context = CallContext::default();

    assert!(engine.validate(&widget(), &object, None, &context)?.is_valid());

    flag.store(true, Ordering::SeqCst);
    let validation = engine.validate(&widget(), &object, None, &context)?;
    assert_eq!(validation.remaining_budget, -1);
    assert!(validation.errors.to_string().contains("evaluation cancelled"));

    let mutations = engine.compile_mutations(
        Some(&widget()),
        &[mutation::Mutation::apply_configuration(
            "Object{spec: Object.spec{replicas: 1}}",
        )],
    )?;
    let outcome = engine.mutate(&mutations, object.clone(), None, &context);
    assert!(matches!(
        outcome.error,
        Some(MutationError::Eval {
            index: 0,
            error: EvalError::Interrupted(_)
        })
    ));
    assert_eq!(outcome.object, object);

    // Per-call options override the engine's flag.
    let options = WalkOptions {
        eval: EvalOptions::default(),
        ..engine.walk_options()
    };
    let validation =
        engine.validate_with_options(&widget(), &object, None, &context, &options, 1_000)?;
    assert!(validation.is_valid());
    Ok(())
}

#[test]
fn filters_requests() -> Result<()> {
    let mut engine = engine()?;
    let filter = engine.compile_filter(
        Some(&widget()),
        &[
            "object.spec.size == 'large'",
            "has(oldObject.spec) && oldObject.spec.size != object.spec.size",
        ],
        OutputKind::Bool,
    )?;
    let object = json!({"spec": {"size": "large"}});
    let old = json!({"spec": {"size": "small"}});
    let context = CallContext::default();

    let outcome = engine.filter(&filter, Some(&object), Some(&old), &context)?;
    let results: Vec<_> = outcome
        .evaluations
        .iter()
        .map(|e| e.result.clone())
        .collect();
    assert_eq!(results, vec![Ok(Value::Bool(true)), Ok(Value::Bool(true))]);

    // The first expression fits the budget, the second one does not.
    let first = outcome.evaluations[0].cost as i64;
    engine.set_config(EngineConfig {
        runtime_cost_budget: first,
        ..EngineConfig::default()
    });
    let result = engine.filter(&filter, Some(&object), Some(&old), &context);
    assert_eq!(result, Err(FilterError::BudgetExceeded));
    Ok(())
}
