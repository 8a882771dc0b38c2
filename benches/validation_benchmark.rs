use admission_cel::mutation::{CompiledMutations, JsonPatchOperation, Mutation, PatchOp};
use admission_cel::validator::StaticSchemaResolver;
use admission_cel::{CallContext, Engine, EvalOptions, GroupVersionKind, RuleCompiler, Schema};
use criterion::{criterion_group, criterion_main, Criterion};
use serde_json::json;
use std::sync::Arc;

fn deployment_schema() -> Schema {
    Schema::from_json(&json!({
        "type": "object",
        "properties": {
            "spec": {
                "type": "object",
                "x-kubernetes-validations": [
                    {"rule": "self.minReplicas <= self.maxReplicas"}
                ],
                "properties": {
                    "minReplicas": {"type": "integer", "minimum": 0},
                    "maxReplicas": {"type": "integer"},
                    "containers": {
                        "type": "array",
                        "x-kubernetes-list-type": "map",
                        "x-kubernetes-list-map-keys": ["name"],
                        "items": {
                            "type": "object",
                            "x-kubernetes-validations": [
                                {"rule": "self.image.contains(':')", "message": "image tag required"},
                                {"rule": "self.image == oldSelf.image", "message": "image is immutable"}
                            ],
                            "properties": {
                                "name": {"type": "string"},
                                "image": {"type": "string"}
                            }
                        }
                    }
                }
            }
        }
    }))
    .unwrap()
}

fn object(containers: usize) -> serde_json::Value {
    let containers: Vec<_> = (0..containers)
        .map(|i| json!({"name": format!("c{i}"), "image": format!("registry/app{i}:1")}))
        .collect();
    json!({"spec": {"minReplicas": 1, "maxReplicas": 3, "containers": containers}})
}

fn engine() -> (Engine, GroupVersionKind) {
    let gvk = GroupVersionKind::new("apps", "v1", "Deployment");
    let mut schemas = StaticSchemaResolver::new();
    schemas.insert(gvk.clone(), deployment_schema());
    let mut engine = Engine::new();
    engine.set_schemas(schemas);
    (engine, gvk)
}

fn bench_compile(c: &mut Criterion) {
    let compiler = RuleCompiler::default();
    c.bench_function("compile_validator", |b| {
        b.iter(|| {
            admission_cel::validator::CompiledValidator::new(
                Arc::new(deployment_schema()),
                &compiler,
            )
        })
    });
}

fn bench_create(c: &mut Criterion) {
    let (engine, gvk) = engine();
    let object = object(20);
    let context = CallContext::default();
    engine.validator(&gvk).unwrap();

    c.bench_function("validate_create", |b| {
        b.iter(|| engine.validate(&gvk, &object, None, &context).unwrap())
    });
}

fn bench_update(c: &mut Criterion) {
    let (engine, gvk) = engine();
    let object = object(20);
    let old = object.clone();
    let context = CallContext::default();
    engine.validator(&gvk).unwrap();

    c.bench_function("validate_update", |b| {
        b.iter(|| engine.validate(&gvk, &object, Some(&old), &context).unwrap())
    });
}

fn bench_mutation(c: &mut Criterion) {
    let mutations = CompiledMutations::new(
        &[
            Mutation::json_patch(vec![JsonPatchOperation::new(
                PatchOp::Replace,
                "'/spec/maxReplicas'",
            )
            .with_value("object.spec.minReplicas + 2")]),
            Mutation::apply_configuration("Object{spec: Object.spec{minReplicas: 2}}"),
        ],
        Some(Arc::new(deployment_schema())),
        &RuleCompiler::default(),
    );
    let object = object(20);
    let context = CallContext::default();
    let options = EvalOptions::default();

    c.bench_function("mutation_chain", |b| {
        b.iter(|| {
            mutations
                .apply(object.clone(), None, &context, &options, 1_000_000)
                .into_result()
                .unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_compile,
    bench_create,
    bench_update,
    bench_mutation
);
criterion_main!(benches);
