// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use admission_cel::validator::StaticSchemaResolver;
use admission_cel::*;

use anyhow::{bail, Result};
use serde::Deserialize;
use test_generator::test_resources;

#[derive(Deserialize, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
struct ExpectedError {
    path: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    detail: Option<String>,
    contains: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct TestCase {
    note: String,
    schema: serde_json::Value,
    object: serde_json::Value,
    old_object: Option<serde_json::Value>,
    params: Option<serde_json::Value>,
    config: Option<EngineConfig>,
    budget: Option<i64>,
    #[serde(default)]
    errors: Vec<ExpectedError>,
    #[serde(default)]
    exhausted: bool,
    skip: Option<bool>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct YamlTest {
    cases: Vec<TestCase>,
}

fn check_error(expected: &ExpectedError, actual: &FieldError) -> Result<()> {
    if expected.path != actual.path.to_string() {
        bail!("expected error at {}, found {actual}", expected.path);
    }
    if let Some(kind) = &expected.kind {
        if kind != &actual.kind.to_string() {
            bail!("expected {kind} at {}, found {actual}", expected.path);
        }
    }
    if let Some(detail) = &expected.detail {
        if detail != &actual.detail {
            bail!("expected detail {detail:?}, found {:?}", actual.detail);
        }
    }
    if let Some(fragment) = &expected.contains {
        if !actual.detail.contains(fragment.as_str()) {
            bail!("expected detail containing {fragment:?}, found {:?}", actual.detail);
        }
    }
    Ok(())
}

fn run_case(case: &TestCase) -> Result<()> {
    let gvk = GroupVersionKind::new("stable.example.com", "v1", "Widget");
    let mut schemas = StaticSchemaResolver::new();
    schemas.insert(gvk.clone(), Schema::from_json(&case.schema)?);

    let mut engine = Engine::new();
    engine.set_schemas(schemas);
    if let Some(config) = &case.config {
        engine.set_config(config.clone());
    }

    let context = CallContext {
        params: case.params.as_ref().map(Value::from_json),
        ..CallContext::default()
    };
    let budget = case
        .budget
        .unwrap_or(engine.config().runtime_cost_budget);
    let validation = engine.validate_with_budget(
        &gvk,
        &case.object,
        case.old_object.as_ref(),
        &context,
        budget,
    )?;

    let actual = validation.errors.into_vec();
    if actual.len() != case.errors.len() {
        bail!(
            "expected {} errors, found {}: {actual:?}",
            case.errors.len(),
            actual.len()
        );
    }
    for (expected, actual) in case.errors.iter().zip(&actual) {
        check_error(expected, actual)?;
    }
    if case.exhausted != (validation.remaining_budget < 0) {
        bail!(
            "expected exhausted={}, remaining budget {}",
            case.exhausted,
            validation.remaining_budget
        );
    }
    Ok(())
}

fn yaml_test_impl(file: &str) -> Result<()> {
    let yaml_str = std::fs::read_to_string(file)?;
    let test: YamlTest = serde_yaml::from_str(&yaml_str)?;

    println!("running {file}");

    for case in &test.cases {
        print!("case {} ", case.note);
        if case.skip == Some(true) {
            println!("skipped");
            continue;
        }
        run_case(case).map_err(|e| anyhow::anyhow!("case {}: {e}", case.note))?;
        println!("passed");
    }
    Ok(())
}

fn yaml_test(file: &str) -> Result<()> {
    match yaml_test_impl(file) {
        Ok(_) => Ok(()),
        Err(e) => {
            // If Err is returned, it doesn't always get printed by cargo test.
            // Therefore, panic with the error.
            panic!("{}", e);
        }
    }
}

#[test_resources("tests/validation/cases/*.yaml")]
fn run(path: &str) {
    yaml_test(path).unwrap()
}
