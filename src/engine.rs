// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::activation::CallContext;
use crate::compiler::{EnvOptions, OutputKind, RuleCompiler};
use crate::config::EngineConfig;
use crate::error::{FieldErrors, FilterError, MatchError, SchemaError};
use crate::filter::{CompiledFilter, FilterOutcome};
use crate::matcher::{EquivalentResourceMapper, MatchCriteria, MatchedResource, Matcher};
use crate::mutation::{CompiledMutations, Mutation, MutationOutcome};
use crate::program::{CelCompiler, EvalOptions, ExpressionCompiler};
use crate::request::{AdmissionRequest, GroupVersionKind};
use crate::types::schema_value;
use crate::validator::{
    CompiledValidator, SchemaResolver, StaticSchemaResolver, ValidatorCache, WalkOptions,
};

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use serde_json::Value as JsonValue;

/// Result of validating one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub errors: FieldErrors,
    /// Negative when the budget ran out before every rule was evaluated.
    pub remaining_budget: i64,
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty() && self.remaining_budget >= 0
    }
}

/// The validation and admission mutation engine.
///
/// Validator trees are compiled on first use of a kind and shared by every later call. Changing
/// the compiler or the schema resolver discards them.
#[derive(Clone)]
pub struct Engine {
    config: EngineConfig,
    expression_compiler: Arc<dyn ExpressionCompiler>,
    env_options: EnvOptions,
    compiler: RuleCompiler,
    resolver: Arc<dyn SchemaResolver>,
    validators: Arc<ValidatorCache>,
    matcher: Matcher,
    cancel: Option<Arc<AtomicBool>>,
}

/// Create a default engine.
impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        let env_options = EnvOptions::default();
        let expression_compiler: Arc<dyn ExpressionCompiler> = Arc::new(CelCompiler);
        Self {
            config: EngineConfig::default(),
            compiler: RuleCompiler::new(expression_compiler.clone(), &env_options),
            expression_compiler,
            env_options,
            resolver: Arc::new(StaticSchemaResolver::new()),
            validators: Arc::new(ValidatorCache::new()),
            matcher: Matcher::new(),
            cancel: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: EngineConfig) {
        self.config = config;
    }

    pub fn set_resolver(&mut self, resolver: Arc<dyn SchemaResolver>) {
        self.resolver = resolver;
        self.reset_validators();
    }

    /// Serves the given schemas by kind.
    pub fn set_schemas(&mut self, schemas: StaticSchemaResolver) {
        self.set_resolver(Arc::new(schemas));
    }

    pub fn set_env_options(&mut self, options: EnvOptions) {
        self.env_options = options;
        self.rebuild_compiler();
    }

    pub fn set_expression_compiler(&mut self, compiler: Arc<dyn ExpressionCompiler>) {
        self.expression_compiler = compiler;
        self.rebuild_compiler();
    }

    pub fn set_resource_mapper(&mut self, mapper: Arc<dyn EquivalentResourceMapper>) {
        self.matcher = Matcher::new().with_mapper(mapper);
    }

    /// Raising `flag` interrupts every evaluation in progress, checked at the configured
    /// interrupt frequency.
    pub fn set_cancellation_flag(&mut self, flag: Option<Arc<AtomicBool>>) {
        self.cancel = flag;
    }

    /// Evaluation limits derived from the configuration.
    pub fn eval_options(&self) -> EvalOptions {
        EvalOptions {
            cancel: self.cancel.clone(),
            ..self.config.eval_options()
        }
    }

    pub fn walk_options(&self) -> WalkOptions {
        WalkOptions {
            eval: self.eval_options(),
            ..self.config.walk_options()
        }
    }

    pub fn compiler(&self) -> &RuleCompiler {
        &self.compiler
    }

    fn rebuild_compiler(&mut self) {
        self.compiler = RuleCompiler::new(self.expression_compiler.clone(), &self.env_options);
        self.reset_validators();
    }

    fn reset_validators(&mut self) {
        // Clones of the engine keep the trees they already share.
        self.validators = Arc::new(ValidatorCache::new());
    }

    /// Validator tree of `gvk`, compiled on first use.
    pub fn validator(
        &self,
        gvk: &GroupVersionKind,
    ) -> Result<Arc<CompiledValidator>, SchemaError> {
        self.validators
            .get_or_build(gvk, self.resolver.as_ref(), &self.compiler)
    }

    /// Validates `object` of kind `gvk` using the configured request budget.
    pub fn validate(
        &self,
        gvk: &GroupVersionKind,
        object: &JsonValue,
        old_object: Option<&JsonValue>,
        context: &CallContext,
    ) -> Result<Validation, SchemaError> {
        self.validate_with_budget(
            gvk,
            object,
            old_object,
            context,
            self.config.runtime_cost_budget,
        )
    }

    pub fn validate_with_budget(
        &self,
        gvk: &GroupVersionKind,
        object: &JsonValue,
        old_object: Option<&JsonValue>,
        context: &CallContext,
        budget: i64,
    ) -> Result<Validation, SchemaError> {
        self.validate_with_options(gvk, object, old_object, context, &self.walk_options(), budget)
    }

    pub fn validate_with_options(
        &self,
        gvk: &GroupVersionKind,
        object: &JsonValue,
        old_object: Option<&JsonValue>,
        context: &CallContext,
        options: &WalkOptions,
        budget: i64,
    ) -> Result<Validation, SchemaError> {
        let validator = self.validator(gvk)?;
        let schema = validator.schema();
        let root = Some(schema.root());
        let new = schema_value(schema, root, object);
        let old = old_object.map(|o| schema_value(schema, root, o));
        let (errors, remaining_budget) = validator.validate(
            &new,
            old.as_ref(),
            &context.activation(),
            options,
            budget,
        );
        Ok(Validation {
            errors,
            remaining_budget,
        })
    }

    /// Compiles a mutation chain for objects of `gvk`, or for untyped objects without a kind.
    pub fn compile_mutations(
        &self,
        gvk: Option<&GroupVersionKind>,
        mutations: &[Mutation],
    ) -> Result<CompiledMutations, SchemaError> {
        let schema = gvk.map(|gvk| self.resolver.resolve(gvk)).transpose()?;
        Ok(CompiledMutations::new(mutations, schema, &self.compiler))
    }

    /// Applies `mutations` to `object` using the configured request budget.
    pub fn mutate(
        &self,
        mutations: &CompiledMutations,
        object: JsonValue,
        old_object: Option<&JsonValue>,
        context: &CallContext,
    ) -> MutationOutcome {
        mutations.apply(
            object,
            old_object,
            context,
            &self.eval_options(),
            self.config.runtime_cost_budget,
        )
    }

    /// Compiles admission expressions over objects of `gvk`, or untyped objects without a kind.
    pub fn compile_filter<S: AsRef<str>>(
        &self,
        gvk: Option<&GroupVersionKind>,
        expressions: &[S],
        output: OutputKind,
    ) -> Result<CompiledFilter, SchemaError> {
        let schema = gvk.map(|gvk| self.resolver.resolve(gvk)).transpose()?;
        Ok(CompiledFilter::new(expressions, output, schema, &self.compiler))
    }

    /// Evaluates `filter` using the configured request budget.
    pub fn filter(
        &self,
        filter: &CompiledFilter,
        object: Option<&JsonValue>,
        old_object: Option<&JsonValue>,
        context: &CallContext,
    ) -> Result<FilterOutcome, FilterError> {
        filter.evaluate(
            object,
            old_object,
            context,
            &self.eval_options(),
            self.config.runtime_cost_budget,
        )
    }

    pub fn matches(
        &self,
        criteria: &MatchCriteria,
        request: &AdmissionRequest,
        namespace_object: Option<&JsonValue>,
        is_binding: bool,
    ) -> Result<bool, MatchError> {
        self.matcher
            .matches(criteria, request, namespace_object, is_binding)
    }

    pub fn matching_resource(
        &self,
        criteria: &MatchCriteria,
        request: &AdmissionRequest,
        namespace_object: Option<&JsonValue>,
        is_binding: bool,
    ) -> Result<Option<MatchedResource>, MatchError> {
        self.matcher
            .matching_resource(criteria, request, namespace_object, is_binding)
    }
}
