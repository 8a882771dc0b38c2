// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Admission mutations: JSON patches and apply configurations computed by expressions.

mod apply;
mod chain;
mod json_patch;
mod pointer;

#[cfg(test)]
mod tests;

pub use apply::{apply_configuration, check_type_names, find_atomics};
pub use chain::MutationOutcome;
pub use json_patch::{
    apply_patch, object_type_name_at_path, PatchOp, PatchOperation, PatchOutcome,
};
pub use pointer::JsonPointer;

use crate::compiler::{CompiledExpression, OutputKind, RuleCompiler};
use crate::error::CompileError;
use crate::schema::Schema;
use crate::types::{resource_decl_type_for, DeclType};

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// One JSON patch operation. Its operands are expressions evaluated per application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct JsonPatchOperation {
    pub op: PatchOp,
    /// Evaluates to a JSON pointer string.
    pub path_expression: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_expression: Option<String>,
}

impl JsonPatchOperation {
    pub fn new(op: PatchOp, path_expression: &str) -> Self {
        Self {
            op,
            path_expression: path_expression.to_string(),
            from_expression: None,
            value_expression: None,
        }
    }

    pub fn with_value(mut self, expression: &str) -> Self {
        self.value_expression = Some(expression.to_string());
        self
    }

    pub fn with_from(mut self, expression: &str) -> Self {
        self.from_expression = Some(expression.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApplyConfiguration {
    /// Evaluates to an `Object{...}` literal.
    pub expression: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "patchType")]
pub enum Mutation {
    #[serde(rename = "JSONPatch", rename_all = "camelCase")]
    JsonPatch { json_patch: Vec<JsonPatchOperation> },
    #[serde(rename = "ApplyConfiguration", rename_all = "camelCase")]
    ApplyConfiguration {
        apply_configuration: ApplyConfiguration,
    },
}

impl Mutation {
    pub fn json_patch(ops: Vec<JsonPatchOperation>) -> Self {
        Self::JsonPatch { json_patch: ops }
    }

    pub fn apply_configuration(expression: &str) -> Self {
        Self::ApplyConfiguration {
            apply_configuration: ApplyConfiguration {
                expression: expression.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompiledPatchOperation {
    pub op: PatchOp,
    pub path: CompiledExpression,
    pub from: Option<CompiledExpression>,
    pub value: Option<CompiledExpression>,
}

impl CompiledPatchOperation {
    fn expressions(&self) -> impl Iterator<Item = &CompiledExpression> {
        core::iter::once(&self.path)
            .chain(self.from.as_ref())
            .chain(self.value.as_ref())
    }
}

#[derive(Debug, Clone)]
pub enum CompiledMutator {
    JsonPatch(Vec<CompiledPatchOperation>),
    ApplyConfiguration(CompiledExpression),
}

impl CompiledMutator {
    /// First compile error of the mutator, if any.
    pub fn error(&self) -> Option<&CompileError> {
        match self {
            Self::JsonPatch(ops) => ops
                .iter()
                .flat_map(CompiledPatchOperation::expressions)
                .find_map(CompiledExpression::error),
            Self::ApplyConfiguration(expression) => expression.error(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::JsonPatch(_) => "JSONPatch",
            Self::ApplyConfiguration(_) => "ApplyConfiguration",
        }
    }
}

/// An ordered chain of compiled mutations for one kind.
#[derive(Debug, Clone)]
pub struct CompiledMutations {
    schema: Option<Arc<Schema>>,
    mutators: Vec<CompiledMutator>,
}

impl CompiledMutations {
    /// Compiles `mutations` against the kind described by `schema`. Without a schema `object` is
    /// untyped and apply configurations cannot be used.
    pub fn new(
        mutations: &[Mutation],
        schema: Option<Arc<Schema>>,
        compiler: &RuleCompiler,
    ) -> Self {
        let object_type = match &schema {
            Some(schema) => resource_decl_type_for(schema, schema.root()),
            None => Ok(DeclType::DYN),
        };
        let env = object_type.map(|ty| compiler.admission_env(&ty));
        let compile = |source: &str, output: OutputKind| match &env {
            Ok(env) => compiler.compile(source, env, output),
            Err(e) => CompiledExpression::failed(source, e.clone()),
        };

        let mutators = mutations
            .iter()
            .map(|mutation| match mutation {
                Mutation::JsonPatch { json_patch } => CompiledMutator::JsonPatch(
                    json_patch
                        .iter()
                        .map(|op| CompiledPatchOperation {
                            op: op.op,
                            path: compile(&op.path_expression, OutputKind::String),
                            from: op
                                .from_expression
                                .as_deref()
                                .map(|s| compile(s, OutputKind::String)),
                            value: op
                                .value_expression
                                .as_deref()
                                .map(|s| compile(s, OutputKind::Any)),
                        })
                        .collect(),
                ),
                Mutation::ApplyConfiguration {
                    apply_configuration,
                } => CompiledMutator::ApplyConfiguration(compile(
                    &apply_configuration.expression,
                    OutputKind::Object,
                )),
            })
            .collect();
        Self { schema, mutators }
    }

    pub fn mutators(&self) -> &[CompiledMutator] {
        &self.mutators
    }

    pub fn schema(&self) -> Option<&Arc<Schema>> {
        self.schema.as_ref()
    }

    pub fn len(&self) -> usize {
        self.mutators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutators.is_empty()
    }
}
