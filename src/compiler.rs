// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Compiles rules against environments assembled from a node's declared type and the
//! contextual variables available at every node.

use crate::activation::{
    AUTHORIZER_VAR, NAMESPACE_VAR, OLD_OBJECT_VAR, OLD_SELF_VAR, OBJECT_VAR, PARAMS_VAR,
    REQUEST_VAR, SELF_VAR, VARIABLES_VAR,
};
use crate::checker::TypeEnv;
use crate::error::CompileError;
use crate::program::{CelCompiler, ExpressionCompiler, Program};
use crate::request::request_decl_type;
use crate::schema::Rule;
use crate::types::{is_root_reserved, DeclType, ObjectType, OpaqueType, ScalarType};

use std::collections::BTreeMap;
use std::sync::Arc;

/// Type an expression must produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Bool,
    String,
    /// An object literal, as produced by apply configurations.
    Object,
    Any,
}

impl OutputKind {
    fn accepts(&self, ty: &DeclType) -> bool {
        ty.is_dyn_like()
            || match self {
                Self::Bool => ty.is_scalar(ScalarType::Bool),
                Self::String => ty.is_scalar(ScalarType::String),
                Self::Object => matches!(ty, DeclType::Object(_)),
                Self::Any => true,
            }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::String => "string",
            Self::Object => "object",
            Self::Any => "any",
        }
    }
}

/// A compiled program, or the reason it could not be compiled.
#[derive(Debug, Clone)]
pub struct CompiledExpression {
    source: String,
    outcome: Result<Arc<dyn Program>, CompileError>,
}

impl CompiledExpression {
    /// An expression that could not be compiled for a reason outside its own source.
    pub fn failed(source: &str, error: CompileError) -> Self {
        Self {
            source: source.to_string(),
            outcome: Err(error),
        }
    }

    pub fn program(&self) -> Option<&Arc<dyn Program>> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&CompileError> {
        self.outcome.as_ref().err()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// True if the program reads `oldSelf`.
    pub fn is_transition(&self) -> bool {
        self.program()
            .is_some_and(|p| p.references().contains(OLD_SELF_VAR))
    }
}

#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: Rule,
    pub expression: CompiledExpression,
    pub message_expression: Option<CompiledExpression>,
}

impl CompiledRule {
    pub fn is_transition(&self) -> bool {
        self.expression.is_transition()
    }
}

/// Declared types of the optional contextual variables.
#[derive(Debug, Clone, Default)]
pub struct EnvOptions {
    /// Type of `params`, `dyn` when unset.
    pub params_type: Option<DeclType>,
    /// Type of `variables` in admission contexts.
    pub variables_type: Option<DeclType>,
}

/// Compiles rules. The contextual part of the environment is built once and reused for every
/// node.
#[derive(Clone)]
pub struct RuleCompiler {
    compiler: Arc<dyn ExpressionCompiler>,
    base: TypeEnv,
}

impl Default for RuleCompiler {
    fn default() -> Self {
        Self::new(Arc::new(CelCompiler), &EnvOptions::default())
    }
}

fn namespace_decl_type() -> DeclType {
    let metadata = ObjectType {
        open: true,
        ..ObjectType::new("kubernetes.Namespace.metadata")
            .with_field("name", DeclType::STRING)
            .with_field("uid", DeclType::STRING)
            .with_field("labels", DeclType::map(DeclType::STRING, DeclType::STRING))
            .with_field(
                "annotations",
                DeclType::map(DeclType::STRING, DeclType::STRING),
            )
    };
    DeclType::object(
        ObjectType::new("kubernetes.Namespace")
            .with_field("apiVersion", DeclType::STRING)
            .with_field("kind", DeclType::STRING)
            .with_field("metadata", DeclType::object(metadata))
            .with_field("spec", DeclType::DYN)
            .with_field("status", DeclType::DYN),
    )
}

impl RuleCompiler {
    pub fn new(compiler: Arc<dyn ExpressionCompiler>, options: &EnvOptions) -> Self {
        let mut base = TypeEnv::new()
            .with_var(REQUEST_VAR, request_decl_type())
            .with_var(
                PARAMS_VAR,
                options.params_type.clone().unwrap_or(DeclType::DYN),
            )
            .with_var(AUTHORIZER_VAR, DeclType::Opaque(OpaqueType::Authorizer))
            .with_var(NAMESPACE_VAR, namespace_decl_type());
        if let Some(ty) = &options.variables_type {
            base.declare(VARIABLES_VAR, ty.clone());
        }
        Self { compiler, base }
    }

    pub fn base_env(&self) -> &TypeEnv {
        &self.base
    }

    /// Environment for rules attached to a node of type `self_type`.
    ///
    /// Fields of object nodes are also bound as variables. The returned map gives their escaped
    /// names and the property names they read.
    pub fn validation_env(&self, self_type: &DeclType) -> (TypeEnv, BTreeMap<String, String>) {
        let mut env = self
            .base
            .clone()
            .with_var(SELF_VAR, self_type.clone())
            .with_var(OLD_SELF_VAR, self_type.clone());
        let mut siblings = BTreeMap::new();
        if let DeclType::Object(object) = self_type {
            for field in object.fields.values() {
                if is_root_reserved(&field.name)
                    || field.name == SELF_VAR
                    || env.lookup(&field.name).is_some()
                {
                    continue;
                }
                env.declare(&field.name, field.ty.clone());
                siblings.insert(field.name.clone(), field.original.clone());
            }
        }
        (env, siblings)
    }

    /// Environment for admission expressions over a whole object.
    pub fn admission_env(&self, object_type: &DeclType) -> TypeEnv {
        self.base
            .clone()
            .with_var(OBJECT_VAR, object_type.clone())
            .with_var(OLD_OBJECT_VAR, object_type.clone())
    }

    pub fn compile(&self, source: &str, env: &TypeEnv, output: OutputKind) -> CompiledExpression {
        let outcome = self.compiler.compile(source, env).and_then(|program| {
            let found = program.output_type();
            if output.accepts(found) {
                Ok(program)
            } else {
                Err(CompileError::OutputType {
                    expected: output.name().to_string(),
                    found: found.to_string(),
                })
            }
        });
        CompiledExpression {
            source: source.to_string(),
            outcome,
        }
    }

    pub fn compile_rule(&self, rule: &Rule, env: &TypeEnv) -> CompiledRule {
        CompiledRule {
            rule: rule.clone(),
            expression: self.compile(&rule.rule, env, OutputKind::Bool),
            message_expression: rule
                .message_expression
                .as_deref()
                .map(|source| self.compile(source, env, OutputKind::String)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;
    use crate::types::decl_type_for;
    use serde_json::json;

    fn spec_type() -> DeclType {
        let schema = Schema::from_json(&json!({
            "type": "object",
            "properties": {
                "x": {"type": "integer"},
                "max-y": {"type": "integer"},
                "int": {"type": "integer"}
            }
        }))
        .unwrap();
        decl_type_for(&schema, schema.root()).unwrap()
    }

    #[test]
    fn detects_transition_rules() {
        let compiler = RuleCompiler::default();
        let (env, _) = compiler.validation_env(&spec_type());
        assert!(compiler
            .compile("self.x >= oldSelf.x", &env, OutputKind::Bool)
            .is_transition());
        assert!(!compiler
            .compile("self.x >= 0", &env, OutputKind::Bool)
            .is_transition());
    }

    #[test]
    fn binds_escaped_fields_as_variables() {
        let compiler = RuleCompiler::default();
        let (env, siblings) = compiler.validation_env(&spec_type());
        assert_eq!(siblings.get("max__dash__y").map(String::as_str), Some("max-y"));
        assert!(!siblings.contains_key("int"));
        let compiled = compiler.compile("x <= max__dash__y", &env, OutputKind::Bool);
        assert!(compiled.error().is_none(), "{:?}", compiled.error());
    }

    #[test]
    fn enforces_output_type() {
        let compiler = RuleCompiler::default();
        let (env, _) = compiler.validation_env(&spec_type());
        let compiled = compiler.compile("self.x", &env, OutputKind::Bool);
        assert_eq!(
            compiled.error(),
            Some(&CompileError::OutputType {
                expected: "bool".to_string(),
                found: "int".to_string()
            })
        );
        assert!(compiled.program().is_none());
    }

    #[test]
    fn compilation_is_deterministic() {
        let compiler = RuleCompiler::default();
        let (env, _) = compiler.validation_env(&spec_type());
        let a = compiler.compile("self.nope > 1", &env, OutputKind::Bool);
        let b = compiler.compile("self.nope > 1", &env, OutputKind::Bool);
        assert!(a.error().is_some());
        assert_eq!(a.error(), b.error());
    }
}
