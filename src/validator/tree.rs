// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::compiler::{CompiledRule, RuleCompiler};
use crate::error::CompileError;
use crate::schema::{NodeId, Schema};
use crate::types::{decl_type_for, escape, resource_decl_type_for, DeclType};

use std::collections::BTreeMap;
use std::sync::Arc;

/// Index of a node within a [`CompiledValidator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValidatorId(usize);

/// Compiled rules of one schema position.
#[derive(Debug, Clone)]
pub struct CompiledValidatorNode {
    pub schema_node: NodeId,
    pub rules: Vec<CompiledRule>,
    /// Set when the declared type of this node could not be derived.
    pub compilation_error: Option<CompileError>,
    /// Fields of `self` bound as variables, by escaped name.
    pub siblings: BTreeMap<String, String>,
    pub properties: BTreeMap<String, ValidatorId>,
    pub items: Option<ValidatorId>,
    pub additional_properties: Option<ValidatorId>,
}

/// Validator tree mirroring a schema. Subtrees without rules or value validations are
/// omitted.
#[derive(Debug)]
pub struct CompiledValidator {
    schema: Arc<Schema>,
    nodes: Vec<CompiledValidatorNode>,
    root: Option<ValidatorId>,
}

impl CompiledValidator {
    /// Compiles every rule reachable from the schema root, which is treated as a resource root.
    pub fn new(schema: Arc<Schema>, compiler: &RuleCompiler) -> Self {
        let mut builder = TreeBuilder {
            schema: &schema,
            compiler,
            nodes: vec![],
            stack: vec![],
        };
        let root_id = schema.root();
        let ty = resource_decl_type_for(&schema, root_id);
        let root = builder.build(root_id, ty);
        let nodes = builder.nodes;
        Self {
            schema,
            nodes,
            root,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn root(&self) -> Option<ValidatorId> {
        self.root
    }

    pub fn node(&self, id: ValidatorId) -> &CompiledValidatorNode {
        &self.nodes[id.0]
    }

    /// Number of retained validator nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

struct TreeBuilder<'a> {
    schema: &'a Schema,
    compiler: &'a RuleCompiler,
    nodes: Vec<CompiledValidatorNode>,
    stack: Vec<NodeId>,
}

fn type_of(schema: &Schema, id: NodeId) -> Result<DeclType, CompileError> {
    if schema.node(id).embedded_resource {
        resource_decl_type_for(schema, id)
    } else {
        decl_type_for(schema, id)
    }
}

/// Type of a child node, taken from the parent's type when it is known. Embedded resources are
/// always rederived so that they expose the resource fields.
fn child_type(
    schema: &Schema,
    child: NodeId,
    derived: Option<DeclType>,
) -> Result<DeclType, CompileError> {
    match derived {
        Some(t) if !schema.node(child).embedded_resource => Ok(t),
        _ => type_of(schema, child),
    }
}

impl TreeBuilder<'_> {
    fn build(&mut self, id: NodeId, ty: Result<DeclType, CompileError>) -> Option<ValidatorId> {
        // Recursive schemas are walked once per path. Rules on a recursive node already report
        // the cycle through their type.
        if self.stack.contains(&id) {
            return None;
        }
        self.stack.push(id);
        let node = self.build_node(id, ty);
        self.stack.pop();
        node
    }

    fn build_node(
        &mut self,
        id: NodeId,
        ty: Result<DeclType, CompileError>,
    ) -> Option<ValidatorId> {
        let schema = self.schema;
        let node = schema.node(id);

        let mut rules = vec![];
        let mut siblings = BTreeMap::new();
        let mut compilation_error = None;
        if !node.rules.is_empty() {
            match &ty {
                Ok(self_type) => {
                    let (env, bound) = self.compiler.validation_env(self_type);
                    rules = node
                        .rules
                        .iter()
                        .map(|rule| self.compiler.compile_rule(rule, &env))
                        .collect();
                    siblings = bound;
                }
                Err(e) => compilation_error = Some(e.clone()),
            }
        }

        let mut properties = BTreeMap::new();
        for (name, child) in &node.properties {
            let field = match (&ty, escape(name)) {
                (Ok(DeclType::Object(o)), Some(escaped)) => {
                    o.field(&escaped).map(|f| f.ty.clone())
                }
                _ => None,
            };
            let child_ty = child_type(schema, *child, field);
            if let Some(v) = self.build(*child, child_ty) {
                properties.insert(name.clone(), v);
            }
        }

        let items = match node.items {
            Some(child) => {
                let elem = match &ty {
                    Ok(DeclType::List(elem)) => Some(elem.as_ref().clone()),
                    _ => None,
                };
                let child_ty = child_type(schema, child, elem);
                self.build(child, child_ty)
            }
            None => None,
        };

        let additional_properties = match node.additional_properties {
            Some(child) => {
                let elem = match &ty {
                    Ok(DeclType::Map(_, v)) => Some(v.as_ref().clone()),
                    _ => None,
                };
                let child_ty = child_type(schema, child, elem);
                self.build(child, child_ty)
            }
            None => None,
        };

        let keep = !rules.is_empty()
            || compilation_error.is_some()
            || !node.validations.is_empty()
            || !properties.is_empty()
            || items.is_some()
            || additional_properties.is_some();
        if !keep {
            return None;
        }

        self.nodes.push(CompiledValidatorNode {
            schema_node: id,
            rules,
            compilation_error,
            siblings,
            properties,
            items,
            additional_properties,
        });
        Some(ValidatorId(self.nodes.len() - 1))
    }
}
