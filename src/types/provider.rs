// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use super::{escape, DeclField, DeclType, ObjectType, UnionType};
use crate::error::CompileError;
use crate::schema::{Kind, NodeId, Schema};

/// Name of the root object type. Object literals in apply configurations use it as a prefix.
pub const ROOT_TYPE_NAME: &str = "Object";

/// Derives the declared type of a schema node.
pub fn decl_type_for(schema: &Schema, node: NodeId) -> Result<DeclType, CompileError> {
    Provider {
        schema,
        stack: vec![],
    }
    .build(node, ROOT_TYPE_NAME, false)
}

/// Like [`decl_type_for`], but the node is a resource root: `apiVersion`, `kind` and the
/// `metadata.name`/`metadata.generateName` fields are always present.
pub fn resource_decl_type_for(schema: &Schema, node: NodeId) -> Result<DeclType, CompileError> {
    Provider {
        schema,
        stack: vec![],
    }
    .build(node, ROOT_TYPE_NAME, true)
}

struct Provider<'a> {
    schema: &'a Schema,
    stack: Vec<NodeId>,
}

impl Provider<'_> {
    fn build(
        &mut self,
        id: NodeId,
        name: &str,
        resource_root: bool,
    ) -> Result<DeclType, CompileError> {
        if self.stack.contains(&id) {
            return Err(CompileError::CyclicType {
                path: name.to_string(),
            });
        }
        self.stack.push(id);
        let result = self.build_node(id, name, resource_root);
        self.stack.pop();
        result
    }

    fn build_node(
        &mut self,
        id: NodeId,
        name: &str,
        resource_root: bool,
    ) -> Result<DeclType, CompileError> {
        let schema = self.schema;
        let node = schema.node(id);
        if node.int_or_string {
            return Ok(DeclType::Union(Arc::new(UnionType::int_or_string())));
        }
        let resource = resource_root || node.embedded_resource;

        Ok(match node.kind {
            Kind::Boolean => DeclType::BOOL,
            Kind::Integer => DeclType::INT,
            Kind::Number => DeclType::DOUBLE,
            Kind::Null => DeclType::NULL,
            Kind::String => match node.format.as_deref() {
                Some("binary") => DeclType::BYTES,
                Some("duration") => DeclType::DURATION,
                Some("date") | Some("date-time") => DeclType::TIMESTAMP,
                _ => DeclType::STRING,
            },
            Kind::Array => match node.items {
                Some(items) => DeclType::list(self.build(items, name, false)?),
                None => DeclType::list(DeclType::DYN),
            },
            Kind::Map => match node.additional_properties {
                Some(values) => DeclType::map(DeclType::STRING, self.build(values, name, false)?),
                None => DeclType::map(DeclType::STRING, DeclType::DYN),
            },
            Kind::Any if !resource && node.properties.is_empty() => DeclType::DYN,
            Kind::Object | Kind::Any => {
                let mut object = ObjectType::new(name);
                object.open = node.preserve_unknown_fields
                    || (node.additional_properties.is_some() && !node.properties.is_empty());
                for (prop, child) in &node.properties {
                    if resource && prop == "metadata" {
                        continue;
                    }
                    let escaped = escape(prop).ok_or_else(|| CompileError::Escape {
                        name: prop.clone(),
                    })?;
                    let child_name = format!("{name}.{prop}");
                    let ty = self.build(*child, &child_name, false)?;
                    object.fields.insert(
                        escaped.clone(),
                        DeclField {
                            name: escaped,
                            original: prop.clone(),
                            ty,
                            required: node.validations.required.contains(prop),
                        },
                    );
                }
                if resource {
                    add_resource_fields(&mut object, name);
                }
                DeclType::object(object)
            }
        })
    }
}

fn add_resource_fields(object: &mut ObjectType, name: &str) {
    for field in ["apiVersion", "kind"] {
        object.fields.entry(field.to_string()).or_insert(DeclField {
            name: field.to_string(),
            original: field.to_string(),
            ty: DeclType::STRING,
            required: false,
        });
    }
    let metadata = ObjectType::new(format!("{name}.metadata"))
        .with_field("name", DeclType::STRING)
        .with_field("generateName", DeclType::STRING);
    object.fields.insert(
        "metadata".to_string(),
        DeclField {
            name: "metadata".to_string(),
            original: "metadata".to_string(),
            ty: DeclType::object(metadata),
            required: false,
        },
    );
}
