// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::tree::CompiledValidator;

use crate::compiler::RuleCompiler;
use crate::error::SchemaError;
use crate::request::GroupVersionKind;
use crate::schema::Schema;

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

/// Supplies the schema of a kind.
pub trait SchemaResolver: Send + Sync {
    fn resolve(&self, gvk: &GroupVersionKind) -> Result<Arc<Schema>, SchemaError>;
}

/// Resolver over a fixed set of schemas.
#[derive(Debug, Clone, Default)]
pub struct StaticSchemaResolver {
    schemas: BTreeMap<GroupVersionKind, Arc<Schema>>,
}

impl StaticSchemaResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, gvk: GroupVersionKind, schema: Schema) {
        self.schemas.insert(gvk, Arc::new(schema));
    }
}

impl SchemaResolver for StaticSchemaResolver {
    fn resolve(&self, gvk: &GroupVersionKind) -> Result<Arc<Schema>, SchemaError> {
        self.schemas
            .get(gvk)
            .cloned()
            .ok_or_else(|| SchemaError::UnresolvedRef(gvk.to_string()))
    }
}

type Snapshot = Arc<BTreeMap<GroupVersionKind, Arc<CompiledValidator>>>;

/// Validator trees by kind.
///
/// Readers take a snapshot and never observe a partially built tree. New trees are built outside
/// the lock and published by replacing the snapshot. Entries are never invalidated.
#[derive(Debug, Default)]
pub struct ValidatorCache {
    validators: RwLock<Snapshot>,
}

impl ValidatorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, gvk: &GroupVersionKind) -> Option<Arc<CompiledValidator>> {
        self.validators.read().get(gvk).cloned()
    }

    pub fn len(&self) -> usize {
        self.validators.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.read().is_empty()
    }

    /// Returns the validator of `gvk`, building and publishing it on first use.
    pub fn get_or_build(
        &self,
        gvk: &GroupVersionKind,
        resolver: &dyn SchemaResolver,
        compiler: &RuleCompiler,
    ) -> Result<Arc<CompiledValidator>, SchemaError> {
        if let Some(validator) = self.get(gvk) {
            return Ok(validator);
        }

        let schema = resolver.resolve(gvk)?;
        let built = Arc::new(CompiledValidator::new(schema, compiler));

        let mut guard = self.validators.write();
        // Another caller may have published while this tree was being built.
        if let Some(existing) = guard.get(gvk) {
            return Ok(existing.clone());
        }
        let mut replacement = BTreeMap::clone(&guard);
        replacement.insert(gvk.clone(), built.clone());
        *guard = Arc::new(replacement);
        debug!(gvk = %gvk, nodes = built.len(), "installed validator");
        Ok(built)
    }
}
