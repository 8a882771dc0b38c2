// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Compiled validator trees and the walk that evaluates them against objects.

mod cache;
mod tree;
mod values;
mod walk;

#[cfg(test)]
mod tests;

pub use cache::{SchemaResolver, StaticSchemaResolver, ValidatorCache};
pub use tree::{CompiledValidator, CompiledValidatorNode, ValidatorId};
pub use values::validate_values;
pub use walk::{WalkOptions, MAX_MESSAGE_EXPRESSION_LENGTH};
