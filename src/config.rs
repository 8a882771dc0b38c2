// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::program::EvalOptions;
use crate::validator::{WalkOptions, MAX_MESSAGE_EXPRESSION_LENGTH};

use core::num::NonZeroU32;
use core::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Default per-expression cost ceiling.
pub const PER_CALL_LIMIT: u64 = 1_000_000;

/// Default cost budget of one request.
pub const RUNTIME_COST_BUDGET: i64 = 10_000_000;

/// Limits applied by the [`Engine`](crate::Engine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct EngineConfig {
    pub per_call_limit: u64,
    pub runtime_cost_budget: i64,
    pub max_message_expression_length: usize,
    /// Work units between deadline and cancellation checks. Zero is treated as one.
    pub interrupt_check_frequency: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation_time_limit_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            per_call_limit: PER_CALL_LIMIT,
            runtime_cost_budget: RUNTIME_COST_BUDGET,
            max_message_expression_length: MAX_MESSAGE_EXPRESSION_LENGTH,
            interrupt_check_frequency: 100,
            evaluation_time_limit_ms: None,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    #[cfg(feature = "yaml")]
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn eval_options(&self) -> EvalOptions {
        EvalOptions {
            cost_limit: Some(self.per_call_limit),
            time_limit: self.evaluation_time_limit_ms.map(Duration::from_millis),
            check_interval: NonZeroU32::new(self.interrupt_check_frequency)
                .unwrap_or(NonZeroU32::MIN),
            cancel: None,
        }
    }

    pub fn walk_options(&self) -> WalkOptions {
        WalkOptions {
            eval: self.eval_options(),
            max_message_expression_length: self.max_message_expression_length,
        }
    }
}
