// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::error::MatchError;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Alphanumeric at both ends, with `-`, `_` and `.` allowed inside.
fn is_label_name(s: &str) -> bool {
    let alnum = |c: char| c.is_ascii_alphanumeric();
    s.starts_with(alnum)
        && s.ends_with(alnum)
        && s.chars().all(|c| alnum(c) || matches!(c, '-' | '_' | '.'))
}

fn is_dns_subdomain(s: &str) -> bool {
    s.split('.').all(|label| {
        let lower = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
        label.starts_with(lower)
            && label.ends_with(lower)
            && label.chars().all(|c| lower(c) || c == '-')
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectorOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelectorRequirement {
    pub key: String,
    pub operator: SelectorOperator,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

/// Label query over a set of labels. The requirements are ANDed; an empty selector matches
/// every label set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LabelSelector {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<LabelSelectorRequirement>,
}

fn validate_key(key: &str) -> Result<(), MatchError> {
    let (prefix, name) = match key.rsplit_once('/') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, key),
    };
    if let Some(prefix) = prefix {
        if prefix.is_empty() || prefix.len() > 253 || !is_dns_subdomain(prefix) {
            return Err(MatchError::InvalidSelector(format!(
                "{key:?}: prefix part must be a lowercase DNS subdomain"
            )));
        }
    }
    if name.is_empty() || name.len() > 63 || !is_label_name(name) {
        return Err(MatchError::InvalidSelector(format!(
            "{key:?}: name part must consist of at most 63 alphanumeric characters, '-', '_' or '.'"
        )));
    }
    Ok(())
}

fn validate_value(key: &str, value: &str) -> Result<(), MatchError> {
    if value.is_empty() || (value.len() <= 63 && is_label_name(value)) {
        return Ok(());
    }
    Err(MatchError::InvalidSelector(format!(
        "{value:?}: invalid label value for key {key:?}"
    )))
}

impl LabelSelectorRequirement {
    fn validate(&self) -> Result<(), MatchError> {
        validate_key(&self.key)?;
        match self.operator {
            SelectorOperator::In | SelectorOperator::NotIn if self.values.is_empty() => {
                Err(MatchError::InvalidSelector(format!(
                    "{:?}: values must be non-empty for operator {:?}",
                    self.key, self.operator
                )))
            }
            SelectorOperator::Exists | SelectorOperator::DoesNotExist
                if !self.values.is_empty() =>
            {
                Err(MatchError::InvalidSelector(format!(
                    "{:?}: values must be empty for operator {:?}",
                    self.key, self.operator
                )))
            }
            _ => self
                .values
                .iter()
                .try_for_each(|v| validate_value(&self.key, v)),
        }
    }

    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let value = labels.get(&self.key);
        match self.operator {
            SelectorOperator::In => value.is_some_and(|v| self.values.contains(v)),
            SelectorOperator::NotIn => value.is_none_or(|v| !self.values.contains(v)),
            SelectorOperator::Exists => value.is_some(),
            SelectorOperator::DoesNotExist => value.is_none(),
        }
    }
}

impl LabelSelector {
    pub fn is_empty(&self) -> bool {
        self.match_labels.is_empty() && self.match_expressions.is_empty()
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.match_labels.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_expression(
        mut self,
        key: &str,
        operator: SelectorOperator,
        values: &[&str],
    ) -> Self {
        self.match_expressions.push(LabelSelectorRequirement {
            key: key.to_string(),
            operator,
            values: values.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    /// Checks the selector is well formed.
    pub fn validate(&self) -> Result<(), MatchError> {
        for (key, value) in &self.match_labels {
            validate_key(key)?;
            validate_value(key, value)?;
        }
        self.match_expressions
            .iter()
            .try_for_each(LabelSelectorRequirement::validate)
    }

    /// Evaluates the selector against `labels`. Malformed selectors are errors rather than
    /// non-matches.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> Result<bool, MatchError> {
        self.validate()?;
        let labels_match = self
            .match_labels
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v));
        Ok(labels_match && self.match_expressions.iter().all(|r| r.matches(labels)))
    }
}
