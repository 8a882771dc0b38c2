// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::error::MutationError;

use core::fmt;

/// A JSON pointer such as `/spec/containers/0/name`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JsonPointer {
    tokens: Vec<String>,
}

impl JsonPointer {
    pub fn parse(pointer: &str) -> Result<Self, MutationError> {
        if pointer.is_empty() {
            return Ok(Self::default());
        }
        let Some(rest) = pointer.strip_prefix('/') else {
            return Err(MutationError::InvalidPointer {
                pointer: pointer.to_string(),
                reason: "must be empty or start with '/'".to_string(),
            });
        };
        let tokens = rest
            .split('/')
            .map(|token| unescape_token(token, pointer))
            .collect::<Result<_, _>>()?;
        Ok(Self { tokens })
    }

    /// Decoded reference tokens.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn is_root(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Splits into the parent pointer and the last token.
    pub fn split_last(&self) -> Option<(JsonPointer, &str)> {
        let (last, parent) = self.tokens.split_last()?;
        Some((
            JsonPointer {
                tokens: parent.to_vec(),
            },
            last,
        ))
    }

    /// True if `self` is a proper prefix of `other`.
    pub fn is_proper_prefix_of(&self, other: &JsonPointer) -> bool {
        self.tokens.len() < other.tokens.len() && other.tokens.starts_with(&self.tokens)
    }
}

fn unescape_token(token: &str, pointer: &str) -> Result<String, MutationError> {
    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars();
    while let Some(c) = chars.next() {
        if c != '~' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => out.push('~'),
            Some('1') => out.push('/'),
            _ => {
                return Err(MutationError::InvalidPointer {
                    pointer: pointer.to_string(),
                    reason: "'~' must be followed by '0' or '1'".to_string(),
                })
            }
        }
    }
    Ok(out)
}

impl fmt::Display for JsonPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for token in &self.tokens {
            write!(f, "/{}", token.replace('~', "~0").replace('/', "~1"))?;
        }
        Ok(())
    }
}
