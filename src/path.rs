// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Field paths used to scope validation errors.

use core::fmt;

use serde::{Serialize, Serializer};

/// Component of a field path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PathElement {
    /// Named property (`.name`).
    Field(String),
    /// Array position (`[0]`).
    Index(usize),
    /// Map key (`[key]`).
    Key(String),
}

/// Path from the validated root to a field, rendered as `spec.items[0].name`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldPath {
    elements: Vec<PathElement>,
}

impl FieldPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn elements(&self) -> &[PathElement] {
        &self.elements
    }

    pub fn child(&self, name: &str) -> Self {
        self.with(PathElement::Field(name.to_string()))
    }

    pub fn index(&self, idx: usize) -> Self {
        self.with(PathElement::Index(idx))
    }

    pub fn key(&self, key: &str) -> Self {
        self.with(PathElement::Key(key.to_string()))
    }

    fn with(&self, element: PathElement) -> Self {
        let mut elements = Vec::with_capacity(self.elements.len() + 1);
        elements.extend(self.elements.iter().cloned());
        elements.push(element);
        Self { elements }
    }

    /// Appends a relative path such as `.spec.replicas` or `.labels['app']`.
    ///
    /// Returns `None` if the relative path is malformed.
    pub fn join_relative(&self, relative: &str) -> Option<Self> {
        let mut path = self.clone();
        let mut rest = relative.trim();
        while !rest.is_empty() {
            if let Some(r) = rest.strip_prefix('.') {
                let end = r.find(['.', '[']).unwrap_or(r.len());
                if end == 0 {
                    return None;
                }
                path.elements.push(PathElement::Field(r[..end].to_string()));
                rest = &r[end..];
            } else if let Some(r) = rest.strip_prefix('[') {
                let close = r.find(']')?;
                let inner = &r[..close];
                let element = match inner.chars().next() {
                    Some(q @ ('\'' | '"')) => {
                        let key = inner.strip_prefix(q)?.strip_suffix(q)?;
                        PathElement::Key(key.to_string())
                    }
                    Some(_) => PathElement::Index(inner.parse().ok()?),
                    None => return None,
                };
                path.elements.push(element);
                rest = &r[close + 1..];
            } else {
                return None;
            }
        }
        Some(path)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.elements.is_empty() {
            return f.write_str("<root>");
        }
        for (idx, element) in self.elements.iter().enumerate() {
            match element {
                PathElement::Field(name) if idx == 0 => f.write_str(name)?,
                PathElement::Field(name) => write!(f, ".{name}")?,
                PathElement::Index(i) => write!(f, "[{i}]")?,
                PathElement::Key(k) => write!(f, "[{k}]")?,
            }
        }
        Ok(())
    }
}

impl Serialize for FieldPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
