//! Payload field values.
//!
//! Business forms carry loosely structured data: vessel names, dates,
//! checklists, nested evaluation sections. `FieldValue` covers that without
//! floating point; decimals keep their exact decimal text.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Business fields of a record, ordered by name.
pub type Payload = BTreeMap<String, FieldValue>;

/// One payload value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Explicitly cleared field.
    Empty,
    Flag(bool),
    Integer(i64),
    /// Decimal number kept as its canonical text, e.g. `"12.75"`.
    Decimal(String),
    Text(String),
    List(Vec<FieldValue>),
    Group(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// The value as text, if it is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Whether the field counts as filled in for required-field checks.
    #[must_use]
    pub fn is_present(&self) -> bool {
        match self {
            Self::Empty => false,
            Self::Text(s) | Self::Decimal(s) => !s.trim().is_empty(),
            Self::List(items) => !items.is_empty(),
            Self::Group(fields) => !fields.is_empty(),
            Self::Flag(_) | Self::Integer(_) => true,
        }
    }

    /// Total length of text carried by this value, nested values included.
    #[must_use]
    pub fn text_len(&self) -> usize {
        match self {
            Self::Text(s) | Self::Decimal(s) => s.len(),
            Self::List(items) => items.iter().map(Self::text_len).sum(),
            Self::Group(fields) => fields
                .iter()
                .map(|(k, v)| k.len().saturating_add(v.text_len()))
                .sum(),
            Self::Empty | Self::Flag(_) | Self::Integer(_) => 0,
        }
    }

    /// Nesting depth; scalars are depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Self::List(items) => 1 + items.iter().map(Self::depth).max().unwrap_or(0),
            Self::Group(fields) => 1 + fields.values().map(Self::depth).max().unwrap_or(0),
            _ => 0,
        }
    }
}
