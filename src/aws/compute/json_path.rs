// SPDX-License-Identifier: MIT

//! JSONPath values for state input/output/result fields
//!
//! Each of the three path fields follows the same three-way rendering rule:
//! an unset field is omitted from the output, the DISCARD sentinel renders
//! JSON `null` (replace with the empty object at runtime), and a literal path
//! renders as its string.

use serde_json::Value;

use crate::grid::error::{BeaconError, StatesError};

/// A JSONPath expression or the discard sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonPath {
    /// Drop the value: renders as JSON `null`
    Discard,
    /// A literal path such as `$.detail.status`
    Path(String),
}

impl JsonPath {
    /// A literal path. Must start with `$`.
    pub fn path(path: impl Into<String>) -> Result<Self, BeaconError> {
        let path = path.into();
        if !path.starts_with('$') {
            return Err(StatesError::InvalidJsonPath(path).into());
        }
        Ok(JsonPath::Path(path))
    }

    pub fn discard() -> Self {
        JsonPath::Discard
    }

    pub fn is_discard(&self) -> bool {
        matches!(self, JsonPath::Discard)
    }
}

/// Render an optional path field: absent key, JSON `null`, or the literal.
pub fn render_json_path(path: Option<&JsonPath>) -> Option<Value> {
    match path {
        None => None,
        Some(JsonPath::Discard) => Some(Value::Null),
        Some(JsonPath::Path(p)) => Some(Value::String(p.clone())),
    }
}
