//! Lazy value tokens
//!
//! The build phase hands out `${Token[N]}` placeholder strings; producers are
//! registered alongside them. A single resolve pass at synthesis substitutes
//! every placeholder with its produced value. Engine-level interpolations
//! like `${aws_iam_role.X.arn}` are not tokens and pass through untouched.

use std::fmt;

use serde_json::Value;

use crate::grid::error::BeaconError;

const TOKEN_PREFIX: &str = "${Token[";
const TOKEN_SUFFIX: &str = "]}";

/// Producer output may itself contain tokens; cap the recursion so a
/// self-referential producer fails instead of hanging.
const MAX_RESOLVE_DEPTH: usize = 16;

type Producer = Box<dyn Fn() -> Result<Value, BeaconError>>;

/// Registry of deferred values, owned by the synthesis root.
#[derive(Default)]
pub struct TokenTable {
    producers: Vec<Producer>,
}

/// True if the string still contains any `${…}` interpolation, token or not.
///
/// Validation that inspects literal values must skip strings for which this
/// returns true; their final content is not known until the engine runs.
pub fn is_unresolved(s: &str) -> bool {
    s.contains("${")
}

impl TokenTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a producer and return its placeholder string.
    pub fn defer(
        &mut self,
        produce: impl Fn() -> Result<Value, BeaconError> + 'static,
    ) -> String {
        let index = self.producers.len();
        self.producers.push(Box::new(produce));
        format!("{}{}{}", TOKEN_PREFIX, index, TOKEN_SUFFIX)
    }

    pub fn len(&self) -> usize {
        self.producers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.producers.is_empty()
    }

    /// Resolve all token placeholders inside `value`.
    pub fn resolve(&self, value: &Value) -> Result<Value, BeaconError> {
        self.resolve_at(value, 0)
    }

    fn resolve_at(&self, value: &Value, depth: usize) -> Result<Value, BeaconError> {
        if depth > MAX_RESOLVE_DEPTH {
            return Err(BeaconError::Token(
                "token resolution exceeded maximum depth; producer output refers back to itself"
                    .into(),
            ));
        }
        match value {
            Value::String(s) => {
                if let Some(index) = parse_exact_token(s) {
                    self.resolve_index(index, depth)
                } else if s.contains(TOKEN_PREFIX) {
                    Ok(Value::String(self.splice(s, depth)?))
                } else {
                    Ok(value.clone())
                }
            }
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.resolve_at(item, depth)?);
                }
                Ok(Value::Array(out))
            }
            Value::Object(map) => {
                let mut out = serde_json::Map::new();
                for (key, item) in map {
                    out.insert(key.clone(), self.resolve_at(item, depth)?);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other.clone()),
        }
    }

    fn resolve_index(&self, index: usize, depth: usize) -> Result<Value, BeaconError> {
        let producer = self.producers.get(index).ok_or_else(|| {
            BeaconError::Token(format!("no producer registered for token {}", index))
        })?;
        let produced = producer()?;
        self.resolve_at(&produced, depth + 1)
    }

    /// Replace embedded token references inside a larger string. Embedded
    /// tokens must produce strings.
    fn splice(&self, s: &str, depth: usize) -> Result<String, BeaconError> {
        let mut out = String::with_capacity(s.len());
        let mut rest = s;
        while let Some(pos) = rest.find(TOKEN_PREFIX) {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + TOKEN_PREFIX.len()..];
            let end = after.find(TOKEN_SUFFIX).ok_or_else(|| {
                BeaconError::Token(format!("malformed token reference in '{}'", s))
            })?;
            let index: usize = after[..end].parse().map_err(|_| {
                BeaconError::Token(format!("malformed token reference in '{}'", s))
            })?;
            match self.resolve_index(index, depth)? {
                Value::String(part) => out.push_str(&part),
                other => {
                    return Err(BeaconError::Token(format!(
                        "token {} produced a non-string value ({}) and cannot be embedded in '{}'",
                        index,
                        value_kind(&other),
                        s
                    )))
                }
            }
            rest = &after[end + TOKEN_SUFFIX.len()..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

fn parse_exact_token(s: &str) -> Option<usize> {
    s.strip_prefix(TOKEN_PREFIX)?
        .strip_suffix(TOKEN_SUFFIX)?
        .parse()
        .ok()
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl fmt::Debug for TokenTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenTable")
            .field("producers", &self.producers.len())
            .finish()
    }
}
