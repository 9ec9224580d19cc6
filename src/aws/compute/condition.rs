//! Choice state conditions
//!
//! Conditions compare a JSONPath variable against a literal (or a second
//! path) and combine with And/Or/Not. Variable references are validated at
//! construction; rendering produces the ASL comparison object.

use serde_json::{Map, Number, Value};

use crate::grid::error::{BeaconError, StatesError};

/// ASL comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    StringEquals,
    StringEqualsPath,
    StringLessThan,
    StringLessThanPath,
    StringGreaterThan,
    StringGreaterThanPath,
    StringLessThanEquals,
    StringLessThanEqualsPath,
    StringGreaterThanEquals,
    StringGreaterThanEqualsPath,
    StringMatches,
    NumericEquals,
    NumericEqualsPath,
    NumericLessThan,
    NumericLessThanPath,
    NumericGreaterThan,
    NumericGreaterThanPath,
    NumericLessThanEquals,
    NumericLessThanEqualsPath,
    NumericGreaterThanEquals,
    NumericGreaterThanEqualsPath,
    BooleanEquals,
    BooleanEqualsPath,
    TimestampEquals,
    TimestampEqualsPath,
    TimestampLessThan,
    TimestampLessThanPath,
    TimestampGreaterThan,
    TimestampGreaterThanPath,
    TimestampLessThanEquals,
    TimestampLessThanEqualsPath,
    TimestampGreaterThanEquals,
    TimestampGreaterThanEqualsPath,
    IsNull,
    IsPresent,
    IsNumeric,
    IsString,
    IsBoolean,
    IsTimestamp,
}

impl ComparisonOperator {
    pub fn asl_key(self) -> &'static str {
        use ComparisonOperator::*;
        match self {
            StringEquals => "StringEquals",
            StringEqualsPath => "StringEqualsPath",
            StringLessThan => "StringLessThan",
            StringLessThanPath => "StringLessThanPath",
            StringGreaterThan => "StringGreaterThan",
            StringGreaterThanPath => "StringGreaterThanPath",
            StringLessThanEquals => "StringLessThanEquals",
            StringLessThanEqualsPath => "StringLessThanEqualsPath",
            StringGreaterThanEquals => "StringGreaterThanEquals",
            StringGreaterThanEqualsPath => "StringGreaterThanEqualsPath",
            StringMatches => "StringMatches",
            NumericEquals => "NumericEquals",
            NumericEqualsPath => "NumericEqualsPath",
            NumericLessThan => "NumericLessThan",
            NumericLessThanPath => "NumericLessThanPath",
            NumericGreaterThan => "NumericGreaterThan",
            NumericGreaterThanPath => "NumericGreaterThanPath",
            NumericLessThanEquals => "NumericLessThanEquals",
            NumericLessThanEqualsPath => "NumericLessThanEqualsPath",
            NumericGreaterThanEquals => "NumericGreaterThanEquals",
            NumericGreaterThanEqualsPath => "NumericGreaterThanEqualsPath",
            BooleanEquals => "BooleanEquals",
            BooleanEqualsPath => "BooleanEqualsPath",
            TimestampEquals => "TimestampEquals",
            TimestampEqualsPath => "TimestampEqualsPath",
            TimestampLessThan => "TimestampLessThan",
            TimestampLessThanPath => "TimestampLessThanPath",
            TimestampGreaterThan => "TimestampGreaterThan",
            TimestampGreaterThanPath => "TimestampGreaterThanPath",
            TimestampLessThanEquals => "TimestampLessThanEquals",
            TimestampLessThanEqualsPath => "TimestampLessThanEqualsPath",
            TimestampGreaterThanEquals => "TimestampGreaterThanEquals",
            TimestampGreaterThanEqualsPath => "TimestampGreaterThanEqualsPath",
            IsNull => "IsNull",
            IsPresent => "IsPresent",
            IsNumeric => "IsNumeric",
            IsString => "IsString",
            IsBoolean => "IsBoolean",
            IsTimestamp => "IsTimestamp",
        }
    }

    /// Operators whose value is itself a JSONPath reference.
    pub fn is_path_operator(self) -> bool {
        matches!(
            self,
            ComparisonOperator::StringEqualsPath
                | ComparisonOperator::StringLessThanPath
                | ComparisonOperator::StringGreaterThanPath
                | ComparisonOperator::StringLessThanEqualsPath
                | ComparisonOperator::StringGreaterThanEqualsPath
                | ComparisonOperator::NumericEqualsPath
                | ComparisonOperator::NumericLessThanPath
                | ComparisonOperator::NumericGreaterThanPath
                | ComparisonOperator::NumericLessThanEqualsPath
                | ComparisonOperator::NumericGreaterThanEqualsPath
                | ComparisonOperator::BooleanEqualsPath
                | ComparisonOperator::TimestampEqualsPath
                | ComparisonOperator::TimestampLessThanPath
                | ComparisonOperator::TimestampGreaterThanPath
                | ComparisonOperator::TimestampLessThanEqualsPath
                | ComparisonOperator::TimestampGreaterThanEqualsPath
        )
    }
}

/// A condition tree for Choice rules.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Comparison {
        variable: String,
        operator: ComparisonOperator,
        value: Value,
    },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

/// A variable must reference the input: `$`, `$.foo` or `$[0]`.
fn validate_reference(reference: &str) -> Result<(), BeaconError> {
    if reference == "$" || reference.starts_with("$.") || reference.starts_with("$[") {
        Ok(())
    } else {
        Err(StatesError::InvalidVariable(reference.to_string()).into())
    }
}

impl Condition {
    /// Build any comparison; validates the variable and, for `…Path`
    /// operators, the value.
    pub fn comparison(
        variable: impl Into<String>,
        operator: ComparisonOperator,
        value: Value,
    ) -> Result<Self, BeaconError> {
        let variable = variable.into();
        validate_reference(&variable)?;
        if operator.is_path_operator() {
            match &value {
                Value::String(s) => validate_reference(s)?,
                _ => {
                    return Err(StatesError::InvalidVariable(format!(
                        "{:?} (path operators compare against a path string)",
                        value
                    ))
                    .into())
                }
            }
        }
        Ok(Condition::Comparison {
            variable,
            operator,
            value,
        })
    }

    pub fn string_equals(
        variable: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, BeaconError> {
        Self::comparison(
            variable,
            ComparisonOperator::StringEquals,
            Value::String(value.into()),
        )
    }

    pub fn string_equals_path(
        variable: impl Into<String>,
        path: impl Into<String>,
    ) -> Result<Self, BeaconError> {
        Self::comparison(
            variable,
            ComparisonOperator::StringEqualsPath,
            Value::String(path.into()),
        )
    }

    pub fn string_less_than(
        variable: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, BeaconError> {
        Self::comparison(
            variable,
            ComparisonOperator::StringLessThan,
            Value::String(value.into()),
        )
    }

    pub fn string_greater_than(
        variable: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, BeaconError> {
        Self::comparison(
            variable,
            ComparisonOperator::StringGreaterThan,
            Value::String(value.into()),
        )
    }

    pub fn string_matches(
        variable: impl Into<String>,
        pattern: impl Into<String>,
    ) -> Result<Self, BeaconError> {
        Self::comparison(
            variable,
            ComparisonOperator::StringMatches,
            Value::String(pattern.into()),
        )
    }

    pub fn number_equals(variable: impl Into<String>, value: f64) -> Result<Self, BeaconError> {
        Self::comparison(variable, ComparisonOperator::NumericEquals, number(value)?)
    }

    pub fn number_less_than(variable: impl Into<String>, value: f64) -> Result<Self, BeaconError> {
        Self::comparison(variable, ComparisonOperator::NumericLessThan, number(value)?)
    }

    pub fn number_greater_than(
        variable: impl Into<String>,
        value: f64,
    ) -> Result<Self, BeaconError> {
        Self::comparison(
            variable,
            ComparisonOperator::NumericGreaterThan,
            number(value)?,
        )
    }

    pub fn number_greater_than_equals(
        variable: impl Into<String>,
        value: f64,
    ) -> Result<Self, BeaconError> {
        Self::comparison(
            variable,
            ComparisonOperator::NumericGreaterThanEquals,
            number(value)?,
        )
    }

    pub fn boolean_equals(variable: impl Into<String>, value: bool) -> Result<Self, BeaconError> {
        Self::comparison(
            variable,
            ComparisonOperator::BooleanEquals,
            Value::Bool(value),
        )
    }

    pub fn timestamp_equals(
        variable: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Result<Self, BeaconError> {
        Self::comparison(
            variable,
            ComparisonOperator::TimestampEquals,
            Value::String(timestamp.into()),
        )
    }

    pub fn timestamp_less_than(
        variable: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Result<Self, BeaconError> {
        Self::comparison(
            variable,
            ComparisonOperator::TimestampLessThan,
            Value::String(timestamp.into()),
        )
    }

    pub fn is_null(variable: impl Into<String>) -> Result<Self, BeaconError> {
        Self::comparison(variable, ComparisonOperator::IsNull, Value::Bool(true))
    }

    pub fn is_not_null(variable: impl Into<String>) -> Result<Self, BeaconError> {
        Self::comparison(variable, ComparisonOperator::IsNull, Value::Bool(false))
    }

    pub fn is_present(variable: impl Into<String>) -> Result<Self, BeaconError> {
        Self::comparison(variable, ComparisonOperator::IsPresent, Value::Bool(true))
    }

    pub fn is_not_present(variable: impl Into<String>) -> Result<Self, BeaconError> {
        Self::comparison(variable, ComparisonOperator::IsPresent, Value::Bool(false))
    }

    pub fn is_numeric(variable: impl Into<String>) -> Result<Self, BeaconError> {
        Self::comparison(variable, ComparisonOperator::IsNumeric, Value::Bool(true))
    }

    pub fn is_string(variable: impl Into<String>) -> Result<Self, BeaconError> {
        Self::comparison(variable, ComparisonOperator::IsString, Value::Bool(true))
    }

    pub fn is_boolean(variable: impl Into<String>) -> Result<Self, BeaconError> {
        Self::comparison(variable, ComparisonOperator::IsBoolean, Value::Bool(true))
    }

    pub fn is_timestamp(variable: impl Into<String>) -> Result<Self, BeaconError> {
        Self::comparison(variable, ComparisonOperator::IsTimestamp, Value::Bool(true))
    }

    pub fn and(conditions: Vec<Condition>) -> Result<Self, BeaconError> {
        if conditions.is_empty() {
            return Err(StatesError::InvalidDefinition(
                "And requires at least one condition".into(),
            )
            .into());
        }
        Ok(Condition::And(conditions))
    }

    pub fn or(conditions: Vec<Condition>) -> Result<Self, BeaconError> {
        if conditions.is_empty() {
            return Err(StatesError::InvalidDefinition(
                "Or requires at least one condition".into(),
            )
            .into());
        }
        Ok(Condition::Or(conditions))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(condition: Condition) -> Self {
        Condition::Not(Box::new(condition))
    }

    /// Render to the ASL comparison object.
    pub fn render(&self) -> Value {
        match self {
            Condition::Comparison {
                variable,
                operator,
                value,
            } => {
                let mut map = Map::new();
                map.insert("Variable".to_string(), Value::String(variable.clone()));
                map.insert(operator.asl_key().to_string(), value.clone());
                Value::Object(map)
            }
            Condition::And(conditions) => {
                let mut map = Map::new();
                map.insert(
                    "And".to_string(),
                    Value::Array(conditions.iter().map(Condition::render).collect()),
                );
                Value::Object(map)
            }
            Condition::Or(conditions) => {
                let mut map = Map::new();
                map.insert(
                    "Or".to_string(),
                    Value::Array(conditions.iter().map(Condition::render).collect()),
                );
                Value::Object(map)
            }
            Condition::Not(condition) => {
                let mut map = Map::new();
                map.insert("Not".to_string(), condition.render());
                Value::Object(map)
            }
        }
    }
}

fn number(value: f64) -> Result<Value, BeaconError> {
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| {
            BeaconError::from(StatesError::InvalidDefinition(format!(
                "{} is not a finite number",
                value
            )))
        })
}
