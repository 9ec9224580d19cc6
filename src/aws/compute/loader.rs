//! Workflow definition loader - YAML file loading and compilation
//!
//! Loads flat workflow definitions from YAML and compiles them into a
//! `States` arena. The format covers the sequential subset: Pass, Task,
//! Wait, Choice, Succeed and Fail states addressed by id, with Task retry
//! rules and Choice rules. Parallel and Map states nest whole sub-machines
//! and are built in code instead.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::aws::compute::condition::Condition;
use crate::aws::compute::json_path::JsonPath;
use crate::aws::compute::state::{
    ChoiceProps, FailProps, PassProps, RetryProps, StateId, States, SucceedProps, TaskProps,
    WaitProps, WaitTime,
};
use crate::grid::error::{BeaconError, StatesError};

/// Loads workflow definitions from YAML files
pub struct WorkflowLoader;

impl WorkflowLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a workflow definition from a YAML file
    pub fn load_workflow<P: AsRef<Path>>(&self, path: P) -> Result<WorkflowSpec, BeaconError> {
        let content = fs::read_to_string(path)?;
        Self::parse_yaml(&content)
    }

    /// Parse a workflow definition from a YAML string
    pub fn parse_yaml(content: &str) -> Result<WorkflowSpec, BeaconError> {
        let spec: WorkflowSpec = serde_yaml::from_str(content)?;
        Ok(spec)
    }
}

impl Default for WorkflowLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
pub struct WorkflowSpec {
    pub name: String,
    pub comment: Option<String>,
    pub start_at: String,
    pub timeout_seconds: Option<u32>,
    pub states: Vec<StateSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateSpec {
    Pass {
        id: String,
        comment: Option<String>,
        next: Option<String>,
        result: Option<Value>,
        parameters: Option<Map<String, Value>>,
        result_path: Option<String>,
    },
    Task {
        id: String,
        comment: Option<String>,
        next: Option<String>,
        resource: String,
        parameters: Option<Map<String, Value>>,
        result_selector: Option<Map<String, Value>>,
        result_path: Option<String>,
        timeout_seconds: Option<u32>,
        heartbeat_seconds: Option<u32>,
        #[serde(default)]
        retry: Vec<RetryRule>,
    },
    Wait {
        id: String,
        comment: Option<String>,
        next: Option<String>,
        seconds: Option<u32>,
        seconds_path: Option<String>,
        timestamp: Option<String>,
        timestamp_path: Option<String>,
    },
    Choice {
        id: String,
        comment: Option<String>,
        #[serde(default)]
        rules: Vec<ChoiceRuleSpec>,
        default: Option<String>,
    },
    Succeed {
        id: String,
        comment: Option<String>,
    },
    Fail {
        id: String,
        comment: Option<String>,
        error: Option<String>,
        cause: Option<String>,
    },
}

impl StateSpec {
    pub fn id(&self) -> &str {
        match self {
            StateSpec::Pass { id, .. }
            | StateSpec::Task { id, .. }
            | StateSpec::Wait { id, .. }
            | StateSpec::Choice { id, .. }
            | StateSpec::Succeed { id, .. }
            | StateSpec::Fail { id, .. } => id,
        }
    }

    fn next(&self) -> Option<&str> {
        match self {
            StateSpec::Pass { next, .. }
            | StateSpec::Task { next, .. }
            | StateSpec::Wait { next, .. } => next.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RetryRule {
    #[serde(default)]
    pub errors: Vec<String>,
    pub interval_seconds: Option<u32>,
    pub max_attempts: Option<u32>,
    pub backoff_rate: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceRuleSpec {
    pub variable: String,
    pub operator: String,
    pub value: Option<Value>,
    pub next: String,
}

impl WorkflowSpec {
    /// Compile the definition into a states arena plus its entry state.
    pub fn build(&self) -> Result<(States, StateId), BeaconError> {
        let mut states = States::new();
        let mut by_id: HashMap<&str, StateId> = HashMap::new();

        for spec in &self.states {
            let sid = create_state(&mut states, spec)?;
            if by_id.insert(spec.id(), sid).is_some() {
                return Err(BeaconError::config(format!(
                    "workflow '{}' defines state id '{}' more than once",
                    self.name,
                    spec.id()
                )));
            }
        }

        let lookup = |target: &str, from: &str| -> Result<StateId, BeaconError> {
            by_id.get(target).copied().ok_or_else(|| {
                StatesError::UnknownState(format!("'{}' (referenced by '{}')", target, from))
                    .into()
            })
        };

        for spec in &self.states {
            let from = by_id[spec.id()];
            if let Some(next) = spec.next() {
                states.set_next(from, lookup(next, spec.id())?)?;
            }
            if let StateSpec::Choice { rules, default, .. } = spec {
                for rule in rules {
                    let target = lookup(&rule.next, spec.id())?;
                    states.when(from, build_condition(rule)?, target)?;
                }
                if let Some(default) = default {
                    states.otherwise(from, lookup(default, spec.id())?)?;
                }
            }
        }

        let start = by_id.get(self.start_at.as_str()).copied().ok_or_else(|| {
            BeaconError::from(StatesError::UnknownState(format!(
                "'{}' (start_at of workflow '{}')",
                self.start_at, self.name
            )))
        })?;
        Ok((states, start))
    }
}

fn create_state(states: &mut States, spec: &StateSpec) -> Result<StateId, BeaconError> {
    match spec {
        StateSpec::Pass {
            id,
            comment,
            result,
            parameters,
            result_path,
            ..
        } => states.pass(
            id,
            PassProps {
                comment: comment.clone(),
                result: result.clone(),
                parameters: parameters.clone(),
                result_path: parse_result_path(result_path.as_deref())?,
                ..Default::default()
            },
        ),
        StateSpec::Task {
            id,
            comment,
            resource,
            parameters,
            result_selector,
            result_path,
            timeout_seconds,
            heartbeat_seconds,
            retry,
            ..
        } => {
            let task = states.task(
                id,
                TaskProps {
                    comment: comment.clone(),
                    resource: resource.clone(),
                    parameters: parameters.clone(),
                    result_selector: result_selector.clone(),
                    result_path: parse_result_path(result_path.as_deref())?,
                    timeout_seconds: *timeout_seconds,
                    heartbeat_seconds: *heartbeat_seconds,
                    ..Default::default()
                },
            )?;
            for rule in retry {
                states.add_retry(
                    task,
                    RetryProps {
                        errors: rule.errors.clone(),
                        interval_seconds: rule.interval_seconds,
                        max_attempts: rule.max_attempts,
                        backoff_rate: rule.backoff_rate,
                    },
                )?;
            }
            Ok(task)
        }
        StateSpec::Wait {
            id,
            comment,
            seconds,
            seconds_path,
            timestamp,
            timestamp_path,
            ..
        } => {
            let time = build_wait_time(id, seconds, seconds_path, timestamp, timestamp_path)?;
            states.wait(
                id,
                WaitProps {
                    time,
                    comment: comment.clone(),
                },
            )
        }
        StateSpec::Choice { id, comment, .. } => states.choice(
            id,
            ChoiceProps {
                comment: comment.clone(),
                ..Default::default()
            },
        ),
        StateSpec::Succeed { id, comment } => states.succeed(
            id,
            SucceedProps {
                comment: comment.clone(),
                ..Default::default()
            },
        ),
        StateSpec::Fail {
            id,
            comment,
            error,
            cause,
        } => states.fail(
            id,
            FailProps {
                comment: comment.clone(),
                error: error.clone(),
                cause: cause.clone(),
                ..Default::default()
            },
        ),
    }
}

/// The literal `discard` drops the result; anything else is a JSONPath.
fn parse_result_path(raw: Option<&str>) -> Result<Option<JsonPath>, BeaconError> {
    match raw {
        None => Ok(None),
        Some(s) if s.eq_ignore_ascii_case("discard") => Ok(Some(JsonPath::Discard)),
        Some(s) => Ok(Some(JsonPath::path(s)?)),
    }
}

fn build_wait_time(
    id: &str,
    seconds: &Option<u32>,
    seconds_path: &Option<String>,
    timestamp: &Option<String>,
    timestamp_path: &Option<String>,
) -> Result<WaitTime, BeaconError> {
    let set = [
        seconds.is_some(),
        seconds_path.is_some(),
        timestamp.is_some(),
        timestamp_path.is_some(),
    ]
    .iter()
    .filter(|b| **b)
    .count();
    if set != 1 {
        return Err(BeaconError::config(format!(
            "Wait state '{}' needs exactly one of seconds, seconds_path, timestamp, timestamp_path",
            id
        )));
    }
    if let Some(n) = seconds {
        return Ok(WaitTime::seconds(*n));
    }
    if let Some(path) = seconds_path {
        return WaitTime::seconds_path(path.clone());
    }
    if let Some(ts) = timestamp {
        return WaitTime::timestamp(ts.clone());
    }
    WaitTime::timestamp_path(timestamp_path.clone().unwrap_or_default())
}

fn build_condition(rule: &ChoiceRuleSpec) -> Result<Condition, BeaconError> {
    let variable = rule.variable.as_str();
    match rule.operator.as_str() {
        "string_equals" => Condition::string_equals(variable, expect_string(rule)?),
        "string_less_than" => Condition::string_less_than(variable, expect_string(rule)?),
        "string_greater_than" => Condition::string_greater_than(variable, expect_string(rule)?),
        "string_matches" => Condition::string_matches(variable, expect_string(rule)?),
        "number_equals" => Condition::number_equals(variable, expect_number(rule)?),
        "number_less_than" => Condition::number_less_than(variable, expect_number(rule)?),
        "number_greater_than" => Condition::number_greater_than(variable, expect_number(rule)?),
        "number_greater_than_equals" => {
            Condition::number_greater_than_equals(variable, expect_number(rule)?)
        }
        "boolean_equals" => Condition::boolean_equals(variable, expect_bool(rule)?),
        "timestamp_equals" => Condition::timestamp_equals(variable, expect_string(rule)?),
        "timestamp_less_than" => Condition::timestamp_less_than(variable, expect_string(rule)?),
        "is_null" => Condition::is_null(variable),
        "is_not_null" => Condition::is_not_null(variable),
        "is_present" => Condition::is_present(variable),
        "is_not_present" => Condition::is_not_present(variable),
        "is_numeric" => Condition::is_numeric(variable),
        "is_string" => Condition::is_string(variable),
        "is_boolean" => Condition::is_boolean(variable),
        "is_timestamp" => Condition::is_timestamp(variable),
        other => Err(BeaconError::config(format!(
            "unknown choice operator '{}'",
            other
        ))),
    }
}

fn expect_string(rule: &ChoiceRuleSpec) -> Result<String, BeaconError> {
    match &rule.value {
        Some(Value::String(s)) => Ok(s.clone()),
        _ => Err(BeaconError::config(format!(
            "operator '{}' needs a string value",
            rule.operator
        ))),
    }
}

fn expect_number(rule: &ChoiceRuleSpec) -> Result<f64, BeaconError> {
    match &rule.value {
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| {
            BeaconError::config(format!("operator '{}' needs a finite number", rule.operator))
        }),
        _ => Err(BeaconError::config(format!(
            "operator '{}' needs a numeric value",
            rule.operator
        ))),
    }
}

fn expect_bool(rule: &ChoiceRuleSpec) -> Result<bool, BeaconError> {
    match &rule.value {
        Some(Value::Bool(b)) => Ok(*b),
        _ => Err(BeaconError::config(format!(
            "operator '{}' needs a boolean value",
            rule.operator
        ))),
    }
}
