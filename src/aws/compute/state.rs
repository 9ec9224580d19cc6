//! Workflow states
//!
//! States live in a `States` arena and are addressed by copyable `StateId`
//! handles; linking mutates the arena explicitly instead of hiding it behind
//! fluent returns. Rendering is a single match over the kind enum, so adding
//! a kind without updating the renderer fails to compile.

use std::collections::HashSet;

use serde_json::{Map, Number, Value};

use crate::aws::compute::condition::Condition;
use crate::aws::compute::fields;
use crate::aws::compute::json_path::{render_json_path, JsonPath};
use crate::aws::iam::PolicyStatement;
use crate::grid::error::{BeaconError, StatesError};
use crate::grid::token;

/// Service limit on state and machine names.
pub const MAX_NAME_LEN: usize = 80;

const ALL_ERRORS: &str = "States.ALL";

/// Handle to a state in a [`States`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateId(pub(crate) usize);

/// State names: 1-80 characters, no control characters. Unresolved token
/// values cannot be checked and pass through.
pub fn validate_state_name(name: &str) -> Result<(), BeaconError> {
    if token::is_unresolved(name) {
        return Ok(());
    }
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(BeaconError::invalid_name(
            name,
            format!("state names must be between 1 and {} characters", MAX_NAME_LEN),
        ));
    }
    if let Some(c) = name.chars().find(|c| c.is_control()) {
        return Err(BeaconError::invalid_name(
            name,
            format!("control character {:?} is not allowed in state names", c),
        ));
    }
    Ok(())
}

/// How long a Wait state waits. Exactly one form per state.
#[derive(Debug, Clone, PartialEq)]
pub enum WaitTime {
    Seconds(u32),
    SecondsPath(String),
    Timestamp(String),
    TimestampPath(String),
}

impl WaitTime {
    pub fn seconds(n: u32) -> Self {
        WaitTime::Seconds(n)
    }

    pub fn seconds_path(path: impl Into<String>) -> Result<Self, BeaconError> {
        let path = path.into();
        if !path.starts_with('$') {
            return Err(StatesError::InvalidJsonPath(path).into());
        }
        Ok(WaitTime::SecondsPath(path))
    }

    /// An RFC 3339 timestamp such as `2026-01-01T00:00:00Z`.
    pub fn timestamp(ts: impl Into<String>) -> Result<Self, BeaconError> {
        let ts = ts.into();
        if chrono::DateTime::parse_from_rfc3339(&ts).is_err() {
            return Err(StatesError::InvalidTimestamp(ts).into());
        }
        Ok(WaitTime::Timestamp(ts))
    }

    pub fn timestamp_path(path: impl Into<String>) -> Result<Self, BeaconError> {
        let path = path.into();
        if !path.starts_with('$') {
            return Err(StatesError::InvalidJsonPath(path).into());
        }
        Ok(WaitTime::TimestampPath(path))
    }
}

#[derive(Debug, Clone, Default)]
pub struct PassProps {
    pub comment: Option<String>,
    pub input_path: Option<JsonPath>,
    pub output_path: Option<JsonPath>,
    pub result_path: Option<JsonPath>,
    /// Literal result injected into the output
    pub result: Option<Value>,
    pub parameters: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskProps {
    pub comment: Option<String>,
    pub input_path: Option<JsonPath>,
    pub output_path: Option<JsonPath>,
    pub result_path: Option<JsonPath>,
    /// Service integration ARN
    pub resource: String,
    pub parameters: Option<Map<String, Value>>,
    pub result_selector: Option<Map<String, Value>>,
    pub timeout_seconds: Option<u32>,
    pub heartbeat_seconds: Option<u32>,
    /// Permissions this task needs; collected per graph with dedup
    pub policy_statements: Vec<PolicyStatement>,
}

#[derive(Debug, Clone, Default)]
pub struct ChoiceProps {
    pub comment: Option<String>,
    pub input_path: Option<JsonPath>,
    pub output_path: Option<JsonPath>,
}

#[derive(Debug, Clone)]
pub struct WaitProps {
    pub time: WaitTime,
    pub comment: Option<String>,
}

impl WaitProps {
    pub fn new(time: WaitTime) -> Self {
        Self {
            time,
            comment: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SucceedProps {
    pub comment: Option<String>,
    pub input_path: Option<JsonPath>,
    pub output_path: Option<JsonPath>,
}

#[derive(Debug, Clone, Default)]
pub struct FailProps {
    pub comment: Option<String>,
    pub error: Option<String>,
    pub error_path: Option<String>,
    pub cause: Option<String>,
    pub cause_path: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ParallelProps {
    pub comment: Option<String>,
    pub input_path: Option<JsonPath>,
    pub output_path: Option<JsonPath>,
    pub result_path: Option<JsonPath>,
    pub result_selector: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default)]
pub struct MapProps {
    pub comment: Option<String>,
    pub input_path: Option<JsonPath>,
    pub output_path: Option<JsonPath>,
    pub result_path: Option<JsonPath>,
    /// Where the array to iterate over lives in the input
    pub items_path: Option<String>,
    pub item_selector: Option<Map<String, Value>>,
    /// Legacy alias for `item_selector`, rendered as `Parameters`
    pub parameters: Option<Map<String, Value>>,
    pub max_concurrency: Option<u32>,
    pub max_concurrency_path: Option<String>,
}

/// Retry rule configuration. Unset fields are omitted from the output.
#[derive(Debug, Clone, Default)]
pub struct RetryProps {
    /// Error patterns; defaults to all errors when empty
    pub errors: Vec<String>,
    pub interval_seconds: Option<u32>,
    pub max_attempts: Option<u32>,
    pub backoff_rate: Option<f64>,
}

/// Catch edge configuration.
#[derive(Debug, Clone, Default)]
pub struct CatchProps {
    /// Error patterns; defaults to all errors when empty
    pub errors: Vec<String>,
    pub result_path: Option<JsonPath>,
}

#[derive(Debug, Clone)]
struct RetrySpec {
    errors: Vec<String>,
    interval_seconds: Option<u32>,
    max_attempts: Option<u32>,
    backoff_rate: Option<f64>,
}

#[derive(Debug, Clone)]
struct CatchSpec {
    errors: Vec<String>,
    result_path: Option<JsonPath>,
    next: StateId,
}

#[derive(Debug, Clone)]
struct ChoiceRule {
    condition: Condition,
    next: StateId,
}

#[derive(Debug, Clone)]
enum StateKind {
    Pass {
        result: Option<Value>,
        parameters: Option<Map<String, Value>>,
    },
    Task {
        resource: String,
        parameters: Option<Map<String, Value>>,
        result_selector: Option<Map<String, Value>>,
        timeout_seconds: Option<u32>,
        heartbeat_seconds: Option<u32>,
        policy_statements: Vec<PolicyStatement>,
    },
    Choice {
        rules: Vec<ChoiceRule>,
        default: Option<StateId>,
    },
    Wait {
        time: WaitTime,
    },
    Succeed,
    Fail {
        error: Option<String>,
        error_path: Option<String>,
        cause: Option<String>,
        cause_path: Option<String>,
    },
    Parallel {
        branches: Vec<StateId>,
        result_selector: Option<Map<String, Value>>,
    },
    Map {
        items_path: Option<String>,
        item_selector: Option<Map<String, Value>>,
        parameters: Option<Map<String, Value>>,
        processor: Option<StateId>,
        legacy_iterator: bool,
        max_concurrency: Option<u32>,
        max_concurrency_path: Option<String>,
    },
    Custom {
        template: Map<String, Value>,
    },
}

/// Which graph region discovered a state.
#[derive(Debug, Clone)]
struct Claim {
    generation: usize,
    region: usize,
    display: String,
}

#[derive(Debug)]
struct StateNode {
    name: String,
    comment: Option<String>,
    input_path: Option<JsonPath>,
    output_path: Option<JsonPath>,
    result_path: Option<JsonPath>,
    kind: StateKind,
    next: Option<StateId>,
    retries: Vec<RetrySpec>,
    catches: Vec<CatchSpec>,
    claim: Option<Claim>,
}

/// Arena holding every state of one machine definition.
#[derive(Debug, Default)]
pub struct States {
    nodes: Vec<StateNode>,
    generations: usize,
}

impl States {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(
        &mut self,
        name: &str,
        comment: Option<String>,
        input_path: Option<JsonPath>,
        output_path: Option<JsonPath>,
        result_path: Option<JsonPath>,
        kind: StateKind,
    ) -> Result<StateId, BeaconError> {
        validate_state_name(name)?;
        let id = StateId(self.nodes.len());
        self.nodes.push(StateNode {
            name: name.to_string(),
            comment,
            input_path,
            output_path,
            result_path,
            kind,
            next: None,
            retries: Vec::new(),
            catches: Vec::new(),
            claim: None,
        });
        Ok(id)
    }

    pub fn pass(&mut self, name: &str, props: PassProps) -> Result<StateId, BeaconError> {
        self.add(
            name,
            props.comment,
            props.input_path,
            props.output_path,
            props.result_path,
            StateKind::Pass {
                result: props.result,
                parameters: props.parameters,
            },
        )
    }

    pub fn task(&mut self, name: &str, props: TaskProps) -> Result<StateId, BeaconError> {
        if props.resource.is_empty() {
            return Err(StatesError::InvalidDefinition(format!(
                "Task state '{}' needs a resource",
                name
            ))
            .into());
        }
        self.add(
            name,
            props.comment,
            props.input_path,
            props.output_path,
            props.result_path,
            StateKind::Task {
                resource: props.resource,
                parameters: props.parameters,
                result_selector: props.result_selector,
                timeout_seconds: props.timeout_seconds,
                heartbeat_seconds: props.heartbeat_seconds,
                policy_statements: props.policy_statements,
            },
        )
    }

    pub fn choice(&mut self, name: &str, props: ChoiceProps) -> Result<StateId, BeaconError> {
        self.add(
            name,
            props.comment,
            props.input_path,
            props.output_path,
            None,
            StateKind::Choice {
                rules: Vec::new(),
                default: None,
            },
        )
    }

    pub fn wait(&mut self, name: &str, props: WaitProps) -> Result<StateId, BeaconError> {
        self.add(
            name,
            props.comment,
            None,
            None,
            None,
            StateKind::Wait { time: props.time },
        )
    }

    pub fn succeed(&mut self, name: &str, props: SucceedProps) -> Result<StateId, BeaconError> {
        self.add(
            name,
            props.comment,
            props.input_path,
            props.output_path,
            None,
            StateKind::Succeed,
        )
    }

    pub fn fail(&mut self, name: &str, props: FailProps) -> Result<StateId, BeaconError> {
        if props.error.is_some() && props.error_path.is_some() {
            return Err(StatesError::InvalidDefinition(format!(
                "Fail state '{}' cannot set both error and error_path",
                name
            ))
            .into());
        }
        if props.cause.is_some() && props.cause_path.is_some() {
            return Err(StatesError::InvalidDefinition(format!(
                "Fail state '{}' cannot set both cause and cause_path",
                name
            ))
            .into());
        }
        self.add(
            name,
            props.comment,
            None,
            None,
            None,
            StateKind::Fail {
                error: props.error,
                error_path: props.error_path,
                cause: props.cause,
                cause_path: props.cause_path,
            },
        )
    }

    pub fn parallel(&mut self, name: &str, props: ParallelProps) -> Result<StateId, BeaconError> {
        self.add(
            name,
            props.comment,
            props.input_path,
            props.output_path,
            props.result_path,
            StateKind::Parallel {
                branches: Vec::new(),
                result_selector: props.result_selector,
            },
        )
    }

    pub fn map(&mut self, name: &str, props: MapProps) -> Result<StateId, BeaconError> {
        if props.max_concurrency.is_some() && props.max_concurrency_path.is_some() {
            return Err(StatesError::InvalidDefinition(format!(
                "Map state '{}' cannot set both max_concurrency and max_concurrency_path",
                name
            ))
            .into());
        }
        if let Some(path) = &props.items_path {
            if !path.starts_with('$') {
                return Err(StatesError::InvalidJsonPath(path.clone()).into());
            }
        }
        self.add(
            name,
            props.comment,
            props.input_path,
            props.output_path,
            props.result_path,
            StateKind::Map {
                items_path: props.items_path,
                item_selector: props.item_selector,
                parameters: props.parameters,
                processor: None,
                legacy_iterator: false,
                max_concurrency: props.max_concurrency,
                max_concurrency_path: props.max_concurrency_path,
            },
        )
    }

    /// A state defined by raw ASL JSON, merged with chain-added transitions.
    pub fn custom(&mut self, name: &str, template: Map<String, Value>) -> Result<StateId, BeaconError> {
        self.add(name, None, None, None, None, StateKind::Custom { template })
    }

    pub fn name(&self, state: StateId) -> &str {
        &self.nodes[state.0].name
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn kind_name(&self, state: StateId) -> &'static str {
        match self.nodes[state.0].kind {
            StateKind::Pass { .. } => "Pass",
            StateKind::Task { .. } => "Task",
            StateKind::Choice { .. } => "Choice",
            StateKind::Wait { .. } => "Wait",
            StateKind::Succeed => "Succeed",
            StateKind::Fail { .. } => "Fail",
            StateKind::Parallel { .. } => "Parallel",
            StateKind::Map { .. } => "Map",
            StateKind::Custom { .. } => "Custom",
        }
    }

    pub(crate) fn is_terminal(&self, state: StateId) -> bool {
        matches!(
            self.nodes[state.0].kind,
            StateKind::Succeed | StateKind::Fail { .. }
        )
    }

    pub(crate) fn is_choice(&self, state: StateId) -> bool {
        matches!(self.nodes[state.0].kind, StateKind::Choice { .. })
    }

    pub(crate) fn next_of(&self, state: StateId) -> Option<StateId> {
        self.nodes[state.0].next
    }

    pub(crate) fn catch_targets(&self, state: StateId) -> Vec<StateId> {
        self.nodes[state.0].catches.iter().map(|c| c.next).collect()
    }

    pub(crate) fn choice_targets(&self, state: StateId) -> (Vec<StateId>, Option<StateId>) {
        match &self.nodes[state.0].kind {
            StateKind::Choice { rules, default } => {
                (rules.iter().map(|r| r.next).collect(), *default)
            }
            _ => (Vec::new(), None),
        }
    }

    pub(crate) fn branches_of(&self, state: StateId) -> Vec<StateId> {
        match &self.nodes[state.0].kind {
            StateKind::Parallel { branches, .. } => branches.clone(),
            _ => Vec::new(),
        }
    }

    pub(crate) fn processor_of(&self, state: StateId) -> Option<StateId> {
        match &self.nodes[state.0].kind {
            StateKind::Map { processor, .. } => *processor,
            _ => None,
        }
    }

    pub(crate) fn policy_statements_of(&self, state: StateId) -> &[PolicyStatement] {
        match &self.nodes[state.0].kind {
            StateKind::Task {
                policy_statements, ..
            } => policy_statements,
            _ => &[],
        }
    }

    /// Record the default transition of `from`.
    pub fn set_next(&mut self, from: StateId, to: StateId) -> Result<(), BeaconError> {
        let name = self.nodes[from.0].name.clone();
        match self.nodes[from.0].kind {
            StateKind::Succeed => {
                return Err(StatesError::TerminalState {
                    name,
                    kind: "Succeed",
                }
                .into())
            }
            StateKind::Fail { .. } => {
                return Err(StatesError::TerminalState { name, kind: "Fail" }.into())
            }
            StateKind::Choice { .. } => {
                return Err(StatesError::ChoiceHasNoNext { name }.into())
            }
            _ => {}
        }
        if self.nodes[from.0].next.is_some() {
            return Err(StatesError::NextAlreadySet { name }.into());
        }
        self.nodes[from.0].next = Some(to);
        Ok(())
    }

    fn supports_retry_catch(&self, state: StateId) -> bool {
        matches!(
            self.nodes[state.0].kind,
            StateKind::Task { .. }
                | StateKind::Parallel { .. }
                | StateKind::Map { .. }
                | StateKind::Custom { .. }
        )
    }

    /// Append a retry rule. Rules keep their declaration order; the service
    /// evaluates the rendered array front to back.
    pub fn add_retry(&mut self, state: StateId, props: RetryProps) -> Result<(), BeaconError> {
        if !self.supports_retry_catch(state) {
            return Err(StatesError::RetryNotSupported {
                name: self.nodes[state.0].name.clone(),
                kind: self.kind_name(state),
            }
            .into());
        }
        if let Some(rate) = props.backoff_rate {
            if !rate.is_finite() {
                return Err(StatesError::InvalidDefinition(format!(
                    "backoff_rate must be finite, got {}",
                    rate
                ))
                .into());
            }
        }
        let errors = if props.errors.is_empty() {
            vec![ALL_ERRORS.to_string()]
        } else {
            props.errors
        };
        self.nodes[state.0].retries.push(RetrySpec {
            errors,
            interval_seconds: props.interval_seconds,
            max_attempts: props.max_attempts,
            backoff_rate: props.backoff_rate,
        });
        Ok(())
    }

    /// Append a catch edge to `handler`. Edges keep their declaration order.
    pub fn add_catch(
        &mut self,
        state: StateId,
        handler: StateId,
        props: CatchProps,
    ) -> Result<(), BeaconError> {
        if !self.supports_retry_catch(state) {
            return Err(StatesError::CatchNotSupported {
                name: self.nodes[state.0].name.clone(),
                kind: self.kind_name(state),
            }
            .into());
        }
        let errors = if props.errors.is_empty() {
            vec![ALL_ERRORS.to_string()]
        } else {
            props.errors
        };
        self.nodes[state.0].catches.push(CatchSpec {
            errors,
            result_path: props.result_path,
            next: handler,
        });
        Ok(())
    }

    /// Append a Choice rule: when `condition` holds, go to `next`.
    pub fn when(
        &mut self,
        choice: StateId,
        condition: Condition,
        next: StateId,
    ) -> Result<(), BeaconError> {
        let name = self.nodes[choice.0].name.clone();
        match &mut self.nodes[choice.0].kind {
            StateKind::Choice { rules, .. } => {
                rules.push(ChoiceRule { condition, next });
                Ok(())
            }
            _ => Err(StatesError::InvalidDefinition(format!(
                "when() is only valid on a Choice state, '{}' is a {}",
                name,
                self.kind_name(choice)
            ))
            .into()),
        }
    }

    /// Set the Choice default transition.
    pub fn otherwise(&mut self, choice: StateId, target: StateId) -> Result<(), BeaconError> {
        let name = self.nodes[choice.0].name.clone();
        match &mut self.nodes[choice.0].kind {
            StateKind::Choice { default, .. } => {
                if default.is_some() {
                    return Err(StatesError::DefaultAlreadySet { name }.into());
                }
                *default = Some(target);
                Ok(())
            }
            _ => Err(StatesError::InvalidDefinition(format!(
                "otherwise() is only valid on a Choice state, '{}' is a {}",
                name,
                self.kind_name(choice)
            ))
            .into()),
        }
    }

    /// Add a parallel branch starting at `start`.
    pub fn branch(&mut self, parallel: StateId, start: StateId) -> Result<(), BeaconError> {
        let name = self.nodes[parallel.0].name.clone();
        match &mut self.nodes[parallel.0].kind {
            StateKind::Parallel { branches, .. } => {
                branches.push(start);
                Ok(())
            }
            _ => Err(StatesError::InvalidDefinition(format!(
                "branch() is only valid on a Parallel state, '{}' is a {}",
                name,
                self.kind_name(parallel)
            ))
            .into()),
        }
    }

    /// Set the Map item processor, rendered under `ItemProcessor`.
    pub fn item_processor(&mut self, map: StateId, start: StateId) -> Result<(), BeaconError> {
        self.set_processor(map, start, false)
    }

    /// Set the Map item processor, rendered under the legacy `Iterator` key.
    pub fn iterator(&mut self, map: StateId, start: StateId) -> Result<(), BeaconError> {
        self.set_processor(map, start, true)
    }

    fn set_processor(
        &mut self,
        map: StateId,
        start: StateId,
        legacy: bool,
    ) -> Result<(), BeaconError> {
        let name = self.nodes[map.0].name.clone();
        match &mut self.nodes[map.0].kind {
            StateKind::Map {
                processor,
                legacy_iterator,
                ..
            } => {
                if processor.is_some() {
                    return Err(StatesError::InvalidDefinition(format!(
                        "Map state '{}' already has an item processor",
                        name
                    ))
                    .into());
                }
                *processor = Some(start);
                *legacy_iterator = legacy;
                Ok(())
            }
            _ => Err(StatesError::InvalidDefinition(format!(
                "item_processor() is only valid on a Map state, '{}' is a {}",
                name,
                self.kind_name(map)
            ))
            .into()),
        }
    }

    /// Every state reachable from `start` through any edge, in deterministic
    /// discovery order. Descends into Parallel branches and Map processors.
    pub(crate) fn reachable_from(&self, start: StateId) -> Vec<StateId> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = std::collections::VecDeque::new();
        queue.push_back(start);
        seen.insert(start);
        while let Some(id) = queue.pop_front() {
            order.push(id);
            for target in self.all_targets(id) {
                if seen.insert(target) {
                    queue.push_back(target);
                }
            }
        }
        order
    }

    fn all_targets(&self, id: StateId) -> Vec<StateId> {
        let mut targets = Vec::new();
        if let Some(next) = self.next_of(id) {
            targets.push(next);
        }
        targets.extend(self.catch_targets(id));
        let (rule_targets, default) = self.choice_targets(id);
        targets.extend(rule_targets);
        if let Some(default) = default {
            targets.push(default);
        }
        targets.extend(self.branches_of(id));
        if let Some(processor) = self.processor_of(id) {
            targets.push(processor);
        }
        targets
    }

    /// Prepend `prefix` to the name of every state reachable from `start`.
    pub fn prefix_states(&mut self, start: StateId, prefix: &str) -> Result<(), BeaconError> {
        for id in self.reachable_from(start) {
            let renamed = format!("{}{}", prefix, self.nodes[id.0].name);
            validate_state_name(&renamed)?;
            self.nodes[id.0].name = renamed;
        }
        Ok(())
    }

    /// Wrap the fragment starting at `start` into a single Parallel state
    /// with one branch.
    pub fn to_single_state(
        &mut self,
        start: StateId,
        name: &str,
        props: ParallelProps,
    ) -> Result<StateId, BeaconError> {
        let wrapper = self.parallel(name, props)?;
        self.branch(wrapper, start)?;
        Ok(wrapper)
    }

    pub(crate) fn new_generation(&mut self) -> usize {
        self.generations += 1;
        self.generations
    }

    /// Claim a state for one region of one graph. Returns true when the
    /// state was already claimed by that same region (a loop).
    pub(crate) fn claim(
        &mut self,
        state: StateId,
        generation: usize,
        region: usize,
        display: &str,
    ) -> Result<bool, BeaconError> {
        match &self.nodes[state.0].claim {
            Some(claim) if claim.generation == generation && claim.region == region => Ok(true),
            Some(claim) => Err(StatesError::StateInMultipleGraphs {
                name: self.nodes[state.0].name.clone(),
                graph: display.to_string(),
                other: claim.display.clone(),
            }
            .into()),
            None => {
                self.nodes[state.0].claim = Some(Claim {
                    generation,
                    region,
                    display: display.to_string(),
                });
                Ok(false)
            }
        }
    }

    /// Render one state to its ASL JSON object. `render_sub` renders the
    /// sub-machine document rooted at a Parallel branch or Map processor.
    pub(crate) fn render_state(
        &self,
        id: StateId,
        render_sub: &dyn Fn(StateId) -> Result<Value, BeaconError>,
    ) -> Result<Value, BeaconError> {
        let node = &self.nodes[id.0];
        let mut map = Map::new();

        if let StateKind::Custom { template } = &node.kind {
            self.render_next_end(node, &mut map);
            for (key, value) in template {
                map.insert(key.clone(), value.clone());
            }
            if !node.retries.is_empty() {
                map.insert("Retry".to_string(), self.render_retries(node));
            }
            if !node.catches.is_empty() {
                map.insert("Catch".to_string(), self.render_catches(node)?);
            }
            return Ok(Value::Object(map));
        }

        map.insert(
            "Type".to_string(),
            Value::String(self.kind_name(id).to_string()),
        );
        if let Some(comment) = &node.comment {
            map.insert("Comment".to_string(), Value::String(comment.clone()));
        }
        if let Some(path) = render_json_path(node.input_path.as_ref()) {
            map.insert("InputPath".to_string(), path);
        }
        if let Some(path) = render_json_path(node.output_path.as_ref()) {
            map.insert("OutputPath".to_string(), path);
        }
        if let Some(path) = render_json_path(node.result_path.as_ref()) {
            map.insert("ResultPath".to_string(), path);
        }
        self.render_next_end(node, &mut map);
        if !node.retries.is_empty() {
            map.insert("Retry".to_string(), self.render_retries(node));
        }
        if !node.catches.is_empty() {
            map.insert("Catch".to_string(), self.render_catches(node)?);
        }

        match &node.kind {
            StateKind::Pass { result, parameters } => {
                if let Some(result) = result {
                    map.insert("Result".to_string(), result.clone());
                }
                if let Some(parameters) = parameters {
                    map.insert(
                        "Parameters".to_string(),
                        Value::Object(fields::render_object(parameters)),
                    );
                }
            }
            StateKind::Task {
                resource,
                parameters,
                result_selector,
                timeout_seconds,
                heartbeat_seconds,
                ..
            } => {
                map.insert("Resource".to_string(), Value::String(resource.clone()));
                if let Some(parameters) = parameters {
                    map.insert(
                        "Parameters".to_string(),
                        Value::Object(fields::render_object(parameters)),
                    );
                }
                if let Some(selector) = result_selector {
                    map.insert(
                        "ResultSelector".to_string(),
                        Value::Object(fields::render_object(selector)),
                    );
                }
                if let Some(seconds) = timeout_seconds {
                    map.insert("TimeoutSeconds".to_string(), Value::Number((*seconds).into()));
                }
                if let Some(seconds) = heartbeat_seconds {
                    map.insert(
                        "HeartbeatSeconds".to_string(),
                        Value::Number((*seconds).into()),
                    );
                }
            }
            StateKind::Choice { rules, default } => {
                let mut rendered = Vec::with_capacity(rules.len());
                for rule in rules {
                    let mut rule_map = match rule.condition.render() {
                        Value::Object(m) => m,
                        other => {
                            return Err(StatesError::InvalidDefinition(format!(
                                "condition rendered to a non-object: {}",
                                other
                            ))
                            .into())
                        }
                    };
                    rule_map.insert(
                        "Next".to_string(),
                        Value::String(self.nodes[rule.next.0].name.clone()),
                    );
                    rendered.push(Value::Object(rule_map));
                }
                map.insert("Choices".to_string(), Value::Array(rendered));
                if let Some(default) = default {
                    map.insert(
                        "Default".to_string(),
                        Value::String(self.nodes[default.0].name.clone()),
                    );
                }
            }
            StateKind::Wait { time } => match time {
                WaitTime::Seconds(n) => {
                    map.insert("Seconds".to_string(), Value::Number((*n).into()));
                }
                WaitTime::SecondsPath(path) => {
                    map.insert("SecondsPath".to_string(), Value::String(path.clone()));
                }
                WaitTime::Timestamp(ts) => {
                    map.insert("Timestamp".to_string(), Value::String(ts.clone()));
                }
                WaitTime::TimestampPath(path) => {
                    map.insert("TimestampPath".to_string(), Value::String(path.clone()));
                }
            },
            StateKind::Succeed => {}
            StateKind::Fail {
                error,
                error_path,
                cause,
                cause_path,
            } => {
                if let Some(error) = error {
                    map.insert("Error".to_string(), Value::String(error.clone()));
                }
                if let Some(path) = error_path {
                    map.insert("ErrorPath".to_string(), Value::String(path.clone()));
                }
                if let Some(cause) = cause {
                    map.insert("Cause".to_string(), Value::String(cause.clone()));
                }
                if let Some(path) = cause_path {
                    map.insert("CausePath".to_string(), Value::String(path.clone()));
                }
            }
            StateKind::Parallel {
                branches,
                result_selector,
            } => {
                if branches.is_empty() {
                    return Err(StatesError::InvalidDefinition(format!(
                        "Parallel state '{}' must have at least one branch",
                        node.name
                    ))
                    .into());
                }
                let mut rendered = Vec::with_capacity(branches.len());
                for branch in branches {
                    rendered.push(render_sub(*branch)?);
                }
                map.insert("Branches".to_string(), Value::Array(rendered));
                if let Some(selector) = result_selector {
                    map.insert(
                        "ResultSelector".to_string(),
                        Value::Object(fields::render_object(selector)),
                    );
                }
            }
            StateKind::Map {
                items_path,
                item_selector,
                parameters,
                processor,
                legacy_iterator,
                max_concurrency,
                max_concurrency_path,
            } => {
                let processor = processor.ok_or_else(|| {
                    BeaconError::from(StatesError::InvalidDefinition(format!(
                        "Map state '{}' must have an item processor",
                        node.name
                    )))
                })?;
                let key = if *legacy_iterator {
                    "Iterator"
                } else {
                    "ItemProcessor"
                };
                map.insert(key.to_string(), render_sub(processor)?);
                if let Some(path) = items_path {
                    map.insert("ItemsPath".to_string(), Value::String(path.clone()));
                }
                if let Some(selector) = item_selector {
                    map.insert(
                        "ItemSelector".to_string(),
                        Value::Object(fields::render_object(selector)),
                    );
                }
                if let Some(parameters) = parameters {
                    map.insert(
                        "Parameters".to_string(),
                        Value::Object(fields::render_object(parameters)),
                    );
                }
                if let Some(n) = max_concurrency {
                    map.insert("MaxConcurrency".to_string(), Value::Number((*n).into()));
                }
                if let Some(path) = max_concurrency_path {
                    map.insert(
                        "MaxConcurrencyPath".to_string(),
                        Value::String(path.clone()),
                    );
                }
            }
            StateKind::Custom { .. } => unreachable!("handled above"),
        }

        Ok(Value::Object(map))
    }

    fn render_next_end(&self, node: &StateNode, map: &mut Map<String, Value>) {
        if let Some(next) = node.next {
            map.insert(
                "Next".to_string(),
                Value::String(self.nodes[next.0].name.clone()),
            );
            return;
        }
        let endable = !matches!(
            node.kind,
            StateKind::Succeed | StateKind::Fail { .. } | StateKind::Choice { .. }
        );
        if endable {
            map.insert("End".to_string(), Value::Bool(true));
        }
    }

    fn render_retries(&self, node: &StateNode) -> Value {
        let rendered = node
            .retries
            .iter()
            .map(|retry| {
                let mut map = Map::new();
                map.insert(
                    "ErrorEquals".to_string(),
                    Value::Array(
                        retry
                            .errors
                            .iter()
                            .map(|e| Value::String(e.clone()))
                            .collect(),
                    ),
                );
                if let Some(seconds) = retry.interval_seconds {
                    map.insert("IntervalSeconds".to_string(), Value::Number(seconds.into()));
                }
                if let Some(attempts) = retry.max_attempts {
                    map.insert("MaxAttempts".to_string(), Value::Number(attempts.into()));
                }
                if let Some(rate) = retry.backoff_rate {
                    if let Some(number) = Number::from_f64(rate) {
                        map.insert("BackoffRate".to_string(), Value::Number(number));
                    }
                }
                Value::Object(map)
            })
            .collect();
        Value::Array(rendered)
    }

    fn render_catches(&self, node: &StateNode) -> Result<Value, BeaconError> {
        let mut rendered = Vec::with_capacity(node.catches.len());
        for catch in &node.catches {
            let mut map = Map::new();
            map.insert(
                "ErrorEquals".to_string(),
                Value::Array(
                    catch
                        .errors
                        .iter()
                        .map(|e| Value::String(e.clone()))
                        .collect(),
                ),
            );
            map.insert(
                "Next".to_string(),
                Value::String(self.nodes[catch.next.0].name.clone()),
            );
            if let Some(path) = render_json_path(catch.result_path.as_ref()) {
                map.insert("ResultPath".to_string(), path);
            }
            rendered.push(Value::Object(map));
        }
        Ok(Value::Array(rendered))
    }
}
