//! State machine beacon
//!
//! Builds the `aws_sfn_state_machine` resource together with its execution
//! role. The graph is compiled in the constructor so definition errors
//! surface where the machine is declared; the definition and role policy
//! strings are registered as deferred tokens and rendered at synth.

use std::rc::Rc;

use serde_json::{Map, Value};

use crate::aws::compute::chain::Chain;
use crate::aws::compute::graph::StateGraph;
use crate::aws::compute::state::{StateId, States, MAX_NAME_LEN};
use crate::aws::iam::{PolicyDocument, PolicyStatement};
use crate::grid::error::BeaconError;
use crate::grid::spec::Spec;
use crate::grid::token;
use crate::grid::tree::{NodeId, NodeKind, ResourceBlock};

const GRAPH_NAME: &str = "State Machine definition";
const STATES_SERVICE: &str = "states.amazonaws.com";

const LOG_DELIVERY_ACTIONS: &[&str] = &[
    "logs:CreateLogDelivery",
    "logs:GetLogDelivery",
    "logs:UpdateLogDelivery",
    "logs:DeleteLogDelivery",
    "logs:ListLogDeliveries",
    "logs:PutResourcePolicy",
    "logs:DescribeResourcePolicies",
    "logs:DescribeLogGroups",
];

const XRAY_ACTIONS: &[&str] = &[
    "xray:PutTraceSegments",
    "xray:PutTelemetryRecords",
    "xray:GetSamplingRules",
    "xray:GetSamplingTargets",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StateMachineType {
    #[default]
    Standard,
    Express,
}

impl StateMachineType {
    fn as_str(&self) -> &'static str {
        match self {
            StateMachineType::Standard => "STANDARD",
            StateMachineType::Express => "EXPRESS",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Off,
    All,
    #[default]
    Error,
    Fatal,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Off => "OFF",
            LogLevel::All => "ALL",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }
}

/// Execution history logging configuration.
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Log group ARN the execution history is delivered to
    pub destination_arn: String,
    pub level: LogLevel,
    pub include_execution_data: bool,
}

impl LogOptions {
    pub fn new(destination_arn: impl Into<String>) -> Self {
        Self {
            destination_arn: destination_arn.into(),
            level: LogLevel::default(),
            include_execution_data: false,
        }
    }
}

/// The definition of a machine: a states arena plus the entry state.
///
/// Constructing a definition body consumes the arena, so states cannot be
/// shared with a second machine.
#[derive(Debug)]
pub struct DefinitionBody {
    states: States,
    start: StateId,
}

impl DefinitionBody {
    pub fn from_chain(states: States, chain: &Chain) -> Self {
        Self {
            states,
            start: chain.start_state(),
        }
    }

    pub fn from_state(states: States, start: StateId) -> Self {
        Self { states, start }
    }
}

#[derive(Debug)]
pub struct StateMachineProps {
    pub definition: DefinitionBody,
    /// Explicit machine name; conflicts with `name_prefix`
    pub state_machine_name: Option<String>,
    /// Name prefix the engine completes to a unique name
    pub name_prefix: Option<String>,
    pub state_machine_type: StateMachineType,
    /// Machine-level execution timeout, rendered into the definition
    pub timeout_seconds: Option<u32>,
    /// Top-level definition comment
    pub comment: Option<String>,
    /// Existing role to execute as; when unset a role is created and granted
    /// what the graph's tasks declare
    pub role_arn: Option<String>,
    pub logs: Option<LogOptions>,
    pub tracing_enabled: bool,
}

impl StateMachineProps {
    pub fn new(definition: DefinitionBody) -> Self {
        Self {
            definition,
            state_machine_name: None,
            name_prefix: None,
            state_machine_type: StateMachineType::default(),
            timeout_seconds: None,
            comment: None,
            role_arn: None,
            logs: None,
            tracing_enabled: false,
        }
    }
}

/// Machine names: 1-80 characters from the service's allowed set. Unresolved
/// token values pass through.
fn validate_machine_name(name: &str) -> Result<(), BeaconError> {
    if token::is_unresolved(name) {
        return Ok(());
    }
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(BeaconError::invalid_name(
            name,
            format!(
                "state machine names must be between 1 and {} characters",
                MAX_NAME_LEN
            ),
        ));
    }
    const ALLOWED: &str = "+!@.()-=_'";
    if let Some(c) = name
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !ALLOWED.contains(*c))
    {
        return Err(BeaconError::invalid_name(
            name,
            format!(
                "character '{}' is not allowed; use alphanumeric characters or {}",
                c, ALLOWED
            ),
        ));
    }
    Ok(())
}

/// The frozen machine shared by the deferred definition and policy renderers.
struct MachineCore {
    states: States,
    graph: StateGraph,
    comment: Option<String>,
}

#[derive(Debug)]
pub struct StateMachine {
    node: NodeId,
    resource: NodeId,
    role: Option<NodeId>,
    arn: String,
}

impl StateMachine {
    pub fn new(
        spec: &mut Spec,
        parent: NodeId,
        id: &str,
        props: StateMachineProps,
    ) -> Result<Self, BeaconError> {
        let StateMachineProps {
            definition,
            state_machine_name,
            name_prefix,
            state_machine_type,
            timeout_seconds,
            comment,
            role_arn,
            logs,
            tracing_enabled,
        } = props;

        if state_machine_name.is_some() && name_prefix.is_some() {
            return Err(BeaconError::config(
                "cannot specify both state_machine_name and name_prefix",
            ));
        }
        if let Some(name) = &state_machine_name {
            validate_machine_name(name)?;
        }

        let DefinitionBody { mut states, start } = definition;
        let mut graph = StateGraph::build(&mut states, start, GRAPH_NAME)?;
        if let Some(seconds) = timeout_seconds {
            graph = graph.with_timeout(seconds);
        }

        let node = spec.tree_mut().add_child(parent, id, NodeKind::Construct)?;

        let core = Rc::new(MachineCore {
            states,
            graph,
            comment,
        });

        let role_ref = match &role_arn {
            Some(arn) => RoleRef::External(arn.clone()),
            None => Self::create_role(spec, node, &core, logs.is_some(), tracing_enabled)?,
        };

        let definition_core = Rc::clone(&core);
        let definition_token = spec.tokens_mut().defer(move || {
            let mut doc = definition_core
                .graph
                .to_graph_json(&definition_core.states)?;
            if let (Value::Object(map), Some(comment)) = (&mut doc, &definition_core.comment) {
                map.insert("Comment".to_string(), Value::String(comment.clone()));
            }
            Ok(Value::String(doc.to_string()))
        });

        let mut body = Map::new();
        match (&state_machine_name, &name_prefix) {
            (Some(name), _) => {
                body.insert("name".to_string(), Value::String(name.clone()));
            }
            (None, Some(prefix)) => {
                body.insert("name_prefix".to_string(), Value::String(prefix.clone()));
            }
            (None, None) => {
                let path = spec.tree().node(node).path.clone();
                let components: Vec<&str> = path.iter().map(String::as_str).collect();
                let generated =
                    crate::grid::names::make_unique_resource_name(&components, MAX_NAME_LEN, "-");
                body.insert("name".to_string(), Value::String(generated));
            }
        }
        body.insert("role_arn".to_string(), Value::String(role_ref.arn()));
        body.insert("definition".to_string(), Value::String(definition_token));
        body.insert(
            "type".to_string(),
            Value::String(state_machine_type.as_str().to_string()),
        );
        if let Some(logs) = &logs {
            let mut logging = Map::new();
            logging.insert(
                "log_destination".to_string(),
                Value::String(logs.destination_arn.clone()),
            );
            logging.insert(
                "include_execution_data".to_string(),
                Value::Bool(logs.include_execution_data),
            );
            logging.insert(
                "level".to_string(),
                Value::String(logs.level.as_str().to_string()),
            );
            body.insert("logging_configuration".to_string(), Value::Object(logging));
        }
        if tracing_enabled {
            let mut tracing = Map::new();
            tracing.insert("enabled".to_string(), Value::Bool(true));
            body.insert("tracing_configuration".to_string(), Value::Object(tracing));
        }

        let resource = spec.tree_mut().add_child(
            node,
            "Resource",
            NodeKind::Resource(
                ResourceBlock::new("aws_sfn_state_machine")
                    .taggable()
                    .with_body(body),
            ),
        )?;
        let arn = format!(
            "${{aws_sfn_state_machine.{}.arn}}",
            spec.tree().logical_id(resource)
        );

        log::info!(
            "declared state machine '{}' ({} policy statement(s))",
            spec.tree().display_path(node),
            core.graph.policy_statements().len()
        );

        Ok(Self {
            node,
            resource,
            role: role_ref.node(),
            arn,
        })
    }

    /// Create the execution role and, when the graph or the machine options
    /// call for any permissions, its inline policy.
    fn create_role(
        spec: &mut Spec,
        node: NodeId,
        core: &Rc<MachineCore>,
        logs_enabled: bool,
        tracing_enabled: bool,
    ) -> Result<RoleRef, BeaconError> {
        let trust = PolicyDocument::new(vec![PolicyStatement::assume_role(STATES_SERVICE)])
            .to_json_string()?;
        let mut role_body = Map::new();
        role_body.insert("assume_role_policy".to_string(), Value::String(trust));
        let role = spec.tree_mut().add_child(
            node,
            "Role",
            NodeKind::Resource(
                ResourceBlock::new("aws_iam_role")
                    .taggable()
                    .with_body(role_body),
            ),
        )?;
        let role_logical = spec.tree().logical_id(role);

        let mut statements: Vec<PolicyStatement> = core.graph.policy_statements().to_vec();
        if logs_enabled {
            statements.push(PolicyStatement::allow(LOG_DELIVERY_ACTIONS, &["*"]));
        }
        if tracing_enabled {
            statements.push(PolicyStatement::allow(XRAY_ACTIONS, &["*"]));
        }
        if !statements.is_empty() {
            let policy_token = spec
                .tokens_mut()
                .defer(move || Ok(Value::String(PolicyDocument::new(statements.clone()).to_json_string()?)));
            let mut policy_body = Map::new();
            policy_body.insert(
                "role".to_string(),
                Value::String(format!("${{aws_iam_role.{}.name}}", role_logical)),
            );
            policy_body.insert("policy".to_string(), Value::String(policy_token));
            spec.tree_mut().add_child(
                node,
                "RolePolicy",
                NodeKind::Resource(
                    ResourceBlock::new("aws_iam_role_policy").with_body(policy_body),
                ),
            )?;
        }

        Ok(RoleRef::Managed {
            node: role,
            arn: format!("${{aws_iam_role.{}.arn}}", role_logical),
        })
    }

    /// Construct node of the whole beacon.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The `aws_sfn_state_machine` resource node.
    pub fn resource_node(&self) -> NodeId {
        self.resource
    }

    /// The managed execution role, when one was created.
    pub fn role_node(&self) -> Option<NodeId> {
        self.role
    }

    /// Reference expression for the machine ARN.
    pub fn state_machine_arn(&self) -> &str {
        &self.arn
    }
}

enum RoleRef {
    External(String),
    Managed { node: NodeId, arn: String },
}

impl RoleRef {
    fn arn(&self) -> String {
        match self {
            RoleRef::External(arn) => arn.clone(),
            RoleRef::Managed { arn, .. } => arn.clone(),
        }
    }

    fn node(&self) -> Option<NodeId> {
        match self {
            RoleRef::External(_) => None,
            RoleRef::Managed { node, .. } => Some(*node),
        }
    }
}
