//! Integration tests for state machine synthesis
//!
//! These tests verify the full pipeline: state graphs compiled to ASL
//! definitions, beacons wired into the construct tree, dependency
//! propagation, and the final resource manifest.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use serde_json::{json, Value};

use beacons_rs::aws::compute::condition::Condition;
use beacons_rs::aws::compute::json_path::JsonPath;
use beacons_rs::aws::compute::loader::WorkflowLoader;
use beacons_rs::aws::compute::machine::{DefinitionBody, StateMachine, StateMachineProps};
use beacons_rs::aws::compute::state::{
    CatchProps, ChoiceProps, FailProps, ParallelProps, PassProps, States, SucceedProps, TaskProps,
};
use beacons_rs::aws::iam::PolicyStatement;
use beacons_rs::grid::spec::{Spec, SpecProps};
use beacons_rs::grid::token;
use beacons_rs::grid::tree::{NodeKind, ResourceBlock};

// ============================================================================
// Fixtures
// ============================================================================

fn test_spec(environment: &str) -> Spec {
    let mut tags = BTreeMap::new();
    tags.insert("team".to_string(), "fulfillment".to_string());
    Spec::new(
        "TestSpec",
        SpecProps {
            environment_name: environment.to_string(),
            grid_uuid: Some("11111111-2222-3333-4444-555555555555".to_string()),
            tags,
        },
    )
}

/// Validate -> Check -> (Ship -> Done | Reject), with a catch-all handler
/// on Validate that records the failure and rejects.
fn order_definition() -> DefinitionBody {
    let mut states = States::new();
    let validate = states
        .task(
            "Validate",
            TaskProps {
                resource: "arn:aws:states:::lambda:invoke".into(),
                parameters: Some(as_object(json!({
                    "FunctionName": "validate-order",
                    "Payload": "$.order"
                }))),
                policy_statements: vec![PolicyStatement::allow(
                    &["lambda:InvokeFunction"],
                    &["arn:aws:lambda:us-east-1:123456789012:function:validate-order"],
                )],
                ..Default::default()
            },
        )
        .unwrap();
    let check = states.choice("Check", ChoiceProps::default()).unwrap();
    let ship = states
        .task(
            "Ship",
            TaskProps {
                resource: "arn:aws:states:::sns:publish".into(),
                policy_statements: vec![PolicyStatement::allow(
                    &["sns:Publish"],
                    &["arn:aws:sns:us-east-1:123456789012:shipments"],
                )],
                ..Default::default()
            },
        )
        .unwrap();
    let done = states.succeed("Done", SucceedProps::default()).unwrap();
    let reject = states
        .fail(
            "Reject",
            FailProps {
                error: Some("InvalidOrder".into()),
                ..Default::default()
            },
        )
        .unwrap();
    let record = states.pass("RecordFailure", PassProps::default()).unwrap();

    states.set_next(validate, check).unwrap();
    states
        .add_catch(
            validate,
            record,
            CatchProps {
                result_path: Some(JsonPath::path("$.error").unwrap()),
                ..Default::default()
            },
        )
        .unwrap();
    states
        .when(check, Condition::boolean_equals("$.valid", true).unwrap(), ship)
        .unwrap();
    states.otherwise(check, reject).unwrap();
    states.set_next(ship, done).unwrap();
    states.set_next(record, reject).unwrap();

    DefinitionBody::from_state(states, validate)
}

static EXPECTED_ORDER_DEFINITION: Lazy<Value> = Lazy::new(|| {
    json!({
        "StartAt": "Validate",
        "States": {
            "Validate": {
                "Type": "Task",
                "Resource": "arn:aws:states:::lambda:invoke",
                "Parameters": {
                    "FunctionName": "validate-order",
                    "Payload.$": "$.order"
                },
                "Catch": [{
                    "ErrorEquals": ["States.ALL"],
                    "Next": "RecordFailure",
                    "ResultPath": "$.error"
                }],
                "Next": "Check"
            },
            "Check": {
                "Type": "Choice",
                "Choices": [
                    { "Variable": "$.valid", "BooleanEquals": true, "Next": "Ship" }
                ],
                "Default": "Reject"
            },
            "Ship": {
                "Type": "Task",
                "Resource": "arn:aws:states:::sns:publish",
                "Next": "Done"
            },
            "Done": { "Type": "Succeed" },
            "Reject": { "Type": "Fail", "Error": "InvalidOrder" },
            "RecordFailure": { "Type": "Pass", "Next": "Reject" }
        }
    })
});

fn as_object(value: Value) -> serde_json::Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {}", other),
    }
}

fn parse_embedded_json(value: &Value) -> Value {
    serde_json::from_str(value.as_str().expect("expected a JSON string")).unwrap()
}

// ============================================================================
// State machine synthesis
// ============================================================================

#[test]
fn test_machine_definition_rendered_into_manifest() {
    let mut spec = test_spec("Production");
    let root = spec.root();
    let mut props = StateMachineProps::new(order_definition());
    props.state_machine_name = Some("orders-machine".to_string());
    let machine = StateMachine::new(&mut spec, root, "Orders", props).unwrap();
    let machine_logical = spec.tree().logical_id(machine.resource_node());

    let manifest = spec.synth().unwrap();
    let body = &manifest["resource"]["aws_sfn_state_machine"][&machine_logical];
    assert_eq!(body["name"], "orders-machine");
    assert_eq!(body["type"], "STANDARD");
    assert_eq!(
        parse_embedded_json(&body["definition"]),
        *EXPECTED_ORDER_DEFINITION
    );
}

#[test]
fn test_definition_stays_deferred_until_synth() {
    let mut spec = test_spec("Production");
    let root = spec.root();
    let machine = StateMachine::new(
        &mut spec,
        root,
        "Orders",
        StateMachineProps::new(order_definition()),
    )
    .unwrap();

    let body = &spec
        .tree()
        .resource(machine.resource_node())
        .unwrap()
        .body;
    let placeholder = body["definition"].as_str().unwrap();
    assert!(token::is_unresolved(placeholder));

    let manifest = spec.synth().unwrap();
    let logical = spec.tree().logical_id(machine.resource_node());
    let rendered = manifest["resource"]["aws_sfn_state_machine"][&logical]["definition"]
        .as_str()
        .unwrap();
    assert!(!token::is_unresolved(rendered));
}

#[test]
fn test_execution_role_granted_task_permissions_in_discovery_order() {
    let mut spec = test_spec("Production");
    let root = spec.root();
    let machine = StateMachine::new(
        &mut spec,
        root,
        "Orders",
        StateMachineProps::new(order_definition()),
    )
    .unwrap();
    let role_logical = spec.tree().logical_id(machine.role_node().unwrap());

    let manifest = spec.synth().unwrap();
    let role = &manifest["resource"]["aws_iam_role"][&role_logical];
    let trust = parse_embedded_json(&role["assume_role_policy"]);
    assert_eq!(
        trust["Statement"][0]["Principal"]["Service"],
        "states.amazonaws.com"
    );

    let policies = manifest["resource"]["aws_iam_role_policy"]
        .as_object()
        .unwrap();
    assert_eq!(policies.len(), 1);
    let policy = policies.values().next().unwrap();
    assert_eq!(
        policy["role"],
        format!("${{aws_iam_role.{}.name}}", role_logical)
    );
    let doc = parse_embedded_json(&policy["policy"]);
    assert_eq!(doc["Version"], "2012-10-17");
    let statements = doc["Statement"].as_array().unwrap();
    assert_eq!(statements.len(), 2);
    assert_eq!(statements[0]["Action"], "lambda:InvokeFunction");
    assert_eq!(statements[1]["Action"], "sns:Publish");
}

#[test]
fn test_machine_and_role_carry_grid_tags() {
    let mut spec = test_spec("Production");
    let root = spec.root();
    let machine = StateMachine::new(
        &mut spec,
        root,
        "Orders",
        StateMachineProps::new(order_definition()),
    )
    .unwrap();
    let machine_logical = spec.tree().logical_id(machine.resource_node());
    let role_logical = spec.tree().logical_id(machine.role_node().unwrap());

    let manifest = spec.synth().unwrap();
    for body in [
        &manifest["resource"]["aws_sfn_state_machine"][&machine_logical],
        &manifest["resource"]["aws_iam_role"][&role_logical],
    ] {
        assert_eq!(body["tags"]["grid:EnvironmentName"], "Production");
        assert_eq!(
            body["tags"]["grid:UUID"],
            "11111111-2222-3333-4444-555555555555"
        );
        assert_eq!(body["tags"]["team"], "fulfillment");
    }
}

#[test]
fn test_parallel_branches_survive_full_synthesis() {
    let mut states = States::new();
    let fanout = states.parallel("FanOut", ParallelProps::default()).unwrap();
    let left = states.pass("Left", PassProps::default()).unwrap();
    let right = states.pass("Right", PassProps::default()).unwrap();
    states.branch(fanout, left).unwrap();
    states.branch(fanout, right).unwrap();

    let mut spec = test_spec("Production");
    let root = spec.root();
    let machine = StateMachine::new(
        &mut spec,
        root,
        "FanOut",
        StateMachineProps::new(DefinitionBody::from_state(states, fanout)),
    )
    .unwrap();
    let logical = spec.tree().logical_id(machine.resource_node());

    let manifest = spec.synth().unwrap();
    let definition = parse_embedded_json(
        &manifest["resource"]["aws_sfn_state_machine"][&logical]["definition"],
    );
    let branches = definition["States"]["FanOut"]["Branches"]
        .as_array()
        .unwrap();
    assert_eq!(branches.len(), 2);
    assert_eq!(branches[0]["StartAt"], "Left");
    assert_eq!(branches[1]["StartAt"], "Right");
}

// ============================================================================
// Dependency propagation
// ============================================================================

#[test]
fn test_composite_dependency_reaches_every_machine_resource() {
    let mut spec = test_spec("Production");
    let root = spec.root();

    let database = spec
        .tree_mut()
        .add_child(root, "Database", NodeKind::Construct)
        .unwrap();
    let table = spec
        .tree_mut()
        .add_child(
            database,
            "Table",
            NodeKind::Resource(ResourceBlock::new("aws_dynamodb_table").taggable()),
        )
        .unwrap();
    let replica = spec
        .tree_mut()
        .add_child(
            database,
            "Replica",
            NodeKind::Resource(ResourceBlock::new("aws_dynamodb_table")),
        )
        .unwrap();

    let machine = StateMachine::new(
        &mut spec,
        root,
        "Orders",
        StateMachineProps::new(order_definition()),
    )
    .unwrap();
    spec.tree_mut().add_dependency(machine.node(), database);

    let table_addr = spec.tree().address(table).unwrap();
    let replica_addr = spec.tree().address(replica).unwrap();
    let machine_logical = spec.tree().logical_id(machine.resource_node());
    let role_logical = spec.tree().logical_id(machine.role_node().unwrap());

    let manifest = spec.synth().unwrap();
    let expected = json!([table_addr, replica_addr]);
    assert_eq!(
        manifest["resource"]["aws_sfn_state_machine"][&machine_logical]["depends_on"],
        expected
    );
    assert_eq!(
        manifest["resource"]["aws_iam_role"][&role_logical]["depends_on"],
        expected
    );
}

#[test]
fn test_sibling_without_dependency_stays_clean() {
    let mut spec = test_spec("Production");
    let root = spec.root();

    let database = spec
        .tree_mut()
        .add_child(root, "Database", NodeKind::Construct)
        .unwrap();
    spec.tree_mut()
        .add_child(
            database,
            "Table",
            NodeKind::Resource(ResourceBlock::new("aws_dynamodb_table")),
        )
        .unwrap();

    let machine = StateMachine::new(
        &mut spec,
        root,
        "Orders",
        StateMachineProps::new(order_definition()),
    )
    .unwrap();
    spec.tree_mut().add_dependency(machine.node(), database);

    let audit = spec
        .tree_mut()
        .add_child(
            root,
            "Audit",
            NodeKind::Resource(ResourceBlock::new("aws_cloudwatch_log_group")),
        )
        .unwrap();
    let audit_logical = spec.tree().logical_id(audit);

    let manifest = spec.synth().unwrap();
    let audit_body = &manifest["resource"]["aws_cloudwatch_log_group"][&audit_logical];
    assert!(audit_body.get("depends_on").is_none());
}

#[test]
fn test_skip_marker_stops_propagation_into_subtree() {
    let mut spec = test_spec("Production");
    let root = spec.root();

    let database = spec
        .tree_mut()
        .add_child(root, "Database", NodeKind::Construct)
        .unwrap();
    spec.tree_mut()
        .add_child(
            database,
            "Table",
            NodeKind::Resource(ResourceBlock::new("aws_dynamodb_table")),
        )
        .unwrap();

    let app = spec
        .tree_mut()
        .add_child(root, "App", NodeKind::Construct)
        .unwrap();
    spec.tree_mut().add_dependency(app, database);
    let opted_out = spec
        .tree_mut()
        .add_child(app, "Standalone", NodeKind::Construct)
        .unwrap();
    spec.tree_mut().skip_dependency_propagation(opted_out);
    let inner = spec
        .tree_mut()
        .add_child(
            opted_out,
            "Bucket",
            NodeKind::Resource(ResourceBlock::new("aws_s3_bucket")),
        )
        .unwrap();
    let wired = spec
        .tree_mut()
        .add_child(
            app,
            "Queue",
            NodeKind::Resource(ResourceBlock::new("aws_sqs_queue")),
        )
        .unwrap();

    let inner_logical = spec.tree().logical_id(inner);
    let wired_logical = spec.tree().logical_id(wired);

    let manifest = spec.synth().unwrap();
    assert!(manifest["resource"]["aws_s3_bucket"][&inner_logical]
        .get("depends_on")
        .is_none());
    assert!(manifest["resource"]["aws_sqs_queue"][&wired_logical]
        .get("depends_on")
        .is_some());
}

// ============================================================================
// Workflow files
// ============================================================================

const PIPELINE: &str = r#"
name: order-pipeline
comment: "Process a single order"
start_at: Validate
timeout_seconds: 300
states:
  - id: Validate
    type: task
    resource: "arn:aws:states:::lambda:invoke"
    parameters:
      FunctionName: validate-order
      Payload: "$.order"
    next: CheckResult
  - id: CheckResult
    type: choice
    rules:
      - variable: "$.valid"
        operator: boolean_equals
        value: true
        next: Done
    default: Reject
  - id: Done
    type: succeed
  - id: Reject
    type: fail
    error: InvalidOrder
    cause: "order failed validation"
"#;

static EXPECTED_PIPELINE_DEFINITION: Lazy<Value> = Lazy::new(|| {
    json!({
        "Comment": "Process a single order",
        "StartAt": "Validate",
        "TimeoutSeconds": 300,
        "States": {
            "Validate": {
                "Type": "Task",
                "Resource": "arn:aws:states:::lambda:invoke",
                "Parameters": {
                    "FunctionName": "validate-order",
                    "Payload.$": "$.order"
                },
                "Next": "CheckResult"
            },
            "CheckResult": {
                "Type": "Choice",
                "Choices": [
                    { "Variable": "$.valid", "BooleanEquals": true, "Next": "Done" }
                ],
                "Default": "Reject"
            },
            "Done": { "Type": "Succeed" },
            "Reject": {
                "Type": "Fail",
                "Error": "InvalidOrder",
                "Cause": "order failed validation"
            }
        }
    })
});

#[test]
fn test_workflow_file_synthesizes_to_manifest() {
    let workflow = WorkflowLoader::parse_yaml(PIPELINE).unwrap();
    let (states, start) = workflow.build().unwrap();

    let mut spec = test_spec("Staging");
    let root = spec.root();
    let mut props = StateMachineProps::new(DefinitionBody::from_state(states, start));
    props.state_machine_name = Some(workflow.name.clone());
    props.timeout_seconds = workflow.timeout_seconds;
    props.comment = workflow.comment.clone();
    let machine = StateMachine::new(&mut spec, root, &workflow.name, props).unwrap();
    let logical = spec.tree().logical_id(machine.resource_node());

    let manifest = spec.synth().unwrap();
    let body = &manifest["resource"]["aws_sfn_state_machine"][&logical];
    assert_eq!(body["name"], "order-pipeline");
    assert_eq!(
        parse_embedded_json(&body["definition"]),
        *EXPECTED_PIPELINE_DEFINITION
    );
}
