use clap::{Parser, Subcommand};

use beacons_rs::aws::compute::graph::StateGraph;
use beacons_rs::aws::compute::loader::WorkflowLoader;
use beacons_rs::aws::compute::machine::{DefinitionBody, StateMachine, StateMachineProps};
use beacons_rs::grid::spec::{Spec, SpecProps};

const GRAPH_NAME: &str = "State Machine definition";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render the state machine definition of a workflow file
    Render {
        /// Path to the workflow file
        #[arg(short, long)]
        file: String,

        /// Pretty-print the JSON output
        #[arg(short, long)]
        pretty: bool,
    },
    /// Synthesize the full resource manifest for a workflow file
    Synth {
        /// Path to the workflow file
        #[arg(short, long)]
        file: String,

        /// Environment name recorded in the grid tags
        #[arg(short, long, default_value = "dev")]
        environment: String,

        /// Pretty-print the JSON output
        #[arg(short, long)]
        pretty: bool,
    },
    /// Check a workflow file without emitting anything
    Validate {
        /// Path to the workflow file
        #[arg(short, long)]
        file: String,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();

    match args.command {
        Commands::Render { file, pretty } => {
            let workflow = WorkflowLoader::new().load_workflow(&file)?;
            log::info!("rendering workflow '{}'", workflow.name);

            let (mut states, start) = workflow.build()?;
            let mut graph = StateGraph::build(&mut states, start, GRAPH_NAME)?;
            if let Some(seconds) = workflow.timeout_seconds {
                graph = graph.with_timeout(seconds);
            }
            let mut doc = graph.to_graph_json(&states)?;
            if let (serde_json::Value::Object(map), Some(comment)) = (&mut doc, &workflow.comment)
            {
                map.insert(
                    "Comment".to_string(),
                    serde_json::Value::String(comment.clone()),
                );
            }
            print_json(&doc, pretty)?;
        }
        Commands::Synth {
            file,
            environment,
            pretty,
        } => {
            let workflow = WorkflowLoader::new().load_workflow(&file)?;
            log::info!(
                "synthesizing workflow '{}' for environment '{}'",
                workflow.name,
                environment
            );

            let (states, start) = workflow.build()?;
            let mut spec = Spec::new(
                "Workflow",
                SpecProps {
                    environment_name: environment,
                    ..Default::default()
                },
            );
            let root = spec.root();
            let mut props = StateMachineProps::new(DefinitionBody::from_state(states, start));
            props.state_machine_name = Some(workflow.name.clone());
            props.timeout_seconds = workflow.timeout_seconds;
            props.comment = workflow.comment.clone();
            StateMachine::new(&mut spec, root, &workflow.name, props)?;

            let manifest = spec.synth()?;
            print_json(&manifest, pretty)?;
        }
        Commands::Validate { file } => {
            let workflow = WorkflowLoader::new().load_workflow(&file)?;
            let (mut states, start) = workflow.build()?;
            let graph = StateGraph::build(&mut states, start, GRAPH_NAME)?;
            println!(
                "{}: {} states, starts at '{}'",
                workflow.name,
                graph.state_count(),
                states.name(graph.start())
            );
        }
    }

    Ok(())
}

fn print_json(value: &serde_json::Value, pretty: bool) -> anyhow::Result<()> {
    if pretty {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", value);
    }
    Ok(())
}
