//! State graph discovery and rendering
//!
//! A `StateGraph` is the frozen shape of one machine definition: every state
//! reachable from the start, grouped into regions. Region 0 is the top level
//! document; each Parallel branch and Map processor opens a fresh region that
//! renders as its own nested sub-machine. Discovery claims each state for its
//! region, which is what makes name collisions and cross-region jumps
//! build-time errors instead of service-side surprises.

use std::collections::{HashSet, VecDeque};

use serde_json::{Map, Value};

use crate::aws::compute::state::{StateId, States};
use crate::aws::iam::PolicyStatement;
use crate::grid::error::{BeaconError, StatesError};

#[derive(Debug)]
struct Region {
    display: String,
    start: StateId,
    /// Discovery order within the region
    states: Vec<StateId>,
}

#[derive(Debug)]
pub struct StateGraph {
    name: String,
    start: StateId,
    regions: Vec<Region>,
    policy_statements: Vec<PolicyStatement>,
    timeout_seconds: Option<u32>,
}

impl StateGraph {
    /// Walk everything reachable from `start` and freeze it into a graph.
    ///
    /// Fails when two reachable states render to the same name, when an edge
    /// crosses region boundaries, or when a state is already bound to
    /// another graph.
    pub fn build(states: &mut States, start: StateId, name: &str) -> Result<Self, BeaconError> {
        let generation = states.new_generation();
        let mut regions: Vec<Region> = Vec::new();
        let mut policy_statements: Vec<PolicyStatement> = Vec::new();
        let mut names: HashSet<String> = HashSet::new();

        // Regions are discovered breadth-first as well: the top level first,
        // then each sub-machine in the order its parent state was found.
        let mut pending: VecDeque<(String, StateId)> = VecDeque::new();
        pending.push_back((name.to_string(), start));

        while let Some((display, region_start)) = pending.pop_front() {
            let region_index = regions.len();
            let mut region = Region {
                display: display.clone(),
                start: region_start,
                states: Vec::new(),
            };

            let mut queue = VecDeque::new();
            if !states.claim(region_start, generation, region_index, &display)? {
                queue.push_back(region_start);
            }
            while let Some(id) = queue.pop_front() {
                let state_name = states.name(id).to_string();
                if !names.insert(state_name.clone()) {
                    return Err(StatesError::DuplicateStateName {
                        name: state_name,
                        graph: name.to_string(),
                    }
                    .into());
                }
                region.states.push(id);

                for statement in states.policy_statements_of(id) {
                    if !policy_statements.contains(statement) {
                        policy_statements.push(statement.clone());
                    }
                }

                for target in region_targets(states, id) {
                    if !states.claim(target, generation, region_index, &display)? {
                        queue.push_back(target);
                    }
                }

                for (branch_index, branch) in states.branches_of(id).into_iter().enumerate() {
                    pending.push_back((
                        format!(
                            "branch {} of Parallel '{}'",
                            branch_index + 1,
                            states.name(id)
                        ),
                        branch,
                    ));
                }
                if let Some(processor) = states.processor_of(id) {
                    pending.push_back((
                        format!("item processor of Map '{}'", states.name(id)),
                        processor,
                    ));
                }
            }

            regions.push(region);
        }

        log::debug!(
            "built graph '{}' with {} state(s) in {} region(s)",
            name,
            names.len(),
            regions.len()
        );

        Ok(StateGraph {
            name: name.to_string(),
            start,
            regions,
            policy_statements,
            timeout_seconds: None,
        })
    }

    pub fn with_timeout(mut self, seconds: u32) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&self) -> StateId {
        self.start
    }

    /// Deduplicated policy statements of every task in the graph, in
    /// discovery order.
    pub fn policy_statements(&self) -> &[PolicyStatement] {
        &self.policy_statements
    }

    pub fn state_count(&self) -> usize {
        self.regions.iter().map(|r| r.states.len()).sum()
    }

    /// Render the whole graph to an ASL document.
    pub fn to_graph_json(&self, states: &States) -> Result<Value, BeaconError> {
        self.render_region(states, &self.regions[0], self.timeout_seconds)
    }

    fn render_region(
        &self,
        states: &States,
        region: &Region,
        timeout_seconds: Option<u32>,
    ) -> Result<Value, BeaconError> {
        let mut rendered = Map::new();
        for &id in &region.states {
            let state_json = states.render_state(id, &|sub| self.render_sub(states, sub))?;
            rendered.insert(states.name(id).to_string(), state_json);
        }
        let mut doc = Map::new();
        doc.insert(
            "StartAt".to_string(),
            Value::String(states.name(region.start).to_string()),
        );
        doc.insert("States".to_string(), Value::Object(rendered));
        if let Some(seconds) = timeout_seconds {
            doc.insert("TimeoutSeconds".to_string(), Value::Number(seconds.into()));
        }
        Ok(Value::Object(doc))
    }

    fn render_sub(&self, states: &States, sub_start: StateId) -> Result<Value, BeaconError> {
        let region = self
            .regions
            .iter()
            .skip(1)
            .find(|r| r.start == sub_start)
            .ok_or_else(|| {
                BeaconError::from(StatesError::InvalidDefinition(format!(
                    "state '{}' starts a sub-machine that was not part of this graph",
                    states.name(sub_start)
                )))
            })?;
        self.render_region(states, region, None)
    }
}

/// Edges that stay inside the current region. Parallel branches and Map
/// processors open new regions and are handled separately.
fn region_targets(states: &States, id: StateId) -> Vec<StateId> {
    let mut targets = Vec::new();
    if let Some(next) = states.next_of(id) {
        targets.push(next);
    }
    targets.extend(states.catch_targets(id));
    let (rule_targets, default) = states.choice_targets(id);
    targets.extend(rule_targets);
    if let Some(default) = default {
        targets.push(default);
    }
    targets
}
