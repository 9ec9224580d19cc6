// SPDX-License-Identifier: MIT

//! Chaining state fragments
//!
//! A `Chain` is a lightweight view over a `States` arena: a start handle plus
//! the set of open ends new states can be appended to. Wiring mutates the
//! arena; the chain itself stays cheap to copy around.

use crate::aws::compute::state::{ParallelProps, StateId, States};
use crate::grid::error::{BeaconError, StatesError};

/// An open end of a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainEnd {
    /// The default transition slot of a non-terminal state.
    Next(StateId),
    /// The otherwise slot of a Choice state.
    Default(StateId),
}

/// Options for [`Chain::afterwards`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AfterwardsOptions {
    /// Also treat the unset otherwise slot of the starting Choice as an end.
    pub include_otherwise: bool,
    /// Follow catch edges when looking for dangling ends.
    pub include_error_handlers: bool,
}

#[derive(Debug, Clone)]
pub struct Chain {
    start: StateId,
    ends: Vec<ChainEnd>,
}

impl Chain {
    /// Begin a chain at a single state.
    pub fn start(states: &States, state: StateId) -> Chain {
        Chain {
            start: state,
            ends: end_slots(states, state),
        }
    }

    pub fn start_state(&self) -> StateId {
        self.start
    }

    pub fn end_states(&self) -> &[ChainEnd] {
        &self.ends
    }

    /// Wire every open end to `target` and continue the chain from there.
    ///
    /// Fails when there is nothing to continue from, for example directly
    /// after a Succeed or Fail state or a bare Choice.
    pub fn next(self, states: &mut States, target: StateId) -> Result<Chain, BeaconError> {
        if self.ends.is_empty() {
            return Err(StatesError::CannotContinueChain {
                start: states.name(self.start).to_string(),
            }
            .into());
        }
        for end in &self.ends {
            match end {
                ChainEnd::Next(id) => states.set_next(*id, target)?,
                ChainEnd::Default(choice) => states.otherwise(*choice, target)?,
            }
        }
        Ok(Chain {
            start: self.start,
            ends: end_slots(states, target),
        })
    }

    /// Wire every open end to the start of `other`; the result keeps this
    /// chain's start and the other chain's ends.
    pub fn next_chain(self, states: &mut States, other: Chain) -> Result<Chain, BeaconError> {
        if self.ends.is_empty() {
            return Err(StatesError::CannotContinueChain {
                start: states.name(self.start).to_string(),
            }
            .into());
        }
        for end in &self.ends {
            match end {
                ChainEnd::Next(id) => states.set_next(*id, other.start)?,
                ChainEnd::Default(choice) => states.otherwise(*choice, other.start)?,
            }
        }
        Ok(Chain {
            start: self.start,
            ends: other.ends,
        })
    }

    /// Wrap this chain into a single Parallel state with one branch.
    pub fn to_single_state(
        self,
        states: &mut States,
        name: &str,
        props: ParallelProps,
    ) -> Result<StateId, BeaconError> {
        states.to_single_state(self.start, name, props)
    }

    /// Collect the dangling ends reachable from `start` into a chain, so a
    /// branching fragment can be continued as one unit.
    ///
    /// Follows next edges, Choice rules and defaults; catch edges only with
    /// `include_error_handlers`. Parallel branches and Map processors are
    /// closed sub-machines and are not descended into.
    pub fn afterwards(
        states: &States,
        start: StateId,
        options: AfterwardsOptions,
    ) -> Result<Chain, BeaconError> {
        if options.include_otherwise && states.is_choice(start) {
            let (_, default) = states.choice_targets(start);
            if default.is_some() {
                return Err(StatesError::DefaultAlreadySet {
                    name: states.name(start).to_string(),
                }
                .into());
            }
        }

        let mut ends = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut queue = std::collections::VecDeque::new();
        queue.push_back(start);
        seen.insert(start);
        while let Some(id) = queue.pop_front() {
            let (rule_targets, default) = states.choice_targets(id);
            if states.is_choice(id) {
                if default.is_none() && options.include_otherwise {
                    ends.push(ChainEnd::Default(id));
                }
            } else if !states.is_terminal(id) && states.next_of(id).is_none() {
                ends.push(ChainEnd::Next(id));
            }

            let mut targets = Vec::new();
            if let Some(next) = states.next_of(id) {
                targets.push(next);
            }
            targets.extend(rule_targets);
            if let Some(default) = default {
                targets.push(default);
            }
            if options.include_error_handlers {
                targets.extend(states.catch_targets(id));
            }
            for target in targets {
                if seen.insert(target) {
                    queue.push_back(target);
                }
            }
        }

        Ok(Chain { start, ends })
    }
}

fn end_slots(states: &States, state: StateId) -> Vec<ChainEnd> {
    if states.is_terminal(state) || states.is_choice(state) {
        Vec::new()
    } else {
        vec![ChainEnd::Next(state)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::compute::condition::Condition;
    use crate::aws::compute::state::{
        CatchProps, ChoiceProps, PassProps, SucceedProps, TaskProps,
    };

    #[test]
    fn test_chain_wires_sequence() {
        let mut states = States::new();
        let a = states.pass("A", PassProps::default()).unwrap();
        let b = states.pass("B", PassProps::default()).unwrap();
        let c = states.pass("C", PassProps::default()).unwrap();
        let chain = Chain::start(&states, a)
            .next(&mut states, b)
            .unwrap()
            .next(&mut states, c)
            .unwrap();
        assert_eq!(states.next_of(a), Some(b));
        assert_eq!(states.next_of(b), Some(c));
        assert_eq!(chain.start_state(), a);
        assert_eq!(chain.end_states(), &[ChainEnd::Next(c)]);
    }

    #[test]
    fn test_chain_after_terminal_fails() {
        let mut states = States::new();
        let done = states.succeed("Done", SucceedProps::default()).unwrap();
        let next = states.pass("Next", PassProps::default()).unwrap();
        let err = Chain::start(&states, done)
            .next(&mut states, next)
            .unwrap_err();
        assert!(err.to_string().contains("no next-able end states"));
    }

    #[test]
    fn test_chain_after_bare_choice_fails() {
        let mut states = States::new();
        let choice = states.choice("Decide", ChoiceProps::default()).unwrap();
        let next = states.pass("Next", PassProps::default()).unwrap();
        let err = Chain::start(&states, choice)
            .next(&mut states, next)
            .unwrap_err();
        assert!(err.to_string().contains("no next-able end states"));
    }

    #[test]
    fn test_afterwards_collects_dangling_ends() {
        let mut states = States::new();
        let choice = states.choice("Decide", ChoiceProps::default()).unwrap();
        let yes = states.pass("Yes", PassProps::default()).unwrap();
        let no = states.pass("No", PassProps::default()).unwrap();
        let finish = states.pass("Finish", PassProps::default()).unwrap();
        states
            .when(choice, Condition::is_present("$.x").unwrap(), yes)
            .unwrap();
        states
            .when(choice, Condition::is_null("$.x").unwrap(), no)
            .unwrap();

        Chain::afterwards(&states, choice, AfterwardsOptions::default())
            .unwrap()
            .next(&mut states, finish)
            .unwrap();

        assert_eq!(states.next_of(yes), Some(finish));
        assert_eq!(states.next_of(no), Some(finish));
        let (_, default) = states.choice_targets(choice);
        assert_eq!(default, None);
    }

    #[test]
    fn test_afterwards_include_otherwise_wires_default() {
        let mut states = States::new();
        let choice = states.choice("Decide", ChoiceProps::default()).unwrap();
        let yes = states.succeed("Yes", SucceedProps::default()).unwrap();
        let finish = states.pass("Finish", PassProps::default()).unwrap();
        states
            .when(choice, Condition::is_present("$.x").unwrap(), yes)
            .unwrap();

        let options = AfterwardsOptions {
            include_otherwise: true,
            ..Default::default()
        };
        Chain::afterwards(&states, choice, options)
            .unwrap()
            .next(&mut states, finish)
            .unwrap();

        let (_, default) = states.choice_targets(choice);
        assert_eq!(default, Some(finish));
    }

    #[test]
    fn test_afterwards_include_otherwise_conflicts_with_otherwise() {
        let mut states = States::new();
        let choice = states.choice("Decide", ChoiceProps::default()).unwrap();
        let fallback = states.pass("Fallback", PassProps::default()).unwrap();
        states.otherwise(choice, fallback).unwrap();

        let options = AfterwardsOptions {
            include_otherwise: true,
            ..Default::default()
        };
        let err = Chain::afterwards(&states, choice, options).unwrap_err();
        assert!(err.to_string().contains("already has a default"));
    }

    #[test]
    fn test_afterwards_error_handlers_opt_in() {
        let mut states = States::new();
        let task = states
            .task(
                "T",
                TaskProps {
                    resource: "arn:x".into(),
                    ..Default::default()
                },
            )
            .unwrap();
        let handler = states.pass("Handler", PassProps::default()).unwrap();
        let done = states.succeed("Done", SucceedProps::default()).unwrap();
        states.add_catch(task, handler, CatchProps::default()).unwrap();
        states.set_next(task, done).unwrap();

        let plain = Chain::afterwards(&states, task, AfterwardsOptions::default()).unwrap();
        assert_eq!(plain.end_states(), &[]);

        let with_handlers = Chain::afterwards(
            &states,
            task,
            AfterwardsOptions {
                include_error_handlers: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(with_handlers.end_states(), &[ChainEnd::Next(handler)]);
    }

    #[test]
    fn test_next_chain_composes_fragments() {
        let mut states = States::new();
        let a = states.pass("A", PassProps::default()).unwrap();
        let b = states.pass("B", PassProps::default()).unwrap();
        let c = states.pass("C", PassProps::default()).unwrap();
        let d = states.pass("D", PassProps::default()).unwrap();
        let first = Chain::start(&states, a).next(&mut states, b).unwrap();
        let second = Chain::start(&states, c).next(&mut states, d).unwrap();
        let whole = first.next_chain(&mut states, second).unwrap();
        assert_eq!(states.next_of(b), Some(c));
        assert_eq!(whole.start_state(), a);
        assert_eq!(whole.end_states(), &[ChainEnd::Next(d)]);
    }
}
