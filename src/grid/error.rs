// SPDX-License-Identifier: MIT

//! Typed error handling for beacons-rs
//!
//! This module provides the error type hierarchy using thiserror. Library
//! code returns `BeaconError`; the state-machine compiler has its own
//! `StatesError` nested under it.

use thiserror::Error;

/// Top-level error type for beacons-rs
#[derive(Debug, Error)]
pub enum BeaconError {
    /// Configuration errors (conflicting props, missing required values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A name rejected by the orchestration service's naming rules
    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// State-machine graph errors
    #[error("States error: {0}")]
    States(#[from] StatesError),

    /// Lazy token registration/resolution errors
    #[error("Token error: {0}")]
    Token(String),

    /// Construct tree errors (duplicate ids, unknown nodes)
    #[error("Construct tree error: {0}")]
    Tree(String),

    /// Synthesis errors (address collisions, unresolved output)
    #[error("Synthesis error: {0}")]
    Synth(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error wrapper for compatibility
    #[error("{0}")]
    Other(String),
}

/// Errors raised by the state-machine graph compiler
#[derive(Debug, Error)]
pub enum StatesError {
    /// Two states render to the same name within one machine
    #[error("State with name '{name}' occurs more than once in {graph}; state names must be unique across the whole machine")]
    DuplicateStateName { name: String, graph: String },

    /// A state was discovered by a second graph or a second branch
    #[error("Trying to use state '{name}' in {graph}, but it is already used in {other}; every state can only be part of one graph")]
    StateInMultipleGraphs {
        name: String,
        graph: String,
        other: String,
    },

    /// next() called twice on the same state
    #[error("State '{name}' already has a next state")]
    NextAlreadySet { name: String },

    /// next() called on a terminal state
    #[error("Cannot chain onto '{name}': {kind} states are terminal and have no outgoing transition")]
    TerminalState { name: String, kind: &'static str },

    /// next() called on a Choice state
    #[error("Cannot chain a next state onto Choice '{name}'; use when(), otherwise() or afterwards()")]
    ChoiceHasNoNext { name: String },

    /// Continuing a chain that has no open ends
    #[error("Cannot continue chain from '{start}': it has no next-able end states (if a Choice ends the chain, use afterwards() to continue)")]
    CannotContinueChain { start: String },

    /// addRetry() on a state kind without retry support
    #[error("Retriers are not supported on {kind} state '{name}'")]
    RetryNotSupported { name: String, kind: &'static str },

    /// addCatch() on a state kind without catch support
    #[error("Catchers are not supported on {kind} state '{name}'")]
    CatchNotSupported { name: String, kind: &'static str },

    /// otherwise() called twice on one Choice
    #[error("Choice '{name}' already has a default transition")]
    DefaultAlreadySet { name: String },

    /// A condition variable that is not a JSONPath reference
    #[error("Variable reference must be '$', start with '$.', or start with '$[', got '{0}'")]
    InvalidVariable(String),

    /// A field value that must be a JSONPath expression
    #[error("Expected JSON path to start with '$', got '{0}'")]
    InvalidJsonPath(String),

    /// A Wait timestamp that is not RFC 3339
    #[error("Timestamp '{0}' is not a valid RFC 3339 timestamp")]
    InvalidTimestamp(String),

    /// An operation addressed a state id the arena does not contain
    #[error("Unknown state id referenced: {0}")]
    UnknownState(String),

    /// A definition that cannot be turned into a graph
    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),
}

impl BeaconError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an invalid-name error
    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a synthesis error
    pub fn synth(message: impl Into<String>) -> Self {
        Self::Synth(message.into())
    }

    /// Create from a generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

impl From<&str> for BeaconError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for BeaconError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}
