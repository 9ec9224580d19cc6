// SPDX-License-Identifier: MIT

//! IAM policy value objects
//!
//! Statements compare structurally so the graph compiler can deduplicate the
//! permissions contributed by task states.

use serde_json::{Map, Value};

use crate::grid::error::BeaconError;

const POLICY_VERSION: &str = "2012-10-17";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Effect {
    #[default]
    Allow,
    Deny,
}

impl Effect {
    fn as_str(self) -> &'static str {
        match self {
            Effect::Allow => "Allow",
            Effect::Deny => "Deny",
        }
    }
}

/// Who a statement applies to (trust policies only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Service(String),
}

/// One IAM policy statement. Equality is structural.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PolicyStatement {
    pub sid: Option<String>,
    pub effect: Effect,
    pub actions: Vec<String>,
    pub resources: Vec<String>,
    pub principals: Vec<Principal>,
    pub condition: Option<Value>,
}

impl PolicyStatement {
    /// Allow `actions` on `resources`.
    pub fn allow(actions: &[&str], resources: &[&str]) -> Self {
        Self {
            effect: Effect::Allow,
            actions: actions.iter().map(|s| s.to_string()).collect(),
            resources: resources.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    /// The standard trust-policy statement for a service principal.
    pub fn assume_role(service: impl Into<String>) -> Self {
        Self {
            effect: Effect::Allow,
            actions: vec!["sts:AssumeRole".to_string()],
            principals: vec![Principal::Service(service.into())],
            ..Default::default()
        }
    }

    pub fn with_sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self
    }

    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        if let Some(sid) = &self.sid {
            map.insert("Sid".to_string(), Value::String(sid.clone()));
        }
        map.insert(
            "Effect".to_string(),
            Value::String(self.effect.as_str().to_string()),
        );
        if !self.actions.is_empty() {
            map.insert("Action".to_string(), string_or_list(&self.actions));
        }
        if !self.resources.is_empty() {
            map.insert("Resource".to_string(), string_or_list(&self.resources));
        }
        if !self.principals.is_empty() {
            let services: Vec<String> = self
                .principals
                .iter()
                .map(|p| match p {
                    Principal::Service(name) => name.clone(),
                })
                .collect();
            let mut principal = Map::new();
            principal.insert("Service".to_string(), string_or_list(&services));
            map.insert("Principal".to_string(), Value::Object(principal));
        }
        if let Some(condition) = &self.condition {
            map.insert("Condition".to_string(), condition.clone());
        }
        Value::Object(map)
    }
}

/// A policy document wrapping an ordered statement list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PolicyDocument {
    pub statements: Vec<PolicyStatement>,
}

impl PolicyDocument {
    pub fn new(statements: Vec<PolicyStatement>) -> Self {
        Self { statements }
    }

    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert(
            "Version".to_string(),
            Value::String(POLICY_VERSION.to_string()),
        );
        map.insert(
            "Statement".to_string(),
            Value::Array(self.statements.iter().map(PolicyStatement::to_json).collect()),
        );
        Value::Object(map)
    }

    pub fn to_json_string(&self) -> Result<String, BeaconError> {
        Ok(serde_json::to_string(&self.to_json())?)
    }
}

/// IAM collapses single-element lists to a bare string.
fn string_or_list(items: &[String]) -> Value {
    if items.len() == 1 {
        Value::String(items[0].clone())
    } else {
        Value::Array(items.iter().map(|s| Value::String(s.clone())).collect())
    }
}
