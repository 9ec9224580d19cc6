// SPDX-License-Identifier: MIT

//! Synthesis root
//!
//! A `Spec` owns the construct tree, the token table and the registered
//! aspects, and drives the synthesis pipeline: aspects run over the finished
//! tree (tags, then dependency propagation), tokens are resolved, and the
//! declarative manifest is emitted.

use std::collections::{BTreeMap, HashSet};

use serde_json::{Map, Value};

use crate::grid::aspect::{visit_preorder, Aspect, GridTags};
use crate::grid::dependency::DependencyAspect;
use crate::grid::error::BeaconError;
use crate::grid::token::TokenTable;
use crate::grid::tree::{ConstructTree, NodeId, NodeKind};

/// Configuration for a synthesis root.
#[derive(Debug, Clone, Default)]
pub struct SpecProps {
    /// Environment this spec deploys into, recorded as a grid tag
    pub environment_name: String,
    /// Stable identifier for the grid; generated when not supplied
    pub grid_uuid: Option<String>,
    /// Additional tags merged into every taggable resource
    pub tags: BTreeMap<String, String>,
}

/// The root of a construct tree plus everything needed to synthesize it.
pub struct Spec {
    tree: ConstructTree,
    tokens: TokenTable,
    aspects: Vec<Box<dyn Aspect>>,
    environment_name: String,
    grid_uuid: String,
}

impl Spec {
    pub fn new(id: &str, props: SpecProps) -> Self {
        let grid_uuid = props
            .grid_uuid
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let mut base_tags = BTreeMap::new();
        base_tags.insert(
            "grid:EnvironmentName".to_string(),
            props.environment_name.clone(),
        );
        base_tags.insert("grid:UUID".to_string(), grid_uuid.clone());
        base_tags.extend(props.tags);

        let mut spec = Self {
            tree: ConstructTree::new(id),
            tokens: TokenTable::new(),
            aspects: Vec::new(),
            environment_name: props.environment_name,
            grid_uuid,
        };
        spec.aspects.push(Box::new(GridTags::new(base_tags)));
        spec
    }

    pub fn root(&self) -> NodeId {
        self.tree.root()
    }

    pub fn tree(&self) -> &ConstructTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut ConstructTree {
        &mut self.tree
    }

    pub fn tokens(&self) -> &TokenTable {
        &self.tokens
    }

    pub fn tokens_mut(&mut self) -> &mut TokenTable {
        &mut self.tokens
    }

    pub fn environment_name(&self) -> &str {
        &self.environment_name
    }

    pub fn grid_uuid(&self) -> &str {
        &self.grid_uuid
    }

    /// Register an additional aspect, applied in registration order before
    /// dependency propagation.
    pub fn add_aspect(&mut self, aspect: Box<dyn Aspect>) {
        self.aspects.push(aspect);
    }

    /// Run the synthesis pipeline and return the manifest document.
    pub fn synth(&mut self) -> Result<Value, BeaconError> {
        let root = self.tree.root();
        log::info!(
            "synthesizing '{}' ({} constructs)",
            self.tree.node(root).id,
            self.tree.preorder(root).len()
        );

        let Self { tree, aspects, .. } = self;
        for aspect in aspects.iter_mut() {
            log::debug!("applying aspect: {}", aspect.name());
            visit_preorder(tree, root, aspect.as_mut());
        }

        // Dependency propagation runs last over the finished tree; its caches
        // must not survive the run, so the aspect is built here.
        let mut dependency_aspect = DependencyAspect::new();
        visit_preorder(tree, root, &mut dependency_aspect);

        self.render_manifest()
    }

    fn render_manifest(&self) -> Result<Value, BeaconError> {
        let root = self.tree.root();
        let mut resources: Map<String, Value> = Map::new();
        let mut data_sources: Map<String, Value> = Map::new();
        let mut seen = HashSet::new();

        for node in self.tree.preorder(root) {
            let block = match self.tree.resource(node) {
                Some(block) => block,
                None => continue,
            };
            let address = match self.tree.address(node) {
                Some(address) => address,
                None => continue,
            };
            if !seen.insert(address.clone()) {
                return Err(BeaconError::synth(format!(
                    "duplicate address '{}' in manifest",
                    address
                )));
            }

            let mut body = self.tokens.resolve(&Value::Object(block.body.clone()))?;
            if let Value::Object(map) = &mut body {
                if !block.depends_on.is_empty() {
                    let deps = block
                        .depends_on
                        .iter()
                        .map(|d| Value::String(d.clone()))
                        .collect();
                    map.insert("depends_on".to_string(), Value::Array(deps));
                }
            }

            let section = match self.tree.node(node).kind {
                NodeKind::DataSource(_) => &mut data_sources,
                _ => &mut resources,
            };
            let by_type = section
                .entry(block.resource_type.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(by_type) = by_type {
                by_type.insert(self.tree.logical_id(node), body);
            }
        }

        let mut manifest = Map::new();
        if !resources.is_empty() {
            manifest.insert("resource".to_string(), Value::Object(resources));
        }
        if !data_sources.is_empty() {
            manifest.insert("data".to_string(), Value::Object(data_sources));
        }
        log::info!("synthesis complete ({} token(s) resolved)", self.tokens.len());
        Ok(Value::Object(manifest))
    }
}
