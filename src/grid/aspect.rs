// SPDX-License-Identifier: MIT

//! Tree-wide aspects
//!
//! An aspect visits every construct under a root exactly once, parent before
//! child. The walk is driven explicitly by the synthesis root at a fixed
//! point in the pipeline rather than through framework callbacks.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::grid::tree::{ConstructTree, NodeId};

/// A visitor applied to every node of the construct tree during synthesis.
pub trait Aspect {
    /// Name used in synthesis logging.
    fn name(&self) -> &'static str;

    /// Called once per construct, parents before children.
    fn visit(&mut self, tree: &mut ConstructTree, node: NodeId);
}

/// Drive one aspect over the whole tree in preorder.
pub fn visit_preorder(tree: &mut ConstructTree, root: NodeId, aspect: &mut dyn Aspect) {
    for node in tree.preorder(root) {
        aspect.visit(tree, node);
    }
}

/// Merges the `Spec`'s base tags into every taggable resource body. Tags
/// already present on a resource win over the base value.
pub struct GridTags {
    tags: BTreeMap<String, String>,
}

impl GridTags {
    pub fn new(tags: BTreeMap<String, String>) -> Self {
        Self { tags }
    }
}

impl Aspect for GridTags {
    fn name(&self) -> &'static str {
        "GridTags"
    }

    fn visit(&mut self, tree: &mut ConstructTree, node: NodeId) {
        if self.tags.is_empty() {
            return;
        }
        if let Some(block) = tree.resource_mut(node) {
            if !block.taggable {
                return;
            }
            let entry = block
                .body
                .entry("tags")
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            if let Value::Object(existing) = entry {
                for (key, value) in &self.tags {
                    if !existing.contains_key(key) {
                        existing.insert(key.clone(), Value::String(value.clone()));
                    }
                }
            }
        }
    }
}
