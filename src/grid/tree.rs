//! Construct tree arena
//!
//! Constructs live in a flat arena and are addressed by `NodeId` handles.
//! Composite nodes group children; concrete nodes carry the `ResourceBlock`
//! the manifest is assembled from. Construct-level dependency edges recorded
//! here are what the dependency aspect later rewrites into resource-level
//! `depends_on` entries.

use serde_json::{Map, Value};

use crate::grid::error::BeaconError;
use crate::grid::names;

/// Maximum length of a generated logical id.
const MAX_LOGICAL_ID_LEN: usize = 255;

/// Handle to a node in a [`ConstructTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// What a construct node is to the backing engine.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Composite/abstraction node, invisible to the engine's dependency graph
    Construct,
    /// Concrete managed resource
    Resource(ResourceBlock),
    /// Concrete data source
    DataSource(ResourceBlock),
}

/// The declarative body of a concrete resource or data source.
#[derive(Debug, Clone)]
pub struct ResourceBlock {
    /// Engine-level type, e.g. `aws_sfn_state_machine`
    pub resource_type: String,
    /// Attribute body; may contain unresolved token placeholders
    pub body: Map<String, Value>,
    /// Native dependency edges as `type.logical` addresses
    pub depends_on: Vec<String>,
    /// Whether the tag-merging aspect may write into this block
    pub taggable: bool,
}

impl ResourceBlock {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            body: Map::new(),
            depends_on: Vec::new(),
            taggable: false,
        }
    }

    pub fn taggable(mut self) -> Self {
        self.taggable = true;
        self
    }

    pub fn with_body(mut self, body: Map<String, Value>) -> Self {
        self.body = body;
        self
    }
}

/// One construct in the arena.
#[derive(Debug)]
pub struct ConstructNode {
    /// Local id within the parent scope
    pub id: String,
    /// Path components from the tree root (the root itself has an empty path)
    pub path: Vec<String>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub kind: NodeKind,
    /// Construct-level dependency declarations (targets may be composites)
    pub dependencies: Vec<NodeId>,
    /// Opt-out marker: the dependency aspect skips this node's own wiring
    pub skip_dependency_propagation: bool,
}

/// Arena of construct nodes rooted at a single synthesis scope.
#[derive(Debug)]
pub struct ConstructTree {
    nodes: Vec<ConstructNode>,
}

impl ConstructTree {
    pub fn new(root_id: impl Into<String>) -> Self {
        let root = ConstructNode {
            id: root_id.into(),
            path: Vec::new(),
            parent: None,
            children: Vec::new(),
            kind: NodeKind::Construct,
            dependencies: Vec::new(),
            skip_dependency_propagation: false,
        };
        Self { nodes: vec![root] }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &ConstructNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut ConstructNode {
        &mut self.nodes[id.0]
    }

    /// Add a child construct. Sibling ids must be unique.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        id: &str,
        kind: NodeKind,
    ) -> Result<NodeId, BeaconError> {
        if id.is_empty() {
            return Err(BeaconError::Tree("construct id cannot be empty".into()));
        }
        for child in &self.nodes[parent.0].children {
            if self.nodes[child.0].id == id {
                return Err(BeaconError::Tree(format!(
                    "construct '{}' already has a child named '{}'",
                    self.display_path(parent),
                    id
                )));
            }
        }
        let mut path = self.nodes[parent.0].path.clone();
        path.push(id.to_string());
        let node = ConstructNode {
            id: id.to_string(),
            path,
            parent: Some(parent),
            children: Vec::new(),
            kind,
            dependencies: Vec::new(),
            skip_dependency_propagation: false,
        };
        let node_id = NodeId(self.nodes.len());
        self.nodes.push(node);
        self.nodes[parent.0].children.push(node_id);
        Ok(node_id)
    }

    /// Declare a construct-level dependency of `node` on `target`.
    pub fn add_dependency(&mut self, node: NodeId, target: NodeId) {
        let deps = &mut self.nodes[node.0].dependencies;
        if !deps.contains(&target) {
            deps.push(target);
        }
    }

    /// Mark a node so the dependency aspect skips its own wiring.
    pub fn skip_dependency_propagation(&mut self, node: NodeId) {
        self.nodes[node.0].skip_dependency_propagation = true;
    }

    pub fn is_concrete(&self, id: NodeId) -> bool {
        matches!(
            self.nodes[id.0].kind,
            NodeKind::Resource(_) | NodeKind::DataSource(_)
        )
    }

    pub fn resource(&self, id: NodeId) -> Option<&ResourceBlock> {
        match &self.nodes[id.0].kind {
            NodeKind::Resource(block) | NodeKind::DataSource(block) => Some(block),
            NodeKind::Construct => None,
        }
    }

    pub fn resource_mut(&mut self, id: NodeId) -> Option<&mut ResourceBlock> {
        match &mut self.nodes[id.0].kind {
            NodeKind::Resource(block) | NodeKind::DataSource(block) => Some(block),
            NodeKind::Construct => None,
        }
    }

    /// Logical id of a node: path components joined by `_`, hash-suffixed
    /// when nested or over-long.
    pub fn logical_id(&self, id: NodeId) -> String {
        let node = &self.nodes[id.0];
        let components: Vec<&str> = node.path.iter().map(String::as_str).collect();
        names::make_unique_resource_name(&components, MAX_LOGICAL_ID_LEN, "_")
    }

    /// Engine-level address of a concrete node (`type.logical`, with the
    /// `data.` prefix for data sources). `None` for composites.
    pub fn address(&self, id: NodeId) -> Option<String> {
        match &self.nodes[id.0].kind {
            NodeKind::Resource(block) => {
                Some(format!("{}.{}", block.resource_type, self.logical_id(id)))
            }
            NodeKind::DataSource(block) => Some(format!(
                "data.{}.{}",
                block.resource_type,
                self.logical_id(id)
            )),
            NodeKind::Construct => None,
        }
    }

    /// Human-readable slash path for error messages.
    pub fn display_path(&self, id: NodeId) -> String {
        let node = &self.nodes[id.0];
        if node.path.is_empty() {
            node.id.clone()
        } else {
            node.path.join("/")
        }
    }

    /// All nodes under `from` (inclusive), parent before child, siblings in
    /// insertion order.
    pub fn preorder(&self, from: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            order.push(id);
            for child in self.nodes[id.0].children.iter().rev() {
                stack.push(*child);
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(rtype: &str) -> NodeKind {
        NodeKind::Resource(ResourceBlock::new(rtype))
    }

    #[test]
    fn test_add_child_builds_paths() {
        let mut tree = ConstructTree::new("TestSpec");
        let group = tree
            .add_child(tree.root(), "Group", NodeKind::Construct)
            .unwrap();
        let leaf = tree.add_child(group, "Leaf", resource("test_resource")).unwrap();

        assert_eq!(tree.node(group).path, vec!["Group"]);
        assert_eq!(tree.node(leaf).path, vec!["Group", "Leaf"]);
        assert_eq!(tree.node(leaf).parent, Some(group));
    }

    #[test]
    fn test_duplicate_sibling_id_rejected() {
        let mut tree = ConstructTree::new("TestSpec");
        tree.add_child(tree.root(), "A", NodeKind::Construct).unwrap();
        let err = tree
            .add_child(tree.root(), "A", NodeKind::Construct)
            .unwrap_err();
        assert!(err.to_string().contains("already has a child named 'A'"));
    }

    #[test]
    fn test_preorder_parent_before_child() {
        let mut tree = ConstructTree::new("TestSpec");
        let a = tree.add_child(tree.root(), "A", NodeKind::Construct).unwrap();
        let a1 = tree.add_child(a, "A1", NodeKind::Construct).unwrap();
        let a2 = tree.add_child(a, "A2", NodeKind::Construct).unwrap();
        let b = tree.add_child(tree.root(), "B", NodeKind::Construct).unwrap();

        let order = tree.preorder(tree.root());
        assert_eq!(order, vec![tree.root(), a, a1, a2, b]);
    }

    #[test]
    fn test_logical_id_top_level_has_no_hash() {
        let mut tree = ConstructTree::new("TestSpec");
        let a = tree.add_child(tree.root(), "ResourceA", resource("test_resource")).unwrap();
        assert_eq!(tree.logical_id(a), "ResourceA");
        assert_eq!(tree.address(a), Some("test_resource.ResourceA".to_string()));
    }

    #[test]
    fn test_logical_id_nested_is_hash_suffixed() {
        let mut tree = ConstructTree::new("TestSpec");
        let group = tree.add_child(tree.root(), "Composite", NodeKind::Construct).unwrap();
        let leaf = tree.add_child(group, "Nested1", resource("test_resource")).unwrap();
        let logical = tree.logical_id(leaf);
        assert!(logical.starts_with("Composite_Nested1_"));
        assert_eq!(logical.len(), "Composite_Nested1_".len() + 8);
    }

    #[test]
    fn test_data_source_address_prefix() {
        let mut tree = ConstructTree::new("TestSpec");
        let ds = tree
            .add_child(
                tree.root(),
                "Lookup",
                NodeKind::DataSource(ResourceBlock::new("test_data")),
            )
            .unwrap();
        assert_eq!(tree.address(ds), Some("data.test_data.Lookup".to_string()));
    }

    #[test]
    fn test_dependencies_deduplicated() {
        let mut tree = ConstructTree::new("TestSpec");
        let a = tree.add_child(tree.root(), "A", NodeKind::Construct).unwrap();
        let b = tree.add_child(tree.root(), "B", NodeKind::Construct).unwrap();
        tree.add_dependency(a, b);
        tree.add_dependency(a, b);
        assert_eq!(tree.node(a).dependencies, vec![b]);
    }
}
