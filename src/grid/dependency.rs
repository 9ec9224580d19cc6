//! Dependency propagation aspect
//!
//! Construct-level dependencies may point at composite nodes, but the backing
//! engine only tracks dependencies between concrete resources. This aspect
//! walks the tree once (parents first) and rewrites every declared dependency
//! into `depends_on` entries on the concrete resources a subtree contains.
//!
//! Dependencies accumulate down the parent chain and never across siblings:
//! each node's set is seeded strictly from its parent's accumulated set.

use std::collections::HashMap;

use crate::grid::aspect::Aspect;
use crate::grid::tree::{ConstructTree, NodeId};

/// One instance is built per synthesis run; both caches die with it.
#[derive(Default)]
pub struct DependencyAspect {
    /// Concrete resources contained in a construct's subtree
    resource_cache: HashMap<NodeId, Vec<NodeId>>,
    /// Accumulated dependencies of a construct
    dependency_cache: HashMap<NodeId, Vec<NodeId>>,
}

impl DependencyAspect {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concrete resources in `target`'s subtree, memoized per node.
    fn dependables(&mut self, tree: &ConstructTree, target: NodeId) -> Vec<NodeId> {
        if let Some(cached) = self.resource_cache.get(&target) {
            return cached.clone();
        }
        let mut resources = Vec::new();
        if tree.is_concrete(target) {
            resources.push(target);
        }
        let children = tree.node(target).children.clone();
        for child in children {
            for resource in self.dependables(tree, child) {
                if !resources.contains(&resource) {
                    resources.push(resource);
                }
            }
        }
        self.resource_cache.insert(target, resources.clone());
        resources
    }
}

impl Aspect for DependencyAspect {
    fn name(&self) -> &'static str {
        "DependencyAspect"
    }

    fn visit(&mut self, tree: &mut ConstructTree, node: NodeId) {
        // The marker suppresses this node's own wiring only; the walk still
        // reaches its children, which then inherit nothing through it.
        if tree.node(node).skip_dependency_propagation {
            return;
        }

        // Seed from the parent's accumulated set.
        let mut dependencies: Vec<NodeId> = tree
            .node(node)
            .parent
            .and_then(|parent| self.dependency_cache.get(&parent))
            .cloned()
            .unwrap_or_default();

        // Expand declared dependencies into the concrete resources of their
        // subtrees.
        let declared = tree.node(node).dependencies.clone();
        for target in declared {
            for dependable in self.dependables(tree, target) {
                if !dependencies.contains(&dependable) {
                    dependencies.push(dependable);
                }
            }
        }

        // Write into the native dependency list of concrete nodes, skipping
        // self-references and entries already present.
        if !dependencies.is_empty() {
            let mut addresses = Vec::new();
            for dependable in &dependencies {
                if *dependable == node {
                    continue;
                }
                if let Some(address) = tree.address(*dependable) {
                    addresses.push(address);
                }
            }
            if let Some(block) = tree.resource_mut(node) {
                for address in addresses {
                    if !block.depends_on.contains(&address) {
                        block.depends_on.push(address);
                    }
                }
            }
        }

        self.dependency_cache.insert(node, dependencies);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::aspect::visit_preorder;
    use crate::grid::tree::{NodeKind, ResourceBlock};

    fn resource() -> NodeKind {
        NodeKind::Resource(ResourceBlock::new("test_resource"))
    }

    fn run(tree: &mut ConstructTree) {
        let mut aspect = DependencyAspect::new();
        visit_preorder(tree, tree.root(), &mut aspect);
    }

    fn depends_on(tree: &ConstructTree, node: NodeId) -> Vec<String> {
        tree.resource(node).unwrap().depends_on.clone()
    }

    #[test]
    fn test_direct_resource_dependency() {
        let mut tree = ConstructTree::new("TestSpec");
        let a = tree.add_child(tree.root(), "ResourceA", resource()).unwrap();
        let b = tree.add_child(tree.root(), "ResourceB", resource()).unwrap();
        tree.add_dependency(b, a);

        run(&mut tree);

        assert_eq!(depends_on(&tree, b), vec!["test_resource.ResourceA"]);
        assert!(depends_on(&tree, a).is_empty());
    }

    #[test]
    fn test_composite_dependency_expands_to_all_contained_resources() {
        let mut tree = ConstructTree::new("TestSpec");
        let composite = tree
            .add_child(tree.root(), "Composite", NodeKind::Construct)
            .unwrap();
        let n1 = tree.add_child(composite, "Nested1", resource()).unwrap();
        let n2 = tree.add_child(composite, "Nested2", resource()).unwrap();
        let dependent = tree.add_child(tree.root(), "Dependent", resource()).unwrap();
        tree.add_dependency(dependent, composite);

        run(&mut tree);

        let expected = vec![
            tree.address(n1).unwrap(),
            tree.address(n2).unwrap(),
        ];
        assert_eq!(depends_on(&tree, dependent), expected);
    }

    #[test]
    fn test_dependency_on_composite_propagates_into_dependent_subtree() {
        // A dependency declared on a composite must land on every concrete
        // resource the composite contains.
        let mut tree = ConstructTree::new("TestSpec");
        let target = tree.add_child(tree.root(), "Target", resource()).unwrap();
        let composite = tree
            .add_child(tree.root(), "Composite", NodeKind::Construct)
            .unwrap();
        let inner1 = tree.add_child(composite, "Inner1", resource()).unwrap();
        let deep = tree.add_child(composite, "Deep", NodeKind::Construct).unwrap();
        let inner2 = tree.add_child(deep, "Inner2", resource()).unwrap();
        tree.add_dependency(composite, target);

        run(&mut tree);

        let expected = vec![tree.address(target).unwrap()];
        assert_eq!(depends_on(&tree, inner1), expected);
        assert_eq!(depends_on(&tree, inner2), expected);
    }

    #[test]
    fn test_no_leakage_across_siblings() {
        let mut tree = ConstructTree::new("TestSpec");
        let a = tree.add_child(tree.root(), "ResourceA", resource()).unwrap();
        let parent = tree
            .add_child(tree.root(), "Parent", NodeKind::Construct)
            .unwrap();
        let nested1 = tree.add_child(parent, "Nested1", resource()).unwrap();
        let nested2 = tree.add_child(parent, "Nested2", resource()).unwrap();
        tree.add_dependency(nested1, a);

        run(&mut tree);

        assert_eq!(depends_on(&tree, nested1), vec![tree.address(a).unwrap()]);
        assert!(depends_on(&tree, nested2).is_empty());
    }

    #[test]
    fn test_self_reference_skipped() {
        let mut tree = ConstructTree::new("TestSpec");
        let group = tree
            .add_child(tree.root(), "Group", NodeKind::Construct)
            .unwrap();
        let member = tree.add_child(group, "Member", resource()).unwrap();
        // The group depends on itself through its own subtree.
        tree.add_dependency(group, group);

        run(&mut tree);

        assert!(depends_on(&tree, member).is_empty());
    }

    #[test]
    fn test_existing_entries_not_duplicated() {
        let mut tree = ConstructTree::new("TestSpec");
        let a = tree.add_child(tree.root(), "ResourceA", resource()).unwrap();
        let b = tree.add_child(tree.root(), "ResourceB", resource()).unwrap();
        let addr = tree.address(a).unwrap();
        tree.resource_mut(b).unwrap().depends_on.push(addr.clone());
        tree.add_dependency(b, a);

        run(&mut tree);

        assert_eq!(depends_on(&tree, b), vec![addr]);
    }

    #[test]
    fn test_skip_marker_suppresses_own_wiring_only() {
        let mut tree = ConstructTree::new("TestSpec");
        let target = tree.add_child(tree.root(), "Target", resource()).unwrap();
        let group = tree
            .add_child(tree.root(), "Group", NodeKind::Construct)
            .unwrap();
        let skipped = tree.add_child(group, "Skipped", resource()).unwrap();
        let sibling = tree.add_child(group, "Sibling", resource()).unwrap();
        tree.add_dependency(group, target);
        tree.skip_dependency_propagation(skipped);

        run(&mut tree);

        // The marked node itself is left alone, its sibling is still wired.
        assert!(depends_on(&tree, skipped).is_empty());
        assert_eq!(depends_on(&tree, sibling), vec![tree.address(target).unwrap()]);
    }

    #[test]
    fn test_children_inherit_nothing_through_skipped_node() {
        let mut tree = ConstructTree::new("TestSpec");
        let target = tree.add_child(tree.root(), "Target", resource()).unwrap();
        let skipped = tree
            .add_child(tree.root(), "Skipped", NodeKind::Construct)
            .unwrap();
        let child = tree.add_child(skipped, "Child", resource()).unwrap();
        tree.add_dependency(skipped, target);
        tree.skip_dependency_propagation(skipped);

        run(&mut tree);

        // The skipped node never cached a set, so its child sees nothing.
        assert!(depends_on(&tree, child).is_empty());
    }

    #[test]
    fn test_data_sources_participate() {
        let mut tree = ConstructTree::new("TestSpec");
        let lookup = tree
            .add_child(
                tree.root(),
                "Lookup",
                NodeKind::DataSource(ResourceBlock::new("test_data")),
            )
            .unwrap();
        let dependent = tree.add_child(tree.root(), "Dependent", resource()).unwrap();
        tree.add_dependency(dependent, lookup);

        run(&mut tree);

        assert_eq!(depends_on(&tree, dependent), vec!["data.test_data.Lookup"]);
    }
}
