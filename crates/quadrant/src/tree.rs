//! Adaptive quadtree storage.
//!
//! The tree owns an arena of [`QuadNode`]s. Leaves split into four quadrant
//! children once they hold `capacity` elements, and an internal node collapses
//! back into a leaf once its whole subtree holds fewer than `capacity / 2`.
//! Every element's region slot is rewritten whenever the element changes node.

use std::collections::HashSet;
use std::mem;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::element::SpatialElement;
use crate::error::{QuadtreeError, QuadtreeResult};
use crate::node::{NodeId, QuadNode};
use crate::{Quadrant, Rect};

/// Configuration for the quadtree.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuadtreeConfig {
    /// World bounds (the root region)
    pub bounds: Rect,
    /// Elements a leaf holds before it splits
    pub capacity: usize,
    /// Depth at which leaves stop splitting and simply overflow
    pub max_depth: u8,
}

impl Default for QuadtreeConfig {
    fn default() -> Self {
        Self {
            bounds: Rect::default(),
            capacity: 16,
            max_depth: 12,
        }
    }
}

impl QuadtreeConfig {
    /// Subtree population below which an internal node merges.
    #[must_use]
    pub fn merge_threshold(&self) -> usize {
        self.capacity / 2
    }

    /// Check the configuration describes a usable tree.
    ///
    /// # Errors
    ///
    /// Returns [`QuadtreeError::InvalidConfig`] for a zero capacity or
    /// non-finite / non-positive bounds.
    pub fn validate(&self) -> QuadtreeResult<()> {
        if self.capacity == 0 {
            return Err(QuadtreeError::InvalidConfig("capacity must be at least 1".into()));
        }
        let size = self.bounds.size;
        if !(size.x.is_finite() && size.y.is_finite() && size.x > 0.0 && size.y > 0.0) {
            return Err(QuadtreeError::InvalidConfig(format!(
                "bounds must have a positive finite extent, got {}x{}",
                size.x, size.y
            )));
        }
        if !self.bounds.origin.is_finite() {
            return Err(QuadtreeError::InvalidConfig("bounds origin must be finite".into()));
        }
        Ok(())
    }
}

/// Adaptive quadtree holding element handles of type `E`.
#[derive(Debug, Clone)]
pub struct Quadtree<E> {
    /// Node arena; retired slots are kept for reuse
    nodes: Vec<QuadNode<E>>,
    /// Retired slots available for the next split
    free: Vec<NodeId>,
    /// Root node
    root: NodeId,
    /// Configuration
    config: QuadtreeConfig,
}

impl<E> Quadtree<E> {
    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &QuadtreeConfig {
        &self.config
    }

    /// The root node id.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Look up a live node.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&QuadNode<E>> {
        self.nodes.get(id.index()).filter(|node| !node.retired)
    }

    /// Check if `id` names a live node of this tree.
    #[must_use]
    pub fn is_live(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Depth of a live node (0 = root).
    #[must_use]
    pub fn depth_of(&self, id: NodeId) -> Option<u8> {
        self.node(id).map(QuadNode::depth)
    }

    /// Iterate over all live nodes.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &QuadNode<E>)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| !node.retired)
            .map(|(slot, node)| (slot_id(slot), node))
    }

    /// Iterate over all live leaves.
    pub fn leaves(&self) -> impl Iterator<Item = (NodeId, &QuadNode<E>)> + '_ {
        self.nodes().filter(|(_, node)| node.is_leaf())
    }

    /// Iterate over every indexed element, wherever it is held.
    pub fn elements(&self) -> impl Iterator<Item = &E> + '_ {
        self.nodes().flat_map(|(_, node)| node.elements.iter())
    }

    /// Number of live nodes (the root counts as one).
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Number of live leaves.
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.leaves().count()
    }

    /// Number of indexed elements.
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.subtree_count(self.root)
    }

    /// Get statistics about the tree structure.
    #[must_use]
    pub fn stats(&self) -> QuadtreeStats {
        QuadtreeStats {
            node_count: self.node_count(),
            leaf_count: self.leaf_count(),
            element_count: self.element_count(),
            depth: self.nodes().map(|(_, node)| node.depth).max().unwrap_or(0),
        }
    }

    pub(crate) fn at(&self, id: NodeId) -> &QuadNode<E> {
        &self.nodes[id.index()]
    }

    fn at_mut(&mut self, id: NodeId) -> &mut QuadNode<E> {
        &mut self.nodes[id.index()]
    }

    fn subtree_count(&self, id: NodeId) -> usize {
        let node = self.at(id);
        let own = node.elements.len();
        match node.children {
            Some(children) => own + children.iter().map(|&child| self.subtree_count(child)).sum::<usize>(),
            None => own,
        }
    }

    fn subtree_nodes(&self, id: NodeId) -> usize {
        match self.at(id).children {
            Some(children) => 1 + children.iter().map(|&child| self.subtree_nodes(child)).sum::<usize>(),
            None => 1,
        }
    }

    fn alloc(&mut self, bounds: Rect, parent: NodeId, depth: u8) -> NodeId {
        let node = QuadNode::new(bounds, Some(parent), depth, self.config.capacity);
        if let Some(id) = self.free.pop() {
            self.nodes[id.index()] = node;
            id
        } else {
            self.nodes.push(node);
            slot_id(self.nodes.len() - 1)
        }
    }

    fn retire(&mut self, id: NodeId) {
        let node = self.at_mut(id);
        node.retired = true;
        node.children = None;
        node.parent = None;
        node.elements.clear();
        self.free.push(id);
    }
}

impl<E: SpatialElement + Clone> Quadtree<E> {
    /// Create an empty tree whose root covers `config.bounds`.
    ///
    /// # Errors
    ///
    /// Returns [`QuadtreeError::InvalidConfig`] if the config fails validation.
    pub fn new(config: QuadtreeConfig) -> QuadtreeResult<Self> {
        config.validate()?;
        Ok(Self {
            nodes: vec![QuadNode::new(config.bounds, None, 0, config.capacity)],
            free: Vec::new(),
            root: slot_id(0),
            config,
        })
    }

    /// Insert an element, re-homing it if it is already indexed.
    ///
    /// Returns false (and leaves the element where it was) if the root does not
    /// accept it: position outside the world or size above the world's shorter
    /// side.
    pub fn insert(&mut self, element: &E) -> bool {
        if !self.at(self.root).accepts(element) {
            return false;
        }
        if element.region().is_some() {
            self.remove(element);
        }
        self.insert_into(self.root, element)
    }

    /// Remove an element.
    ///
    /// The element's own region is searched first. If it is not found there the
    /// whole tree is searched as a fallback; both anomalies are logged. Returns
    /// false if the element is not indexed anywhere.
    pub fn remove(&mut self, element: &E) -> bool {
        let id = element.element_id();
        let removed = match element.region() {
            Some(region) if self.is_live(region) && self.remove_from(region, element) => true,
            Some(region) => {
                let removed = self.remove_from(self.root, element);
                if removed {
                    warn!(element = id, region = %region, "element was not inside its own region but was removed anyway");
                } else {
                    error!(element = id, region = %region, "element is not inside its own region and could not be removed");
                }
                removed
            }
            None => {
                let removed = self.remove_from(self.root, element);
                if !removed {
                    error!(element = id, "removal from quadtree failed");
                }
                removed
            }
        };
        if removed {
            element.set_region(None);
        }
        removed
    }

    /// Re-validate an element's region after it moved or grew.
    ///
    /// If the current region no longer accepts the element it is re-inserted
    /// from the root. Neighbour regions are deliberately not tried: a fast
    /// element can skip several regions in one tick.
    ///
    /// # Errors
    ///
    /// - [`QuadtreeError::Unindexed`] if the element has no region.
    /// - [`QuadtreeError::NoRegion`] if no node accepts the element.
    pub fn update_region(&mut self, element: &E) -> QuadtreeResult<()> {
        let Some(region) = element.region() else {
            return Err(QuadtreeError::Unindexed { id: element.element_id() });
        };
        if self.is_live(region) && self.at(region).accepts(element) {
            return Ok(());
        }
        if self.insert(element) {
            return Ok(());
        }
        let position = element.position();
        error!(
            element = element.element_id(),
            x = position.x,
            y = position.y,
            "cannot find region for position"
        );
        Err(QuadtreeError::NoRegion {
            id: element.element_id(),
            x: position.x,
            y: position.y,
            size: element.size(),
        })
    }

    /// Verify the structural invariants of the tree.
    ///
    /// Checks that every element's back-reference names the node holding it,
    /// that the node accepts the element, that no element is held twice, and
    /// that parent/child links and depths agree.
    ///
    /// # Errors
    ///
    /// Returns [`QuadtreeError::Invariant`] describing the first violation.
    pub fn check_invariants(&self) -> QuadtreeResult<()> {
        let mut seen = HashSet::new();
        for (id, node) in self.nodes() {
            for element in &node.elements {
                let element_id = element.element_id();
                if !seen.insert(element_id) {
                    return Err(QuadtreeError::Invariant(format!("element {element_id} is held twice")));
                }
                if element.region() != Some(id) {
                    return Err(QuadtreeError::Invariant(format!(
                        "element {element_id} is held by node {id} but points at {:?}",
                        element.region()
                    )));
                }
                if !node.accepts(element) {
                    return Err(QuadtreeError::Invariant(format!(
                        "node {id} holds element {element_id} it does not accept"
                    )));
                }
            }
            if let Some(children) = node.children {
                for (quadrant, child) in Quadrant::ALL.into_iter().zip(children) {
                    let Some(child_node) = self.node(child) else {
                        return Err(QuadtreeError::Invariant(format!("node {id} owns retired child {child}")));
                    };
                    if child_node.parent != Some(id) || child_node.depth != node.depth + 1 {
                        return Err(QuadtreeError::Invariant(format!("child {child} is not linked to parent {id}")));
                    }
                    if child_node.bounds != node.bounds.quadrant(quadrant) {
                        return Err(QuadtreeError::Invariant(format!(
                            "child {child} does not cover the {quadrant:?} quadrant of {id}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn insert_into(&mut self, id: NodeId, element: &E) -> bool {
        let node = self.at(id);
        if !node.accepts(element) {
            return false;
        }
        let has_room = node.elements.len() < self.config.capacity || node.depth >= self.config.max_depth;
        let children = match node.children {
            Some(children) => children,
            None if has_room => {
                self.attach(id, element);
                return true;
            }
            None => self.split(id),
        };
        if !children.into_iter().any(|child| self.insert_into(child, element)) {
            // Too large for any child
            self.attach(id, element);
        }
        true
    }

    fn attach(&mut self, id: NodeId, element: &E) {
        self.at_mut(id).elements.push(element.clone());
        element.set_region(Some(id));
    }

    fn split(&mut self, id: NodeId) -> [NodeId; 4] {
        let bounds = self.at(id).bounds;
        let depth = self.at(id).depth;
        let children = Quadrant::ALL.map(|quadrant| self.alloc(bounds.quadrant(quadrant), id, depth + 1));

        let node = self.at_mut(id);
        node.children = Some(children);
        let displaced = mem::take(&mut node.elements);
        debug!(node = %id, depth, elements = displaced.len(), "splitting region");

        for element in displaced {
            if !children.into_iter().any(|child| self.insert_into(child, &element)) {
                // Stays here; its region already points at this node
                self.at_mut(id).elements.push(element);
            }
        }
        children
    }

    fn remove_from(&mut self, id: NodeId, element: &E) -> bool {
        let node = self.at_mut(id);
        if let Some(index) = node.position_of(element.element_id()) {
            node.elements.swap_remove(index);
            if node.elements.is_empty() {
                let (children, parent) = (node.children, node.parent);
                match (children, parent) {
                    (None, Some(parent)) => self.collapse_from(parent),
                    _ => self.collapse_from(id),
                }
            }
            return true;
        }
        let children = node.children;
        match children {
            Some(children) => children.into_iter().any(|child| self.remove_from(child, element)),
            None => false,
        }
    }

    /// Merge `start` if eligible, then keep trying its ancestors.
    fn collapse_from(&mut self, start: NodeId) {
        let mut current = Some(start);
        while let Some(id) = current {
            if !self.combine(id) {
                break;
            }
            current = self.at(id).parent;
        }
    }

    fn combine(&mut self, id: NodeId) -> bool {
        let Some(children) = self.at(id).children else {
            return false;
        };
        let count = self.subtree_count(id);
        if count >= self.config.merge_threshold() {
            return false;
        }
        debug!(node = %id, nodes = self.subtree_nodes(id), elements = count, "combining regions");

        for child in children {
            self.combine(child);
            let absorbed = mem::take(&mut self.at_mut(child).elements);
            self.at_mut(id).elements.extend(absorbed);
            self.retire(child);
        }
        let node = self.at_mut(id);
        node.children = None;
        for element in &node.elements {
            element.set_region(Some(id));
        }
        true
    }
}

#[allow(clippy::cast_possible_truncation)]
fn slot_id(slot: usize) -> NodeId {
    NodeId::new(slot as u32)
}

/// Statistics about the tree structure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuadtreeStats {
    /// Live nodes, root included
    pub node_count: usize,
    /// Live leaves
    pub leaf_count: usize,
    /// Indexed elements
    pub element_count: usize,
    /// Depth of the deepest node
    pub depth: u8,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::disc::{disc, Disc};
    use glam::Vec2;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn tree(width: f32, capacity: usize) -> Quadtree<Arc<Disc>> {
        Quadtree::new(QuadtreeConfig {
            bounds: Rect::world(width, width),
            capacity,
            max_depth: 12,
        })
        .unwrap()
    }

    fn region_bounds(tree: &Quadtree<Arc<Disc>>, element: &Arc<Disc>) -> Rect {
        tree.node(element.region().unwrap()).unwrap().bounds()
    }

    #[test]
    fn test_invalid_config() {
        let config = QuadtreeConfig {
            capacity: 0,
            ..Default::default()
        };
        assert!(matches!(
            Quadtree::<Arc<Disc>>::new(config),
            Err(QuadtreeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_insert_rejects_outside_or_oversized() {
        let mut tree = tree(100.0, 4);
        assert!(!tree.insert(&disc(1, 150.0, 50.0, 1.0)));
        assert!(!tree.insert(&disc(2, 50.0, 50.0, 101.0)));
        let fits = disc(3, 50.0, 50.0, 100.0);
        assert!(tree.insert(&fits));
        assert_eq!(fits.region(), Some(tree.root()));
    }

    #[test]
    fn test_split_then_merge_scenario() {
        let mut tree = tree(1000.0, 4);
        let nw = disc(1, 495.0, 495.0, 1.0);
        let ne = disc(2, 505.0, 495.0, 1.0);
        let sw = disc(3, 495.0, 505.0, 1.0);
        let se = disc(4, 505.0, 505.0, 1.0);
        let center = disc(5, 500.0, 500.0, 1.0);
        for element in [&nw, &ne, &sw, &se, &center] {
            assert!(tree.insert(element));
        }

        let root_bounds = tree.node(tree.root()).unwrap().bounds();
        assert!(!tree.node(tree.root()).unwrap().is_leaf());
        assert_eq!(region_bounds(&tree, &nw), root_bounds.quadrant(Quadrant::NorthWest));
        assert_eq!(region_bounds(&tree, &ne), root_bounds.quadrant(Quadrant::NorthEast));
        assert_eq!(region_bounds(&tree, &sw), root_bounds.quadrant(Quadrant::SouthWest));
        assert_eq!(region_bounds(&tree, &se), root_bounds.quadrant(Quadrant::SouthEast));
        // On the shared corner; the first quadrant in order takes it
        assert_eq!(region_bounds(&tree, &center), root_bounds.quadrant(Quadrant::NorthWest));
        assert_eq!(tree.element_count(), 5);
        tree.check_invariants().unwrap();

        assert!(tree.remove(&ne));
        assert!(tree.remove(&center));
        assert!(tree.remove(&nw));
        assert!(!tree.node(tree.root()).unwrap().is_leaf());
        assert!(tree.remove(&sw));

        let root = tree.node(tree.root()).unwrap();
        assert!(root.is_leaf());
        assert_eq!(root.elements().len(), 1);
        assert_eq!(se.region(), Some(tree.root()));
        assert_eq!(ne.region(), None);
        assert_eq!(tree.node_count(), 1);
        tree.check_invariants().unwrap();
    }

    #[test]
    fn test_split_partitions_cluster() {
        let mut tree = tree(1000.0, 4);
        let cluster: Vec<_> = (0..12u64)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let offset = i as f32;
                disc(i, 200.0 + offset * 0.8, 300.0 + (offset * 1.7) % 9.0, 0.5)
            })
            .collect();
        for element in &cluster {
            assert!(tree.insert(element));
        }

        assert!(!tree.node(tree.root()).unwrap().is_leaf());
        assert_eq!(tree.element_count(), 12);
        tree.check_invariants().unwrap();
        for element in &cluster {
            assert!(region_bounds(&tree, element).contains(element.position()));
        }
    }

    #[test]
    fn test_oversized_element_stays_at_parent() {
        let mut tree = tree(1000.0, 1);
        let small = disc(1, 100.0, 100.0, 1.0);
        let big = disc(2, 120.0, 120.0, 600.0);
        assert!(tree.insert(&small));
        assert!(tree.insert(&big));

        assert!(!tree.node(tree.root()).unwrap().is_leaf());
        assert_eq!(big.region(), Some(tree.root()));
        assert_ne!(small.region(), Some(tree.root()));
        tree.check_invariants().unwrap();
    }

    #[test]
    fn test_max_depth_stops_splitting() {
        let mut tree = Quadtree::new(QuadtreeConfig {
            bounds: Rect::world(64.0, 64.0),
            capacity: 2,
            max_depth: 3,
        })
        .unwrap();
        let stacked: Vec<_> = (0..10).map(|i| disc(i, 10.0, 10.0, 0.1)).collect();
        for element in &stacked {
            assert!(tree.insert(element));
        }
        assert_eq!(tree.stats().depth, 3);
        assert_eq!(tree.element_count(), 10);
        tree.check_invariants().unwrap();
    }

    #[test]
    fn test_update_region_rehomes_moved_element() {
        let mut tree = tree(1000.0, 1);
        let anchor = disc(1, 900.0, 900.0, 1.0);
        let mover = disc(2, 100.0, 100.0, 1.0);
        assert!(tree.insert(&anchor));
        assert!(tree.insert(&mover));
        let before = mover.region();

        mover.position.set(Vec2::new(600.0, 120.0));
        tree.update_region(&mover).unwrap();

        assert_ne!(mover.region(), before);
        assert!(region_bounds(&tree, &mover).contains(mover.position()));
        assert_eq!(tree.element_count(), 2);
        tree.check_invariants().unwrap();
    }

    #[test]
    fn test_update_region_errors() {
        let mut tree = tree(100.0, 4);
        let loose = disc(1, 10.0, 10.0, 1.0);
        assert_eq!(tree.update_region(&loose), Err(QuadtreeError::Unindexed { id: 1 }));

        assert!(tree.insert(&loose));
        loose.position.set(Vec2::new(-5.0, 10.0));
        assert!(matches!(tree.update_region(&loose), Err(QuadtreeError::NoRegion { id: 1, .. })));
    }

    #[test]
    fn test_remove_falls_back_to_root_search() {
        let mut tree = tree(1000.0, 1);
        let first = disc(1, 100.0, 100.0, 1.0);
        let second = disc(2, 900.0, 900.0, 1.0);
        assert!(tree.insert(&first));
        assert!(tree.insert(&second));

        // Corrupt the back-reference
        first.set_region(second.region());
        assert!(tree.remove(&first));
        assert_eq!(tree.element_count(), 1);
        assert!(!tree.remove(&first));
    }

    #[test]
    fn test_merge_cascades_to_ancestors() {
        let mut tree = tree(1024.0, 4);
        let west = disc(1, 10.0, 10.0, 1.0);
        let south_east: Vec<_> = [(600.0, 600.0), (1000.0, 600.0), (600.0, 1000.0), (1000.0, 1000.0), (800.0, 800.0)]
            .into_iter()
            .zip(2u64..)
            .map(|((x, y), id)| disc(id, x, y, 1.0))
            .collect();
        assert!(tree.insert(&west));
        for element in &south_east {
            assert!(tree.insert(element));
        }
        assert_eq!(tree.stats().depth, 2);
        assert_eq!(tree.node_count(), 9);

        assert!(tree.remove(&west));
        assert!(tree.remove(&south_east[3]));
        assert!(tree.remove(&south_east[0]));
        assert!(tree.remove(&south_east[1]));
        assert_eq!(tree.node_count(), 9);

        // Emptying the south-west grandchild merges the south-east child,
        // which in turn leaves the root below threshold
        assert!(tree.remove(&south_east[2]));
        assert_eq!(tree.node_count(), 1);
        assert_eq!(south_east[4].region(), Some(tree.root()));
        tree.check_invariants().unwrap();
    }

    proptest! {
        #[test]
        fn prop_random_operations_keep_invariants(
            ops in prop::collection::vec((0u64..24, 0.0f32..512.0, 0.0f32..512.0, 0u8..3), 1..120)
        ) {
            let mut tree = tree(512.0, 3);
            let mut live: std::collections::HashMap<u64, Arc<Disc>> = std::collections::HashMap::new();

            for (id, x, y, op) in ops {
                match (op, live.get(&id).cloned()) {
                    (0, None) => {
                        let element = disc(id, x, y, 1.0);
                        prop_assert!(tree.insert(&element));
                        live.insert(id, element);
                    }
                    (1, Some(element)) => {
                        prop_assert!(tree.remove(&element));
                        live.remove(&id);
                    }
                    (_, Some(element)) => {
                        element.position.set(Vec2::new(x, y));
                        prop_assert!(tree.update_region(&element).is_ok());
                    }
                    _ => {}
                }
                prop_assert_eq!(tree.element_count(), live.len());
            }

            prop_assert!(tree.check_invariants().is_ok());
            for element in live.values() {
                let bounds = tree.node(element.region().unwrap()).unwrap().bounds();
                prop_assert!(bounds.contains(element.position()));
                prop_assert!(bounds.min_side() >= element.size());
            }
        }
    }
}
