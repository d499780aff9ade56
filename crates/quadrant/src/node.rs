//! Quadtree node structure.
//!
//! Nodes live in the tree's arena and refer to each other by [`NodeId`].
//! A node is either a leaf (no children) or internal (exactly four children).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::element::SpatialElement;
use crate::{Quadrant, Rect};

/// Stable index of a node inside its tree's arena.
///
/// Ids of merged-away nodes are recycled by later splits, so an id is only
/// meaningful together with the tree that issued it.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    /// Creates a `NodeId` from a raw arena slot.
    #[must_use]
    pub const fn new(slot: u32) -> Self {
        Self(slot)
    }

    /// Returns the arena slot.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A node in the quadtree.
#[derive(Debug, Clone)]
pub struct QuadNode<E> {
    /// Region covered by this node
    pub(crate) bounds: Rect,
    /// Depth in the tree (0 = root)
    pub(crate) depth: u8,
    /// Owning parent (`None` only at the root)
    pub(crate) parent: Option<NodeId>,
    /// Children in [`Quadrant`] order; `None` for leaves
    pub(crate) children: Option<[NodeId; 4]>,
    /// Elements held directly by this node
    pub(crate) elements: Vec<E>,
    /// Slot is on the free list
    pub(crate) retired: bool,
}

impl<E> QuadNode<E> {
    pub(crate) fn new(bounds: Rect, parent: Option<NodeId>, depth: u8, capacity: usize) -> Self {
        Self {
            bounds,
            depth,
            parent,
            children: None,
            elements: Vec::with_capacity(capacity),
            retired: false,
        }
    }

    /// Region covered by this node.
    #[must_use]
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Depth in the tree (0 = root).
    #[must_use]
    pub fn depth(&self) -> u8 {
        self.depth
    }

    /// Parent node, `None` at the root.
    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in [`Quadrant`] order, if this node is internal.
    #[must_use]
    pub fn children(&self) -> Option<[NodeId; 4]> {
        self.children
    }

    /// Child covering one quadrant, if this node is internal.
    #[must_use]
    pub fn child(&self, quadrant: Quadrant) -> Option<NodeId> {
        self.children.map(|children| children[quadrant.index()])
    }

    /// Check if this node is a leaf.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    /// Elements held directly by this node (not its descendants).
    #[must_use]
    pub fn elements(&self) -> &[E] {
        &self.elements
    }
}

impl<E: SpatialElement> QuadNode<E> {
    /// Containment test: the element's position lies inside this node and the
    /// node's shorter side is at least the element's size.
    #[must_use]
    pub fn accepts(&self, element: &E) -> bool {
        self.bounds.contains(element.position()) && self.bounds.min_side() >= element.size()
    }

    /// Overlap test: the element's expanded box (position ± size) touches this
    /// node, so the subtree may hold something the element collides with.
    #[must_use]
    pub fn overlaps(&self, element: &E) -> bool {
        self.bounds.overlaps_square(element.position(), element.size())
    }

    pub(crate) fn position_of(&self, element_id: u64) -> Option<usize> {
        self.elements.iter().position(|e| e.element_id() == element_id)
    }
}
