//! The capability every indexable world entity implements.

use std::sync::Arc;

use glam::Vec2;

use crate::node::NodeId;

/// An element that can be held by a [`Quadtree`](crate::Quadtree).
///
/// The tree stores clones of the element handle (typically an `Arc<T>`), so
/// every method takes `&self`. Implementors keep the region slot behind
/// interior mutability; only the tree ever writes it.
///
/// # Invariants
///
/// - `element_id` is stable for the element's lifetime and unique among the
///   elements of one tree.
/// - `is_deleted` is monotonic: once true it never returns false again.
/// - `region`, when `Some`, names the node whose element list holds this
///   element. The tree keeps this true across insert, remove, split and merge.
pub trait SpatialElement {
    /// Stable identity used for list lookups.
    fn element_id(&self) -> u64;

    /// Current position.
    fn position(&self) -> Vec2;

    /// Bounding radius.
    fn size(&self) -> f32;

    /// Deletion flag. Deleted elements are skipped by collision scans.
    fn is_deleted(&self) -> bool;

    /// Node currently holding this element.
    fn region(&self) -> Option<NodeId>;

    /// Reassign the back-reference. Called by the tree only.
    fn set_region(&self, region: Option<NodeId>);

    /// Pairwise intersection test.
    ///
    /// Two elements intersect when one centre lies strictly inside the other's
    /// bounding circle, i.e. their distance is below the larger size.
    fn intersects(&self, other: &Self) -> bool {
        let reach = self.size().max(other.size());
        self.position().distance_squared(other.position()) < reach * reach
    }
}

impl<T: SpatialElement + ?Sized> SpatialElement for Arc<T> {
    fn element_id(&self) -> u64 {
        (**self).element_id()
    }

    fn position(&self) -> Vec2 {
        (**self).position()
    }

    fn size(&self) -> f32 {
        (**self).size()
    }

    fn is_deleted(&self) -> bool {
        (**self).is_deleted()
    }

    fn region(&self) -> Option<NodeId> {
        (**self).region()
    }

    fn set_region(&self, region: Option<NodeId>) {
        (**self).set_region(region);
    }

    fn intersects(&self, other: &Self) -> bool {
        (**self).intersects(&**other)
    }
}
