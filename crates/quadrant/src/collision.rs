//! Per-tick collision scan.
//!
//! Each element is tested against the rest of its own node, against the
//! subtrees below its node, and against the subtrees of its node's neighbours.
//! Subtrees whose bounds do not overlap the element's expanded box are pruned.
//!
//! The scan reports every intersecting pair provided each element sits in the
//! deepest node that accepts it (which insertion guarantees while sizes only
//! grow). A pair straddling a region boundary may be reported twice, once from
//! each side; callbacks must tolerate repeats.

use crate::element::SpatialElement;
use crate::node::NodeId;
use crate::tree::Quadtree;

impl<E: SpatialElement> Quadtree<E> {
    /// Invoke `on_collision` for every pair of non-deleted intersecting
    /// elements.
    ///
    /// Deletion is re-checked before every pair test, so the callback may mark
    /// elements deleted and later pairs involving them are skipped.
    pub fn for_each_collision<F>(&self, mut on_collision: F)
    where
        F: FnMut(&E, &E),
    {
        self.scan(self.root(), &mut on_collision);
    }

    /// Number of intersecting pairs found by [`Self::for_each_collision`],
    /// repeats included.
    #[must_use]
    pub fn count_reports(&self) -> usize {
        let mut count = 0;
        self.for_each_collision(|_, _| count += 1);
        count
    }

    fn scan<F>(&self, id: NodeId, on_collision: &mut F)
    where
        F: FnMut(&E, &E),
    {
        let node = self.at(id);
        let children = node.children();
        if let Some(children) = children {
            for child in children {
                self.scan(child, on_collision);
            }
        }
        if node.elements.is_empty() {
            return;
        }

        let neighbors = self.neighbors(id);
        for (index, element) in node.elements.iter().enumerate() {
            for other in &node.elements[index + 1..] {
                test_pair(element, other, on_collision);
            }
            for child in children.into_iter().flatten() {
                self.check_subtree(child, element, on_collision);
            }
            for &neighbor in &neighbors {
                self.check_subtree(neighbor, element, on_collision);
            }
        }
    }

    fn check_subtree<F>(&self, id: NodeId, element: &E, on_collision: &mut F)
    where
        F: FnMut(&E, &E),
    {
        let node = self.at(id);
        if !node.overlaps(element) {
            return;
        }
        for other in &node.elements {
            test_pair(element, other, on_collision);
        }
        if let Some(children) = node.children() {
            for child in children {
                self.check_subtree(child, element, on_collision);
            }
        }
    }
}

fn test_pair<E, F>(a: &E, b: &E, on_collision: &mut F)
where
    E: SpatialElement,
    F: FnMut(&E, &E),
{
    if !a.is_deleted() && !b.is_deleted() && a.intersects(b) {
        on_collision(a, b);
    }
}

/// Every intersecting pair of non-deleted elements, by exhaustive comparison.
///
/// Pairs are `(smaller id, larger id)`, sorted and without repeats. Used as
/// the reference answer when validating the tree scan.
#[must_use]
pub fn brute_force_pairs<E: SpatialElement>(elements: &[E]) -> Vec<(u64, u64)> {
    let mut pairs = Vec::new();
    for (index, a) in elements.iter().enumerate() {
        if a.is_deleted() {
            continue;
        }
        for b in &elements[index + 1..] {
            if !b.is_deleted() && a.intersects(b) {
                pairs.push(ordered(a.element_id(), b.element_id()));
            }
        }
    }
    pairs.sort_unstable();
    pairs.dedup();
    pairs
}

fn ordered(a: u64, b: u64) -> (u64, u64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
