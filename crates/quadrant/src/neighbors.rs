//! Neighbour discovery between quadtree regions.
//!
//! The neighbour of a node in a cardinal direction is the adjacent node of the
//! same size, or the larger leaf covering that side when the tree is shallower
//! there. Diagonal neighbours are reached through the north and south
//! neighbours.

use serde::{Deserialize, Serialize};

use crate::node::NodeId;
use crate::tree::Quadtree;
use crate::Quadrant;

/// Cardinal direction. North is decreasing y.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Decreasing y
    North,
    /// Increasing y
    South,
    /// Increasing x
    East,
    /// Decreasing x
    West,
}

impl Direction {
    /// All directions.
    pub const ALL: [Direction; 4] = [Direction::North, Direction::South, Direction::East, Direction::West];

    /// The opposite direction.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::East => Direction::West,
            Direction::West => Direction::East,
        }
    }

    /// Whether stepping this way out of `quadrant` leaves the parent node.
    const fn leaves_parent(self, quadrant: Quadrant) -> bool {
        match self {
            Direction::North => !quadrant.is_south(),
            Direction::South => quadrant.is_south(),
            Direction::East => quadrant.is_east(),
            Direction::West => !quadrant.is_east(),
        }
    }

    /// The quadrant adjacent to `quadrant` along this direction's axis.
    const fn mirror(self, quadrant: Quadrant) -> Quadrant {
        match self {
            Direction::North | Direction::South => quadrant.flip_vertical(),
            Direction::East | Direction::West => quadrant.flip_horizontal(),
        }
    }
}

impl<E> Quadtree<E> {
    /// Find the neighbour of `id` in a cardinal direction.
    ///
    /// Returns the adjacent node of equal size when it exists, otherwise the
    /// larger leaf that borders this side. Returns `None` at the world edge,
    /// for the root, and for ids that are not live.
    #[must_use]
    pub fn neighbor(&self, id: NodeId, direction: Direction) -> Option<NodeId> {
        let parent_id = self.node(id)?.parent()?;
        let parent = self.at(parent_id);
        let quadrant = Quadrant::ALL
            .into_iter()
            .find(|&quadrant| parent.child(quadrant) == Some(id))?;
        let across = direction.mirror(quadrant);

        if !direction.leaves_parent(quadrant) {
            return parent.child(across);
        }

        let outer = self.neighbor(parent_id, direction)?;
        match self.at(outer).child(across) {
            Some(child) => Some(child),
            None => Some(outer),
        }
    }

    /// All distinct neighbours of `id`.
    ///
    /// Order: west, east, north, south, then north-east and north-west (found
    /// through the north neighbour), then south-east and south-west (found
    /// through the south neighbour). The root has no neighbours.
    #[must_use]
    pub fn neighbors(&self, id: NodeId) -> Vec<NodeId> {
        let north = self.neighbor(id, Direction::North);
        let south = self.neighbor(id, Direction::South);
        let diagonal = |vertical: Option<NodeId>, horizontal: Direction| {
            vertical.and_then(|node| self.neighbor(node, horizontal))
        };

        let candidates = [
            self.neighbor(id, Direction::West),
            self.neighbor(id, Direction::East),
            north,
            south,
            diagonal(north, Direction::East),
            diagonal(north, Direction::West),
            diagonal(south, Direction::East),
            diagonal(south, Direction::West),
        ];

        let mut found = Vec::with_capacity(candidates.len());
        for candidate in candidates.into_iter().flatten() {
            if candidate != id && !found.contains(&candidate) {
                found.push(candidate);
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::disc::{disc, Disc};
    use crate::element::SpatialElement;
    use crate::tree::QuadtreeConfig;
    use crate::Rect;
    use glam::Vec2;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn tree(width: f32, capacity: usize) -> Quadtree<Arc<Disc>> {
        Quadtree::new(QuadtreeConfig {
            bounds: Rect::world(width, width),
            capacity,
            max_depth: 8,
        })
        .unwrap()
    }

    /// Uniform 4x4 grid of depth-2 leaves, one element per cell.
    fn grid() -> (Quadtree<Arc<Disc>>, Vec<Arc<Disc>>) {
        let mut tree = tree(400.0, 1);
        let mut cells = Vec::new();
        for row in 0..4u8 {
            for col in 0..4u8 {
                let element = disc(
                    u64::from(row * 4 + col),
                    50.0 + 100.0 * f32::from(col),
                    50.0 + 100.0 * f32::from(row),
                    1.0,
                );
                assert!(tree.insert(&element));
                cells.push(element);
            }
        }
        (tree, cells)
    }

    fn center_of(tree: &Quadtree<Arc<Disc>>, id: NodeId) -> Vec2 {
        tree.node(id).unwrap().bounds().center()
    }

    #[test]
    fn test_root_has_no_neighbors() {
        let (tree, _) = grid();
        assert!(tree.neighbors(tree.root()).is_empty());
        assert_eq!(tree.neighbor(tree.root(), Direction::East), None);
    }

    #[test]
    fn test_interior_cell_has_eight_neighbors() {
        let (tree, cells) = grid();
        let cell = cells[5].region().unwrap();
        let centers: Vec<Vec2> = tree.neighbors(cell).into_iter().map(|id| center_of(&tree, id)).collect();

        assert_eq!(
            centers,
            vec![
                Vec2::new(50.0, 150.0),
                Vec2::new(250.0, 150.0),
                Vec2::new(150.0, 50.0),
                Vec2::new(150.0, 250.0),
                Vec2::new(250.0, 50.0),
                Vec2::new(50.0, 50.0),
                Vec2::new(250.0, 250.0),
                Vec2::new(50.0, 250.0),
            ]
        );
    }

    #[test]
    fn test_neighbors_cross_parent_boundary() {
        let (tree, cells) = grid();
        // (150, 50) sits in the north-west parent; its east neighbour is in the north-east parent
        let cell = cells[1].region().unwrap();
        let east = tree.neighbor(cell, Direction::East).unwrap();
        assert_eq!(east, cells[2].region().unwrap());
        assert_eq!(tree.neighbor(east, Direction::West), Some(cell));
    }

    #[test]
    fn test_corner_cell_has_three_neighbors() {
        let (tree, cells) = grid();
        let corner = cells[0].region().unwrap();
        assert_eq!(tree.neighbor(corner, Direction::North), None);
        assert_eq!(tree.neighbor(corner, Direction::West), None);
        assert_eq!(tree.neighbors(corner).len(), 3);
    }

    #[test]
    fn test_larger_leaf_is_the_neighbor() {
        let mut tree = tree(400.0, 1);
        let elements: Vec<_> = [(50.0, 50.0), (150.0, 50.0), (50.0, 150.0), (150.0, 150.0), (300.0, 300.0)]
            .into_iter()
            .zip(0u64..)
            .map(|((x, y), id)| disc(id, x, y, 1.0))
            .collect();
        for element in &elements {
            assert!(tree.insert(element));
        }

        let small = elements[1].region().unwrap();
        let east = tree.neighbor(small, Direction::East).unwrap();
        let east_node = tree.node(east).unwrap();
        assert!(east_node.is_leaf());
        assert_eq!(east_node.depth(), 1);
        assert_eq!(east_node.bounds(), Rect::new(200.0, 0.0, 200.0, 200.0));
    }

    proptest! {
        #[test]
        fn prop_same_depth_neighbors_are_symmetric_and_adjacent(
            points in prop::collection::vec((0.0f32..256.0, 0.0f32..256.0), 1..60)
        ) {
            let mut tree = tree(256.0, 2);
            let elements: Vec<_> = points
                .iter()
                .zip(0u64..)
                .map(|(&(x, y), id)| disc(id, x, y, 0.5))
                .collect();
            for element in &elements {
                prop_assert!(tree.insert(element));
            }

            let ids: Vec<NodeId> = tree.nodes().map(|(id, _)| id).collect();
            for id in ids {
                let bounds = tree.node(id).unwrap().bounds();
                for direction in Direction::ALL {
                    let Some(other) = tree.neighbor(id, direction) else { continue };
                    let other_node = tree.node(other).unwrap();
                    prop_assert!(other_node.depth() <= tree.node(id).unwrap().depth());

                    let theirs = other_node.bounds();
                    let touching = match direction {
                        Direction::East => theirs.origin.x == bounds.max().x,
                        Direction::West => theirs.max().x == bounds.origin.x,
                        Direction::North => theirs.max().y == bounds.origin.y,
                        Direction::South => theirs.origin.y == bounds.max().y,
                    };
                    prop_assert!(touching);

                    if other_node.depth() == tree.node(id).unwrap().depth() {
                        prop_assert_eq!(tree.neighbor(other, direction.opposite()), Some(id));
                    }
                }
            }
        }
    }
}
