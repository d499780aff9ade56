//! # Quadrant
//!
//! Adaptive quadtree spatial index for real-time arena simulations.
//!
//! Quadrant stores shared handles to world entities in a capacity-bounded
//! quadtree that splits and merges itself as entities come and go. Every
//! indexed element carries a back-reference to the node that currently holds
//! it, which keeps removal and re-homing cheap:
//!
//! - **Adaptive**: leaves split when they overflow and collapse again once the
//!   subtree falls below half the capacity (hysteresis against oscillation)
//! - **Back-referenced**: the index, and only the index, assigns each element's
//!   region slot
//! - **Neighbour-aware scans**: the per-tick collision scan follows
//!   cardinal and diagonal neighbours so pairs straddling a partition boundary
//!   are found even though they never share a node
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use quadrant::{Quadtree, QuadtreeConfig, Rect};
//!
//! let mut tree = Quadtree::new(QuadtreeConfig {
//!     bounds: Rect::new(0.0, 0.0, 1000.0, 1000.0),
//!     capacity: 4,
//!     max_depth: 12,
//! })?;
//!
//! tree.insert(&entity);
//! tree.for_each_collision(|a, b| println!("{} touches {}", a.element_id(), b.element_id()));
//! tree.remove(&entity);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod collision;
pub mod element;
pub mod error;
pub mod neighbors;
pub mod node;
pub mod tree;

// Re-exports for convenience
pub use collision::brute_force_pairs;
pub use element::SpatialElement;
pub use error::{QuadtreeError, QuadtreeResult};
pub use neighbors::Direction;
pub use node::{NodeId, QuadNode};
pub use tree::{Quadtree, QuadtreeConfig, QuadtreeStats};

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// One of the four children of a split node.
///
/// The discriminant doubles as a bit set: bit 0 is set for the eastern half,
/// bit 1 for the southern half. North is decreasing y.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quadrant {
    /// Low x, low y
    NorthWest = 0,
    /// High x, low y
    NorthEast = 1,
    /// Low x, high y
    SouthWest = 2,
    /// High x, high y
    SouthEast = 3,
}

impl Quadrant {
    /// All quadrants in child slot order.
    pub const ALL: [Quadrant; 4] = [
        Quadrant::NorthWest,
        Quadrant::NorthEast,
        Quadrant::SouthWest,
        Quadrant::SouthEast,
    ];

    /// Child slot index (0-3).
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Quadrant for a child slot index. Indices are taken modulo 4.
    #[must_use]
    pub const fn from_index(index: usize) -> Self {
        match index & 3 {
            0 => Quadrant::NorthWest,
            1 => Quadrant::NorthEast,
            2 => Quadrant::SouthWest,
            _ => Quadrant::SouthEast,
        }
    }

    /// True for the two eastern quadrants.
    #[must_use]
    pub const fn is_east(self) -> bool {
        self.index() & 1 == 1
    }

    /// True for the two southern quadrants.
    #[must_use]
    pub const fn is_south(self) -> bool {
        self.index() & 2 == 2
    }

    /// Mirror across the horizontal axis (north <-> south).
    #[must_use]
    pub const fn flip_vertical(self) -> Self {
        Self::from_index(self.index() ^ 2)
    }

    /// Mirror across the vertical axis (east <-> west).
    #[must_use]
    pub const fn flip_horizontal(self) -> Self {
        Self::from_index(self.index() ^ 1)
    }
}

/// Axis-aligned rectangle described by its origin (minimum corner) and extent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// Minimum corner
    pub origin: Vec2,
    /// Width and height
    pub size: Vec2,
}

impl Rect {
    /// Create a rectangle from its minimum corner and extent.
    #[must_use]
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            origin: Vec2::new(x, y),
            size: Vec2::new(width, height),
        }
    }

    /// Create a rectangle covering `[0, width] x [0, height]`.
    #[must_use]
    pub fn world(width: f32, height: f32) -> Self {
        Self::new(0.0, 0.0, width, height)
    }

    /// Maximum corner.
    #[must_use]
    pub fn max(&self) -> Vec2 {
        self.origin + self.size
    }

    /// Centre point.
    #[must_use]
    pub fn center(&self) -> Vec2 {
        self.origin + self.size * 0.5
    }

    /// Length of the shorter side.
    #[must_use]
    pub fn min_side(&self) -> f32 {
        self.size.min_element()
    }

    /// Check if a point is inside the rectangle (edges inclusive).
    #[must_use]
    pub fn contains(&self, point: Vec2) -> bool {
        let max = self.max();
        point.x >= self.origin.x && point.x <= max.x && point.y >= self.origin.y && point.y <= max.y
    }

    /// Check if the square `center ± half_extent` overlaps this rectangle
    /// (touching edges count as overlap).
    #[must_use]
    pub fn overlaps_square(&self, center: Vec2, half_extent: f32) -> bool {
        let max = self.max();
        center.x + half_extent >= self.origin.x
            && center.x - half_extent <= max.x
            && center.y + half_extent >= self.origin.y
            && center.y - half_extent <= max.y
    }

    /// Bounds of one quadrant of this rectangle.
    #[must_use]
    pub fn quadrant(&self, quadrant: Quadrant) -> Self {
        let half = self.size * 0.5;
        let offset = Vec2::new(
            if quadrant.is_east() { half.x } else { 0.0 },
            if quadrant.is_south() { half.y } else { 0.0 },
        );
        Self {
            origin: self.origin + offset,
            size: half,
        }
    }

    /// Draw a uniformly distributed point inside the rectangle.
    ///
    /// `unit` supplies samples in `[0, 1)`; the caller owns the RNG.
    #[must_use]
    pub fn sample(&self, mut unit: impl FnMut() -> f32) -> Vec2 {
        let x = unit();
        let y = unit();
        self.origin + self.size * Vec2::new(x, y)
    }
}

impl Default for Rect {
    fn default() -> Self {
        Self::world(1000.0, 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_contains_edges() {
        let rect = Rect::new(10.0, 10.0, 20.0, 20.0);
        assert!(rect.contains(Vec2::new(10.0, 10.0)));
        assert!(rect.contains(Vec2::new(30.0, 30.0)));
        assert!(rect.contains(Vec2::new(20.0, 15.0)));
        assert!(!rect.contains(Vec2::new(30.1, 15.0)));
        assert!(!rect.contains(Vec2::new(15.0, 9.9)));
    }

    #[test]
    fn test_rect_quadrants_partition() {
        let rect = Rect::world(100.0, 50.0);
        assert_eq!(rect.quadrant(Quadrant::NorthWest), Rect::new(0.0, 0.0, 50.0, 25.0));
        assert_eq!(rect.quadrant(Quadrant::NorthEast), Rect::new(50.0, 0.0, 50.0, 25.0));
        assert_eq!(rect.quadrant(Quadrant::SouthWest), Rect::new(0.0, 25.0, 50.0, 25.0));
        assert_eq!(rect.quadrant(Quadrant::SouthEast), Rect::new(50.0, 25.0, 50.0, 25.0));
        assert_eq!(rect.min_side(), 50.0);
    }

    #[test]
    fn test_overlaps_square() {
        let rect = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(rect.overlaps_square(Vec2::new(12.0, 5.0), 2.0));
        assert!(!rect.overlaps_square(Vec2::new(12.5, 5.0), 2.0));
        assert!(rect.overlaps_square(Vec2::new(-1.0, -1.0), 1.0));
    }

    #[test]
    fn test_quadrant_flips() {
        assert_eq!(Quadrant::NorthEast.flip_vertical(), Quadrant::SouthEast);
        assert_eq!(Quadrant::SouthWest.flip_vertical(), Quadrant::NorthWest);
        assert_eq!(Quadrant::NorthEast.flip_horizontal(), Quadrant::NorthWest);
        assert_eq!(Quadrant::SouthWest.flip_horizontal(), Quadrant::SouthEast);
        for quadrant in Quadrant::ALL {
            assert_eq!(Quadrant::from_index(quadrant.index()), quadrant);
        }
    }
}
