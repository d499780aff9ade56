//! Error types for the quadtree.

use thiserror::Error;

/// Errors reported by [`Quadtree`](crate::Quadtree) operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QuadtreeError {
    /// The configuration cannot describe a usable tree.
    #[error("invalid quadtree config: {0}")]
    InvalidConfig(String),

    /// The element is not held by any node.
    #[error("element {id} is not in a region")]
    Unindexed {
        /// Element id
        id: u64,
    },

    /// No node of the tree accepts the element at its current position/size.
    #[error("no region accepts element {id} at ({x:.1}, {y:.1}) with size {size:.2}")]
    NoRegion {
        /// Element id
        id: u64,
        /// Position x
        x: f32,
        /// Position y
        y: f32,
        /// Bounding size
        size: f32,
    },

    /// A structural check failed.
    #[error("quadtree invariant violated: {0}")]
    Invariant(String),
}

/// Result alias for quadtree operations.
pub type QuadtreeResult<T> = Result<T, QuadtreeError>;
