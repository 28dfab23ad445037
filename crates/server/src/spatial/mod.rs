//! Spatial indexing utilities.
//!
//! QuadTree implementation matching the JS MultiOgar-Edited implementation.

mod quadtree;

pub use quadtree::{QuadTree, QuadItem, Bounds};
